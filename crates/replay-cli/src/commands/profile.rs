use clap::Subcommand;
use chrono::Utc;
use serde_json::json;

use super::{print_json, CommandResult, Context};

#[derive(Subcommand)]
pub enum ProfileAction {
    /// Set the user's IANA timezone (e.g. "Europe/Berlin")
    Timezone { timezone: String },
    /// Show the timezone the user's weeks are computed in
    Show,
}

pub fn run(ctx: &Context, action: ProfileAction) -> CommandResult {
    let svc = ctx.service()?;
    let user = ctx.user()?;

    match action {
        ProfileAction::Timezone { timezone } => {
            let tz = svc.set_timezone(user, &timezone, Utc::now())?;
            print_json(&json!({ "userId": user, "timezone": tz.name() }))
        }
        ProfileAction::Show => {
            let tz = svc.timezone_for(user);
            print_json(&json!({ "userId": user, "timezone": tz.name() }))
        }
    }
}
