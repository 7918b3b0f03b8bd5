use clap::Subcommand;
use chrono::Utc;
use serde_json::json;

use super::{print_json, CommandResult, Context};

#[derive(Subcommand)]
pub enum ProgressAction {
    /// Current week's summary
    Week,
    /// Recent weeks, newest first
    History {
        /// Number of weeks to look back, current week included
        #[arg(long, default_value_t = 4)]
        weeks: u32,
    },
    /// Rebuild the current week's summary and sync audience tags
    Recompute,
}

pub fn run(ctx: &Context, action: ProgressAction) -> CommandResult {
    let svc = ctx.service()?;
    let user = ctx.user()?;
    let now = Utc::now();

    match action {
        ProgressAction::Week => print_json(&svc.current_week(user, now)?),
        ProgressAction::History { weeks } => print_json(&svc.history(user, weeks, now)?),
        ProgressAction::Recompute => {
            let outcome = svc.recompute_weekly_progress(user, now)?;
            print_json(&json!({ "summary": outcome.summary, "tagSync": outcome.sync }))
        }
    }
}
