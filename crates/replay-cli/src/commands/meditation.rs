use clap::Subcommand;
use chrono::Utc;

use super::{instant_or_now, print_update, CommandResult, Context};

#[derive(Subcommand)]
pub enum MeditationAction {
    /// Record a completed meditation
    Complete {
        /// Completion time as RFC 3339 (defaults to now)
        #[arg(long)]
        at: Option<String>,
    },
}

pub fn run(ctx: &Context, action: MeditationAction) -> CommandResult {
    let svc = ctx.service()?;
    let user = ctx.user()?;

    match action {
        MeditationAction::Complete { at } => {
            let completed_at = instant_or_now(at.as_deref())?;
            let update = svc.meditation_completed(user, completed_at, Utc::now())?;
            print_update(&update)
        }
    }
}
