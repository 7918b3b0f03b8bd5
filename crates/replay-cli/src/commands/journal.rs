use clap::Subcommand;
use chrono::Utc;

use super::{instant_or_now, print_update, CommandResult, Context};

#[derive(Subcommand)]
pub enum JournalAction {
    /// Record a created journal entry
    Add {
        /// Entry date as RFC 3339 (defaults to now)
        #[arg(long)]
        date: Option<String>,
    },
    /// Record a deleted journal entry
    Remove {
        /// Date of the deleted entry as RFC 3339 (defaults to now)
        #[arg(long)]
        date: Option<String>,
    },
}

pub fn run(ctx: &Context, action: JournalAction) -> CommandResult {
    let svc = ctx.service()?;
    let user = ctx.user()?;
    let now = Utc::now();

    let update = match action {
        JournalAction::Add { date } => {
            svc.journal_created(user, instant_or_now(date.as_deref())?, now)?
        }
        JournalAction::Remove { date } => {
            svc.journal_deleted(user, instant_or_now(date.as_deref())?, now)?
        }
    };
    print_update(&update)
}
