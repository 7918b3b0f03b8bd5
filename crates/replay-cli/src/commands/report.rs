use clap::Subcommand;
use chrono::Utc;
use replay_core::week::parse_date;
use serde_json::json;

use super::{print_json, CommandResult, Context};

#[derive(Subcommand)]
pub enum ReportAction {
    /// Reports due for dispatch across all users
    Due {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Claim a due report before dispatching it
    Claim {
        /// Week start (YYYY-MM-DD)
        #[arg(long)]
        week: String,
    },
    /// Give up a claim after a failed dispatch
    Release {
        #[arg(long)]
        week: String,
    },
    /// Mark a week's report as delivered
    MarkSent {
        #[arg(long)]
        week: String,
    },
}

pub fn run(ctx: &Context, action: ReportAction) -> CommandResult {
    let svc = ctx.service()?;
    let now = Utc::now();

    match action {
        ReportAction::Due { limit } => print_json(&svc.due_reports(now, limit)?),
        ReportAction::Claim { week } => {
            let claimed = svc.claim_weekly_report(ctx.user()?, parse_date(&week)?, now)?;
            print_json(&json!({ "claimed": claimed.is_some(), "record": claimed }))
        }
        ReportAction::Release { week } => {
            print_json(&svc.release_weekly_report(ctx.user()?, parse_date(&week)?, now)?)
        }
        ReportAction::MarkSent { week } => {
            print_json(&svc.mark_weekly_report_sent(ctx.user()?, parse_date(&week)?, now)?)
        }
    }
}
