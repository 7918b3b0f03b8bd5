//! Weekly progress: the per-user-per-week ledger, its derivation rules,
//! the read model, and the service that lifecycle events call into.

pub mod ledger;
pub mod record;
pub mod rules;
pub mod service;
pub mod summary;

pub use ledger::ProgressLedger;
pub use record::{ProgressThresholds, WeeklyProgressRecord};
pub use rules::{determine_report_scheduling, should_queue_weekly_report, ProgressEvent};
pub use service::{ProgressService, ProgressUpdate, RecomputeOutcome};
pub use summary::{build_progress_summary, ProgressSummary};
