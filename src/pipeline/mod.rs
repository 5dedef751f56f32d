pub mod orchestrator;
pub mod state;

pub use orchestrator::{run, Engine};
pub use state::{ExecutionContext, RuleReason, RuleReport, RuleState, RuleWarning, RunReport};
