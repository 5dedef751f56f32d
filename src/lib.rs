pub mod auth;
pub mod cli;
pub mod config;
pub mod errors;
pub mod expression;
pub mod http;
pub mod pipeline;
pub mod reporting;

pub use config::{PocConfig, RuleSet, RuleSpec};
pub use errors::{ProbeError, Stage};
pub use pipeline::{run, Engine, ExecutionContext, RunReport};
