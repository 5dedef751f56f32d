pub mod types;
pub mod classification;
pub mod retry;

pub use types::{ProbeError, Stage};
pub use classification::ErrorClassification;
pub use retry::{RetryPolicy, Sleeper, TokioSleeper, with_retry};
