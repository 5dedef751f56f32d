pub mod formatter;
pub mod record;

pub use formatter::{format_record, format_scan_summary};
pub use record::{ScanFailure, ScanRecord};
