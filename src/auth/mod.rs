pub mod cookie_extractor;

pub use cookie_extractor::{extract_cookie, validate_cookie};
