pub mod executor;
pub mod response;
pub mod transport;

pub use executor::{
    effective_timeout, join_url, resolve_cookie_header, RequestExecutor, RequestOptions,
    COOKIE_SENTINEL, MIN_TIMEOUT,
};
pub use response::{CookieRecord, Headers, Response};
pub use transport::{PreparedRequest, ReqwestTransport, Transport, TransportError};
