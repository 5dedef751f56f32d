use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::response::Response;
use super::transport::{PreparedRequest, ReqwestTransport, Transport};
use crate::errors::{with_retry, ProbeError, RetryPolicy, Sleeper, TokioSleeper};

/// `use_cookie` value that sends the cookie stored by an earlier extraction.
pub const COOKIE_SENTINEL: &str = "response.extracted_cookie";

/// Requests never time out sooner than this.
pub const MIN_TIMEOUT: Duration = Duration::from_secs(60);

pub fn effective_timeout(declared: Duration) -> Duration {
    declared.max(MIN_TIMEOUT)
}

/// Join `path` onto `base` with exactly one slash between them.
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

/// Resolve a `use_cookie` directive into the `Cookie` header to send.
pub fn resolve_cookie_header(use_cookie: Option<&str>, stored_cookie: &str) -> Option<String> {
    match use_cookie {
        None | Some("") => None,
        Some(COOKIE_SENTINEL) if stored_cookie.is_empty() => None,
        Some(COOKIE_SENTINEL) => Some(stored_cookie.to_string()),
        Some(verbatim) => Some(verbatim.to_string()),
    }
}

#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
    pub use_cookie: Option<String>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl RequestOptions {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            headers: HashMap::new(),
            body: None,
            use_cookie: None,
            timeout: MIN_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

/// Sends one request per rule, with backoff between failed attempts.
#[derive(Clone)]
pub struct RequestExecutor {
    base_url: String,
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
    verbose: bool,
}

impl RequestExecutor {
    pub fn new(base_url: &str) -> Result<Self, ProbeError> {
        Ok(Self::with_transport(base_url, Arc::new(ReqwestTransport::new()?)))
    }

    pub fn with_transport(base_url: &str, transport: Arc<dyn Transport>) -> Self {
        Self {
            base_url: base_url.to_string(),
            transport,
            sleeper: Arc::new(TokioSleeper),
            verbose: false,
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn prepare(&self, opts: &RequestOptions, stored_cookie: &str) -> PreparedRequest {
        let mut headers: Vec<(String, String)> = opts
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        headers.sort();

        if let Some(cookie) = resolve_cookie_header(opts.use_cookie.as_deref(), stored_cookie) {
            headers.retain(|(name, _)| !name.eq_ignore_ascii_case("cookie"));
            headers.push(("Cookie".to_string(), cookie));
        }

        PreparedRequest {
            method: opts.method.clone(),
            url: join_url(&self.base_url, &opts.path),
            headers,
            body: opts.body.clone().filter(|b| !b.is_empty()),
            timeout: effective_timeout(opts.timeout),
        }
    }

    /// Send the request, retrying until a response is read or the retry
    /// budget is spent. Any status code counts as a response.
    pub async fn execute(&self, opts: &RequestOptions, stored_cookie: &str) -> Result<Response, ProbeError> {
        let request = self.prepare(opts, stored_cookie);

        let operation = format!("{} {}", request.method, request.url);
        let transport = self.transport.clone();
        let verbose = self.verbose;
        let retries = opts.retry.retries();
        let request_ref = &request;

        with_retry(&operation, opts.retry, self.sleeper.as_ref(), verbose, |attempt| {
            let transport = transport.clone();
            async move {
                if verbose {
                    info!(
                        attempt,
                        method = %request_ref.method,
                        url = %request_ref.url,
                        timeout_secs = request_ref.timeout.as_secs(),
                        retries,
                        "Sending request"
                    );
                } else {
                    debug!(attempt, method = %request_ref.method, url = %request_ref.url, "Sending request");
                }
                let response = transport.send(request_ref).await?;
                if verbose {
                    info!(
                        attempt,
                        status = response.status,
                        elapsed_ms = response.elapsed_ms,
                        body_bytes = response.body.len(),
                        "Response received"
                    );
                }
                Ok::<_, super::transport::TransportError>(response)
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::transport::TransportError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Fails the first `failures` sends, then answers 200.
    struct FlakyTransport {
        failures: u32,
        seen: Mutex<Vec<PreparedRequest>>,
    }

    impl FlakyTransport {
        fn new(failures: u32) -> Self {
            Self { failures, seen: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn send(&self, request: &PreparedRequest) -> Result<Response, TransportError> {
            let mut seen = self.seen.lock().unwrap();
            seen.push(request.clone());
            if seen.len() as u32 <= self.failures {
                Err(TransportError::Other(format!("connection reset #{}", seen.len())))
            } else {
                Ok(Response::new(503, "busy"))
            }
        }
    }

    #[derive(Default)]
    struct RecordingSleeper {
        waits: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.waits.lock().unwrap().push(duration);
        }
    }

    fn executor(transport: Arc<FlakyTransport>, sleeper: Arc<RecordingSleeper>) -> RequestExecutor {
        RequestExecutor::with_transport("http://target.local/", transport).with_sleeper(sleeper)
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://a.com/", "/x"), "http://a.com/x");
        assert_eq!(join_url("http://a.com", "x"), "http://a.com/x");
        assert_eq!(join_url("http://a.com//", "/x/y"), "http://a.com/x/y");
        assert_eq!(join_url("http://a.com", ""), "http://a.com/");
    }

    #[test]
    fn test_effective_timeout_floor() {
        assert_eq!(effective_timeout(Duration::ZERO), MIN_TIMEOUT);
        assert_eq!(effective_timeout(Duration::from_secs(30)), MIN_TIMEOUT);
        assert_eq!(effective_timeout(Duration::from_secs(90)), Duration::from_secs(90));
        // Applying the floor twice changes nothing.
        let once = effective_timeout(Duration::from_secs(5));
        assert_eq!(effective_timeout(once), once);
    }

    #[test]
    fn test_resolve_cookie_header() {
        assert_eq!(resolve_cookie_header(None, "sid=1"), None);
        assert_eq!(resolve_cookie_header(Some(""), "sid=1"), None);
        assert_eq!(resolve_cookie_header(Some(COOKIE_SENTINEL), "sid=1"), Some("sid=1".into()));
        assert_eq!(resolve_cookie_header(Some(COOKIE_SENTINEL), ""), None);
        assert_eq!(resolve_cookie_header(Some("token=abc"), "sid=1"), Some("token=abc".into()));
    }

    #[test]
    fn test_prepare_replaces_declared_cookie_header() {
        let exec = executor(Arc::new(FlakyTransport::new(0)), Arc::default());
        let mut opts = RequestOptions::new("POST", "login");
        opts.headers.insert("cookie".into(), "stale=1".into());
        opts.headers.insert("Content-Type".into(), "application/x-www-form-urlencoded".into());
        opts.use_cookie = Some(COOKIE_SENTINEL.into());
        opts.body = Some("user=admin".into());
        opts.timeout = Duration::from_secs(10);

        let req = exec.prepare(&opts, "sid=fresh");
        assert_eq!(req.url, "http://target.local/login");
        assert_eq!(req.header("Cookie"), Some("sid=fresh"));
        assert_eq!(req.headers.iter().filter(|(n, _)| n.eq_ignore_ascii_case("cookie")).count(), 1);
        assert_eq!(req.body.as_deref(), Some("user=admin"));
        assert_eq!(req.timeout, MIN_TIMEOUT);
    }

    #[test]
    fn test_prepare_drops_empty_body() {
        let exec = executor(Arc::new(FlakyTransport::new(0)), Arc::default());
        let mut opts = RequestOptions::new("GET", "/");
        opts.body = Some(String::new());
        assert!(exec.prepare(&opts, "").body.is_none());
    }

    #[tokio::test]
    async fn test_execute_retries_until_response() {
        for n in 0..4u32 {
            let transport = Arc::new(FlakyTransport::new(n));
            let sleeper = Arc::new(RecordingSleeper::default());
            let exec = executor(transport.clone(), sleeper.clone());
            let mut opts = RequestOptions::new("GET", "/");
            opts.retry = RetryPolicy::new(n);

            let response = exec.execute(&opts, "").await.unwrap();
            // A 5xx is still a readable response.
            assert_eq!(response.status, 503);

            let expected: Vec<Duration> = (1..=n).map(|i| Duration::from_secs(2 * u64::from(i))).collect();
            assert_eq!(*sleeper.waits.lock().unwrap(), expected);

            let seen = transport.seen.lock().unwrap();
            assert_eq!(seen.len() as u32, n + 1);
            assert!(seen.iter().all(|r| *r == seen[0]));
        }
    }

    #[tokio::test]
    async fn test_execute_exhaustion_reports_last_error() {
        let transport = Arc::new(FlakyTransport::new(10));
        let sleeper = Arc::new(RecordingSleeper::default());
        let exec = executor(transport.clone(), sleeper.clone());
        let mut opts = RequestOptions::new("GET", "/");
        opts.retry = RetryPolicy::new(2);

        let err = exec.execute(&opts, "").await.unwrap_err();
        match err {
            ProbeError::Request { attempts, message } => {
                assert_eq!(attempts, 3);
                assert!(message.contains("#3"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(transport.seen.lock().unwrap().len(), 3);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_verbose_logs_every_attempt() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let exec = executor(Arc::new(FlakyTransport::new(2)), Arc::default()).with_verbose(true);
        let mut opts = RequestOptions::new("GET", "/");
        opts.retry = RetryPolicy::new(2);
        exec.execute(&opts, "").await.unwrap();

        let text = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert_eq!(text.matches("Sending request").count(), 3);
        assert_eq!(text.matches("Response received").count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_method_spends_retry_budget() {
        let transport = Arc::new(ReqwestTransport::new().unwrap());
        let sleeper = Arc::new(RecordingSleeper::default());
        let exec = RequestExecutor::with_transport("http://127.0.0.1:1", transport).with_sleeper(sleeper.clone());
        let mut opts = RequestOptions::new("GE T", "/");
        opts.retry = RetryPolicy::new(2);

        let err = exec.execute(&opts, "").await.unwrap_err();
        match err {
            ProbeError::Request { attempts, message } => {
                assert_eq!(attempts, 3);
                assert!(message.contains("GE T"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(
            *sleeper.waits.lock().unwrap(),
            vec![Duration::from_secs(2), Duration::from_secs(4)]
        );
    }

    #[tokio::test]
    async fn test_single_attempt_without_retries() {
        let transport = Arc::new(FlakyTransport::new(1));
        let sleeper = Arc::new(RecordingSleeper::default());
        let exec = executor(transport.clone(), sleeper.clone());
        let opts = RequestOptions::new("GET", "/");

        assert!(exec.execute(&opts, "").await.is_err());
        assert_eq!(transport.seen.lock().unwrap().len(), 1);
        assert!(sleeper.waits.lock().unwrap().is_empty());
    }
}
