use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use thiserror::Error;

use super::response::{CookieRecord, Headers, Response};
use crate::errors::ProbeError;

/// A fully resolved request, ready to be sent as-is on every attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub timeout: Duration,
}

impl PreparedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Failure of a single attempt. The executor decides whether to retry.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid HTTP method '{0}'")]
    InvalidMethod(String),

    #[error("invalid header '{name}'")]
    InvalidHeader { name: String },

    #[error("request failed after {elapsed_ms}ms: {source}")]
    Send {
        elapsed_ms: u64,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to read response body: {0}")]
    Body(#[source] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &PreparedRequest) -> Result<Response, TransportError>;
}

/// reqwest-backed transport. Certificates are not verified.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, ProbeError> {
        let client = Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| ProbeError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    fn build(&self, request: &PreparedRequest) -> Result<reqwest::RequestBuilder, TransportError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| TransportError::InvalidMethod(request.method.clone()))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| TransportError::InvalidHeader { name: name.clone() })?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| TransportError::InvalidHeader { name: name.clone() })?;
            headers.insert(header_name, header_value);
        }

        let mut builder = self
            .client
            .request(method, &request.url)
            .headers(headers)
            .timeout(request.timeout);
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        Ok(builder)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &PreparedRequest) -> Result<Response, TransportError> {
        let builder = self.build(request)?;

        let start = Instant::now();
        let resp = builder.send().await.map_err(|source| TransportError::Send {
            elapsed_ms: start.elapsed().as_millis() as u64,
            source,
        })?;

        let status = resp.status().as_u16();

        let mut headers = Headers::new();
        for (name, value) in resp.headers() {
            headers.append(name.as_str(), &String::from_utf8_lossy(value.as_bytes()));
        }

        let cookies: Vec<CookieRecord> = resp
            .cookies()
            .map(|c| CookieRecord {
                name: c.name().to_string(),
                value: c.value().to_string(),
                path: c.path().map(str::to_string),
                domain: c.domain().map(str::to_string),
                http_only: c.http_only(),
                secure: c.secure(),
            })
            .collect();

        let body = resp.text().await.map_err(TransportError::Body)?;

        Ok(Response {
            status,
            headers,
            body,
            cookies,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }
}
