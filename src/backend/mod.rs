//! Provider capability contract and normalized request/response types.
//!
//! The [`Backend`] trait abstracts over the supported LLM providers,
//! translating between the normalized [`LlmRequest`]/[`LlmResponse`] types and
//! each provider's HTTP API. The set of providers is closed: [`Provider`]
//! names every variant, and [`Provider::backend`] builds the matching
//! implementation.
//!
//! ## Architecture
//!
//! ```text
//! LlmClient ──► LlmRequest ──► Backend::complete() / open_stream()
//!                                      │
//!                           ┌──────────┴──────────┐
//!                  AnthropicBackend         OpenAiBackend
//!                  /v1/messages             /v1/chat/completions
//!                  SSE content deltas       SSE choice deltas
//! ```
//!
//! Backends report failures as [`BackendError`]. Classification into the
//! crate's error taxonomy happens in the client, not here.

pub mod anthropic;
pub mod backoff;
pub mod mock;
pub mod openai;
pub mod sse;

pub use anthropic::AnthropicBackend;
pub use backoff::BackoffConfig;
pub use mock::{MockBackend, MockReply};
pub use openai::OpenAiBackend;

use async_trait::async_trait;
use futures::stream::BoxStream;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ReportError;

/// The closed set of LLM providers.
///
/// Adding a provider means adding a variant here and a [`Backend`]
/// implementation; nothing dispatches on provider strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Anthropic,
    OpenAi,
}

impl Provider {
    /// Every supported provider, in declaration order.
    pub const ALL: [Provider; 2] = [Provider::Anthropic, Provider::OpenAi];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::OpenAi => "openai",
        }
    }

    /// Environment variable conventionally holding this provider's API key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::OpenAi => "OPENAI_API_KEY",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::Anthropic => "https://api.anthropic.com",
            Provider::OpenAi => "https://api.openai.com",
        }
    }

    /// Build the concrete backend for this provider.
    ///
    /// A missing key is not an error here; the client checks
    /// [`Backend::has_credential`] before every call.
    pub fn backend(&self, api_key: Option<String>, base_url: Option<String>) -> Box<dyn Backend> {
        let base_url = base_url.unwrap_or_else(|| self.default_base_url().to_string());
        match self {
            Provider::Anthropic => {
                let mut backend = AnthropicBackend::new().with_base_url(base_url);
                if let Some(key) = api_key {
                    backend = backend.with_api_key(key);
                }
                Box::new(backend)
            }
            Provider::OpenAi => {
                let mut backend = OpenAiBackend::new().with_base_url(base_url);
                if let Some(key) = api_key {
                    backend = backend.with_api_key(key);
                }
                Box::new(backend)
            }
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Provider::Anthropic),
            "openai" => Ok(Provider::OpenAi),
            other => Err(ReportError::Configuration(format!(
                "unsupported LLM provider: '{}' (expected one of: anthropic, openai)",
                other
            ))),
        }
    }
}

/// A provider-agnostic LLM request.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    /// Resolved model identifier (never empty by the time a backend sees it).
    pub model: String,
    pub system_prompt: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
    /// Sampling temperature in `[0, 1]`.
    pub temperature: f64,
    pub stream: bool,
}

/// Provider-reported token accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

impl Usage {
    /// Total tokens, derived from input + output when the provider does not
    /// report a total. The derived sum saturates at `u32::MAX`.
    pub fn total(&self) -> Option<u32> {
        self.total_tokens.or(match (self.input_tokens, self.output_tokens) {
            (Some(i), Some(o)) => Some(i.saturating_add(o)),
            _ => None,
        })
    }
}

/// A normalized, non-streaming LLM response.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    /// HTTP status code (for diagnostics/logging).
    pub status: u16,
    /// Model identifier echoed by the provider, if any.
    pub model: Option<String>,
    pub usage: Option<Usage>,
}

/// Lazy, finite sequence of text chunks from a streaming call.
///
/// Dropping the stream drops the underlying HTTP response, which closes the
/// connection.
pub type TextStream = BoxStream<'static, std::result::Result<String, BackendError>>;

/// Raw backend failure, before classification.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The provider signalled throttling (HTTP 429).
    #[error("rate limited: {body}")]
    RateLimited {
        body: String,
        /// Parsed `Retry-After` header value, if present.
        retry_after: Option<Duration>,
    },

    /// Any other non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Connection refused, timeout, or a broken body stream.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body did not have the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),

    /// An error event delivered inside an open stream.
    #[error("stream error: {0}")]
    Stream(String),
}

impl BackendError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, BackendError::RateLimited { .. })
    }
}

/// Abstraction over LLM providers.
///
/// Implementors translate between the normalized [`LlmRequest`]/[`LlmResponse`]
/// and the provider's HTTP API. Two modes: a single-shot completion and a
/// lazily consumed text stream.
///
/// # Object Safety
///
/// This trait is object-safe and designed to be used as `Arc<dyn Backend>`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Which provider this backend talks to.
    fn provider(&self) -> Provider;

    /// Whether an API key is configured. Checked before any network call.
    fn has_credential(&self) -> bool;

    /// Execute a non-streaming LLM call.
    async fn complete(
        &self,
        client: &Client,
        request: &LlmRequest,
    ) -> Result<LlmResponse, BackendError>;

    /// Open a streaming LLM call.
    ///
    /// Errors that occur before the first byte (including rate limiting) are
    /// returned here; errors after that surface as stream items.
    async fn open_stream(
        &self,
        client: &Client,
        request: &LlmRequest,
    ) -> Result<TextStream, BackendError>;

    /// Human-readable name for logging and diagnostics.
    fn name(&self) -> &'static str {
        self.provider().as_str()
    }
}

/// Parse a `Retry-After` header value as seconds.
pub(crate) fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Turn a non-success response into a [`BackendError`], passing successful
/// responses through untouched.
pub(crate) async fn ensure_success(
    resp: reqwest::Response,
) -> Result<reqwest::Response, BackendError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let retry_after = resp
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    let body = resp.text().await.unwrap_or_default();

    if status == StatusCode::TOO_MANY_REQUESTS {
        Err(BackendError::RateLimited { body, retry_after })
    } else {
        Err(BackendError::Http {
            status: status.as_u16(),
            body,
        })
    }
}

/// Redact all but a short prefix of an API key for `Debug` output.
pub(crate) fn redact_key(key: &Option<String>) -> Option<String> {
    key.as_ref().map(|k| match k.get(..6) {
        Some(prefix) if k.len() > 6 => format!("{prefix}***"),
        _ => "***".to_string(),
    })
}

/// Canned HTTP/1.1 responses served from a local socket.
#[cfg(test)]
pub(crate) mod test_server {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// One response, written in `parts` with a short pause between writes.
    #[derive(Debug, Clone)]
    pub(crate) struct Canned {
        parts: Vec<Vec<u8>>,
        hold_open: bool,
    }

    impl Canned {
        pub(crate) fn json(status: &str, headers: &[(&str, &str)], body: &str) -> Self {
            let mut head = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n",
                body.len()
            );
            for (name, value) in headers {
                head.push_str(&format!("{name}: {value}\r\n"));
            }
            head.push_str("\r\n");
            Self {
                parts: vec![head.into_bytes(), body.as_bytes().to_vec()],
                hold_open: false,
            }
        }

        /// An event stream without a length; the body ends when the socket closes.
        pub(crate) fn sse(parts: &[&str]) -> Self {
            let head = "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n";
            let mut all = vec![head.as_bytes().to_vec()];
            all.extend(parts.iter().map(|p| p.as_bytes().to_vec()));
            Self {
                parts: all,
                hold_open: false,
            }
        }

        /// Leave the socket open after the last write.
        pub(crate) fn hold_open(mut self) -> Self {
            self.hold_open = true;
            self
        }
    }

    /// Serve `responses` to successive connections; the last one repeats.
    /// Returns the base URL and a connection counter.
    pub(crate) async fn serve(responses: Vec<Canned>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let canned = responses[n.min(responses.len() - 1)].clone();
                tokio::spawn(respond(stream, canned));
            }
        });

        (format!("http://{addr}"), hits)
    }

    async fn respond(mut stream: TcpStream, canned: Canned) {
        if read_request(&mut stream).await.is_err() {
            return;
        }
        for part in &canned.parts {
            if stream.write_all(part).await.is_err() {
                return;
            }
            let _ = stream.flush().await;
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        if canned.hold_open {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        let _ = stream.shutdown().await;
    }

    /// Consume the request head and body so closing never resets the socket.
    async fn read_request(stream: &mut TcpStream) -> std::io::Result<()> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Ok(());
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
                let body_len = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + body_len {
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ensure_success_maps_429_with_retry_after() {
        let (base, _) = test_server::serve(vec![test_server::Canned::json(
            "429 Too Many Requests",
            &[("retry-after", "5")],
            r#"{"error":{"message":"slow down"}}"#,
        )])
        .await;

        let resp = Client::new().get(format!("{base}/v1/messages")).send().await.unwrap();
        match ensure_success(resp).await {
            Err(BackendError::RateLimited { body, retry_after }) => {
                assert_eq!(retry_after, Some(Duration::from_secs(5)));
                assert!(body.contains("slow down"));
            }
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ensure_success_maps_other_status_to_http() {
        let (base, _) = test_server::serve(vec![test_server::Canned::json(
            "401 Unauthorized",
            &[],
            r#"{"error":{"message":"invalid x-api-key"}}"#,
        )])
        .await;

        let resp = Client::new().get(&base).send().await.unwrap();
        match ensure_success(resp).await {
            Err(BackendError::Http { status, body }) => {
                assert_eq!(status, 401);
                assert!(body.contains("invalid x-api-key"));
            }
            other => panic!("expected HTTP error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ensure_success_passes_success_through() {
        let (base, _) =
            test_server::serve(vec![test_server::Canned::json("200 OK", &[], r#"{"ok":true}"#)]).await;

        let resp = Client::new().get(&base).send().await.unwrap();
        let resp = ensure_success(resp).await.unwrap();
        assert_eq!(resp.text().await.unwrap(), r#"{"ok":true}"#);
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!("anthropic".parse::<Provider>().unwrap(), Provider::Anthropic);
        assert_eq!("OpenAI".parse::<Provider>().unwrap(), Provider::OpenAi);
        assert_eq!(" openai ".parse::<Provider>().unwrap(), Provider::OpenAi);
    }

    #[test]
    fn test_unknown_provider_is_configuration_error() {
        let err = "cohere".parse::<Provider>().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("cohere"));
    }

    #[test]
    fn test_provider_display_round_trips() {
        for provider in Provider::ALL {
            assert_eq!(provider.to_string().parse::<Provider>().unwrap(), provider);
        }
    }

    #[test]
    fn test_provider_backend_matches_variant() {
        let backend = Provider::OpenAi.backend(Some("sk-test".into()), None);
        assert_eq!(backend.provider(), Provider::OpenAi);
        assert!(backend.has_credential());

        let backend = Provider::Anthropic.backend(None, None);
        assert_eq!(backend.name(), "anthropic");
        assert!(!backend.has_credential());
    }

    #[test]
    fn test_usage_total_derived() {
        let usage = Usage {
            input_tokens: Some(120),
            output_tokens: Some(30),
            total_tokens: None,
        };
        assert_eq!(usage.total(), Some(150));

        let reported = Usage {
            total_tokens: Some(7),
            ..Default::default()
        };
        assert_eq!(reported.total(), Some(7));
        assert_eq!(Usage::default().total(), None);
    }

    #[test]
    fn test_usage_total_saturates() {
        let usage = Usage {
            input_tokens: Some(u32::MAX),
            output_tokens: Some(1),
            total_tokens: None,
        };
        assert_eq!(usage.total(), Some(u32::MAX));
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("30"), Some(Duration::from_secs(30)));
        assert_eq!(parse_retry_after(" 5 "), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn test_redact_key() {
        assert_eq!(redact_key(&Some("sk-1234567890".into())), Some("sk-123***".into()));
        assert_eq!(redact_key(&Some("abc".into())), Some("***".into()));
        assert_eq!(redact_key(&None), None);
    }
}
