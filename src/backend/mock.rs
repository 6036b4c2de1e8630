//! Mock backend for testing without a live LLM.
//!
//! [`MockBackend`] plays back a script of [`MockReply`] values in order,
//! counts calls, and records every request it receives, so callers can
//! write deterministic tests against the client, the generator, and the
//! orchestrator.
//!
//! # Example
//!
//! ```
//! use report_pipeline::backend::{MockBackend, MockReply};
//!
//! let mock = MockBackend::fixed("Hello, world!");
//! let throttled = MockBackend::new(vec![MockReply::RateLimited, MockReply::text("ok")]);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;

use super::{Backend, BackendError, LlmRequest, LlmResponse, Provider, TextStream, Usage};

/// One scripted outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    /// A successful completion with no usage data.
    Text(String),
    /// A successful completion with provider-reported token counts.
    WithUsage {
        text: String,
        input_tokens: u32,
        output_tokens: u32,
    },
    /// HTTP 429.
    RateLimited,
    /// Any other non-success status.
    Http { status: u16, body: String },
    /// A stream that yields these chunks and then ends.
    Stream(Vec<String>),
    /// A stream that yields these chunks and then fails.
    BrokenStream { chunks: Vec<String>, message: String },
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        MockReply::Text(text.into())
    }

    pub fn with_usage(text: impl Into<String>, input_tokens: u32, output_tokens: u32) -> Self {
        MockReply::WithUsage {
            text: text.into(),
            input_tokens,
            output_tokens,
        }
    }

    pub fn http(status: u16, body: impl Into<String>) -> Self {
        MockReply::Http {
            status,
            body: body.into(),
        }
    }
}

/// A test backend that plays back scripted replies in order.
///
/// Once the script is exhausted the last reply repeats.
#[derive(Debug)]
pub struct MockBackend {
    replies: Vec<MockReply>,
    index: AtomicUsize,
    provider: Provider,
    has_credential: bool,
    requests: Mutex<Vec<LlmRequest>>,
}

impl MockBackend {
    /// Create a mock backend with the given script.
    ///
    /// An empty script behaves like a single empty text reply.
    pub fn new(replies: Vec<MockReply>) -> Self {
        let replies = if replies.is_empty() {
            vec![MockReply::Text(String::new())]
        } else {
            replies
        };
        Self {
            replies,
            index: AtomicUsize::new(0),
            provider: Provider::Anthropic,
            has_credential: true,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that always returns the same text.
    pub fn fixed(response: impl Into<String>) -> Self {
        Self::new(vec![MockReply::Text(response.into())])
    }

    /// Create a mock that is always throttled.
    pub fn rate_limited() -> Self {
        Self::new(vec![MockReply::RateLimited])
    }

    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = provider;
        self
    }

    /// Report no API key, so the client refuses to call.
    pub fn without_credential(mut self) -> Self {
        self.has_credential = false;
        self
    }

    /// Number of calls made so far (completions and stream opens).
    pub fn calls(&self) -> usize {
        self.index.load(Ordering::SeqCst)
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn next_reply(&self, request: &LlmRequest) -> MockReply {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());
        let idx = self.index.fetch_add(1, Ordering::SeqCst);
        let idx = idx.min(self.replies.len() - 1);
        self.replies[idx].clone()
    }
}

fn rate_limit_error() -> BackendError {
    BackendError::RateLimited {
        body: r#"{"error":{"type":"rate_limit_error","message":"Too many requests"}}"#.into(),
        retry_after: None,
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn has_credential(&self) -> bool {
        self.has_credential
    }

    async fn complete(
        &self,
        _client: &Client,
        request: &LlmRequest,
    ) -> Result<LlmResponse, BackendError> {
        let (text, usage) = match self.next_reply(request) {
            MockReply::Text(text) => (text, None),
            MockReply::WithUsage {
                text,
                input_tokens,
                output_tokens,
            } => (
                text,
                Some(Usage {
                    input_tokens: Some(input_tokens),
                    output_tokens: Some(output_tokens),
                    total_tokens: None,
                }),
            ),
            MockReply::Stream(chunks) => (chunks.concat(), None),
            MockReply::RateLimited => return Err(rate_limit_error()),
            MockReply::Http { status, body } => return Err(BackendError::Http { status, body }),
            MockReply::BrokenStream { message, .. } => {
                return Err(BackendError::Stream(message))
            }
        };

        Ok(LlmResponse {
            text,
            status: 200,
            model: Some(request.model.clone()),
            usage,
        })
    }

    async fn open_stream(
        &self,
        _client: &Client,
        request: &LlmRequest,
    ) -> Result<TextStream, BackendError> {
        let items: Vec<Result<String, BackendError>> = match self.next_reply(request) {
            MockReply::Text(text) | MockReply::WithUsage { text, .. } => vec![Ok(text)],
            MockReply::Stream(chunks) => chunks.into_iter().map(Ok).collect(),
            MockReply::BrokenStream { chunks, message } => chunks
                .into_iter()
                .map(Ok)
                .chain(std::iter::once(Err(BackendError::Stream(message))))
                .collect(),
            MockReply::RateLimited => return Err(rate_limit_error()),
            MockReply::Http { status, body } => return Err(BackendError::Http { status, body }),
        };

        Ok(futures::stream::iter(items).boxed())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
