//! Provider-agnostic LLM client with rate-limit retry and error classification.
//!
//! [`LlmClient`] owns the configured [`Backend`], the HTTP client, and the
//! retry schedule. It is constructed once from [`Settings`] (or directly from
//! a backend in tests) and shared behind an `Arc`; every call is independent.
//!
//! Raw [`BackendError`]s never leave this module: they are narrowed into
//! [`ReportError::RateLimited`] (after the retry budget is spent) or
//! [`ReportError::Upstream`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backend::{Backend, BackendError, BackoffConfig, LlmRequest, Provider, Usage};
use crate::config::Settings;
use crate::error::{ReportError, Result};
use crate::events::{emit, Event, EventHandler};

/// Per-call parameters.
///
/// # Example
///
/// ```
/// use report_pipeline::client::GenerateOptions;
///
/// let opts = GenerateOptions::default()
///     .max_tokens(8000)
///     .temperature(0.7)
///     .system_prompt("You are a business analyst.");
/// assert_eq!(opts.max_tokens, 8000);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateOptions {
    /// Overrides the client's default model when set and non-empty.
    pub model: Option<String>,
    pub max_tokens: u32,
    /// Clamped to `[0, 1]`.
    pub temperature: f64,
    pub system_prompt: Option<String>,
    /// Stream from the provider and collect the chunks. Usage is not
    /// reported in this mode.
    pub stream: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: 4000,
            temperature: 0.7,
            system_prompt: None,
            stream: false,
        }
    }
}

impl GenerateOptions {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature.clamp(0.0, 1.0);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

/// Output of a single generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    /// Which backend answered.
    pub provider: Provider,
    pub content: String,
    /// Model reported by the provider, or the requested model.
    pub model: String,
    pub tokens_used: Option<u32>,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    /// Wall-clock time including any backoff waits.
    pub generation_time_seconds: f64,
}

/// Chunks from [`LlmClient::generate_stream`], already classified.
pub type GenerationStream = BoxStream<'static, Result<String>>;

/// The LLM client.
///
/// # Example
///
/// ```
/// use report_pipeline::backend::MockBackend;
/// use report_pipeline::client::LlmClient;
/// use std::sync::Arc;
///
/// let client = LlmClient::with_backend(Arc::new(MockBackend::fixed("hi")), "test-model");
/// assert_eq!(client.default_model(), "test-model");
/// ```
#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    backend: Arc<dyn Backend>,
    default_model: String,
    backoff: BackoffConfig,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("provider", &self.backend.provider())
            .field("backend", &self.backend.name())
            .field("default_model", &self.default_model)
            .field("backoff", &self.backoff)
            .field("has_event_handler", &self.event_handler.is_some())
            .finish()
    }
}

impl LlmClient {
    /// Build a client from loaded settings.
    ///
    /// Fails with a configuration error when the provider name is unknown.
    /// A missing API key is reported on the first call instead, so a
    /// misconfigured process can still start.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let provider = settings.provider()?;
        let backend = provider.backend(settings.api_key(provider), settings.base_url(provider));

        let http = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| ReportError::Configuration(format!("failed to build HTTP client: {e}")))?;

        info!(%provider, model = settings.model(provider), "LLM client configured");

        Ok(Self {
            http,
            backend: Arc::from(backend),
            default_model: settings.model(provider).to_string(),
            backoff: BackoffConfig::rate_limit(),
            event_handler: None,
        })
    }

    /// Build a client around an explicit backend.
    pub fn with_backend(backend: Arc<dyn Backend>, default_model: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            backend,
            default_model: default_model.into(),
            backoff: BackoffConfig::rate_limit(),
            event_handler: None,
        }
    }

    /// Replace the rate-limit retry schedule.
    pub fn backoff(mut self, config: BackoffConfig) -> Self {
        self.backoff = config;
        self
    }

    pub fn event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    pub fn provider(&self) -> Provider {
        self.backend.provider()
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Send `prompt` and wait for the full response.
    #[tracing::instrument(
        skip(self, prompt, options),
        fields(provider = %self.provider(), stream = options.stream, prompt_chars = prompt.len())
    )]
    pub async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<GenerationResult> {
        self.check_credential()?;

        let request = self.build_request(prompt, options);
        let started = Instant::now();
        emit(
            &self.event_handler,
            Event::GenerationStart {
                provider: self.provider(),
                model: request.model.clone(),
            },
        );

        let outcome = if request.stream {
            self.collect_stream(&request).await
        } else {
            self.with_rate_limit_retry(|| self.backend.complete(&self.http, &request))
                .await
                .map(|resp| (resp.text, resp.model, resp.usage))
        };

        emit(&self.event_handler, Event::GenerationEnd { ok: outcome.is_ok() });

        let (content, model, usage) = outcome?;
        let usage = usage.unwrap_or_default();
        let elapsed = started.elapsed().as_secs_f64();

        debug!(
            chars = content.len(),
            tokens = usage.total(),
            elapsed_secs = elapsed,
            "generation complete"
        );

        Ok(GenerationResult {
            provider: self.provider(),
            content,
            model: model.unwrap_or(request.model),
            tokens_used: usage.total(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            generation_time_seconds: elapsed,
        })
    }

    /// Open a lazy stream of text chunks.
    ///
    /// Rate limits hit while opening the stream are retried like
    /// [`generate`](Self::generate). Once chunks flow, the first error ends
    /// the stream. Dropping the stream closes the connection.
    #[tracing::instrument(skip(self, prompt, options), fields(provider = %self.provider()))]
    pub async fn generate_stream(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<GenerationStream> {
        self.check_credential()?;

        let mut request = self.build_request(prompt, options);
        request.stream = true;

        let stream = self
            .with_rate_limit_retry(|| self.backend.open_stream(&self.http, &request))
            .await?;

        let provider = self.provider();
        let handler = self.event_handler.clone();
        Ok(stream
            .map_err(move |e| classify(provider, e))
            .inspect_ok(move |chunk| {
                emit(&handler, Event::Token { chunk: chunk.clone() });
            })
            .boxed())
    }

    /// Fail with [`ReportError::MissingCredential`] when the backend has no API key.
    pub fn check_credential(&self) -> Result<()> {
        if self.backend.has_credential() {
            return Ok(());
        }
        let provider = self.provider();
        warn!(%provider, "refusing to call provider without an API key");
        Err(ReportError::MissingCredential {
            provider,
            env_var: provider.api_key_env(),
        })
    }

    fn build_request(&self, prompt: &str, options: &GenerateOptions) -> LlmRequest {
        let model = options
            .model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.default_model)
            .to_string();

        LlmRequest {
            model,
            system_prompt: options.system_prompt.clone(),
            prompt: prompt.to_string(),
            max_tokens: options.max_tokens,
            temperature: options.temperature.clamp(0.0, 1.0),
            stream: options.stream,
        }
    }

    async fn collect_stream(
        &self,
        request: &LlmRequest,
    ) -> Result<(String, Option<String>, Option<Usage>)> {
        let mut stream = self
            .with_rate_limit_retry(|| self.backend.open_stream(&self.http, request))
            .await?;

        let mut content = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| classify(self.provider(), e))?;
            emit(&self.event_handler, Event::Token { chunk: chunk.clone() });
            content.push_str(&chunk);
        }

        Ok((content, None, None))
    }

    /// Run `op`, retrying only on rate limits, up to `backoff.max_attempts`.
    async fn with_rate_limit_retry<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, BackendError>>,
    {
        let max_attempts = self.backoff.max_attempts.max(1);
        let mut attempt: u32 = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(BackendError::RateLimited { body, retry_after }) => {
                    if attempt >= max_attempts {
                        warn!(attempts = attempt, "rate limit retries exhausted");
                        return Err(ReportError::RateLimited {
                            attempts: attempt,
                            message: provider_message(&body, "too many requests"),
                        });
                    }

                    let delay = self.backoff.next_delay(attempt, retry_after);
                    let delay_ms = delay.as_millis() as u64;
                    warn!(attempt, delay_ms, "rate limited, backing off");
                    emit(&self.event_handler, Event::RateLimitRetry { attempt, delay_ms });

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(classify(self.provider(), e)),
            }
        }
    }

    /// Upper bound on time spent waiting between rate-limited attempts.
    pub fn max_backoff(&self) -> Duration {
        self.backoff.worst_case_wait()
    }
}

/// Narrow a raw backend failure into the crate taxonomy.
fn classify(provider: Provider, err: BackendError) -> ReportError {
    match err {
        BackendError::RateLimited { body, .. } => ReportError::RateLimited {
            attempts: 1,
            message: provider_message(&body, "too many requests"),
        },
        BackendError::Http { status, body } => ReportError::Upstream {
            provider,
            status: Some(status),
            message: provider_message(&body, "no response body"),
        },
        BackendError::Transport(e) => ReportError::Upstream {
            provider,
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        },
        BackendError::Decode(message) | BackendError::Stream(message) => ReportError::Upstream {
            provider,
            status: None,
            message,
        },
    }
}

/// Pull `error.message` out of a provider error body, falling back to the
/// raw body. Both providers use that envelope.
fn provider_message(body: &str, fallback: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return fallback.to_string();
    }

    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, MockReply};
    use crate::events::FnEventHandler;
    use std::sync::Mutex;

    fn client_for(mock: &Arc<MockBackend>) -> LlmClient {
        LlmClient::with_backend(mock.clone(), "default-model")
    }

    fn recording_handler() -> (Arc<dyn EventHandler>, Arc<Mutex<Vec<Event>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let handler: Arc<dyn EventHandler> = Arc::new(FnEventHandler(move |e: Event| {
            sink.lock().unwrap().push(e);
        }));
        (handler, events)
    }

    #[tokio::test]
    async fn test_generate_returns_content_and_usage() {
        let mock = Arc::new(MockBackend::new(vec![MockReply::with_usage(
            "Generated text",
            120,
            30,
        )]));
        let client = client_for(&mock);

        let result = client
            .generate("Write a report", &GenerateOptions::default())
            .await
            .unwrap();

        assert_eq!(result.provider, Provider::Anthropic);
        assert_eq!(result.content, "Generated text");
        assert_eq!(result.model, "default-model");
        assert_eq!(result.tokens_used, Some(150));
        assert_eq!(result.input_tokens, Some(120));
        assert_eq!(result.output_tokens, Some(30));
        assert!(result.generation_time_seconds >= 0.0);
    }

    #[tokio::test]
    async fn test_request_carries_options() {
        let mock = Arc::new(MockBackend::fixed("ok"));
        let client = client_for(&mock);
        let opts = GenerateOptions::default()
            .model("custom-model")
            .max_tokens(8000)
            .temperature(3.0)
            .system_prompt("sys");

        client.generate("prompt", &opts).await.unwrap();

        let sent = &mock.requests()[0];
        assert_eq!(sent.model, "custom-model");
        assert_eq!(sent.max_tokens, 8000);
        assert_eq!(sent.temperature, 1.0);
        assert_eq!(sent.system_prompt.as_deref(), Some("sys"));
        assert_eq!(sent.prompt, "prompt");
    }

    #[tokio::test]
    async fn test_blank_model_falls_back_to_default() {
        let mock = Arc::new(MockBackend::fixed("ok"));
        let client = client_for(&mock);

        client
            .generate("p", &GenerateOptions::default().model("  "))
            .await
            .unwrap();

        assert_eq!(mock.requests()[0].model, "default-model");
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_credential_never_calls_backend() {
        let mock = Arc::new(MockBackend::fixed("unused").without_credential());
        let client = client_for(&mock);
        let started = Instant::now();

        let err = client
            .generate("p", &GenerateOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ReportError::MissingCredential {
                provider: Provider::Anthropic,
                env_var: "ANTHROPIC_API_KEY"
            }
        ));
        assert!(err.is_configuration());
        assert_eq!(mock.calls(), 0);
        assert_eq!(started.elapsed(), Duration::ZERO);

        assert!(client.generate_stream("p", &GenerateOptions::default()).await.is_err());
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_exhausts_three_attempts() {
        let mock = Arc::new(MockBackend::rate_limited());
        let (handler, events) = recording_handler();
        let client = client_for(&mock).event_handler(handler);
        let started = Instant::now();

        let err = client
            .generate("p", &GenerateOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ReportError::RateLimited { attempts: 3, .. }));
        assert!(err.to_string().contains("Too many requests"));
        assert_eq!(mock.calls(), 3);

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(6), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(7), "elapsed {:?}", elapsed);

        let delays: Vec<u64> = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Event::RateLimitRetry { delay_ms, .. } => Some(*delay_ms),
                _ => None,
            })
            .collect();
        assert_eq!(delays, vec![2000, 4000]);
        assert_eq!(
            events.lock().unwrap().last(),
            Some(&Event::GenerationEnd { ok: false })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_then_success() {
        let mock = Arc::new(MockBackend::new(vec![
            MockReply::RateLimited,
            MockReply::text("recovered"),
        ]));
        let client = client_for(&mock);

        let result = client
            .generate("p", &GenerateOptions::default())
            .await
            .unwrap();

        assert_eq!(result.content, "recovered");
        assert_eq!(mock.calls(), 2);
        assert!(result.generation_time_seconds >= 2.0);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let mock = Arc::new(MockBackend::new(vec![MockReply::http(
            401,
            r#"{"error":{"type":"authentication_error","message":"invalid x-api-key"}}"#,
        )]));
        let client = client_for(&mock);

        let err = client
            .generate("p", &GenerateOptions::default())
            .await
            .unwrap_err();

        match err {
            ReportError::Upstream {
                provider,
                status,
                message,
            } => {
                assert_eq!(provider, Provider::Anthropic);
                assert_eq!(status, Some(401));
                assert_eq!(message, "invalid x-api-key");
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_stream_mode_collects_without_usage() {
        let mock = Arc::new(MockBackend::new(vec![MockReply::Stream(vec![
            "Gener".into(),
            "ated".into(),
        ])]));
        let (handler, events) = recording_handler();
        let client = client_for(&mock).event_handler(handler);

        let result = client
            .generate("p", &GenerateOptions::default().stream(true))
            .await
            .unwrap();

        assert_eq!(result.content, "Generated");
        assert_eq!(result.tokens_used, None);
        assert_eq!(result.input_tokens, None);
        assert!(mock.requests()[0].stream);

        let tokens: Vec<String> = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Event::Token { chunk } => Some(chunk.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(tokens, vec!["Gener", "ated"]);
    }

    #[tokio::test]
    async fn test_generate_stream_yields_chunks() {
        let mock = Arc::new(MockBackend::new(vec![MockReply::Stream(vec![
            "a".into(),
            "b".into(),
            "c".into(),
        ])]));
        let client = client_for(&mock);

        let stream = client
            .generate_stream("p", &GenerateOptions::default())
            .await
            .unwrap();
        let chunks: Vec<String> = stream.try_collect().await.unwrap();

        assert_eq!(chunks, vec!["a", "b", "c"]);
        assert!(mock.requests()[0].stream);
    }

    #[tokio::test]
    async fn test_generate_stream_classifies_mid_stream_error() {
        let mock = Arc::new(MockBackend::new(vec![MockReply::BrokenStream {
            chunks: vec!["partial".into()],
            message: "connection reset".into(),
        }]));
        let client = client_for(&mock);

        let mut stream = client
            .generate_stream("p", &GenerateOptions::default())
            .await
            .unwrap();

        assert_eq!(stream.next().await.unwrap().unwrap(), "partial");
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, ReportError::Upstream { status: None, .. }));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_stream_retries_open_on_rate_limit() {
        let mock = Arc::new(MockBackend::new(vec![
            MockReply::RateLimited,
            MockReply::Stream(vec!["ok".into()]),
        ]));
        let client = client_for(&mock);

        let stream = client
            .generate_stream("p", &GenerateOptions::default())
            .await
            .unwrap();
        let chunks: Vec<String> = stream.try_collect().await.unwrap();

        assert_eq!(chunks, vec!["ok"]);
        assert_eq!(mock.calls(), 2);
    }

    #[test]
    fn test_from_settings_rejects_unknown_provider() {
        let settings = Settings {
            llm_provider: "mistral".into(),
            ..Settings::default()
        };
        let err = LlmClient::from_settings(&settings).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_from_settings_picks_provider_model() {
        let settings = Settings {
            llm_provider: "openai".into(),
            openai_api_key: Some("sk-test".into()),
            ..Settings::default()
        };
        let client = LlmClient::from_settings(&settings).unwrap();
        assert_eq!(client.provider(), Provider::OpenAi);
        assert_eq!(client.default_model(), "gpt-4o");
        assert_eq!(client.max_backoff(), Duration::from_secs(6));
    }

    #[test]
    fn test_provider_message() {
        assert_eq!(
            provider_message(r#"{"error":{"message":"quota exceeded"}}"#, "x"),
            "quota exceeded"
        );
        assert_eq!(provider_message(r#"{"error":"plain"}"#, "x"), "plain");
        assert_eq!(provider_message("Bad Gateway", "x"), "Bad Gateway");
        assert_eq!(provider_message("  ", "fallback"), "fallback");
    }
}
