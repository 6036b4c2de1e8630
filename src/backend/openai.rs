//! Backend for the OpenAI Chat Completions API.
//!
//! Endpoint: `/v1/chat/completions` (always chat mode).
//! Streaming: SSE with `data: {"choices": [{"delta": {"content": "token"}}]}`.

use super::sse::text_stream;
use super::{
    ensure_success, redact_key, Backend, BackendError, LlmRequest, LlmResponse, Provider,
    TextStream, Usage,
};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

/// Backend for the OpenAI Chat Completions API.
///
/// # Example
///
/// ```
/// use report_pipeline::backend::OpenAiBackend;
///
/// let backend = OpenAiBackend::new().with_api_key("sk-...");
/// let with_org = OpenAiBackend::new().with_api_key("sk-...").with_organization("org-abc");
/// ```
#[derive(Clone)]
pub struct OpenAiBackend {
    /// Sent as `Authorization: Bearer {key}`.
    pub(crate) api_key: Option<String>,
    /// Sent as `OpenAI-Organization: {org}`.
    pub(crate) organization: Option<String>,
    pub(crate) base_url: String,
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("api_key", &redact_key(&self.api_key))
            .field("organization", &self.organization)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAiBackend {
    pub fn new() -> Self {
        Self {
            api_key: None,
            organization: None,
            base_url: Provider::OpenAi.default_base_url().to_string(),
        }
    }

    /// Empty keys count as absent.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.api_key = (!key.trim().is_empty()).then_some(key);
        self
    }

    pub fn with_organization(mut self, org: impl Into<String>) -> Self {
        self.organization = Some(org.into());
        self
    }

    /// Accepts either the host root or a URL ending in `/v1`.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        let trimmed = url.trim_end_matches('/');
        self.base_url = trimmed.strip_suffix("/v1").unwrap_or(trimmed).to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn build_messages(request: &LlmRequest) -> Vec<Value> {
        let mut messages = Vec::with_capacity(2);

        if let Some(ref sys) = request.system_prompt {
            if !sys.is_empty() {
                messages.push(json!({"role": "system", "content": sys}));
            }
        }
        messages.push(json!({"role": "user", "content": request.prompt}));

        messages
    }

    /// Build the request body for `/v1/chat/completions`.
    fn build_body(request: &LlmRequest, stream: bool) -> Value {
        json!({
            "model": request.model,
            "messages": Self::build_messages(request),
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "stream": stream,
        })
    }

    fn build_http_request(&self, client: &Client, body: &Value) -> reqwest::RequestBuilder {
        let mut req = client.post(self.endpoint()).json(body);

        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }
        if let Some(ref org) = self.organization {
            req = req.header("OpenAI-Organization", org.as_str());
        }

        req
    }

    fn extract_text(json_resp: &Value) -> Result<String, BackendError> {
        json_resp
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .map(|m| {
                m.get("content")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string()
            })
            .ok_or_else(|| BackendError::Decode("response has no choices[0].message".into()))
    }

    fn extract_usage(json_resp: &Value) -> Option<Usage> {
        let usage = json_resp.get("usage")?;
        let field = |name: &str| usage.get(name).and_then(|v| v.as_u64()).map(|v| v as u32);
        Some(Usage {
            input_tokens: field("prompt_tokens"),
            output_tokens: field("completion_tokens"),
            total_tokens: field("total_tokens"),
        })
    }

    fn extract_delta(event: &Value) -> Option<Result<String, BackendError>> {
        if let Some(error) = event.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown stream error");
            return Some(Err(BackendError::Stream(message.to_string())));
        }

        event
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("delta"))
            .and_then(|d| d.get("content"))
            .and_then(|v| v.as_str())
            .map(|content| Ok(content.to_string()))
    }
}

impl Default for OpenAiBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(
        &self,
        client: &Client,
        request: &LlmRequest,
    ) -> Result<LlmResponse, BackendError> {
        let body = Self::build_body(request, false);
        let resp = self.build_http_request(client, &body).send().await?;
        let resp = ensure_success(resp).await?;
        let status = resp.status().as_u16();

        let json_resp: Value = resp.json().await?;

        Ok(LlmResponse {
            text: Self::extract_text(&json_resp)?,
            status,
            model: json_resp
                .get("model")
                .and_then(|m| m.as_str())
                .map(str::to_string),
            usage: Self::extract_usage(&json_resp),
        })
    }

    async fn open_stream(
        &self,
        client: &Client,
        request: &LlmRequest,
    ) -> Result<TextStream, BackendError> {
        let body = Self::build_body(request, true);
        let resp = self.build_http_request(client, &body).send().await?;
        let resp = ensure_success(resp).await?;
        Ok(text_stream(resp, Self::extract_delta))
    }
}
