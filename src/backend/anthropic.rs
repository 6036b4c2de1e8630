//! Backend for Anthropic's Messages API.
//!
//! Endpoint: `/v1/messages`.
//! Streaming: SSE with `content_block_delta` events carrying `text_delta`s.

use super::sse::text_stream;
use super::{
    ensure_success, redact_key, Backend, BackendError, LlmRequest, LlmResponse, Provider,
    TextStream, Usage,
};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

/// Value of the `anthropic-version` header.
pub const API_VERSION: &str = "2023-06-01";

/// Backend for the Anthropic Messages API.
///
/// # Example
///
/// ```
/// use report_pipeline::backend::AnthropicBackend;
///
/// let backend = AnthropicBackend::new().with_api_key("sk-ant-...");
/// ```
#[derive(Clone)]
pub struct AnthropicBackend {
    pub(crate) api_key: Option<String>,
    pub(crate) base_url: String,
}

impl std::fmt::Debug for AnthropicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicBackend")
            .field("api_key", &redact_key(&self.api_key))
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl AnthropicBackend {
    pub fn new() -> Self {
        Self {
            api_key: None,
            base_url: Provider::Anthropic.default_base_url().to_string(),
        }
    }

    /// Sent as `x-api-key`. Empty keys count as absent.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.api_key = (!key.trim().is_empty()).then_some(key);
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }

    /// Build the request body for `/v1/messages`.
    fn build_body(request: &LlmRequest, stream: bool) -> Value {
        let mut body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": [{"role": "user", "content": request.prompt}],
            "stream": stream,
        });

        if let Some(ref sys) = request.system_prompt {
            if !sys.is_empty() {
                body["system"] = json!(sys);
            }
        }

        body
    }

    fn build_http_request(&self, client: &Client, body: &Value) -> reqwest::RequestBuilder {
        let mut req = client
            .post(self.endpoint())
            .header("anthropic-version", API_VERSION)
            .json(body);

        if let Some(ref key) = self.api_key {
            req = req.header("x-api-key", key.as_str());
        }

        req
    }

    /// Concatenate every `text` content block.
    fn extract_text(json_resp: &Value) -> Result<String, BackendError> {
        let blocks = json_resp
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| BackendError::Decode("response has no content array".into()))?;

        Ok(blocks
            .iter()
            .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
            .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
            .collect())
    }

    fn extract_usage(json_resp: &Value) -> Option<Usage> {
        let usage = json_resp.get("usage")?;
        let field = |name: &str| usage.get(name).and_then(|v| v.as_u64()).map(|v| v as u32);
        Some(Usage {
            input_tokens: field("input_tokens"),
            output_tokens: field("output_tokens"),
            total_tokens: None,
        })
    }

    /// Text from `content_block_delta` events; `error` events end the stream.
    fn extract_delta(event: &Value) -> Option<Result<String, BackendError>> {
        match event.get("type").and_then(|t| t.as_str())? {
            "content_block_delta" => {
                let delta = event.get("delta")?;
                if delta.get("type").and_then(|t| t.as_str()) != Some("text_delta") {
                    return None;
                }
                delta
                    .get("text")
                    .and_then(|t| t.as_str())
                    .map(|t| Ok(t.to_string()))
            }
            "error" => {
                let message = event
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown stream error");
                Some(Err(BackendError::Stream(message.to_string())))
            }
            _ => None,
        }
    }
}

impl Default for AnthropicBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for AnthropicBackend {
    fn provider(&self) -> Provider {
        Provider::Anthropic
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
