use crate::backend::Provider;
use crate::output_parser::ParseError;
use thiserror::Error;

/// Errors produced by the LLM client, the blueprint pipeline, and the
/// report orchestrator.
///
/// Backends report raw wire failures as [`BackendError`](crate::backend::BackendError);
/// the [`LlmClient`](crate::client::LlmClient) narrows those into the variants
/// below, so no transport type ever reaches a caller.
#[derive(Error, Debug)]
pub enum ReportError {
    /// Unknown provider name or otherwise unusable settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The selected provider has no API key. Raised before any network call.
    #[error("{provider} API key is not configured (set {env_var})")]
    MissingCredential {
        provider: Provider,
        env_var: &'static str,
    },

    /// The provider kept throttling after every retry attempt was spent.
    #[error("rate limit exceeded after {attempts} attempts: {message}")]
    RateLimited { attempts: u32, message: String },

    /// Any other provider failure: authentication, malformed request, 5xx,
    /// transport failure, or an unreadable response body.
    #[error("{provider} API error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Upstream {
        provider: Provider,
        status: Option<u16>,
        message: String,
    },

    /// The model's blueprint response was not a JSON document.
    #[error("failed to parse blueprint response: {0}")]
    Parse(#[from] ParseError),

    /// Structurally invalid blueprint data.
    #[error("invalid blueprint: {0}")]
    Validation(String),

    /// The report store is unavailable or rejected a write.
    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("user {0} not found")]
    UserNotFound(i64),

    #[error("report {0} not found")]
    ReportNotFound(i64),
}

impl ReportError {
    /// Missing credential or unknown provider. Never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ReportError::Configuration(_) | ReportError::MissingCredential { .. }
        )
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ReportError::RateLimited { .. })
    }

    /// Failures the orchestrator records on the report row instead of
    /// propagating.
    pub fn is_llm_failure(&self) -> bool {
        matches!(
            self,
            ReportError::RateLimited { .. } | ReportError::Upstream { .. }
        )
    }
}

impl From<anyhow::Error> for ReportError {
    fn from(err: anyhow::Error) -> Self {
        ReportError::Persistence(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ReportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_display_with_status() {
        let err = ReportError::Upstream {
            provider: Provider::OpenAi,
            status: Some(401),
            message: "invalid api key".into(),
        };
        assert_eq!(err.to_string(), "openai API error (HTTP 401): invalid api key");
    }

    #[test]
    fn test_upstream_display_without_status() {
        let err = ReportError::Upstream {
            provider: Provider::Anthropic,
            status: None,
            message: "connection reset".into(),
        };
        assert_eq!(err.to_string(), "anthropic API error: connection reset");
    }

    #[test]
    fn test_missing_credential_names_env_var() {
        let err = ReportError::MissingCredential {
            provider: Provider::Anthropic,
            env_var: "ANTHROPIC_API_KEY",
        };
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
        assert!(err.is_configuration());
        assert!(!err.is_llm_failure());
    }

    #[test]
    fn test_classification() {
        let rate = ReportError::RateLimited {
            attempts: 3,
            message: "slow down".into(),
        };
        assert!(rate.is_rate_limited());
        assert!(rate.is_llm_failure());
        assert!(!rate.is_configuration());

        assert!(ReportError::Configuration("bad".into()).is_configuration());
        assert!(!ReportError::Validation("cycle".into()).is_llm_failure());
        assert!(!ReportError::Persistence("down".into()).is_llm_failure());
    }

    #[test]
    fn test_anyhow_becomes_persistence() {
        let err: ReportError = anyhow::anyhow!("disk full").into();
        assert!(matches!(err, ReportError::Persistence(ref m) if m == "disk full"));
    }
}
