//! Runtime settings, merged from defaults, an optional TOML file, and the
//! environment.
//!
//! Priority (highest to lowest):
//! 1. Environment: `LLM_PROVIDER`, `ANTHROPIC_API_KEY`, `OPENAI_API_KEY`, and
//!    any field under the `REPORT_PIPELINE_` prefix
//!    (e.g. `REPORT_PIPELINE_OPENAI_MODEL`)
//! 2. Explicit config path, if given
//! 3. `./report-pipeline.toml`, if present
//! 4. Built-in defaults
//!
//! Settings are loaded once and injected; nothing in request handling reads
//! the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::backend::{redact_key, Provider};
use crate::error::{ReportError, Result};

/// File looked up in the working directory.
pub const CONFIG_FILE: &str = "report-pipeline.toml";

/// Prefix for every environment override except the provider and key names.
pub const ENV_PREFIX: &str = "REPORT_PIPELINE_";

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Provider name; parsed into [`Provider`] when the client is built.
    pub llm_provider: String,
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub anthropic_model: String,
    pub openai_model: String,
    pub anthropic_base_url: Option<String>,
    pub openai_base_url: Option<String>,
    /// Per-request HTTP timeout. A non-streaming report call holds the
    /// connection until all of its 8000 output tokens are written, so this
    /// must cover the slowest full completion.
    pub request_timeout_secs: u64,
    /// Age after which a `processing` report counts as abandoned. Keep it
    /// above three request timeouts plus the rate-limit waits, or a live run
    /// can be failed under it.
    pub stale_report_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            llm_provider: Provider::Anthropic.as_str().to_string(),
            anthropic_api_key: None,
            openai_api_key: None,
            anthropic_model: "claude-sonnet-4-20250514".to_string(),
            openai_model: "gpt-4o".to_string(),
            anthropic_base_url: None,
            openai_base_url: None,
            request_timeout_secs: 600,
            stale_report_timeout_secs: 3600,
        }
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("llm_provider", &self.llm_provider)
            .field("anthropic_api_key", &redact_key(&self.anthropic_api_key))
            .field("openai_api_key", &redact_key(&self.openai_api_key))
            .field("anthropic_model", &self.anthropic_model)
            .field("openai_model", &self.openai_model)
            .field("anthropic_base_url", &self.anthropic_base_url)
            .field("openai_base_url", &self.openai_base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("stale_report_timeout_secs", &self.stale_report_timeout_secs)
            .finish()
    }
}

impl Settings {
    /// The merged figment, before extraction.
    pub fn figment(config_path: Option<&Path>) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Settings::default()));

        let local = PathBuf::from(CONFIG_FILE);
        if local.exists() {
            figment = figment.merge(Toml::file(&local));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment
            .merge(Env::raw().only(&["LLM_PROVIDER", "ANTHROPIC_API_KEY", "OPENAI_API_KEY"]))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load settings from every source.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        Self::figment(config_path)
            .extract()
            .map_err(|e| ReportError::Configuration(e.to_string()))
    }

    /// Parse the configured provider name.
    pub fn provider(&self) -> Result<Provider> {
        self.llm_provider.parse()
    }

    /// API key for `provider`. Blank values count as absent.
    pub fn api_key(&self, provider: Provider) -> Option<String> {
        let key = match provider {
            Provider::Anthropic => &self.anthropic_api_key,
            Provider::OpenAi => &self.openai_api_key,
        };
        key.as_ref()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(str::to_string)
    }

    /// Default model for `provider`.
    pub fn model(&self, provider: Provider) -> &str {
        match provider {
            Provider::Anthropic => &self.anthropic_model,
            Provider::OpenAi => &self.openai_model,
        }
    }

    pub fn base_url(&self, provider: Provider) -> Option<String> {
        match provider {
            Provider::Anthropic => self.anthropic_base_url.clone(),
            Provider::OpenAi => self.openai_base_url.clone(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn stale_report_timeout(&self) -> Duration {
        Duration::from_secs(self.stale_report_timeout_secs)
    }
}
