//! Persisted report entity and the values that drive its lifecycle.
//!
//! A report generated from a blueprint moves `processing → completed` or
//! `processing → failed`. `pending` belongs to reports created without a
//! blueprint and is never entered here.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::Provider;
use crate::blueprint::ReportType;
use crate::client::GenerationResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Processing => "processing",
            ReportStatus::Completed => "completed",
            ReportStatus::Failed => "failed",
        }
    }

    /// Completed and failed reports are never touched again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReportStatus::Completed | ReportStatus::Failed)
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
}

/// Provenance of generated content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationMetadata {
    pub provider: Provider,
    pub model: String,
    pub tokens_used: Option<u32>,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub generation_time_seconds: f64,
}

impl From<&GenerationResult> for GenerationMetadata {
    fn from(result: &GenerationResult) -> Self {
        Self {
            provider: result.provider,
            model: result.model.clone(),
            tokens_used: result.tokens_used,
            input_tokens: result.input_tokens,
            output_tokens: result.output_tokens,
            generation_time_seconds: result.generation_time_seconds,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub status: ReportStatus,
    pub report_type: ReportType,
    /// The caller's blueprint, stored verbatim.
    pub blueprint: Value,
    pub form_selections: Value,
    pub prompt_used: Option<String>,
    pub generated_content: Option<String>,
    pub generation_metadata: Option<GenerationMetadata>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when a report row is created.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReport {
    pub user_id: i64,
    pub title: String,
    pub report_type: ReportType,
    pub blueprint: Value,
    pub form_selections: Value,
}
