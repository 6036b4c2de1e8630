//! Report generation saga.
//!
//! One run walks a report through `processing → completed | failed`, committing
//! after every step so a crash leaves an inspectable row:
//!
//! 1. create the row (`processing`) with the caller's blueprint verbatim
//! 2. render and persist the prompt
//! 3. call the model once, non-streaming
//! 4. persist content and metadata, or the classified LLM error
//!
//! Rows abandoned mid-run stay `processing` until
//! [`ReportOrchestrator::reconcile_stale_reports`] fails them.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::blueprint::Blueprint;
use crate::client::{GenerateOptions, LlmClient};
use crate::error::{ReportError, Result};
use crate::prompt::{self, REPORT_SYSTEM_PROMPT};
use crate::report::{GenerationMetadata, NewReport, Report, ReportStatus};
use crate::store::ReportStore;

/// Token budget for long-form report content.
pub const REPORT_MAX_TOKENS: u32 = 8000;
pub const REPORT_TEMPERATURE: f64 = 0.7;

/// Error message written to reports failed by reconciliation.
pub const STALE_REPORT_MESSAGE: &str =
    "generation abandoned: report was still processing after the recovery timeout";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateReportRequest {
    pub user_id: i64,
    /// Stored exactly as received; parsed into a [`Blueprint`] for rendering.
    pub blueprint: Value,
    #[serde(default)]
    pub form_selections: Value,
}

impl GenerateReportRequest {
    pub fn new(user_id: i64, blueprint: &Blueprint) -> Result<Self> {
        let blueprint = serde_json::to_value(blueprint)
            .map_err(|e| ReportError::Validation(format!("blueprint is not serializable: {e}")))?;
        Ok(Self {
            user_id,
            blueprint,
            form_selections: Value::Object(Default::default()),
        })
    }

    pub fn with_form_selections(mut self, selections: Value) -> Self {
        self.form_selections = selections;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateReportResponse {
    pub report_id: i64,
    pub status: ReportStatus,
    pub message: String,
}

/// Drives report rows through generation.
#[derive(Clone)]
pub struct ReportOrchestrator {
    client: Arc<LlmClient>,
    store: Arc<dyn ReportStore>,
}

impl std::fmt::Debug for ReportOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportOrchestrator")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

impl ReportOrchestrator {
    pub fn new(client: Arc<LlmClient>, store: Arc<dyn ReportStore>) -> Self {
        Self { client, store }
    }

    /// Run the saga for one blueprint.
    ///
    /// A rate-limit or upstream failure is a normal outcome: the row is
    /// marked `failed` and the response carries the error message. Unknown
    /// users, invalid blueprints and missing credentials are rejected before
    /// any row exists. Persistence failures propagate and leave the row at
    /// its last committed state.
    #[tracing::instrument(skip(self, request), fields(user_id = request.user_id))]
    pub async fn generate_report(
        &self,
        request: GenerateReportRequest,
    ) -> Result<GenerateReportResponse> {
        let GenerateReportRequest {
            user_id,
            blueprint: raw_blueprint,
            form_selections,
        } = request;

        self.store
            .find_user(user_id)
            .await?
            .ok_or(ReportError::UserNotFound(user_id))?;

        let blueprint: Blueprint = serde_json::from_value(raw_blueprint.clone())
            .map_err(|e| ReportError::Validation(format!("malformed blueprint: {e}")))?;
        blueprint.validate()?;
        self.client.check_credential()?;

        let report = self
            .store
            .create_report(NewReport {
                user_id,
                title: blueprint.report_title.clone(),
                report_type: blueprint.report_type,
                blueprint: raw_blueprint,
                form_selections,
            })
            .await?;
        let report_id = report.id;
        info!(report_id, report_type = %blueprint.report_type, "report processing");

        let prompt = prompt::render(&blueprint);
        self.store.set_prompt(report_id, &prompt).await?;

        let options = GenerateOptions::default()
            .max_tokens(REPORT_MAX_TOKENS)
            .temperature(REPORT_TEMPERATURE)
            .system_prompt(REPORT_SYSTEM_PROMPT);

        match self.client.generate(&prompt, &options).await {
            Ok(result) => {
                self.store
                    .complete_report(report_id, &result.content, GenerationMetadata::from(&result))
                    .await?;
                info!(
                    report_id,
                    model = %result.model,
                    tokens = ?result.tokens_used,
                    "report completed"
                );
                Ok(GenerateReportResponse {
                    report_id,
                    status: ReportStatus::Completed,
                    message: "Report generated successfully".into(),
                })
            }
            Err(err) if err.is_llm_failure() => {
                let message = err.to_string();
                self.store.fail_report(report_id, &message).await?;
                warn!(report_id, error = %message, "report failed");
                Ok(GenerateReportResponse {
                    report_id,
                    status: ReportStatus::Failed,
                    message,
                })
            }
            Err(err) => {
                error!(report_id, error = %err, "report left processing");
                Err(err)
            }
        }
    }

    pub async fn get_report(&self, report_id: i64) -> Result<Report> {
        self.store
            .get_report(report_id)
            .await?
            .ok_or(ReportError::ReportNotFound(report_id))
    }

    /// Fail every `processing` report untouched for longer than `timeout`.
    /// Returns the ids that were failed.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile_stale_reports(&self, timeout: Duration) -> Result<Vec<i64>> {
        let timeout = chrono::Duration::from_std(timeout)
            .map_err(|e| ReportError::Configuration(format!("stale report timeout: {e}")))?;
        let cutoff = Utc::now() - timeout;

        let ids = self
            .store
            .fail_stale_processing(cutoff, STALE_REPORT_MESSAGE)
            .await?;
        if !ids.is_empty() {
            warn!(count = ids.len(), ?ids, "failed abandoned reports");
        }
        Ok(ids)
    }
}
