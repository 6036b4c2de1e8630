//! Persistence port for users and reports.
//!
//! Every method is its own commit. The orchestrator never holds a
//! transaction open across an LLM call.

pub mod memory;

pub use memory::InMemoryReportStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::report::{GenerationMetadata, NewReport, Report, User};

/// Durable storage for reports.
///
/// Implementations report outages as [`ReportError::Persistence`] and unknown
/// report ids as [`ReportError::ReportNotFound`].
///
/// Status only moves `processing → completed` or `processing → failed`.
/// `set_prompt`, `complete_report` and `fail_report` must reject a row that
/// is already terminal with [`ReportError::Persistence`] and leave it as is.
///
/// [`ReportError::Persistence`]: crate::error::ReportError::Persistence
/// [`ReportError::ReportNotFound`]: crate::error::ReportError::ReportNotFound
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn find_user(&self, user_id: i64) -> Result<Option<User>>;

    /// Insert a row with status `processing`.
    async fn create_report(&self, report: NewReport) -> Result<Report>;

    async fn set_prompt(&self, report_id: i64, prompt: &str) -> Result<()>;

    /// Content, metadata, and status `completed` in one update.
    async fn complete_report(
        &self,
        report_id: i64,
        content: &str,
        metadata: GenerationMetadata,
    ) -> Result<Report>;

    /// Error message and status `failed` in one update.
    async fn fail_report(&self, report_id: i64, message: &str) -> Result<Report>;

    async fn get_report(&self, report_id: i64) -> Result<Option<Report>>;

    /// Fail every `processing` report last updated before `cutoff`.
    /// Returns the affected ids in ascending order.
    async fn fail_stale_processing(
        &self,
        cutoff: DateTime<Utc>,
        message: &str,
    ) -> Result<Vec<i64>>;
}
