//! In-memory [`ReportStore`] for tests and local development.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::ReportStore;
use crate::error::{ReportError, Result};
use crate::report::{GenerationMetadata, NewReport, Report, ReportStatus, User};

/// In-memory storage. Ids start at 1.
#[derive(Debug)]
pub struct InMemoryReportStore {
    users: RwLock<HashMap<i64, User>>,
    reports: RwLock<HashMap<i64, Report>>,
    next_id: AtomicI64,
    unavailable: AtomicBool,
}

impl Default for InMemoryReportStore {
    fn default() -> Self {
        Self {
            users: RwLock::default(),
            reports: RwLock::default(),
            next_id: AtomicI64::new(1),
            unavailable: AtomicBool::new(false),
        }
    }
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, id: i64, email: impl Into<String>) {
        self.users.write().await.insert(
            id,
            User {
                id,
                email: email.into(),
            },
        );
    }

    /// Make every subsequent call fail with a persistence error, as if the
    /// database went away.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Overwrite a report's `updated_at`, e.g. to simulate an abandoned run.
    pub async fn set_updated_at(&self, report_id: i64, at: DateTime<Utc>) -> Result<()> {
        self.check_available()?;
        let mut reports = self.reports.write().await;
        let report = reports
            .get_mut(&report_id)
            .ok_or(ReportError::ReportNotFound(report_id))?;
        report.updated_at = at;
        Ok(())
    }

    /// Snapshot of every report, ordered by id.
    pub async fn reports(&self) -> Vec<Report> {
        let reports = self.reports.read().await;
        let mut all: Vec<Report> = reports.values().cloned().collect();
        all.sort_by_key(|r| r.id);
        all
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ReportError::Persistence("report store unavailable".into()));
        }
        Ok(())
    }

    /// Apply a transition to a `processing` row. Terminal rows are rejected.
    async fn update<F>(&self, report_id: i64, apply: F) -> Result<Report>
    where
        F: FnOnce(&mut Report) + Send,
    {
        self.check_available()?;
        let mut reports = self.reports.write().await;
        let report = reports
            .get_mut(&report_id)
            .ok_or(ReportError::ReportNotFound(report_id))?;
        if report.status.is_terminal() {
            return Err(ReportError::Persistence(format!(
                "report {report_id} is already {}",
                report.status
            )));
        }
        apply(report);
        report.updated_at = Utc::now();
        Ok(report.clone())
    }
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    async fn find_user(&self, user_id: i64) -> Result<Option<User>> {
        self.check_available()?;
        Ok(self.users.read().await.get(&user_id).cloned())
    }

    async fn create_report(&self, new: NewReport) -> Result<Report> {
        self.check_available()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let report = Report {
            id,
            user_id: new.user_id,
            title: new.title,
            status: ReportStatus::Processing,
            report_type: new.report_type,
            blueprint: new.blueprint,
            form_selections: new.form_selections,
            prompt_used: None,
            generated_content: None,
            generation_metadata: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        self.reports.write().await.insert(id, report.clone());
        Ok(report)
    }

    async fn set_prompt(&self, report_id: i64, prompt: &str) -> Result<()> {
        self.update(report_id, |r| r.prompt_used = Some(prompt.to_string()))
            .await
            .map(|_| ())
    }

    async fn complete_report(
        &self,
        report_id: i64,
        content: &str,
        metadata: GenerationMetadata,
    ) -> Result<Report> {
        self.update(report_id, |r| {
            r.status = ReportStatus::Completed;
            r.generated_content = Some(content.to_string());
            r.generation_metadata = Some(metadata);
            r.error_message = None;
        })
        .await
    }

    async fn fail_report(&self, report_id: i64, message: &str) -> Result<Report> {
        self.update(report_id, |r| {
            r.status = ReportStatus::Failed;
            r.error_message = Some(message.to_string());
        })
        .await
    }

    async fn get_report(&self, report_id: i64) -> Result<Option<Report>> {
        self.check_available()?;
        Ok(self.reports.read().await.get(&report_id).cloned())
    }

    async fn fail_stale_processing(
        &self,
        cutoff: DateTime<Utc>,
        message: &str,
    ) -> Result<Vec<i64>> {
        self.check_available()?;
        let now = Utc::now();
        let mut reports = self.reports.write().await;
        let mut failed: Vec<i64> = reports
            .values_mut()
            .filter(|r| r.status == ReportStatus::Processing && r.updated_at < cutoff)
            .map(|r| {
                r.status = ReportStatus::Failed;
                r.error_message = Some(message.to_string());
                r.updated_at = now;
                r.id
            })
            .collect();
        failed.sort_unstable();
        Ok(failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Provider;
    use crate::blueprint::ReportType;
    use chrono::Duration;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    fn new_report(user_id: i64) -> NewReport {
        NewReport {
            user_id,
            title: "Q1 Overview".into(),
            report_type: ReportType::BusinessPerformance,
            blueprint: json!({"reportTitle": "Q1 Overview", "sections": []}),
            form_selections: json!({}),
        }
    }

    fn metadata() -> GenerationMetadata {
        GenerationMetadata {
            provider: Provider::Anthropic,
            model: "m".into(),
            tokens_used: None,
            input_tokens: None,
            output_tokens: None,
            generation_time_seconds: 0.1,
        }
    }

    #[tokio::test]
    async fn test_create_starts_processing() {
        let store = InMemoryReportStore::new();
        let first = store.create_report(new_report(1)).await.unwrap();
        let second = store.create_report(new_report(1)).await.unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(first.status, ReportStatus::Processing);
        assert!(first.prompt_used.is_none());
    }

    #[tokio::test]
    async fn test_lifecycle_updates() {
        let store = InMemoryReportStore::new();
        let report = store.create_report(new_report(1)).await.unwrap();

        store.set_prompt(report.id, "PROMPT").await.unwrap();
        let done = store
            .complete_report(report.id, "Generated text", metadata())
            .await
            .unwrap();

        assert_eq!(done.status, ReportStatus::Completed);
        assert_eq!(done.prompt_used.as_deref(), Some("PROMPT"));
        assert_eq!(done.generated_content.as_deref(), Some("Generated text"));
        assert!(done.updated_at >= done.created_at);
    }

    #[tokio::test]
    async fn test_terminal_rows_are_never_rewritten() {
        let store = InMemoryReportStore::new();
        let report = store.create_report(new_report(1)).await.unwrap();

        let cutoff = Utc::now() + Duration::seconds(1);
        let ids = store.fail_stale_processing(cutoff, "abandoned").await.unwrap();
        assert_eq!(ids, vec![report.id]);

        let err = assert_err!(
            store
                .complete_report(report.id, "late", metadata())
                .await
        );
        assert!(matches!(err, ReportError::Persistence(ref m) if m.contains("already failed")));
        assert_err!(store.fail_report(report.id, "again").await);
        assert_err!(store.set_prompt(report.id, "late prompt").await);

        let stored = store.get_report(report.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReportStatus::Failed);
        assert_eq!(stored.error_message.as_deref(), Some("abandoned"));
        assert!(stored.generated_content.is_none());
        assert!(stored.prompt_used.is_none());
    }

    #[tokio::test]
    async fn test_completed_row_cannot_fail() {
        let store = InMemoryReportStore::new();
        let report = store.create_report(new_report(1)).await.unwrap();
        assert_ok!(store.complete_report(report.id, "done", metadata()).await);

        assert_err!(store.fail_report(report.id, "late failure").await);
        let stored = store.get_report(report.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReportStatus::Completed);
        assert!(stored.error_message.is_none());
    }

    #[tokio::test]
    async fn test_unknown_report() {
        let store = InMemoryReportStore::new();
        let err = store.fail_report(99, "x").await.unwrap_err();
        assert!(matches!(err, ReportError::ReportNotFound(99)));
        assert!(store.get_report(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_users() {
        let store = InMemoryReportStore::new();
        store.add_user(1, "a@example.com").await;
        assert_eq!(store.find_user(1).await.unwrap().unwrap().email, "a@example.com");
        assert!(store.find_user(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unavailable() {
        let store = InMemoryReportStore::new();
        store.set_unavailable(true);
        let err = assert_err!(store.create_report(new_report(1)).await);
        assert!(matches!(err, ReportError::Persistence(_)));
        assert_err!(store.find_user(1).await);

        store.set_unavailable(false);
        assert_ok!(store.create_report(new_report(1)).await);
    }

    #[tokio::test]
    async fn test_fail_stale_processing() {
        let store = InMemoryReportStore::new();
        let stale = store.create_report(new_report(1)).await.unwrap();
        let fresh = store.create_report(new_report(1)).await.unwrap();
        let finished = store.create_report(new_report(1)).await.unwrap();
        store.fail_report(finished.id, "earlier").await.unwrap();

        let long_ago = Utc::now() - Duration::hours(2);
        store.set_updated_at(stale.id, long_ago).await.unwrap();
        store.set_updated_at(finished.id, long_ago).await.unwrap();

        let cutoff = Utc::now() - Duration::minutes(15);
        let ids = store.fail_stale_processing(cutoff, "abandoned").await.unwrap();
        assert_eq!(ids, vec![stale.id]);

        let stale = store.get_report(stale.id).await.unwrap().unwrap();
        assert_eq!(stale.status, ReportStatus::Failed);
        assert_eq!(stale.error_message.as_deref(), Some("abandoned"));

        let fresh = store.get_report(fresh.id).await.unwrap().unwrap();
        assert_eq!(fresh.status, ReportStatus::Processing);

        let finished = store.get_report(finished.id).await.unwrap().unwrap();
        assert_eq!(finished.error_message.as_deref(), Some("earlier"));
    }
}
