//! End-to-end run: ask the model for a blueprint, then generate the report.
//!
//! Uses the provider from `LLM_PROVIDER` / `report-pipeline.toml`. Without an
//! API key it falls back to a scripted mock so the flow can still be seen.
//!
//! ```text
//! ANTHROPIC_API_KEY=... cargo run --example generate_report -- -vv
//! ```

use std::sync::Arc;

use report_pipeline::backend::MockReply;
use report_pipeline::{
    telemetry, BlueprintGenerator, BlueprintRequest, GenerateReportRequest, InMemoryReportStore,
    LlmClient, MockBackend, ReportOrchestrator, ReportType, Settings,
};

const CANNED_BLUEPRINT: &str = r#"```json
{
  "reportTitle": "Competitor Snapshot",
  "sections": [
    {"id": "s1", "type": "title", "content": "Competitor Snapshot", "order": 0},
    {"id": "s2", "type": "section", "content": "Traffic & SEO", "order": 1},
    {"id": "s3", "type": "paragraph", "content": "Organic reach compared", "parentId": "s2"},
    {"id": "s4", "type": "chart", "content": "Monthly visits", "parentId": "s2",
     "metadata": {"visualizationType": "line chart"}}
  ]
}
```"#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let verbosity = std::env::args()
        .skip(1)
        .filter(|a| a.starts_with('-') && a.chars().skip(1).all(|c| c == 'v'))
        .map(|a| a.len().saturating_sub(1) as u8)
        .sum();
    telemetry::init_tracing(verbosity);

    let settings = Settings::load(None)?;
    let client = LlmClient::from_settings(&settings)?;
    let client = match client.check_credential() {
        Ok(()) => Arc::new(client),
        Err(e) => {
            println!("{e}; using a scripted mock backend\n");
            let mock = MockBackend::new(vec![
                MockReply::text(CANNED_BLUEPRINT),
                MockReply::with_usage("# Competitor Snapshot\n\nTraffic grew 12% quarter over quarter.", 900, 40),
            ]);
            Arc::new(LlmClient::with_backend(Arc::new(mock), "mock-model"))
        }
    };

    let generator = BlueprintGenerator::new(client.clone());
    let response = generator
        .generate(BlueprintRequest {
            report_type: ReportType::CompetitorAnalysis,
            selected_data_points: vec!["traffic_seo".into(), "content_strategy".into()],
            additional_notes: Some("Focus on the two largest rivals.".into()),
        })
        .await;
    let blueprint = match (response.blueprint, response.error) {
        (Some(blueprint), _) => blueprint,
        (None, error) => anyhow::bail!(
            "blueprint generation failed: {}",
            error.unwrap_or_default()
        ),
    };

    let summary = blueprint.summary();
    println!(
        "Blueprint: {} ({} sections, {})",
        blueprint.report_title,
        summary.total_sections,
        summary.estimated_length()
    );

    let store = Arc::new(InMemoryReportStore::new());
    store.add_user(1, "demo@example.com").await;
    let orchestrator = ReportOrchestrator::new(client, store);

    let abandoned = orchestrator
        .reconcile_stale_reports(settings.stale_report_timeout())
        .await?;
    if !abandoned.is_empty() {
        println!("Failed {} abandoned report(s)", abandoned.len());
    }

    let outcome = orchestrator
        .generate_report(GenerateReportRequest::new(1, &blueprint)?)
        .await?;
    println!("Report {}: {} ({})", outcome.report_id, outcome.status, outcome.message);

    let report = orchestrator.get_report(outcome.report_id).await?;
    if let Some(content) = report.generated_content {
        println!("\n{content}");
    }
    if let Some(meta) = report.generation_metadata {
        println!(
            "\n[{} / {}] tokens: {:?}, {:.1}s",
            meta.provider, meta.model, meta.tokens_used, meta.generation_time_seconds
        );
    }

    Ok(())
}
