//! # Report Pipeline
//!
//! Turns a structured report blueprint into a long-form generated document.
//!
//! The crate has three moving parts:
//!
//! - **Blueprint compiler** ([`prompt`]): renders a tree of typed sections
//!   into a deterministic natural-language generation prompt.
//! - **LLM client** ([`client`]): one call surface over Anthropic and OpenAI
//!   with rate-limit backoff, streaming, and a closed error taxonomy.
//! - **Orchestrator** ([`orchestrator`]): the `processing → completed | failed`
//!   saga that persists the prompt, the content, and its provenance.
//!
//! The [`generator`] asks the model for a blueprint in the first place and
//! normalizes whatever JSON comes back.
//!
//! ## Core Concepts
//!
//! - **[`Blueprint`]**: title, report type, and a flat list of
//!   [`Section`]s linked by `parentId`.
//! - **[`LlmClient`]**: constructed once from [`Settings`], shared behind an
//!   `Arc`.
//! - **[`ReportStore`]**: persistence port; [`InMemoryReportStore`] ships for
//!   tests and demos.
//! - **[`ReportError`]**: configuration, rate-limit, upstream, parse,
//!   validation and persistence failures.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use report_pipeline::{
//!     Blueprint, GenerateReportRequest, InMemoryReportStore, LlmClient, ReportOrchestrator,
//!     ReportType, Section, SectionType, Settings,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::load(None)?;
//!     let client = Arc::new(LlmClient::from_settings(&settings)?);
//!
//!     let store = Arc::new(InMemoryReportStore::new());
//!     store.add_user(1, "analyst@example.com").await;
//!
//!     let blueprint = Blueprint {
//!         report_title: "Q1 Overview".into(),
//!         sections: vec![Section::new("s1", SectionType::Section, "Revenue")],
//!         generated_at: "2025-01-01T00:00:00Z".into(),
//!         report_type: ReportType::BusinessPerformance,
//!     };
//!
//!     let orchestrator = ReportOrchestrator::new(client, store);
//!     let response = orchestrator
//!         .generate_report(GenerateReportRequest::new(1, &blueprint)?)
//!         .await?;
//!     println!("report {} is {}", response.report_id, response.status);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod blueprint;
pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod generator;
pub mod orchestrator;
pub mod output_parser;
pub mod prompt;
pub mod report;
pub mod store;
pub mod telemetry;

pub use backend::{
    AnthropicBackend, Backend, BackoffConfig, MockBackend, MockReply, OpenAiBackend, Provider,
};
pub use blueprint::{Blueprint, BlueprintSummary, ReportType, Section, SectionMetadata, SectionType};
pub use client::{GenerateOptions, GenerationResult, GenerationStream, LlmClient};
pub use config::Settings;
pub use error::{ReportError, Result};
pub use events::{Event, EventHandler, FnEventHandler};
pub use generator::{BlueprintGenerator, BlueprintRequest, BlueprintResponse};
pub use orchestrator::{GenerateReportRequest, GenerateReportResponse, ReportOrchestrator};
pub use output_parser::ParseError;
pub use report::{GenerationMetadata, Report, ReportStatus};
pub use store::{InMemoryReportStore, ReportStore};
