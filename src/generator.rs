//! Blueprint generator: asks the model for a report outline as JSON and
//! repairs it into a typed [`Blueprint`].
//!
//! Model output is treated as untrusted. Ids and orders may be missing or
//! numeric, section types may be synonyms or differently cased, and the
//! document may be wrapped in a markdown fence. Anything that still fails
//! after normalization is a generation failure; no partial blueprint is
//! returned.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::blueprint::synonyms::resolve_section_type;
use crate::blueprint::{Blueprint, ReportType, Section, SectionMetadata};
use crate::catalog::{clamp_notes, data_point_label};
use crate::client::{GenerateOptions, LlmClient};
use crate::error::{ReportError, Result};
use crate::output_parser::parse_json;
use crate::prompt::numbered_list;

/// Token budget for blueprint generation.
pub const BLUEPRINT_MAX_TOKENS: u32 = 4000;
pub const BLUEPRINT_TEMPERATURE: f64 = 0.7;

pub const BLUEPRINT_SYSTEM_PROMPT: &str = "You are an expert business analyst who designs \
report structures. You respond with a single valid JSON object that matches the requested \
schema exactly, with no commentary before or after it.";

const SCHEMA: &str = r#"Respond with a single JSON object using this schema:
{
  "reportTitle": "string",
  "sections": [
    {
      "id": "unique string",
      "type": "title | subtitle | section | paragraph | image_placeholder | table_placeholder",
      "content": "what this section should cover",
      "order": 0,
      "parentId": null,
      "metadata": {
        "dataSource": "optional",
        "analysisType": "optional",
        "visualizationType": "optional",
        "estimatedLength": "optional, e.g. 200-300 words"
      }
    }
  ]
}

Rules:
- "type" must be exactly one of: title, subtitle, section, paragraph, image_placeholder, table_placeholder.
- Start with exactly one "title" section.
- Include an "Executive Summary" section.
- Include 3-5 image_placeholder or table_placeholder sections.
- Number "order" sequentially from 0 within each parent.
- Express hierarchy with "parentId": null for top-level sections, otherwise the id of the parent.
- Cover every selected data point."#;

/// Standalone generation request, as sent by the report builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlueprintRequest {
    pub report_type: ReportType,
    #[serde(default)]
    pub selected_data_points: Vec<String>,
    #[serde(default)]
    pub additional_notes: Option<String>,
}

/// Never an error: failures are reported in `error` with `success == false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlueprintResponse {
    pub blueprint: Option<Blueprint>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBlueprint {
    #[serde(default)]
    report_title: Option<String>,
    #[serde(default)]
    sections: Vec<RawSection>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSection {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default, rename = "type")]
    section_type: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    order: Option<Value>,
    #[serde(default)]
    parent_id: Option<Value>,
    #[serde(default)]
    metadata: Option<Value>,
}

pub struct BlueprintGenerator {
    client: Arc<LlmClient>,
}

impl BlueprintGenerator {
    pub fn new(client: Arc<LlmClient>) -> Self {
        Self { client }
    }

    /// Ask the model for a blueprint and normalize it.
    #[tracing::instrument(
        skip(self, selected_data_points, notes),
        fields(report_type = %report_type, data_points = selected_data_points.len())
    )]
    pub async fn generate_blueprint(
        &self,
        report_type: ReportType,
        selected_data_points: &[String],
        notes: Option<&str>,
    ) -> Result<Blueprint> {
        let prompt = generation_prompt(report_type, selected_data_points, notes);
        let options = GenerateOptions::default()
            .max_tokens(BLUEPRINT_MAX_TOKENS)
            .temperature(BLUEPRINT_TEMPERATURE)
            .system_prompt(BLUEPRINT_SYSTEM_PROMPT);

        let result = self.client.generate(&prompt, &options).await?;
        debug!(chars = result.content.len(), "blueprint response received");

        let blueprint = blueprint_from_response(
            &result.content,
            report_type,
            chrono::Utc::now().to_rfc3339(),
        )?;

        info!(
            title = %blueprint.report_title,
            sections = blueprint.sections.len(),
            "blueprint generated"
        );
        Ok(blueprint)
    }

    /// Like [`generate_blueprint`](Self::generate_blueprint), but folds any
    /// failure into the response.
    pub async fn generate(&self, request: BlueprintRequest) -> BlueprintResponse {
        match self
            .generate_blueprint(
                request.report_type,
                &request.selected_data_points,
                request.additional_notes.as_deref(),
            )
            .await
        {
            Ok(blueprint) => BlueprintResponse {
                blueprint: Some(blueprint),
                success: true,
                error: None,
            },
            Err(e) => {
                warn!(error = %e, "blueprint generation failed");
                BlueprintResponse {
                    blueprint: None,
                    success: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

/// Build the prompt asking for a blueprint.
pub fn generation_prompt(
    report_type: ReportType,
    selected_data_points: &[String],
    notes: Option<&str>,
) -> String {
    let mut prompt = format!(
        "Create a detailed report blueprint for a {} report.\n\n",
        report_type.display_name()
    );

    let labels: Vec<String> = selected_data_points
        .iter()
        .filter(|id| !id.trim().is_empty())
        .map(|id| data_point_label(report_type, id))
        .collect();

    if labels.is_empty() {
        prompt.push_str(
            "No specific data points were selected; choose the topics most relevant to this report type.\n\n",
        );
    } else {
        prompt.push_str("Selected data points:\n");
        prompt.push_str(&numbered_list(&labels));
        prompt.push_str("\n\n");
    }

    if let Some(notes) = notes.map(clamp_notes).filter(|n| !n.is_empty()) {
        prompt.push_str("Additional notes from the requester:\n");
        prompt.push_str(notes);
        prompt.push_str("\n\n");
    }

    prompt.push_str(SCHEMA);
    prompt.push('\n');
    prompt
}

/// Parse, repair, and validate a model response into a blueprint.
///
/// Missing ids become `section_<index>`, missing orders become the index,
/// and section types go through the synonym table.
pub fn blueprint_from_response(
    text: &str,
    report_type: ReportType,
    generated_at: String,
) -> Result<Blueprint> {
    let raw: RawBlueprint = parse_json(text)?;

    let sections = raw
        .sections
        .into_iter()
        .enumerate()
        .map(|(index, section)| normalize_section(index, section))
        .collect::<Result<Vec<_>>>()?;

    let blueprint = Blueprint {
        report_title: raw.report_title.unwrap_or_default().trim().to_string(),
        sections,
        generated_at,
        report_type,
    };
    blueprint.validate()?;
    Ok(blueprint)
}

fn normalize_section(index: usize, raw: RawSection) -> Result<Section> {
    let id = raw
        .id
        .as_ref()
        .and_then(scalar_string)
        .unwrap_or_else(|| format!("section_{index}"));

    let raw_type = raw.section_type.unwrap_or_default();
    let section_type = resolve_section_type(&raw_type).map_err(|_| {
        ReportError::Validation(format!(
            "section '{id}' has unknown type '{}'",
            raw_type.trim()
        ))
    })?;

    let order = raw
        .order
        .as_ref()
        .and_then(integer)
        .unwrap_or(index as i64);

    let parent_id = raw.parent_id.as_ref().and_then(scalar_string);

    let metadata = raw
        .metadata
        .as_ref()
        .map(|m| SectionMetadata {
            data_source: m.get("dataSource").and_then(scalar_string),
            analysis_type: m.get("analysisType").and_then(scalar_string),
            visualization_type: m.get("visualizationType").and_then(scalar_string),
            estimated_length: m.get("estimatedLength").and_then(scalar_string),
        })
        .unwrap_or_default();

    Ok(Section {
        id,
        section_type,
        content: raw.content.unwrap_or_default(),
        order,
        parent_id,
        metadata,
    })
}

/// Non-empty string or number, as a string.
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
