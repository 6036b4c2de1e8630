//! Blueprint data model: a report title, a category, and a forest of typed
//! sections linked by `parentId`.
//!
//! The JSON shape is camelCase to match what the model and the HTTP layer
//! exchange. Structural checks live in [`Blueprint::validate`]; rendering
//! lives in [`crate::prompt`].

pub mod synonyms;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ReportError, Result};

/// The closed set of section kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionType {
    Title,
    Subtitle,
    Section,
    Paragraph,
    ImagePlaceholder,
    TablePlaceholder,
}

impl SectionType {
    pub const ALL: [SectionType; 6] = [
        SectionType::Title,
        SectionType::Subtitle,
        SectionType::Section,
        SectionType::Paragraph,
        SectionType::ImagePlaceholder,
        SectionType::TablePlaceholder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionType::Title => "title",
            SectionType::Subtitle => "subtitle",
            SectionType::Section => "section",
            SectionType::Paragraph => "paragraph",
            SectionType::ImagePlaceholder => "image_placeholder",
            SectionType::TablePlaceholder => "table_placeholder",
        }
    }

    /// Upper-case tag used in rendered prompts, e.g. `IMAGE PLACEHOLDER`.
    pub fn tag(&self) -> String {
        self.as_str().to_ascii_uppercase().replace('_', " ")
    }
}

impl fmt::Display for SectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exact canonical names only; see [`synonyms`] for lenient parsing.
impl FromStr for SectionType {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        SectionType::ALL
            .into_iter()
            .find(|ty| ty.as_str() == s)
            .ok_or_else(|| ReportError::Validation(format!("unknown section type '{s}'")))
    }
}

/// Report categories offered by the report builder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    #[default]
    CompetitorAnalysis,
    BusinessPerformance,
    NewPartners,
    MarketTrends,
    ProductLaunch,
}

impl ReportType {
    pub const ALL: [ReportType; 5] = [
        ReportType::CompetitorAnalysis,
        ReportType::BusinessPerformance,
        ReportType::NewPartners,
        ReportType::MarketTrends,
        ReportType::ProductLaunch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::CompetitorAnalysis => "competitor_analysis",
            ReportType::BusinessPerformance => "business_performance",
            ReportType::NewPartners => "new_partners",
            ReportType::MarketTrends => "market_trends",
            ReportType::ProductLaunch => "product_launch",
        }
    }

    /// Upper-case label for prompt headers, e.g. `COMPETITOR ANALYSIS`.
    pub fn label(&self) -> String {
        self.as_str().to_ascii_uppercase().replace('_', " ")
    }

    /// Title-case name, e.g. `Competitor Analysis`.
    pub fn display_name(&self) -> &'static str {
        match self {
            ReportType::CompetitorAnalysis => "Competitor Analysis",
            ReportType::BusinessPerformance => "Business Performance",
            ReportType::NewPartners => "New Partners",
            ReportType::MarketTrends => "Market Trends",
            ReportType::ProductLaunch => "Product Launch",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        let folded = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        ReportType::ALL
            .into_iter()
            .find(|ty| ty.as_str() == folded)
            .ok_or_else(|| ReportError::Validation(format!("unknown report type '{s}'")))
    }
}

/// Optional hints attached to a section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visualization_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_length: Option<String>,
}

impl SectionMetadata {
    pub fn is_empty(&self) -> bool {
        self.data_source.is_none()
            && self.analysis_type.is_none()
            && self.visualization_type.is_none()
            && self.estimated_length.is_none()
    }
}

/// One node of the outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: String,
    #[serde(rename = "type")]
    pub section_type: SectionType,
    /// Instruction for the writer, not final prose.
    #[serde(default)]
    pub content: String,
    /// Sibling ordering; only meaningful among children of one parent.
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub metadata: SectionMetadata,
}

impl Section {
    pub fn new(id: impl Into<String>, section_type: SectionType, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            section_type,
            content: content.into(),
            order: 0,
            parent_id: None,
            metadata: SectionMetadata::default(),
        }
    }

    pub fn with_order(mut self, order: i64) -> Self {
        self.order = order;
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: SectionMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// The full document plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blueprint {
    pub report_title: String,
    #[serde(default)]
    pub sections: Vec<Section>,
    /// RFC 3339 timestamp, copied verbatim into the prompt header.
    #[serde(default)]
    pub generated_at: String,
    #[serde(default)]
    pub report_type: ReportType,
}

/// Counts shown next to a blueprint in the report builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlueprintSummary {
    pub total_sections: usize,
    pub section_types: BTreeMap<SectionType, usize>,
    /// Sum of the word counts found in `estimatedLength` hints.
    pub estimated_words: u64,
}

impl BlueprintSummary {
    /// `~N words`, or `Not specified` when no section carries a word count.
    pub fn estimated_length(&self) -> String {
        if self.estimated_words > 0 {
            format!("~{} words", self.estimated_words)
        } else {
            "Not specified".to_string()
        }
    }
}

impl Blueprint {
    /// Sections whose `parentId` names no section in this blueprint.
    ///
    /// They are rendered as roots.
    pub fn orphans(&self) -> Vec<&Section> {
        let ids: HashSet<&str> = self.sections.iter().map(|s| s.id.as_str()).collect();
        self.sections
            .iter()
            .filter(|s| {
                s.parent_id
                    .as_deref()
                    .is_some_and(|parent| !ids.contains(parent))
            })
            .collect()
    }

    /// Check the structural rules: non-empty title, unique non-empty ids, no
    /// section parented to itself, no parent cycles.
    ///
    /// Orphans are allowed and logged.
    pub fn validate(&self) -> Result<()> {
        if self.report_title.trim().is_empty() {
            return Err(ReportError::Validation("reportTitle must not be empty".into()));
        }

        let mut parents: HashMap<&str, Option<&str>> = HashMap::with_capacity(self.sections.len());
        for section in &self.sections {
            if section.id.trim().is_empty() {
                return Err(ReportError::Validation("section id must not be empty".into()));
            }
            if section.parent_id.as_deref() == Some(section.id.as_str()) {
                return Err(ReportError::Validation(format!(
                    "section '{}' is its own parent",
                    section.id
                )));
            }
            if parents
                .insert(section.id.as_str(), section.parent_id.as_deref())
                .is_some()
            {
                return Err(ReportError::Validation(format!(
                    "duplicate section id '{}'",
                    section.id
                )));
            }
        }

        for section in &self.sections {
            let mut seen = HashSet::new();
            let mut cursor = Some(section.id.as_str());
            while let Some(id) = cursor {
                if !seen.insert(id) {
                    return Err(ReportError::Validation(format!(
                        "parent cycle through section '{}'",
                        id
                    )));
                }
                cursor = parents.get(id).copied().flatten();
            }
        }

        for orphan in self.orphans() {
            warn!(
                section = %orphan.id,
                parent = orphan.parent_id.as_deref().unwrap_or_default(),
                "parent not found, treating section as a root"
            );
        }

        Ok(())
    }

    pub fn summary(&self) -> BlueprintSummary {
        let mut section_types = BTreeMap::new();
        for section in &self.sections {
            *section_types.entry(section.section_type).or_insert(0) += 1;
        }

        let estimated_words = self
            .sections
            .iter()
            .filter_map(|s| s.metadata.estimated_length.as_deref())
            .filter_map(word_count)
            .fold(0u64, u64::saturating_add);

        BlueprintSummary {
            total_sections: self.sections.len(),
            section_types,
            estimated_words,
        }
    }
}

/// First `<digits> word(s)` figure in a length hint, e.g. `"200-300 words"`
/// yields 300.
fn word_count(hint: &str) -> Option<u64> {
    let bytes = hint.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        let digits = &hint[start..i];
        let rest = hint[i..].trim_start();
        if rest.get(..4).is_some_and(|w| w.eq_ignore_ascii_case("word")) {
            return digits.parse().ok();
        }
    }
    None
}
