//! Blueprint compiler: turns a [`Blueprint`] into the instruction prompt for
//! long-form report generation.
//!
//! Rendering is pure and deterministic. Sections are walked depth-first;
//! siblings are sorted by `order` with ties kept in collection order. Roots
//! carry no outline number, nested sections are numbered per sibling group.
//! Sections whose parent cannot be found are rendered as roots, and every
//! section appears exactly once.

use std::collections::HashMap;
use std::fmt::Write;

use crate::blueprint::{Blueprint, Section, SectionType};

/// System prompt paired with the rendered blueprint for report writing.
pub const REPORT_SYSTEM_PROMPT: &str = "You are an expert business analyst and report writer. \
Produce comprehensive, data-driven reports in well-structured markdown. \
Follow the supplied blueprint exactly. Where real data is unavailable, use realistic, \
plausible figures and metrics. Describe charts and tables textually where the blueprint \
marks a placeholder. Keep a professional, consistent tone and close with actionable \
recommendations.";

const INDENT: &str = "  ";

const GUIDELINES: &str = "\
GENERATION GUIDELINES:
1. Follow the structure above exactly, in the order given.
2. Format the report in markdown: # for the title, ## for sections, ### for subsections.
3. Write detailed, data-driven analysis for every paragraph; where real data is absent, use realistic, plausible figures and metrics.
4. For IMAGE PLACEHOLDER sections, describe the visualization in text: chart type, axes, and the insight it shows, as [IMAGE: description].
5. For TABLE PLACEHOLDER sections, present the data as a markdown table.
6. Keep a professional, consistent tone and make each section flow into the next.
7. Close with clear, actionable recommendations.

Begin generating the report now:
";

/// Render `blueprint` into the report-generation prompt.
///
/// # Example
///
/// ```
/// use report_pipeline::blueprint::{Blueprint, ReportType, Section, SectionType};
/// use report_pipeline::prompt::render;
///
/// let blueprint = Blueprint {
///     report_title: "Q1 Overview".into(),
///     sections: vec![Section::new("s1", SectionType::Title, "Q1 Overview")],
///     generated_at: "2025-01-15T10:00:00Z".into(),
///     report_type: ReportType::BusinessPerformance,
/// };
///
/// let prompt = render(&blueprint);
/// assert!(prompt.contains("Report Type: BUSINESS PERFORMANCE"));
/// assert!(prompt.contains("[TITLE] Q1 Overview"));
/// ```
pub fn render(blueprint: &Blueprint) -> String {
    let mut out = String::new();

    out.push_str("REPORT GENERATION INSTRUCTIONS\n\n");
    let _ = writeln!(out, "Report Title: {}", blueprint.report_title);
    let _ = writeln!(out, "Report Type: {}", blueprint.report_type.label());
    let _ = writeln!(out, "Generation Date: {}", blueprint.generated_at);
    out.push_str("\nSTRUCTURAL BLUEPRINT:\n\n");

    out.push_str(&render_sections(&blueprint.sections));

    out.push_str("\n---\n\n");
    out.push_str(GUIDELINES);
    out
}

/// Render only the section outline, one line per section plus metadata.
pub fn render_sections(sections: &[Section]) -> String {
    let forest = Forest::new(sections);
    let mut out = String::new();
    let mut visited = vec![false; sections.len()];

    for &root in &forest.roots {
        forest.walk(root, 0, None, &mut visited, &mut out);
    }

    // Only reachable for blueprints that skipped validation: sections on a
    // parent cycle have no path from a root.
    for idx in 0..sections.len() {
        if !visited[idx] {
            forest.walk(idx, 0, None, &mut visited, &mut out);
        }
    }

    out
}

/// Numbered list, 1-indexed.
pub fn numbered_list(items: &[String]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {}", i + 1, item))
        .collect::<Vec<_>>()
        .join("\n")
}

struct Forest<'a> {
    sections: &'a [Section],
    roots: Vec<usize>,
    children: HashMap<&'a str, Vec<usize>>,
}

impl<'a> Forest<'a> {
    fn new(sections: &'a [Section]) -> Self {
        let known: HashMap<&str, usize> = sections
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.as_str(), i))
            .collect();

        let mut roots = Vec::new();
        let mut children: HashMap<&str, Vec<usize>> = HashMap::new();

        for (idx, section) in sections.iter().enumerate() {
            match section.parent_id.as_deref() {
                Some(parent) if known.contains_key(parent) => {
                    children.entry(parent).or_default().push(idx)
                }
                _ => roots.push(idx),
            }
        }

        // sort_by_key is stable, so equal orders keep collection order.
        roots.sort_by_key(|&i| sections[i].order);
        for group in children.values_mut() {
            group.sort_by_key(|&i| sections[i].order);
        }

        Self {
            sections,
            roots,
            children,
        }
    }

    fn walk(
        &self,
        idx: usize,
        depth: usize,
        number: Option<usize>,
        visited: &mut [bool],
        out: &mut String,
    ) {
        if visited[idx] {
            return;
        }
        visited[idx] = true;

        let section = &self.sections[idx];
        write_section(section, depth, number, out);

        if let Some(kids) = self.children.get(section.id.as_str()) {
            let mut n = 0;
            for &child in kids {
                if visited[child] {
                    continue;
                }
                n += 1;
                self.walk(child, depth + 1, Some(n), visited, out);
            }
        }
    }
}

fn write_section(section: &Section, depth: usize, number: Option<usize>, out: &mut String) {
    let indent = INDENT.repeat(depth);
    let prefix = number.map(|n| format!("{n}. ")).unwrap_or_default();
    let _ = writeln!(
        out,
        "{indent}{prefix}[{}] {}",
        section.section_type.tag(),
        section.content
    );

    let meta = &section.metadata;
    if meta.is_empty() {
        return;
    }
    let detail = INDENT.repeat(depth + 1);
    let visualization_label = match section.section_type {
        SectionType::ImagePlaceholder => "Visualization",
        SectionType::TablePlaceholder => "Table Type",
        _ => "Visualization Type",
    };

    let lines = [
        ("Data Source", &meta.data_source),
        ("Analysis Type", &meta.analysis_type),
        (visualization_label, &meta.visualization_type),
        ("Estimated Length", &meta.estimated_length),
    ];
    for (label, value) in lines {
        if let Some(value) = value.as_deref().filter(|v| !v.trim().is_empty()) {
            let _ = writeln!(out, "{detail}- {label}: {value}");
        }
    }
}
