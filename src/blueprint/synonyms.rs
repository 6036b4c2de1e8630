//! Lookup table for section type names the model emits instead of the
//! canonical ones.
//!
//! Adding a synonym is a table edit; [`normalize_section_type`] never
//! changes. Bump [`SYNONYM_TABLE_VERSION`] whenever the table changes.

use super::SectionType;
use crate::error::{ReportError, Result};

pub const SYNONYM_TABLE_VERSION: u32 = 1;

/// `(synonym, canonical type)`. Keys are lower-case with `_` separators.
pub const SECTION_TYPE_SYNONYMS: &[(&str, SectionType)] = &[
    ("subsection", SectionType::Section),
    ("heading", SectionType::Section),
    ("header", SectionType::Section),
    ("text", SectionType::Paragraph),
    ("body", SectionType::Paragraph),
    ("image", SectionType::ImagePlaceholder),
    ("chart", SectionType::ImagePlaceholder),
    ("graph", SectionType::ImagePlaceholder),
    ("visualization", SectionType::ImagePlaceholder),
    ("table", SectionType::TablePlaceholder),
    ("data_table", SectionType::TablePlaceholder),
];

/// Map a raw type name onto its canonical spelling.
///
/// Case-insensitive; spaces and hyphens count as underscores. Names that are
/// neither canonical nor a known synonym come back folded but otherwise
/// unchanged, so validation can reject them. Idempotent.
///
/// ```
/// use report_pipeline::blueprint::synonyms::normalize_section_type;
///
/// assert_eq!(normalize_section_type("Chart"), "image_placeholder");
/// assert_eq!(normalize_section_type("Data Table"), "table_placeholder");
/// assert_eq!(normalize_section_type("title"), "title");
/// ```
pub fn normalize_section_type(raw: &str) -> String {
    let folded: String = raw
        .trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect();

    SECTION_TYPE_SYNONYMS
        .iter()
        .find(|(synonym, _)| *synonym == folded)
        .map(|(_, canonical)| canonical.as_str().to_string())
        .unwrap_or(folded)
}

/// Normalize and parse in one step.
pub fn resolve_section_type(raw: &str) -> Result<SectionType> {
    normalize_section_type(raw)
        .parse()
        .map_err(|_| ReportError::Validation(format!("unknown section type '{}'", raw.trim())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_synonym_maps_to_its_canonical_type() {
        for (synonym, canonical) in SECTION_TYPE_SYNONYMS {
            assert_eq!(normalize_section_type(synonym), canonical.as_str(), "{synonym}");
            assert_eq!(
                normalize_section_type(&synonym.to_uppercase()),
                canonical.as_str(),
                "{synonym} upper-case"
            );
            assert_eq!(resolve_section_type(synonym).unwrap(), *canonical);
        }
    }

    #[test]
    fn test_canonical_names_are_fixed_points() {
        for ty in SectionType::ALL {
            assert_eq!(normalize_section_type(ty.as_str()), ty.as_str());
        }
    }

    #[test]
    fn test_synonyms_never_shadow_canonical_names() {
        for (synonym, _) in SECTION_TYPE_SYNONYMS {
            assert!(
                SectionType::ALL.iter().all(|ty| ty.as_str() != *synonym),
                "{synonym} is already canonical"
            );
        }
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = SECTION_TYPE_SYNONYMS
            .iter()
            .map(|(s, _)| s.to_string())
            .chain(SectionType::ALL.iter().map(|t| t.as_str().to_string()))
            .chain(
                ["Chart", " IMAGE ", "Image Placeholder", "data-table", "sidebar", ""]
                    .into_iter()
                    .map(String::from),
            );

        for input in inputs {
            let once = normalize_section_type(&input);
            assert_eq!(normalize_section_type(&once), once, "input {input:?}");
        }
    }

    #[test]
    fn test_separators_and_case_fold() {
        assert_eq!(normalize_section_type("Image Placeholder"), "image_placeholder");
        assert_eq!(normalize_section_type("TABLE-PLACEHOLDER"), "table_placeholder");
        assert_eq!(normalize_section_type("  Subsection "), "section");
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert_eq!(normalize_section_type("Sidebar"), "sidebar");
        let err = resolve_section_type("Sidebar").unwrap_err();
        assert!(matches!(err, ReportError::Validation(ref m) if m.contains("Sidebar")));
    }
}
