//! JSON document extraction from LLM responses.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::output_parser::error::{truncate, ParseError};
use crate::output_parser::extract::{extract_code_block, extract_code_block_for};

/// Extract the JSON document from an LLM response.
///
/// Candidates, in order: the whole trimmed text, the first `` ```json ``
/// block, the first fenced block of any language. The first candidate that
/// parses wins.
///
/// # Examples
///
/// ```
/// use report_pipeline::output_parser::parse_json_document;
///
/// let value = parse_json_document("```json\n{\"reportTitle\": \"X\"}\n```").unwrap();
/// assert_eq!(value["reportTitle"], "X");
/// ```
pub fn parse_json_document(response: &str) -> Result<Value, ParseError> {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return Err(ParseError::EmptyResponse);
    }

    let candidates = [
        Some(trimmed),
        extract_code_block_for(trimmed, "json"),
        extract_code_block(trimmed).map(|(_, content)| content),
    ];

    candidates
        .into_iter()
        .flatten()
        .find_map(|candidate| serde_json::from_str::<Value>(candidate).ok())
        .ok_or_else(|| ParseError::NoJsonDocument {
            text: truncate(trimmed, 200),
        })
}

/// Extract the JSON document and deserialize it into `T`.
///
/// # Examples
///
/// ```
/// use serde::Deserialize;
/// use report_pipeline::output_parser::parse_json;
///
/// #[derive(Deserialize)]
/// struct Outline {
///     title: String,
/// }
///
/// let outline: Outline = parse_json("Sure!\n```\n{\"title\": \"Q1\"}\n```").unwrap();
/// assert_eq!(outline.title, "Q1");
/// ```
pub fn parse_json<T: DeserializeOwned>(response: &str) -> Result<T, ParseError> {
    let value = parse_json_document(response)?;
    let raw_json = truncate(&value.to_string(), 200);
    serde_json::from_value(value).map_err(|e| ParseError::DeserializationFailed {
        reason: e.to_string(),
        raw_json,
    })
}
