//! Error types for the output parser.

/// Errors returned by output parsers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The LLM response was empty or whitespace-only.
    #[error("empty LLM response")]
    EmptyResponse,

    /// Neither the whole response nor any fenced block was valid JSON.
    #[error("no JSON document found in LLM response: {text}")]
    NoJsonDocument {
        /// A truncated copy of the response (max 200 chars).
        text: String,
    },

    /// JSON was extracted but did not match the target type.
    #[error("JSON deserialization failed: {reason}")]
    DeserializationFailed {
        /// The serde error message.
        reason: String,
        /// The extracted JSON, truncated.
        raw_json: String,
    },
}

/// Truncate a string to at most `max_chars` characters, appending "..." if truncated.
pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &s[..cut]),
        None => s.to_string(),
    }
}
