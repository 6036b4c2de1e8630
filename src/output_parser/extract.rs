//! Markdown fence extraction.
//!
//! A fence opens with three backticks, an optional language hint, and a
//! newline; it closes at the next three backticks. Content is trimmed.

/// Extract content from the first markdown code block.
///
/// Returns `(language_hint, content)` where hint is `None` for bare fences.
///
/// # Examples
///
/// ```
/// use report_pipeline::output_parser::extract::extract_code_block;
///
/// let input = "Here:\n```json\n{\"a\": 1}\n```";
/// let (lang, content) = extract_code_block(input).unwrap();
/// assert_eq!(lang, Some("json"));
/// assert_eq!(content, "{\"a\": 1}");
/// ```
pub fn extract_code_block(text: &str) -> Option<(Option<&str>, &str)> {
    let mut search_from = 0;
    while let Some(fence_start) = text[search_from..].find("```") {
        let after_backticks = search_from + fence_start + 3;

        // Language hint: everything between ``` and the next newline
        let line_end = text[after_backticks..].find('\n')?;
        let lang_str = text[after_backticks..after_backticks + line_end].trim();
        let lang = (!lang_str.is_empty()).then_some(lang_str);

        let content_start = after_backticks + line_end + 1;

        if let Some(close_offset) = text[content_start..].find("```") {
            let content = text[content_start..content_start + close_offset].trim();
            return Some((lang, content));
        }

        search_from = after_backticks;
    }
    None
}

/// Extract content from the first code block tagged with `lang`
/// (case-insensitive). Untagged blocks are skipped.
///
/// # Examples
///
/// ```
/// use report_pipeline::output_parser::extract::extract_code_block_for;
///
/// let input = "```json\n[1, 2, 3]\n```";
/// assert_eq!(extract_code_block_for(input, "json"), Some("[1, 2, 3]"));
/// ```
pub fn extract_code_block_for<'a>(text: &'a str, lang: &str) -> Option<&'a str> {
    let mut search_from = 0;
    while let Some(fence_start) = text[search_from..].find("```") {
        let after_backticks = search_from + fence_start + 3;

        let line_end = text[after_backticks..].find('\n')?;
        let lang_str = text[after_backticks..after_backticks + line_end].trim();
        let content_start = after_backticks + line_end + 1;
        let close_offset = text[content_start..].find("```")?;

        if lang_str.eq_ignore_ascii_case(lang) {
            return Some(text[content_start..content_start + close_offset].trim());
        }

        // Skip past this whole block so its closing fence is not read as an opener.
        search_from = content_start + close_offset + 3;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_code_block() {
        let input = "Here:\n```json\n{\"a\": 1}\n```";
        let (lang, content) = extract_code_block(input).unwrap();
        assert_eq!(lang, Some("json"));
        assert_eq!(content, "{\"a\": 1}");
    }

    #[test]
    fn extract_bare_code_block() {
        let input = "Here:\n```\n{\"a\": 1}\n```";
        let (lang, content) = extract_code_block(input).unwrap();
        assert_eq!(lang, None);
        assert_eq!(content, "{\"a\": 1}");
    }

    #[test]
    fn extract_code_block_no_fence() {
        assert!(extract_code_block("no code blocks here").is_none());
    }

    #[test]
    fn extract_code_block_unclosed() {
        assert!(extract_code_block("```json\n{\"a\": 1}").is_none());
    }

    #[test]
    fn extract_code_block_for_json() {
        let input = "```json\n[1, 2, 3]\n```";
        assert_eq!(extract_code_block_for(input, "json"), Some("[1, 2, 3]"));
    }

    #[test]
    fn extract_code_block_for_wrong_lang() {
        let input = "```yaml\nname: test\n```";
        assert_eq!(extract_code_block_for(input, "json"), None);
    }

    #[test]
    fn extract_code_block_for_skips_earlier_blocks() {
        let input = "```text\nnotes\n```\nthen\n```JSON\n{\"b\": 2}\n```";
        assert_eq!(extract_code_block_for(input, "json"), Some("{\"b\": 2}"));
    }
}
