// Shared prompt constants and prompt-building utilities.
// Each service that needs LLM calls defines its own prompts.rs alongside it.
// This file contains cross-cutting prompt fragments.

/// Appended to every system prompt that expects a JSON object back.
pub const JSON_ONLY_INSTRUCTION: &str = "You MUST respond with a valid JSON object only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

/// Upper bound on document text forwarded to the model.
pub const MAX_DOCUMENT_CHARS: usize = 15_000;

/// Truncates `text` to at most `MAX_DOCUMENT_CHARS` characters on a char boundary.
pub fn truncate_document(text: &str) -> &str {
    match text.char_indices().nth(MAX_DOCUMENT_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_text_unchanged() {
        assert_eq!(truncate_document("short"), "short");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "é".repeat(MAX_DOCUMENT_CHARS + 10);
        let truncated = truncate_document(&text);
        assert_eq!(truncated.chars().count(), MAX_DOCUMENT_CHARS);
    }
}
