//! Output sanitization for every string that leaves the service.
//!
//! Model output is embedded verbatim in JSON responses and task rows, so it
//! is scrubbed of line breaks, control and invisible format characters, and
//! capped in length. URLs are validated rather than truncated: a URL that
//! fails validation is treated as a failed upload by the caller.

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum sanitized text length in characters.
pub const MAX_TEXT_CHARS: usize = 1000;

/// Suffix appended to text cut at [`MAX_TEXT_CHARS`].
const TRUNCATION_SUFFIX: &str = "...";

/// Replacement for non-empty text that sanitizes down to nothing.
pub const REMOVED_PLACEHOLDER: &str = "[content removed]";

/// Maximum accepted asset URL length.
pub const MAX_URL_CHARS: usize = 2048;

// ---------------------------------------------------------------------------
// Sanitizer
// ---------------------------------------------------------------------------

/// Shared output sanitizer. One instance is injected into the pipeline and
/// the HTTP layer so both apply identical rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSanitizer {
    pub max_text_chars: usize,
    pub max_url_chars: usize,
}

impl Default for OutputSanitizer {
    fn default() -> Self {
        Self {
            max_text_chars: MAX_TEXT_CHARS,
            max_url_chars: MAX_URL_CHARS,
        }
    }
}

impl OutputSanitizer {
    /// Scrub a free-text string for embedding in a response.
    ///
    /// Unsafe characters become spaces, whitespace runs collapse to one
    /// space, the result is trimmed and capped. Empty input stays empty;
    /// non-empty input that scrubs to nothing becomes [`REMOVED_PLACEHOLDER`].
    pub fn text(&self, raw: &str) -> String {
        if raw.is_empty() {
            return String::new();
        }

        let replaced: String = raw
            .chars()
            .map(|c| if is_unsafe_char(c) { ' ' } else { c })
            .collect();
        let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");

        if collapsed.is_empty() {
            return REMOVED_PLACEHOLDER.to_string();
        }

        if collapsed.chars().count() > self.max_text_chars {
            let keep = self.max_text_chars.saturating_sub(TRUNCATION_SUFFIX.len());
            let mut truncated: String = collapsed.chars().take(keep).collect();
            truncated.push_str(TRUNCATION_SUFFIX);
            return truncated;
        }

        collapsed
    }

    /// Validate an asset URL for the response.
    ///
    /// Only `http(s)` URLs without whitespace or control characters and
    /// within [`MAX_URL_CHARS`] pass. Inline `data:` URLs are rejected.
    pub fn url(&self, raw: &str) -> Result<String, CoreError> {
        let url = raw.trim();

        if url.is_empty() {
            return Err(CoreError::Validation("asset URL is empty".into()));
        }
        if url.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("data:")) {
            return Err(CoreError::Validation(
                "inline data URLs are not returned".into(),
            ));
        }
        if url.chars().count() > self.max_url_chars {
            return Err(CoreError::Validation(format!(
                "asset URL exceeds {} characters",
                self.max_url_chars
            )));
        }
        if url.chars().any(|c| c.is_whitespace() || is_unsafe_char(c)) {
            return Err(CoreError::Validation(
                "asset URL contains unsafe characters".into(),
            ));
        }
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(CoreError::Validation(
                "asset URL must use http or https".into(),
            ));
        }

        Ok(url.to_string())
    }
}

/// Line breaks, C0/C1 controls, zero-width, bidi and other invisible format
/// characters.
pub fn is_unsafe_char(c: char) -> bool {
    matches!(
        c,
        '\u{0000}'..='\u{001F}'
            | '\u{007F}'..='\u{009F}'
            | '\u{200B}'..='\u{200F}'
            | '\u{2028}'..='\u{202F}'
            | '\u{205F}'..='\u{206F}'
            | '\u{FEFF}'
    )
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn strips_controls_and_invisible_characters() {
        let s = OutputSanitizer::default();
        assert_eq!(
            s.text("line one\r\nline\u{0007} two\u{200B}\u{FEFF}end"),
            "line one line two end"
        );
        assert_eq!(s.text("  keep   inner\tspacing  "), "keep inner spacing");
    }

    #[test]
    fn caps_long_text() {
        let s = OutputSanitizer::default();
        let long = "a".repeat(MAX_TEXT_CHARS + 50);
        let out = s.text(&long);

        assert_eq!(out.chars().count(), MAX_TEXT_CHARS);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn counts_characters_not_bytes() {
        let s = OutputSanitizer::default();
        let text = "姿".repeat(MAX_TEXT_CHARS);
        assert_eq!(s.text(&text), text);
    }

    #[test]
    fn empty_after_scrubbing_becomes_placeholder() {
        let s = OutputSanitizer::default();
        assert_eq!(s.text("\u{200B}\u{0000}\n"), REMOVED_PLACEHOLDER);
        assert_eq!(s.text(""), "");
    }

    #[test]
    fn accepts_plain_https_url() {
        let s = OutputSanitizer::default();
        assert_eq!(
            s.url(" https://cdn.example.com/a.png ").unwrap(),
            "https://cdn.example.com/a.png"
        );
    }

    #[test]
    fn rejects_unsafe_urls() {
        let s = OutputSanitizer::default();
        assert_matches!(s.url("data:image/png;base64,AAAA"), Err(CoreError::Validation(_)));
        assert_matches!(s.url("https://cdn.example.com/a b.png"), Err(CoreError::Validation(_)));
        assert_matches!(s.url("ftp://cdn.example.com/a.png"), Err(CoreError::Validation(_)));
        assert_matches!(s.url(""), Err(CoreError::Validation(_)));

        let long = format!("https://cdn.example.com/{}", "x".repeat(MAX_URL_CHARS));
        assert_matches!(s.url(&long), Err(CoreError::Validation(_)));
    }
}
