//! Utility functions and helpers.

pub mod http;
#[cfg(test)]
pub(crate) mod testing;

use unicode_segmentation::UnicodeSegmentation;

/// Shorten `text` to at most `max` grapheme clusters, ending with an ellipsis
/// when anything was cut.
pub fn truncate_graphemes(text: &str, max: usize) -> String {
    let count = text.graphemes(true).count();
    if count <= max {
        return text.to_string();
    }
    if max == 0 {
        return String::new();
    }
    let mut out: String = text.graphemes(true).take(max - 1).collect();
    out.push('…');
    out
}

/// Number of grapheme clusters in `text`.
pub fn grapheme_len(text: &str) -> usize {
    text.graphemes(true).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_keeps_short_text() {
        assert_eq!(truncate_graphemes("Magnitude 6.1", 300), "Magnitude 6.1");
    }

    #[test]
    fn test_truncate_counts_graphemes_not_bytes() {
        let text = "🇯🇵🇯🇵🇯🇵🇯🇵";
        assert_eq!(grapheme_len(text), 4);
        assert_eq!(truncate_graphemes(text, 3), "🇯🇵🇯🇵…");
    }

    #[test]
    fn test_truncate_to_zero() {
        assert_eq!(truncate_graphemes("abc", 0), "");
    }
}
