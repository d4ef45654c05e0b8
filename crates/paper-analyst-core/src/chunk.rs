//! Fixed-length text chunker.
//!
//! Splits an oversized document into [`Document`] parts of exactly
//! `max_chars` characters (the last part may be shorter). There is no
//! paragraph or sentence awareness: a split can land mid-word. Lengths are
//! measured in Unicode scalar values, never bytes, so a split never falls
//! inside a multi-byte character.
//!
//! # Example
//!
//! ```rust
//! use paper_analyst_core::chunk::chunk_text;
//!
//! let parts = chunk_text("notes.txt", "abcdefghij", 4);
//! assert_eq!(parts.len(), 3);
//! assert_eq!(parts[0].filename, "notes.txt (Part 1)");
//! assert_eq!(parts[2].content, "ij");
//! ```

use crate::models::Document;

/// Split `text` into consecutive slices of at most `max_chars` characters.
///
/// # Guarantees
///
/// - Text at or below the limit comes back as a single slice, unchanged.
/// - Slices are contiguous and non-overlapping; their concatenation equals
///   `text`.
/// - Every slice but the last has exactly `max_chars` characters.
///
/// A `max_chars` of zero is treated as "no limit".
pub fn split_by_chars(text: &str, max_chars: usize) -> Vec<&str> {
    if max_chars == 0 {
        return vec![text];
    }

    let mut slices = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (idx, _) in text.char_indices() {
        if count == max_chars {
            slices.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    slices.push(&text[start..]);
    slices
}

/// Turn one sanitized source into one or more documents.
///
/// A single slice keeps the original filename; multiple slices are labelled
/// `"<filename> (Part i)"` with `i` starting at 1.
pub fn chunk_text(filename: &str, text: &str, max_chars: usize) -> Vec<Document> {
    let slices = split_by_chars(text, max_chars);
    if slices.len() == 1 {
        return vec![Document::new(filename, text)];
    }

    slices
        .into_iter()
        .enumerate()
        .map(|(i, slice)| Document::new(part_name(filename, i + 1), slice))
        .collect()
}

/// Display name of part `index` (1-based) of `filename`.
pub fn part_name(filename: &str, index: usize) -> String {
    format!("{} (Part {})", filename, index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_at_limit_is_single_unchanged_document() {
        let docs = chunk_text("a.txt", "abcd", 4);
        assert_eq!(docs, vec![Document::new("a.txt", "abcd")]);
    }

    #[test]
    fn empty_text_is_single_document() {
        let docs = chunk_text("a.txt", "", 4);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "");
    }

    #[test]
    fn chunk_count_is_ceiling_of_length_over_limit() {
        for len in [5usize, 8, 9, 17, 100] {
            let text: String = "x".repeat(len);
            let slices = split_by_chars(&text, 4);
            assert_eq!(slices.len(), len.div_ceil(4), "len {}", len);
            for s in &slices[..slices.len() - 1] {
                assert_eq!(s.chars().count(), 4);
            }
            assert_eq!(slices.concat(), text);
        }
    }

    #[test]
    fn parts_are_numbered_from_one() {
        let docs = chunk_text("report.pdf", "abcdefghij", 4);
        let names: Vec<_> = docs.iter().map(|d| d.filename.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "report.pdf (Part 1)",
                "report.pdf (Part 2)",
                "report.pdf (Part 3)"
            ]
        );
        assert_eq!(docs[1].content, "efgh");
    }

    #[test]
    fn splits_on_character_not_byte_boundaries() {
        let text = "日本語のテキスト";
        let slices = split_by_chars(text, 3);
        assert_eq!(slices, vec!["日本語", "のテキ", "スト"]);
    }

    #[test]
    fn split_may_fall_mid_word() {
        let slices = split_by_chars("hello world", 4);
        assert_eq!(slices, vec!["hell", "o wo", "rld"]);
    }

    #[test]
    fn zero_limit_disables_splitting() {
        assert_eq!(split_by_chars("abc", 0), vec!["abc"]);
    }
}
