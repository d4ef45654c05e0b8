//! Character-level cleanup of extracted text.
//!
//! Text pulled out of PDFs and legacy encodings regularly carries NULs,
//! form feeds, BOMs and Unicode line/paragraph separators. Those break
//! terminal display and JSON snapshots, so every document passes through
//! [`sanitize_text`] exactly once before it is chunked.

const LINE_SEPARATOR: char = '\u{2028}';
const PARAGRAPH_SEPARATOR: char = '\u{2029}';
const BYTE_ORDER_MARK: char = '\u{feff}';

/// Remove control characters and normalize Unicode line separators.
///
/// - `U+2028` and `U+2029` become `\n`.
/// - `\n`, `\r` and `\t` are kept.
/// - Every other control character (NUL included) and the BOM are dropped.
/// - All printable characters are kept untouched.
pub fn sanitize_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            LINE_SEPARATOR | PARAGRAPH_SEPARATOR => out.push('\n'),
            '\n' | '\r' | '\t' => out.push(ch),
            BYTE_ORDER_MARK => {}
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}
