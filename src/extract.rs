//! Per-format text extraction for PDF, Word (`.docx`) and plain-text files.
//!
//! Extraction never fails toward its caller: every format-specific error is
//! caught and turned into an [`Extraction`] with empty text and a
//! [`Diagnostic`] describing what happened. For PDFs the diagnostic tells a
//! document that parsed but has no text layer (usually a scan) apart from
//! one that could not be parsed at all.
//!
//! | Source | Extensions | Method |
//! |--------|------------|--------|
//! | [`TextSource::Pdf`] | `.pdf` | `pdf-extract`, pages concatenated in order |
//! | [`TextSource::WordDoc`] | `.docx` | `word/document.xml` paragraphs joined with `\n` |
//! | [`TextSource::PlainText`] | `.txt`, `.md`, `.csv` | first candidate encoding that decodes cleanly |

use std::io::Read;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use encoding_rs::Encoding;
use tracing::debug;

/// Maximum decompressed bytes read from `word/document.xml` (zip-bomb guard).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// The format family of a supported file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSource {
    Pdf,
    WordDoc,
    PlainText,
}

impl TextSource {
    /// Map a file extension (without the dot, case-sensitive) to a source.
    /// Unsupported extensions yield `None`.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "pdf" => Some(TextSource::Pdf),
            "docx" => Some(TextSource::WordDoc),
            "txt" | "md" | "csv" => Some(TextSource::PlainText),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Extract trimmed text from the file at `path`.
    ///
    /// `encodings` is only consulted for [`TextSource::PlainText`].
    pub fn extract(self, path: &Path, encodings: &[&'static Encoding]) -> Extraction {
        let result = std::fs::read(path)
            .map_err(|e| ExtractError::Io(e.to_string()))
            .and_then(|bytes| match self {
                TextSource::Pdf => extract_pdf(&bytes),
                TextSource::WordDoc => extract_docx(&bytes),
                TextSource::PlainText => decode_text(&bytes, encodings),
            });

        match result {
            Ok(text) => {
                let text = text.trim().to_string();
                let diagnostic = if text.is_empty() && self == TextSource::Pdf {
                    Diagnostic::NoTextLayer
                } else {
                    Diagnostic::Extracted
                };
                Extraction { text, diagnostic }
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "extraction failed");
                Extraction {
                    text: String::new(),
                    diagnostic: Diagnostic::Failed(e.to_string()),
                }
            }
        }
    }
}

/// Outcome of extracting one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub text: String,
    pub diagnostic: Diagnostic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// The file was read and decoded (the text may still be empty for
    /// non-PDF sources).
    Extracted,
    /// The PDF parsed but no page carried any non-whitespace text.
    NoTextLayer,
    /// Reading, parsing or decoding failed.
    Failed(String),
}

impl Extraction {
    pub fn has_text(&self) -> bool {
        !self.text.is_empty()
    }
}

/// Internal extraction error; always downgraded to [`Diagnostic::Failed`].
#[derive(Debug, thiserror::Error)]
enum ExtractError {
    #[error("read failed: {0}")]
    Io(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
    #[error("no candidate encoding could decode the file")]
    Decode,
}

/// Resolve encoding labels (`"utf-8"`, `"shift_jis"`, …); unknown labels are skipped.
pub fn resolve_encodings(labels: &[String]) -> Vec<&'static Encoding> {
    labels
        .iter()
        .filter_map(|label| Encoding::for_label(label.as_bytes()))
        .collect()
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    // pdf-extract panics on some malformed inputs instead of returning Err.
    let pages = catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    }))
    .map_err(|_| ExtractError::Pdf("parser panicked".to_string()))?
    .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    Ok(pages.concat())
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    let paragraphs = extract_paragraphs(&doc_xml)?;
    Ok(paragraphs.join("\n"))
}

/// Collect the text of every `<w:p>` in document order.
fn extract_paragraphs(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    use quick_xml::events::Event;

    let mut paragraphs = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => current = Some(String::new()),
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"p" => paragraphs.push(String::new()),
                b"tab" => {
                    if let Some(p) = current.as_mut() {
                        p.push('\t');
                    }
                }
                b"br" | b"cr" => {
                    if let Some(p) = current.as_mut() {
                        p.push('\n');
                    }
                }
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                if let Some(p) = current.as_mut() {
                    p.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if let Some(p) = current.take() {
                        paragraphs.push(p);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(paragraphs)
}

/// Decode with the first encoding that accepts the bytes without replacement.
fn decode_text(bytes: &[u8], encodings: &[&'static Encoding]) -> Result<String, ExtractError> {
    encodings
        .iter()
        .find_map(|encoding| {
            encoding
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(|text| text.into_owned())
        })
        .ok_or(ExtractError::Decode)
}
