//! Folder loader: extract → sanitize → chunk for every supported file.
//!
//! Only files directly inside the folder are considered, in the order the
//! directory listing returns them (no sorting). Problems with a single file
//! never abort the pass; they become [`LoadWarning`]s.
//!
//! The loader does not enforce the document cap. [`crate::ingest`] applies
//! it to the finished report.

use std::path::Path;

use encoding_rs::Encoding;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use paper_analyst_core::chunk::chunk_text;
use paper_analyst_core::models::{LoadReport, LoadWarning};
use paper_analyst_core::sanitize::sanitize_text;
use paper_analyst_core::AnalystError;

use crate::config::LoaderConfig;
use crate::extract::{resolve_encodings, Diagnostic, TextSource};

/// Per-pass loader settings.
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    pub max_chars_per_chunk: usize,
    pub encodings: Vec<&'static Encoding>,
}

impl LoaderOptions {
    pub fn from_config(config: &LoaderConfig) -> Self {
        Self {
            max_chars_per_chunk: config.max_chars_per_chunk,
            encodings: resolve_encodings(&config.encodings),
        }
    }
}

/// Load every supported file directly inside `folder`.
///
/// A path that is missing or not a directory yields an empty document list
/// with a single [`LoadWarning::InvalidFolder`].
pub fn load_documents(folder: &Path, options: &LoaderOptions) -> LoadReport {
    let mut report = LoadReport::default();

    if !folder.is_dir() {
        let path = folder.display().to_string();
        warn!(error = %AnalystError::InvalidFolder { path: path.clone() }, "load pass skipped");
        report.warnings.push(LoadWarning::InvalidFolder { path });
        return report;
    }

    let walker = WalkDir::new(folder).min_depth(1).max_depth(1);
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(source) = TextSource::from_path(path) else {
            continue;
        };
        load_file(path, source, options, &mut report);
    }

    if report.documents.is_empty() && report.warnings.is_empty() {
        report.warnings.push(LoadWarning::NothingFound);
    }

    info!(
        folder = %folder.display(),
        documents = report.documents.len(),
        warnings = report.warnings.len(),
        "load pass finished"
    );
    report
}

fn load_file(path: &Path, source: TextSource, options: &LoaderOptions, report: &mut LoadReport) {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let extraction = source.extract(path, &options.encodings);
    if extraction.has_text() {
        let content = sanitize_text(&extraction.text);
        let parts = chunk_text(&filename, &content, options.max_chars_per_chunk);
        debug!(file = %filename, parts = parts.len(), "extracted");
        if parts.len() > 1 {
            report.warnings.push(LoadWarning::Split {
                filename: filename.clone(),
                parts: parts.len(),
            });
        }
        report.documents.extend(parts);
        return;
    }

    let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    if size == 0 {
        debug!(file = %filename, "empty file skipped");
        return;
    }

    let warning = match extraction.diagnostic {
        Diagnostic::NoTextLayer => LoadWarning::ScannedPdf { filename },
        Diagnostic::Failed(reason) => {
            let error = AnalystError::ExtractionFailure {
                filename: filename.clone(),
                reason,
            };
            warn!(error = %error, "file skipped");
            LoadWarning::Unreadable { filename }
        }
        Diagnostic::Extracted => LoadWarning::Unreadable { filename },
    };
    report.warnings.push(warning);
}
