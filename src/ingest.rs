//! Load-pass orchestration.
//!
//! Runs the [`loader`](crate::loader) against a folder, enforces the
//! document cap on the result, and swaps the outcome into the session.

use std::path::Path;

use tracing::warn;

use paper_analyst_core::models::LoadReport;
use paper_analyst_core::session::SessionContext;
use paper_analyst_core::Result;

use crate::config::LoaderConfig;
use crate::loader::{load_documents, LoaderOptions};

/// Load `folder` and keep at most `config.max_documents` documents.
pub fn run_load(folder: &Path, config: &LoaderConfig) -> LoadReport {
    let options = LoaderOptions::from_config(config);
    let mut report = load_documents(folder, &options);
    let produced = report.documents.len();
    report.cap_documents(config.max_documents);
    if produced > report.documents.len() {
        warn!(
            produced,
            kept = report.documents.len(),
            "document cap reached; extra documents dropped"
        );
    }
    report
}

/// Run a load pass and replace the session's documents with the result.
///
/// Fails only if a generation is in flight; every per-file problem is
/// recorded in the session's warnings instead.
pub fn load_into_session(
    session: &mut SessionContext,
    folder: &Path,
    config: &LoaderConfig,
) -> Result<()> {
    if session.is_generating {
        return Err(paper_analyst_core::AnalystError::GenerationInProgress);
    }
    let report = run_load(folder, config);
    session.replace_documents(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use paper_analyst_core::models::LoadWarning;
    use paper_analyst_core::session::AppStatus;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn cap_keeps_first_documents_and_warns_once() {
        let tmp = TempDir::new().unwrap();
        for i in 0..15 {
            fs::write(tmp.path().join(format!("doc{:02}.txt", i)), format!("body {}", i)).unwrap();
        }
        let config = LoaderConfig {
            max_documents: 10,
            ..LoaderConfig::default()
        };

        let uncapped = load_documents(tmp.path(), &LoaderOptions::from_config(&config));
        let report = run_load(tmp.path(), &config);

        assert_eq!(report.documents.len(), 10);
        assert_eq!(report.documents[..], uncapped.documents[..10]);
        let truncations = report
            .warnings
            .iter()
            .filter(|w| matches!(w, LoadWarning::Truncated { .. }))
            .count();
        assert_eq!(truncations, 1);
    }

    #[test]
    fn load_replaces_previous_documents() {
        let first = TempDir::new().unwrap();
        fs::write(first.path().join("a.txt"), "alpha").unwrap();
        let second = TempDir::new().unwrap();
        fs::write(second.path().join("b.txt"), "beta").unwrap();

        let mut session = SessionContext::new();
        let config = LoaderConfig::default();
        load_into_session(&mut session, first.path(), &config).unwrap();
        load_into_session(&mut session, second.path(), &config).unwrap();

        assert_eq!(session.status, AppStatus::Ready);
        assert_eq!(session.loaded_documents.len(), 1);
        assert_eq!(session.loaded_documents[0].filename, "b.txt");
    }

    #[test]
    fn invalid_folder_lands_in_session_warnings() {
        let mut session = SessionContext::new();
        load_into_session(&mut session, Path::new("/no/such/dir"), &LoaderConfig::default())
            .unwrap();
        assert!(session.loaded_documents.is_empty());
        assert_eq!(session.load_warnings.len(), 1);
        assert!(session.load_warnings[0].contains("/no/such/dir"));
    }
}
