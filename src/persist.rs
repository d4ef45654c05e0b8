//! Session snapshot files.
//!
//! Thin filesystem wrapper over [`SessionContext::to_json`] and
//! [`SessionContext::restore_json`]. A failed restore leaves the session
//! untouched.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use paper_analyst_core::session::SessionContext;

/// Default snapshot name: `session_<unix-seconds>.json`.
pub fn default_snapshot_path() -> PathBuf {
    PathBuf::from(format!("session_{}.json", chrono::Utc::now().timestamp()))
}

pub fn save_session(session: &SessionContext, path: &Path) -> Result<()> {
    let json = session.to_json()?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write session file: {}", path.display()))?;
    info!(path = %path.display(), messages = session.messages.len(), "session saved");
    Ok(())
}

pub fn load_session(session: &mut SessionContext, path: &Path) -> Result<()> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read session file: {}", path.display()))?;
    session
        .restore_json(&json)
        .with_context(|| format!("Failed to restore session from {}", path.display()))?;
    info!(path = %path.display(), documents = session.loaded_documents.len(), "session restored");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use paper_analyst_core::models::{Document, LoadReport};
    use paper_analyst_core::AnalystError;
    use tempfile::TempDir;

    #[test]
    fn save_then_load_restores_documents() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("s.json");

        let mut session = SessionContext::new();
        session.select_model("M");
        session
            .replace_documents(LoadReport {
                documents: vec![Document::new("a.txt", "alpha")],
                warnings: Vec::new(),
            })
            .unwrap();
        save_session(&session, &path).unwrap();

        let mut restored = SessionContext::new();
        load_session(&mut restored, &path).unwrap();
        assert_eq!(restored.loaded_documents, session.loaded_documents);
    }

    #[test]
    fn malformed_file_reports_session_format_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.json");
        std::fs::write(&path, r#"{"messages": []}"#).unwrap();

        let mut session = SessionContext::new();
        let err = load_session(&mut session, &path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnalystError>(),
            Some(AnalystError::SessionFormat(_))
        ));
    }

    #[test]
    fn default_name_has_timestamp() {
        let name = default_snapshot_path();
        let name = name.to_string_lossy();
        assert!(name.starts_with("session_") && name.ends_with(".json"));
    }
}
