//! Integration tests for the `analyst` binary.
//!
//! Only commands that never reach the network are exercised here.

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

fn analyst_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop();
    path.pop();
    path.push("analyst");
    path
}

fn run(tmp: &TempDir, args: &[&str], env: &[(&str, &str)]) -> Output {
    let config = tmp.path().join("missing.toml");
    let mut cmd = Command::new(analyst_binary());
    cmd.arg("--config").arg(&config).args(args);
    cmd.env_remove("MODEL_NAMES").env("RUST_LOG", "warn");
    for (k, v) in env {
        cmd.env(k, v);
    }
    cmd.output().expect("failed to run analyst")
}

#[test]
fn load_lists_documents_and_warnings() {
    let tmp = TempDir::new().unwrap();
    let papers = tmp.path().join("papers");
    fs::create_dir(&papers).unwrap();
    fs::write(papers.join("notes.md"), "# Notes\nbody").unwrap();
    fs::write(papers.join("broken.docx"), "not a zip").unwrap();

    let output = run(&tmp, &["load", papers.to_str().unwrap()], &[]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stdout.contains("notes.md"), "stdout: {}", stdout);
    assert!(stderr.contains("broken.docx"), "stderr: {}", stderr);
}

#[test]
fn load_saves_snapshot_when_asked() {
    let tmp = TempDir::new().unwrap();
    let papers = tmp.path().join("papers");
    fs::create_dir(&papers).unwrap();
    fs::write(papers.join("a.txt"), "alpha").unwrap();
    let snapshot = tmp.path().join("snap.json");

    let output = run(
        &tmp,
        &[
            "load",
            papers.to_str().unwrap(),
            "--save",
            snapshot.to_str().unwrap(),
        ],
        &[("MODEL_NAMES", "GPT41 (documents)")],
    );
    assert!(output.status.success());
    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&snapshot).unwrap()).unwrap();
    assert_eq!(json["selected_model"], "GPT41 (documents)");
    assert_eq!(json["loaded_documents"][0]["filename"], "a.txt");
}

#[test]
fn models_reports_missing_settings() {
    let tmp = TempDir::new().unwrap();
    let output = run(
        &tmp,
        &["models"],
        &[
            ("MODEL_NAMES", "ZZTEST (documents)"),
            ("ZZTEST_AZURE_OPENAI_KEY", "k"),
        ],
    );
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ZZTEST (documents)"));
    assert!(stdout.contains("ZZTEST_AZURE_OPENAI_ENDPOINT"));
    assert!(!stdout.contains("ZZTEST_AZURE_OPENAI_KEY,"));
}

#[test]
fn ask_without_models_fails() {
    let tmp = TempDir::new().unwrap();
    let output = run(
        &tmp,
        &["ask", "what?", "--folder", tmp.path().to_str().unwrap()],
        &[],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("No models configured"));
}

#[test]
fn count_prints_token_total() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.txt"), "some words to count").unwrap();

    let output = run(
        &tmp,
        &["count", "--folder", tmp.path().to_str().unwrap()],
        &[],
    );
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Documents: 1"), "stdout: {}", stdout);
    assert!(stdout.contains("Input tokens:"));
}

#[test]
fn completions_need_no_config() {
    let tmp = TempDir::new().unwrap();
    let output = run(&tmp, &["completions", "bash"], &[]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("analyst"));
}
