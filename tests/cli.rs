//! End-to-end tests that run the `regassist` binary.

mod common;

use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn regassist_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("regassist");
    path
}

fn run(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = regassist_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env_remove("KB_ID")
        .env_remove("APP_PASSWORD")
        .env_remove("S3_BUCKET")
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run regassist binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn metadata_command_writes_sidecars() {
    let tmp = TempDir::new().unwrap();
    let data = tmp.path().join("data");
    common::write_pdf(&data, "Title 10/Revenue/a.pdf", common::LONG_TEXT);
    common::write_pdf(&data, "Title 13/b.pdf", common::SHORT_TEXT);
    let config = tmp.path().join("regassist.toml");
    std::fs::write(
        &config,
        format!("[metadata]\nroot = {:?}\n", data.to_string_lossy()),
    )
    .unwrap();

    let (stdout, stderr, ok) = run(&config, &["metadata"]);
    assert!(ok, "stderr: {}", stderr);
    assert!(stdout.contains("Processed 2 documents"), "{}", stdout);
    assert!(stdout.contains("Found 1 potentially scanned"), "{}", stdout);
    assert!(data.join("Title 10/Revenue/a.pdf.metadata.json").exists());
    assert!(data.join("Title 13/b.pdf.metadata.json").exists());
}

#[test]
fn metadata_root_flag_overrides_config() {
    let tmp = TempDir::new().unwrap();
    let other = tmp.path().join("elsewhere");
    common::write_pdf(&other, "x.pdf", common::LONG_TEXT);

    let (stdout, _, ok) = run(
        &tmp.path().join("missing.toml"),
        &["metadata", "--root", other.to_str().unwrap()],
    );
    assert!(ok);
    assert!(stdout.contains("Processed 1 documents"));
}

#[test]
fn metadata_missing_root_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, ok) = run(
        &tmp.path().join("missing.toml"),
        &["metadata", "--root", tmp.path().join("nope").to_str().unwrap()],
    );
    assert!(!ok);
    assert!(stderr.contains("data directory not found"), "{}", stderr);
}

#[test]
fn config_command_shows_defaults_and_redacts_password() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("regassist.toml");
    std::fs::write(
        &config,
        "[server]\npassword = \"hunter2\"\n\n[citations]\nstyle = \"annotated\"\n",
    )
    .unwrap();

    let (stdout, _, ok) = run(&config, &["config"]);
    assert!(ok);
    assert!(stdout.contains("ENBRB90GYL"));
    assert!(stdout.contains("annotated"));
    assert!(stdout.contains("<set>"));
    assert!(!stdout.contains("hunter2"));
}

#[test]
fn invalid_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("regassist.toml");
    std::fs::write(&config, "[knowledge_base]\nid = \"\"\n").unwrap();

    let (_, stderr, ok) = run(&config, &["config"]);
    assert!(!ok);
    assert!(stderr.contains("knowledge_base.id"), "{}", stderr);
}
