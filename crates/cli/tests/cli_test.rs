//! Basic CLI integration tests.

#![allow(deprecated)] // Command::cargo_bin deprecated for custom build-dir; still works for default

use assert_cmd::Command;
use pretty_assertions::assert_eq;

const BOOK: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<FictionBook xmlns="http://www.gribuser.ru/xml/fictionbook/2.0" xmlns:l="http://www.w3.org/1999/xlink">
<description><title-info><book-title>Tiny</book-title><lang>en</lang></title-info></description>
<body><section><title><p>Chapter</p></title><p>Hello.</p></section></body>
</FictionBook>"#;

fn cli(config_home: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("fb2-converter").unwrap();
    cmd.env("XDG_CONFIG_HOME", config_home).env("HOME", config_home);
    cmd
}

#[test]
fn help_prints_and_exits_success() {
    Command::cargo_bin("fb2-converter")
        .unwrap()
        .arg("--help")
        .assert()
        .success();
}

#[test]
fn config_show_runs() {
    let home = tempfile::tempdir().unwrap();
    cli(home.path()).args(["config", "show"]).assert().success();
}

#[test]
fn config_show_json_valid() {
    let home = tempfile::tempdir().unwrap();
    let out = cli(home.path()).args(["config", "show", "--json"]).assert().success();
    let stdout = std::str::from_utf8(&out.get_output().stdout).unwrap();
    let value: serde_json::Value = serde_json::from_str(stdout).expect("config show --json should output valid JSON");
    assert_eq!(value["notes"]["mode"], "default");
}

#[test]
fn config_set_then_show() {
    let home = tempfile::tempdir().unwrap();
    let file = home.path().join("custom.toml");
    let file_arg = file.to_str().unwrap();
    cli(home.path())
        .args(["config", "set", "toc.placement", "after", "--config", file_arg])
        .assert()
        .success();
    let out = cli(home.path())
        .args(["config", "show", "--json", "--config", file_arg])
        .assert()
        .success();
    let value: serde_json::Value = serde_json::from_slice(&out.get_output().stdout).unwrap();
    assert_eq!(value["toc"]["placement"], "after");
}

#[test]
fn config_set_unknown_key_fails() {
    let home = tempfile::tempdir().unwrap();
    let file = home.path().join("custom.toml");
    cli(home.path())
        .args(["config", "set", "no.such", "1", "--config", file.to_str().unwrap()])
        .assert()
        .failure();
}

#[test]
fn convert_nonexistent_file_reports_missing() {
    let home = tempfile::tempdir().unwrap();
    let out = cli(home.path())
        .args(["convert", "/nonexistent/file.fb2", "-o", home.path().to_str().unwrap()])
        .assert()
        .failure();
    let stderr = std::str::from_utf8(&out.get_output().stderr).unwrap();
    assert!(stderr.contains("Input file not found"));
}

#[test]
fn unknown_format_fails() {
    let home = tempfile::tempdir().unwrap();
    let input = home.path().join("tiny.fb2");
    std::fs::write(&input, BOOK).unwrap();
    cli(home.path())
        .args(["convert", input.to_str().unwrap(), "-f", "pdf"])
        .assert()
        .failure();
}

#[test]
fn convert_to_epub() {
    let home = tempfile::tempdir().unwrap();
    let input = home.path().join("tiny.fb2");
    std::fs::write(&input, BOOK).unwrap();
    let out_dir = home.path().join("out");

    let out = cli(home.path())
        .args(["convert", input.to_str().unwrap(), "-o", out_dir.to_str().unwrap(), "--json"])
        .assert()
        .success();
    let value: serde_json::Value = serde_json::from_slice(&out.get_output().stdout).unwrap();
    assert_eq!(value[0]["workdir"], serde_json::Value::Null);

    let epub = out_dir.join("tiny.epub");
    assert!(epub.is_file());
    let bytes = std::fs::read(&epub).unwrap();
    assert_eq!(&bytes[..2], b"PK");
}

#[test]
fn mobi_without_kindlegen_fails() {
    let home = tempfile::tempdir().unwrap();
    let input = home.path().join("tiny.fb2");
    std::fs::write(&input, BOOK).unwrap();
    cli(home.path())
        .env_remove("KINDLEGEN")
        .args(["convert", input.to_str().unwrap(), "-f", "mobi"])
        .assert()
        .failure();
}
