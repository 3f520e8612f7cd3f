//! CLI tests for the `senddat check-specs` subcommand.

use std::fs;
use std::process::Command;

use assert_cmd::cargo;

fn senddat_cmd() -> Command {
    Command::new(cargo::cargo_bin!("senddat"))
}

fn write_temp_table(name: &str, content: &str) -> (tempfile::TempDir, String) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(name);
    fs::write(&path, content).expect("write temp table");
    (dir, path.to_string_lossy().to_string())
}

fn generic_table() -> String {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../core/data/generic.csv");
    path.to_string_lossy().to_string()
}

#[test]
fn check_specs_reports_counts() {
    let (_dir, path) = write_temp_table(
        "specs.csv",
        "prefix,name,arg_names,payload_formula\n\"ESC \"\"@\"\"\",Initialize,,\nESC 0x2A,Bit image,m nL nH,nL + 256 * nH\n",
    );
    let output = senddat_cmd()
        .args(["check-specs", &path, "--output", "json"])
        .output()
        .expect("run check-specs");

    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(json["ok"], true);
    assert_eq!(json["commands"], 2);
    assert_eq!(json["subcommands"], 0);
    // root, ESC, ESC @, ESC *
    assert_eq!(json["nodes"], 4);
}

#[test]
fn check_specs_generic_table_with_subcommands() {
    let subs = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../core/data/generic_subcommands.csv");
    let output = senddat_cmd()
        .args([
            "check-specs",
            &generic_table(),
            "--subcommands",
            &subs.to_string_lossy(),
            "--output",
            "pretty",
        ])
        .output()
        .expect("run check-specs");

    assert!(
        output.status.success(),
        "stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("13 subcommands"), "stdout={stdout}");
}

#[test]
fn check_specs_list_shows_prefixes() {
    let (_dir, path) = write_temp_table(
        "specs.csv",
        "prefix,name,arg_names,payload_formula\n1B 40,Initialize,,\n1D 56,Cut,m,\n",
    );
    let output = senddat_cmd()
        .args([
            "check-specs",
            &path,
            "--prefix-format",
            "hex",
            "--list",
            "--output",
            "pretty",
        ])
        .output()
        .expect("run check-specs");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Initialize"), "stdout={stdout}");
    assert!(stdout.contains("Cut"), "stdout={stdout}");
    assert!(stdout.contains("2 commands"), "stdout={stdout}");
}

#[test]
fn check_specs_rejects_ambiguous_prefixes() {
    let (_dir, path) = write_temp_table(
        "specs.csv",
        "prefix,name,arg_names,payload_formula\n1B 40,Initialize,,\n1B 40 00,Shadow,,\n",
    );
    let output = senddat_cmd()
        .args(["check-specs", &path, "--prefix-format", "hex", "--output", "json"])
        .output()
        .expect("run check-specs");

    assert_eq!(output.status.code(), Some(1));
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(json["ok"], false);
    let error = json["error"].as_str().expect("error message");
    assert!(error.contains("Shadow"), "error={error}");
}

#[test]
fn check_specs_reports_bad_rows() {
    let (_dir, path) = write_temp_table(
        "specs.csv",
        "prefix,name,arg_names,payload_formula\n1B 40,Initialize,,\n1B 2A,Bit image,m,m + k\n",
    );
    let output = senddat_cmd()
        .args(["check-specs", &path, "--prefix-format", "hex", "--output", "pretty"])
        .output()
        .expect("run check-specs");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("line 3"), "stderr={stderr}");
}
