//! Schema checks on the --json output stream: every line must parse and the
//! per-iteration records must carry the full register set.

use assert_cmd::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[driver]
settle_ms = 0
max_iterations = 60
stable_band = 0.05
stable_iters = 3

[timeouts]
metering_ms = 100
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

#[test]
fn converge_json_stream_is_wellformed() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("autoexp_cli").unwrap();
    cmd.arg("--config").arg(&cfg).arg("--json").arg("converge");

    let output = cmd.assert().success().get_output().stdout.clone();
    let text = String::from_utf8(output).expect("utf-8 stdout");
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    assert!(!lines.is_empty(), "expected JSON lines on stdout");

    let records: Vec<Value> = lines
        .iter()
        .map(|l| serde_json::from_str(l).unwrap_or_else(|e| panic!("bad JSON line {l:?}: {e}")))
        .collect();

    // Every iteration record carries the full register set.
    let mut last_iteration = 0u64;
    for rec in records.iter().filter(|r| r["event"] == "iteration") {
        for key in [
            "iteration",
            "error",
            "scene_brightness",
            "shutter",
            "analog_gain",
            "red_gain",
            "green_gain",
            "blue_gain",
        ] {
            assert!(rec.get(key).is_some(), "iteration record missing {key}: {rec}");
        }
        let iteration = rec["iteration"].as_u64().expect("iteration is integer");
        assert!(iteration > last_iteration, "iterations must increase");
        last_iteration = iteration;

        let shutter = rec["shutter"].as_u64().expect("shutter is integer");
        assert!((4..=16383).contains(&shutter));
        let gain = rec["analog_gain"].as_u64().expect("analog gain is integer");
        assert!((1..=248).contains(&gain));
    }

    // The stream terminates with a settled record matching the last
    // iteration.
    let last = records.last().expect("at least one record");
    assert_eq!(last["event"], "settled", "final record: {last}");
    assert_eq!(last["iterations"].as_u64(), Some(last_iteration));
    assert!(last["error"].as_f64().is_some());
}

#[test]
fn self_check_json_has_sample() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("autoexp_cli").unwrap();
    cmd.arg("--config")
        .arg(&cfg)
        .arg("--json")
        .arg("self-check");

    let output = cmd.assert().success().get_output().stdout.clone();
    let text = String::from_utf8(output).expect("utf-8 stdout");
    let rec: Value = serde_json::from_str(text.trim()).expect("one JSON record");
    assert_eq!(rec["event"], "self_check");
    assert_eq!(rec["ok"], true);
    assert_eq!(rec["sample"].as_array().map(Vec::len), Some(6));
}
