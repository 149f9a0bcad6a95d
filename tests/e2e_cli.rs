//! CLI end-to-end tests
//!
//! Tests for the tracklift command-line interface.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::{tempdir, TempDir};
use tracklift_media::fixture::{write_mp4, write_mp4_file, FixtureTrack};

/// Get a command for the tracklift binary
#[allow(deprecated)]
fn tracklift_cmd() -> Command {
    Command::cargo_bin("tracklift").unwrap()
}

/// Write a two-track movie (60 video, 100 audio samples) into a temp dir.
fn movie() -> (TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("movie.mp4");
    write_mp4_file(
        &path,
        &[FixtureTrack::video(1, 60), FixtureTrack::audio(2, 100)],
    )
    .unwrap();
    (dir, path)
}

fn run_json(args: &[&str], file: &Path) -> serde_json::Value {
    let output = tracklift_cmd()
        .args(args)
        .arg(file)
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_cli_no_args_shows_help() {
    tracklift_cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_version_command() {
    tracklift_cmd()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("tracklift"));
}

#[test]
fn test_cli_import_help() {
    tracklift_cmd()
        .args(["import", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--cancel-after"));
}

#[test]
fn test_cli_probe_lists_tracks() {
    let (_dir, path) = movie();
    tracklift_cmd()
        .arg("probe")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Tracks: 2"))
        .stdout(predicate::str::contains("video avc1 60 samples"))
        .stdout(predicate::str::contains("audio mp4a 100 samples"));
}

#[test]
fn test_cli_probe_json() {
    let (_dir, path) = movie();
    let json = run_json(&["probe"], &path);
    assert_eq!(json["tracks"].as_array().unwrap().len(), 2);
    assert_eq!(json["tracks"][0]["kind"], "video");
    assert_eq!(json["faststart"], true);
}

#[test]
fn test_cli_probe_missing_file() {
    tracklift_cmd()
        .args(["probe", "/definitely/not/here.mp4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_cli_import_completes() {
    let (_dir, path) = movie();
    tracklift_cmd()
        .arg("import")
        .arg(&path)
        .args(["--capacity", "4"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Samples: 160"))
        .stdout(predicate::str::contains("Status: completed"))
        .stdout(predicate::str::contains("Progress: 100.0%"));
}

#[test]
fn test_cli_import_selected_track_json() {
    let (_dir, path) = movie();
    let json = run_json(&["import", "--track", "2"], &path);

    let tracks = json["tracks"].as_array().unwrap();
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0]["samples"], 100);
    assert_eq!(tracks[0]["first_dts"], 0);
    assert_eq!(tracks[0]["last_dts"], 99 * 1024);
    assert_eq!(json["status"]["status"], "completed");
    assert_eq!(json["progress"], 1.0);
}

#[test]
fn test_cli_import_cancel_after() {
    let (_dir, path) = movie();
    tracklift_cmd()
        .arg("import")
        .arg(&path)
        .args(["--capacity", "2", "--cancel-after", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Status: cancelled"));
}

#[test]
fn test_cli_import_unknown_track() {
    let (_dir, path) = movie();
    tracklift_cmd()
        .arg("import")
        .arg(&path)
        .args(["--track", "9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown track: 9"));
}

#[test]
fn test_cli_import_truncated_file_fails() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.mp4");
    let mut bytes = write_mp4(&[FixtureTrack::audio(1, 20)]);
    bytes.truncate(bytes.len() - 30);
    fs::write(&path, bytes).unwrap();

    tracklift_cmd()
        .arg("import")
        .arg(&path)
        .assert()
        .failure()
        .stdout(predicate::str::contains("Status: failed"))
        .stderr(predicate::str::contains("Import failed"));
}

#[test]
fn test_cli_import_rejects_zero_capacity() {
    let (_dir, path) = movie();
    tracklift_cmd()
        .arg("import")
        .arg(&path)
        .args(["--capacity", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("queue_capacity"));
}

#[test]
fn test_cli_validate_config() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tracklift.toml");
    fs::write(&path, "[import]\nqueue_capacity = 16\n").unwrap();

    tracklift_cmd()
        .arg("validate")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("Queue capacity: 16"));
}

#[test]
fn test_cli_validate_invalid_config() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tracklift.toml");
    fs::write(&path, "[import]\nprogress_event_step = 0.0\n").unwrap();

    tracklift_cmd()
        .arg("validate")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("progress_event_step"));
}
