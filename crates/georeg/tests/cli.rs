mod common;

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use common::{crop, textured_image, write_geotiff};
use predicates::prelude::*;
use serde_json::Value;

const REFERENCE_GT: [f64; 6] = [500000.0, 2.0, 0.0, 4000000.0, 0.0, -2.0];

/// Writes `target.tif` (no georeferencing) and `ref.tif` (georeferenced) plus a
/// config that keeps ORB on a single pyramid level.
fn scene(dir: &Path) {
    let big = textured_image(300, 300, 21);
    write_geotiff(&dir.join("ref.tif"), &crop(&big, 0, 0, 280, 280), Some(REFERENCE_GT));
    write_geotiff(&dir.join("target.tif"), &crop(&big, 12, 7, 280, 280), None);
    fs::write(
        dir.join("cfg.json"),
        r#"{"detectors": {"orb": {"pyramid_levels": 1}}}"#,
    )
    .unwrap();
}

fn georeg(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("georeg").unwrap();
    cmd.current_dir(dir);
    cmd
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn help_lists_the_options() {
    Command::cargo_bin("georeg")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--algorithm").and(predicate::str::contains("--aoi")));
}

#[test]
fn unknown_algorithm_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    georeg(dir.path())
        .args(["a.tif", "b.tif", "--algorithm", "surf"])
        .assert()
        .code(1);
}

#[test]
fn missing_input_exits_with_failure() {
    let dir = tempfile::tempdir().unwrap();
    georeg(dir.path())
        .args(["nope.tif", "also-nope.tif", "-q"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("georeg:").and(predicate::str::contains("nope.tif")));
}

#[test]
fn dry_run_writes_gcps_and_report() {
    let dir = tempfile::tempdir().unwrap();
    scene(dir.path());

    georeg(dir.path())
        .args([
            "target.tif",
            "ref.tif",
            "--config",
            "cfg.json",
            "--dry-run",
            "--gcps",
            "gcps.geojson",
            "--report",
            "report.json",
        ])
        .assert()
        .success();

    let report = read_json(&dir.path().join("report.json"));
    assert_eq!(report["outcome"], "registered");
    assert_eq!(report["algorithm"], "orb");
    assert_eq!(report["dry_run"], true);
    assert_eq!(report["gcps"].as_array().map(Vec::len), Some(10));
    assert!(report["output_path"]
        .as_str()
        .is_some_and(|p| p.ends_with("target_orb_registered.tif")));

    let gcps = read_json(&dir.path().join("gcps.geojson"));
    assert_eq!(gcps["type"], "FeatureCollection");
    assert_eq!(gcps["features"].as_array().map(Vec::len), Some(10));
    assert!(!dir.path().join("target_orb_registered.tif").exists());
}

#[test]
fn aoi_excluding_everything_is_not_a_failure() {
    let dir = tempfile::tempdir().unwrap();
    scene(dir.path());
    fs::write(
        dir.path().join("aoi.geojson"),
        r#"{"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}"#,
    )
    .unwrap();

    georeg(dir.path())
        .args([
            "target.tif",
            "ref.tif",
            "--config",
            "cfg.json",
            "--aoi",
            "aoi.geojson",
            "--report",
            "report.json",
            "--translate-program",
            "/nonexistent/gdal_translate",
        ])
        .assert()
        .success();

    let report = read_json(&dir.path().join("report.json"));
    assert_eq!(report["outcome"], "aborted");
    assert_eq!(report["accepted"], 0);
}

#[test]
fn bad_geotransform_override_fails_and_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    scene(dir.path());

    georeg(dir.path())
        .args([
            "target.tif",
            "ref.tif",
            "--geotransform",
            "500000, 1, 0, 4000000, 0",
            "--report",
            "report.json",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("geotransform"));

    let report = read_json(&dir.path().join("report.json"));
    assert_eq!(report["outcome"], "failed");
    assert!(report["error"].as_str().is_some_and(|e| e.contains("6")));
}

#[test]
fn failing_translate_program_exits_with_failure() {
    let dir = tempfile::tempdir().unwrap();
    scene(dir.path());

    georeg(dir.path())
        .args([
            "target.tif",
            "ref.tif",
            "--config",
            "cfg.json",
            "--translate-program",
            "/nonexistent/gdal_translate",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("gdal_translate"));
}
