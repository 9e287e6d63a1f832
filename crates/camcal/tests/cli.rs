mod common;

use assert_cmd::Command;
use camcal::CalibrationRecord;
use predicates::prelude::*;

fn camcal() -> Command {
    Command::new(env!("CARGO_BIN_EXE_camcal"))
}

#[test]
fn calibrate_writes_record() {
    let dir = tempfile::tempdir().expect("tempdir");
    let images = common::write_views(dir.path(), 10);
    let out = dir.path().join("result.json");

    camcal()
        .args(["calibrate", "--cols", "9", "--rows", "6", "--output"])
        .arg(&out)
        .args(&images)
        .assert()
        .success()
        .stdout(predicate::str::contains("reprojection_error"));

    let record = CalibrationRecord::load_json(&out).expect("record");
    assert_eq!(record.image_size, [common::WIDTH, common::HEIGHT]);
    assert_eq!(record.dist_coeffs.len(), 5);
    assert!(record.reprojection_error >= 0.0);
}

#[test]
fn calibrate_with_too_few_images_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let images = common::write_views(dir.path(), 3);
    let out = dir.path().join("result.json");

    camcal()
        .args(["calibrate", "--output"])
        .arg(&out)
        .args(&images)
        .assert()
        .failure()
        .stderr(predicate::str::contains("error: need at least 9 views to calibrate, have 3"));
    assert!(!out.exists());
}

#[test]
fn calibrate_reports_unreadable_image() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bogus = dir.path().join("bogus.png");
    std::fs::write(&bogus, b"not a png").expect("write");

    camcal()
        .arg("calibrate")
        .arg(&bogus)
        .assert()
        .failure()
        .stderr(predicate::str::contains("bogus.png"));
}

#[test]
fn detect_prints_corners_and_overlay() {
    let dir = tempfile::tempdir().expect("tempdir");
    let images = common::write_views(dir.path(), 1);
    let overlay = dir.path().join("overlay.png");

    let assert = camcal()
        .args(["detect", "--cols", "9", "--rows", "6", "--overlay"])
        .arg(&overlay)
        .arg(&images[0])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8");
    let report: serde_json::Value = serde_json::from_str(&stdout).expect("json");
    assert_eq!(report["corners"].as_array().map(Vec::len), Some(54));
    assert_eq!(report["image_size"], serde_json::json!([640, 480]));

    let drawn = image::open(&overlay).expect("overlay");
    assert_eq!((drawn.width(), drawn.height()), (common::WIDTH, common::HEIGHT));
}

#[test]
fn detect_wrong_pattern_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let images = common::write_views(dir.path(), 1);

    camcal()
        .args(["detect", "--cols", "8", "--rows", "6"])
        .arg(&images[0])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no 8x6 checkerboard found"));
}

#[test]
fn invalid_pattern_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let images = common::write_views(dir.path(), 1);

    camcal()
        .args(["detect", "--cols", "1", "--rows", "6"])
        .arg(&images[0])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error: pattern cols = 1"));
}
