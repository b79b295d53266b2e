#![cfg(feature = "cli")]

use assert_cmd::Command;
use fieldtrack::replay::{Session, SessionFrame};
use fieldtrack::tags::TagDetection;
use fieldtrack::FieldTrackConfig;
use nalgebra::Point2;
use predicates::prelude::*;

fn tag(id: u32, cx: f32, cy: f32) -> TagDetection {
    TagDetection {
        id,
        center: Point2::new(cx, cy),
        corners: [
            Point2::new(cx - 4.0, cy - 4.0),
            Point2::new(cx + 4.0, cy - 4.0),
            Point2::new(cx + 4.0, cy + 4.0),
            Point2::new(cx - 4.0, cy + 4.0),
        ],
    }
}

#[test]
fn default_config_prints_valid_json() {
    let out = Command::cargo_bin("fieldtrack")
        .expect("binary")
        .arg("default-config")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let cfg: FieldTrackConfig = serde_json::from_slice(&out).expect("config json");
    assert_eq!(cfg, FieldTrackConfig::default());
}

#[test]
fn check_config_rejects_duplicate_ids() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("bad.json");
    std::fs::write(&path, r#"{"tags":{"agent":1}}"#).expect("write");

    Command::cargo_bin("fieldtrack")
        .expect("binary")
        .args(["check-config", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("assigned to more than one role"));
}

/// One frame with the ball in the lower half of the plane, then one missing
/// frame; returns the session path.
fn write_session(dir: &std::path::Path) -> std::path::PathBuf {
    let (w, h) = (160u32, 120u32);

    let mut img = image::RgbImage::from_pixel(w, h, image::Rgb([40, 110, 50]));
    for y in 0..h {
        for x in 0..w {
            let (dx, dy) = (x as f32 - 80.0, y as f32 - 80.0);
            if dx * dx + dy * dy <= 64.0 {
                img.put_pixel(x, y, image::Rgb([255, 120, 0]));
            }
        }
    }
    img.save(dir.join("f0.png")).expect("png");

    let corners = vec![
        tag(0, 5.0, 5.0),
        tag(1, 155.0, 5.0),
        tag(2, 155.0, 115.0),
        tag(3, 5.0, 115.0),
    ];
    let session = Session {
        frames: vec![
            SessionFrame {
                image: "f0.png".into(),
                tags: corners.clone(),
            },
            SessionFrame {
                image: "lost.png".into(),
                tags: corners,
            },
        ],
        base_dir: Default::default(),
    };
    let session_path = dir.join("session.json");
    session.write_json(&session_path).expect("session");
    session_path
}

#[test]
fn run_replays_session_and_goes_offline() {
    let dir = tempfile::tempdir().expect("tempdir");
    let session_path = write_session(dir.path());

    Command::cargo_bin("fieldtrack")
        .expect("binary")
        .args(["run", "--frame-interval-ms", "100", "--session"])
        .arg(&session_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("ball/goal_status\t"))
        .stdout(predicate::str::contains("\"status\":\"GOAL\""))
        .stdout(predicate::str::contains("\"kind\":\"offline\""))
        .stderr(predicate::str::contains("\"frames_processed\": 1"));
}

#[test]
fn log_level_flag_sets_verbosity() {
    let dir = tempfile::tempdir().expect("tempdir");
    let session_path = write_session(dir.path());

    let run = |level: &str| {
        let out = Command::cargo_bin("fieldtrack")
            .expect("binary")
            .env_remove("FIELDTRACK_LOG")
            .env_remove("RUST_LOG")
            .args(["--log-level", level, "run", "--frame-interval-ms", "100", "--session"])
            .arg(&session_path)
            .assert()
            .success()
            .get_output()
            .stderr
            .clone();
        String::from_utf8_lossy(&out).into_owned()
    };

    assert!(run("info").contains("run finished"));
    let quiet = run("error");
    assert!(!quiet.contains("run finished"), "{quiet}");
    assert!(quiet.contains("\"frames_processed\": 1"));
}
