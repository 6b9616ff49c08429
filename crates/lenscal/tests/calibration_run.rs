mod common;

use std::fs;

use lenscal::{
    open_source, run_calibration, suffixed_path, CalibrationRecord, CalibrationSettings,
    Calibrator, HeadlessSink, RunOptions, ANNOTATED_SUFFIX, UNDISTORTED_SUFFIX,
};
use tempfile::tempdir;

use common::{calibration_settings, write_blank_views, write_views, BOARD, HEIGHT, TILTS, WIDTH};

fn settings_for(dir: &std::path::Path, list: &std::path::Path, frames: usize) -> CalibrationSettings {
    let cfg = dir.join("settings.json");
    let body = calibration_settings(list, &dir.join("camera.json"), frames);
    fs::write(&cfg, body.to_string()).expect("write settings");
    CalibrationSettings::load_json(&cfg).expect("valid settings")
}

#[test]
fn synthetic_captures_calibrate_and_persist() {
    let dir = tempdir().expect("tempdir");
    let list = write_views(dir.path(), &TILTS);
    let settings = settings_for(dir.path(), &list, 25);
    // Clamped to the list length.
    assert_eq!(settings.frame_target, TILTS.len());

    let mut source = open_source(&settings.input).expect("source");
    let mut sink = HeadlessSink::default();
    let summary = run_calibration(
        &settings,
        &RunOptions::default(),
        &Calibrator::new(),
        source.as_mut(),
        &mut sink,
    );

    assert_eq!(summary.frames, TILTS.len());
    assert_eq!(sink.frames_shown, TILTS.len());
    assert!(summary.accepted >= 4, "accepted {}", summary.accepted);
    assert_eq!(summary.estimations, 1);
    let result = summary.result.as_ref().expect("calibrated");
    assert!(result.rms < 0.5, "rms {}", result.rms);
    assert_eq!(result.per_view_errors.len(), summary.accepted);

    let record = CalibrationRecord::load(&dir.path().join("camera.json")).expect("record");
    assert_eq!(record.nr_of_frames, summary.accepted);
    assert_eq!((record.image_width, record.image_height), (WIDTH as usize, HEIGHT as usize));
    assert_eq!(record.board_width, BOARD.width);
    assert!(!record.fisheye_model);
    assert_eq!(
        record.grid_points.as_ref().map(Vec::len),
        Some(BOARD.point_count())
    );
    assert_eq!(
        record.image_points.as_ref().map(Vec::len),
        Some(summary.accepted)
    );
    assert!(record.camera_model().is_ok());

    let entries = lenscal::read_image_list(&list).expect("list");
    let annotated = entries
        .iter()
        .filter(|p| suffixed_path(p, ANNOTATED_SUFFIX).exists())
        .count();
    assert_eq!(annotated, summary.accepted);
    for entry in &entries {
        assert!(suffixed_path(entry, UNDISTORTED_SUFFIX).exists());
    }
}

#[test]
fn estimation_runs_once_at_the_target_count() {
    let dir = tempdir().expect("tempdir");
    let list = write_views(dir.path(), &TILTS);
    let settings = settings_for(dir.path(), &list, 3);

    let mut source = open_source(&settings.input).expect("source");
    let summary = run_calibration(
        &settings,
        &RunOptions::default(),
        &Calibrator::new(),
        source.as_mut(),
        &mut HeadlessSink::default(),
    );

    assert_eq!(summary.estimations, 1);
    assert!(summary.calibrated());
    // Frames after calibration are annotated but not accumulated.
    assert_eq!(summary.accepted, 3);
    let record = summary.record.as_ref().expect("record");
    assert_eq!(record.nr_of_frames, 3);
}

#[test]
fn grid_width_override_refines_the_board() {
    let dir = tempdir().expect("tempdir");
    let list = write_views(dir.path(), &TILTS);
    let settings = settings_for(dir.path(), &list, 25);

    let mut source = open_source(&settings.input).expect("source");
    let options = RunOptions {
        grid_width: Some(6.0),
        ..RunOptions::default()
    };
    let summary = run_calibration(
        &settings,
        &options,
        &Calibrator::new(),
        source.as_mut(),
        &mut HeadlessSink::default(),
    );

    let result = summary.result.expect("calibrated");
    assert!(result.released);
    assert_eq!(result.object_points[BOARD.width - 1].x, 6.0);
    assert!(result.rms < 0.5, "rms {}", result.rms);
}

#[test]
fn captures_without_a_board_never_estimate() {
    let dir = tempdir().expect("tempdir");
    let list = write_blank_views(dir.path(), 3);
    let settings = settings_for(dir.path(), &list, 2);

    let mut source = open_source(&settings.input).expect("source");
    let summary = run_calibration(
        &settings,
        &RunOptions::default(),
        &Calibrator::new(),
        source.as_mut(),
        &mut HeadlessSink::default(),
    );

    assert_eq!(summary.frames, 3);
    assert_eq!(summary.accepted, 0);
    assert_eq!(summary.estimations, 0);
    assert!(!summary.calibrated());
    assert!(!dir.path().join("camera.json").exists());
}
