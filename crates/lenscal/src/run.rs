//! The calibration run loop.
//!
//! Pulls frames from a [`FrameSource`], detects the configured pattern,
//! feeds accepted observations to the [`CaptureStateMachine`] and runs the
//! [`Calibrator`] whenever the machine asks for it. Presentation goes
//! through a [`PreviewSink`].

use std::path::Path;
use std::time::Instant;

use image::RgbImage;
use lenscal_core::{ImageSize, UndistortionMap};
use lenscal_detect::{detector_for, CornerRefiner, SubPixParams, SubPixRefiner};
use lenscal_optim::CameraEstimator;
use log::{debug, info, warn};
use nalgebra::Point2;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::calibrator::{CalibrationRequest, CalibrationResult, Calibrator};
use crate::capture::{CaptureState, CaptureStateMachine};
use crate::convert::{image_size, pixel_view, rgb_from_buffer, to_gray};
use crate::error::{CalibrationError, OutputError};
use crate::persist::{CalibrationRecord, ResultPersister};
use crate::preview::{draw_points, invert, Key, PreviewSink};
use crate::settings::{CalibrationSettings, InputSpec};
use crate::source::{suffixed_path, FrameSource};

/// Suffix of annotated detection views.
pub const ANNOTATED_SUFFIX: &str = "-b";
/// Suffix of the undistorted copies written after a list run.
pub const UNDISTORTED_SUFFIX: &str = "-c";

/// Command-line overrides.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Measured grid width; also enables target release.
    pub grid_width: Option<f32>,
    pub subpix_half_window: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            grid_width: None,
            subpix_half_window: SubPixParams::default().half_window,
        }
    }
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub frames: usize,
    pub accepted: usize,
    pub estimations: usize,
    pub result: Option<CalibrationResult>,
    pub record: Option<CalibrationRecord>,
    pub stopped_by_operator: bool,
}

impl RunSummary {
    pub fn calibrated(&self) -> bool {
        self.result.is_some()
    }
}

struct Session<'a, E> {
    settings: &'a CalibrationSettings,
    options: &'a RunOptions,
    calibrator: &'a Calibrator<E>,
    persister: ResultPersister,
    capture: CaptureStateMachine,
    image_size: Option<ImageSize>,
    summary: RunSummary,
}

impl<E: CameraEstimator> Session<'_, E> {
    fn estimate(&mut self) {
        let Some(image_size) = self.image_size else {
            return;
        };
        self.summary.estimations += 1;
        let settings = self.settings;
        let request = CalibrationRequest {
            image_points: self.capture.observations(),
            image_size,
            pattern: settings.pattern,
            board: settings.board,
            square_size: settings.square_size,
            variant: settings.variant,
            grid_width: self.options.grid_width,
        };
        match self.calibrator.calibrate(&request) {
            Ok(result) => {
                if result.released {
                    print_board_corners(&result, settings);
                }
                println!(
                    "Re-projection error reported by the optimizer: {}",
                    result.optimizer_rms
                );
                println!(
                    "Calibration succeeded. avg re projection error = {}",
                    result.rms
                );
                match self
                    .persister
                    .persist(&result, image_size, self.capture.observations())
                {
                    Ok(record) => self.summary.record = Some(record),
                    Err(e) => warn!("{e}"),
                }
                self.capture.record_estimation(true);
                self.summary.result = Some(result);
            }
            Err(CalibrationError::OutOfRange {
                optimizer_rms,
                avg_error,
            }) => {
                println!("Re-projection error reported by the optimizer: {optimizer_rms}");
                println!("Calibration failed. avg re projection error = {avg_error}");
                self.capture.record_estimation(false);
            }
            Err(e) => {
                println!("Calibration failed: {e}");
                self.capture.record_estimation(false);
            }
        }
    }
}

fn print_board_corners(result: &CalibrationResult, settings: &CalibrationSettings) {
    let w = settings.board.width;
    let h = settings.board.height;
    let pts = &result.object_points;
    println!("New board corners: ");
    for idx in [0, w.saturating_sub(1), w * h.saturating_sub(1), pts.len().saturating_sub(1)] {
        if let Some(p) = pts.get(idx) {
            println!("[{}, {}, {}]", p.x, p.y, p.z);
        }
    }
}

fn write_view(img: &RgbImage, path: &Path) -> Result<(), OutputError> {
    img.save(path).map_err(|source| OutputError::Image {
        path: path.to_path_buf(),
        source,
    })
}

/// Run calibration over `source` until it is exhausted or the operator
/// stops. Configuration problems never reach this point; everything here
/// is logged and the run continues where it can.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(target = settings.frame_target))
)]
pub fn run_calibration<E: CameraEstimator>(
    settings: &CalibrationSettings,
    options: &RunOptions,
    calibrator: &Calibrator<E>,
    source: &mut dyn FrameSource,
    sink: &mut dyn PreviewSink,
) -> RunSummary {
    let live = source.is_live();
    let mut session = Session {
        settings,
        options,
        calibrator,
        persister: ResultPersister::new(settings),
        capture: CaptureStateMachine::new(
            settings.frame_target,
            live,
            settings.delay,
            settings.clear_on_failure,
        ),
        image_size: None,
        summary: RunSummary::default(),
    };

    let detector = detector_for(
        settings.pattern,
        &settings.detector,
        !settings.variant.is_wide_angle(),
    );
    let refiner = SubPixRefiner::new(SubPixParams {
        half_window: options.subpix_half_window,
        ..SubPixParams::default()
    });
    let mut show_undistorted = settings.show_undistorted;
    let mut preview_map: Option<UndistortionMap> = None;

    loop {
        if session.capture.should_estimate() {
            session.estimate();
        }

        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                if session.capture.needs_final_estimation() {
                    session.estimate();
                }
                break;
            }
            Err(e) => {
                warn!("input ended early: {e}");
                if session.capture.needs_final_estimation() {
                    session.estimate();
                }
                break;
            }
        };
        session.summary.frames += 1;

        let mut image = frame.image;
        if settings.flip_vertical {
            image::imageops::flip_vertical_in_place(&mut image);
        }
        let size = image_size(&image);
        match session.image_size {
            None => session.image_size = Some(size),
            Some(expected) if expected != size => {
                warn!(
                    "frame {}: size {size} differs from {expected}, skipped",
                    frame.index
                );
                continue;
            }
            Some(_) => {}
        }

        let gray = to_gray(&image);
        let points: Option<Vec<Point2<f32>>> = match detector.detect(&gray.view(), settings.board)
        {
            Ok(mut pts) => {
                if settings.pattern.is_corner_based() {
                    match refiner.refine(&gray.view(), &mut pts) {
                        Ok(()) => Some(pts),
                        Err(e) => {
                            debug!("frame {}: {e}", frame.index);
                            None
                        }
                    }
                } else {
                    Some(pts)
                }
            }
            Err(e) => {
                debug!("frame {}: {e}", frame.index);
                None
            }
        };

        let mut blink = false;
        if let Some(pts) = points {
            draw_points(&mut image, &pts, settings.board, true);
            if let Some(path) = &frame.path {
                let out = suffixed_path(path, ANNOTATED_SUFFIX);
                if let Err(e) = write_view(&image, &out) {
                    warn!("frame {}: {e}", frame.index);
                    sink.acknowledge(&e.to_string());
                }
            }
            if session.capture.offer(pts, Instant::now()) {
                session.summary.accepted += 1;
                blink = live;
            }
        }
        if blink {
            invert(&mut image);
        }

        let calibrated = session.capture.state() == CaptureState::Calibrated;
        if calibrated && show_undistorted {
            if let Some(result) = &session.summary.result {
                if preview_map.as_ref().is_none_or(|m| m.size != size) {
                    preview_map = UndistortionMap::with_camera_matrix(
                        &result.model,
                        &result.model.camera_matrix,
                        size,
                    )
                    .map_err(|e| warn!("preview disabled: {e}"))
                    .ok();
                }
                if let Some(map) = &preview_map {
                    if let Some(undistorted) = rgb_from_buffer(map.remap(&pixel_view(&image))) {
                        image = undistorted;
                    }
                }
            }
        }

        match sink.show(&image) {
            Some(Key::Escape) => {
                info!("stopped by operator");
                session.summary.stopped_by_operator = true;
                break;
            }
            Some(Key::ToggleUndistorted) if calibrated => show_undistorted = !show_undistorted,
            Some(Key::Reset) if live => session.capture.reset(),
            _ => {}
        }
    }

    if let (InputSpec::ImageList { images, .. }, Some(result), true) = (
        &settings.input,
        &session.summary.result,
        show_undistorted,
    ) {
        write_undistorted_list(images, result, session.image_size);
    }

    session.summary
}

/// Undistorted copies of every list image, same size, all source pixels kept.
fn write_undistorted_list(
    images: &[std::path::PathBuf],
    result: &CalibrationResult,
    size: Option<ImageSize>,
) {
    let Some(size) = size else {
        return;
    };
    let map = match UndistortionMap::build(&result.model, size, size) {
        Ok(map) => map,
        Err(e) => {
            warn!("undistorted views skipped: {e}");
            return;
        }
    };
    for path in images {
        let img = match image::open(path) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                warn!("{}: {e}", path.display());
                continue;
            }
        };
        if image_size(&img) != size {
            warn!("{}: size differs from the calibration, skipped", path.display());
            continue;
        }
        let Some(out) = rgb_from_buffer(map.remap(&pixel_view(&img))) else {
            continue;
        };
        let out_path = suffixed_path(path, UNDISTORTED_SUFFIX);
        if let Err(e) = write_view(&out, &out_path) {
            warn!("{e}");
        }
    }
}
