//! Calibration record files.
//!
//! Records are JSON unless the output path ends in `.yaml`/`.yml`. The key
//! names match the records written by the original calibration tool, so the
//! flatten tool can consume either.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use lenscal_core::{BoardSize, CameraModel, Distortion, ImageSize, ModelVariant};
use log::info;
use nalgebra::{Matrix3, Point2};
use serde::{Deserialize, Serialize};

use crate::calibrator::CalibrationResult;
use crate::error::{ConfigError, OutputError};
use crate::settings::CalibrationSettings;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub calibration_time: String,
    pub nr_of_frames: usize,
    pub image_width: usize,
    pub image_height: usize,
    pub board_width: usize,
    pub board_height: usize,
    pub square_size: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_aspect_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags_annotation: Option<String>,
    pub flags: i32,
    pub fisheye_model: bool,
    /// Row-major.
    pub camera_matrix: [[f64; 3]; 3],
    pub distortion_coefficients: Vec<f64>,
    pub avg_reprojection_error: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_view_reprojection_errors: Option<Vec<f64>>,
    /// `[rx, ry, rz, tx, ty, tz]` per view.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extrinsic_parameters: Option<Vec<[f64; 6]>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_points: Option<Vec<Vec<[f32; 2]>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_points: Option<Vec<[f32; 3]>>,
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
}

impl CalibrationRecord {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if is_yaml(path) {
            serde_yaml::from_str(&text).map_err(|source| ConfigError::Yaml {
                path: path.to_path_buf(),
                source,
            })
        } else {
            serde_json::from_str(&text).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), OutputError> {
        let serialize_err = |reason: String| OutputError::Serialize {
            path: path.to_path_buf(),
            reason,
        };
        let text = if is_yaml(path) {
            serde_yaml::to_string(self).map_err(|e| serialize_err(e.to_string()))?
        } else {
            serde_json::to_string_pretty(self).map_err(|e| serialize_err(e.to_string()))?
        };
        fs::write(path, text).map_err(|source| OutputError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn image_size(&self) -> ImageSize {
        ImageSize::new(self.image_width, self.image_height)
    }

    /// Camera model stored in the record, range checked.
    pub fn camera_model(&self) -> Result<CameraModel, ConfigError> {
        let rows = self.camera_matrix;
        let k = Matrix3::from_fn(|r, c| rows[r][c]);
        let distortion =
            Distortion::from_coefficients(self.fisheye_model, &self.distortion_coefficients)
                .ok_or_else(|| {
                    ConfigError::InvalidModel(format!(
                        "{} distortion coefficients in a {} record",
                        self.distortion_coefficients.len(),
                        if self.fisheye_model {
                            "wide-angle"
                        } else {
                            "pinhole"
                        }
                    ))
                })?;
        let model = CameraModel::new(k, distortion);
        if !model.check_range() {
            return Err(ConfigError::InvalidModel("values out of range".into()));
        }
        Ok(model)
    }
}

/// Writes calibration records for one configuration.
#[derive(Debug, Clone)]
pub struct ResultPersister {
    path: PathBuf,
    board: BoardSize,
    square_size: f32,
    variant: ModelVariant,
    write_points: bool,
    write_extrinsics: bool,
    write_grid: bool,
}

impl ResultPersister {
    pub fn new(settings: &CalibrationSettings) -> Self {
        Self {
            path: settings.output_path.clone(),
            board: settings.board,
            square_size: settings.square_size,
            variant: settings.variant,
            write_points: settings.write_points,
            write_extrinsics: settings.write_extrinsics,
            write_grid: settings.write_grid,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(
        &self,
        result: &CalibrationResult,
        image_size: ImageSize,
        image_points: &[Vec<Point2<f32>>],
    ) -> CalibrationRecord {
        let k = result.model.camera_matrix;
        CalibrationRecord {
            calibration_time: Local::now().format("%c").to_string(),
            nr_of_frames: result.poses.len().max(result.per_view_errors.len()),
            image_width: image_size.width,
            image_height: image_size.height,
            board_width: self.board.width,
            board_height: self.board.height,
            square_size: self.square_size,
            fix_aspect_ratio: self.variant.fixed_aspect_ratio(),
            flags_annotation: self.variant.flag_annotation(),
            flags: self.variant.flag_bits(),
            fisheye_model: self.variant.is_wide_angle(),
            camera_matrix: [0, 1, 2].map(|r| [k[(r, 0)], k[(r, 1)], k[(r, 2)]]),
            distortion_coefficients: result.model.distortion.coefficients().to_vec(),
            avg_reprojection_error: result.rms,
            per_view_reprojection_errors: (self.write_extrinsics
                && !result.per_view_errors.is_empty())
            .then(|| result.per_view_errors.clone()),
            extrinsic_parameters: (self.write_extrinsics && !result.poses.is_empty())
                .then(|| result.poses.iter().map(|p| p.sextuple()).collect()),
            image_points: (self.write_points && !image_points.is_empty()).then(|| {
                image_points
                    .iter()
                    .map(|view| view.iter().map(|p| [p.x, p.y]).collect())
                    .collect()
            }),
            grid_points: (self.write_grid && !result.object_points.is_empty()).then(|| {
                result
                    .object_points
                    .iter()
                    .map(|p| [p.x, p.y, p.z])
                    .collect()
            }),
        }
    }

    pub fn persist(
        &self,
        result: &CalibrationResult,
        image_size: ImageSize,
        image_points: &[Vec<Point2<f32>>],
    ) -> Result<CalibrationRecord, OutputError> {
        let record = self.record(result, image_size, image_points);
        record.save(&self.path)?;
        info!("calibration record written to {}", self.path.display());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lenscal_core::{PinholeFlags, ViewPose, WideAngleFlags};
    use nalgebra::{Point3, Vector3};
    use tempfile::tempdir;

    fn result(model: CameraModel) -> CalibrationResult {
        CalibrationResult {
            model,
            poses: vec![ViewPose {
                rvec: Vector3::new(0.1, 0.2, 0.3),
                tvec: Vector3::new(1.0, 2.0, 3.0),
            }],
            per_view_errors: vec![0.4],
            rms: 0.4,
            optimizer_rms: 0.39,
            object_points: vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)],
            released: false,
        }
    }

    fn persister(path: PathBuf, variant: ModelVariant) -> ResultPersister {
        ResultPersister {
            path,
            board: BoardSize::new(2, 1),
            square_size: 1.0,
            variant,
            write_points: true,
            write_extrinsics: false,
            write_grid: true,
        }
    }

    #[test]
    fn record_reflects_write_options_and_flags() {
        let model = CameraModel::new(
            Matrix3::new(500.0, 0.0, 320.0, 0.0, 510.0, 240.0, 0.0, 0.0, 1.0),
            Distortion::Pinhole([-0.1, 0.01, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
        );
        let flags = PinholeFlags {
            fix_aspect_ratio: Some(1.0),
            ..PinholeFlags::default()
        };
        let p = persister(PathBuf::from("unused.json"), ModelVariant::Pinhole(flags));
        let points = vec![vec![Point2::new(1.0, 2.0), Point2::new(3.0, 4.0)]];
        let rec = p.record(&result(model), ImageSize::new(640, 480), &points);

        assert_eq!(rec.flags, PinholeFlags::FIX_ASPECT_RATIO);
        assert_eq!(rec.fix_aspect_ratio, Some(1.0));
        assert_eq!(rec.flags_annotation.as_deref(), Some("flags: +fix_aspectRatio"));
        assert_eq!(rec.camera_matrix[1], [0.0, 510.0, 240.0]);
        assert_eq!(rec.image_points, Some(vec![vec![[1.0, 2.0], [3.0, 4.0]]]));
        assert_eq!(rec.grid_points.as_ref().map(Vec::len), Some(2));
        assert!(rec.extrinsic_parameters.is_none());
        assert!(rec.per_view_reprojection_errors.is_none());

        let json = serde_json::to_value(&rec).expect("json");
        assert!(json.get("extrinsic_parameters").is_none());
        assert_eq!(json["image_width"], 640);
    }

    #[test]
    fn records_load_back_as_camera_models() {
        let dir = tempdir().expect("tempdir");
        let model = CameraModel::new(
            Matrix3::new(300.0, 0.0, 320.0, 0.0, 300.0, 240.0, 0.0, 0.0, 1.0),
            Distortion::WideAngle([0.05, -0.01, 0.0, 0.0]),
        );
        for name in ["calib.json", "calib.yaml"] {
            let path = dir.path().join(name);
            let mut p = persister(
                path.clone(),
                ModelVariant::WideAngle(WideAngleFlags::default()),
            );
            p.write_extrinsics = true;
            let written = p
                .persist(&result(model.clone()), ImageSize::new(640, 480), &[])
                .expect("persist");
            assert!(written.image_points.is_none());
            assert_eq!(
                written.extrinsic_parameters,
                Some(vec![[0.1, 0.2, 0.3, 1.0, 2.0, 3.0]])
            );

            let loaded = CalibrationRecord::load(&path).expect("load");
            assert_eq!(loaded.flags, written.flags);
            assert!(loaded.fisheye_model);
            assert_eq!(loaded.camera_model().expect("model"), model);
            assert_eq!(loaded.image_size(), ImageSize::new(640, 480));
        }
    }

    #[test]
    fn out_of_range_records_are_rejected() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("bad.json");
        let model = CameraModel::new(
            Matrix3::new(1e13, 0.0, 320.0, 0.0, 300.0, 240.0, 0.0, 0.0, 1.0),
            Distortion::zero_pinhole(),
        );
        persister(path.clone(), ModelVariant::Pinhole(PinholeFlags::default()))
            .persist(&result(model), ImageSize::new(640, 480), &[])
            .expect("persist");
        let loaded = CalibrationRecord::load(&path).expect("load");
        assert!(matches!(
            loaded.camera_model(),
            Err(ConfigError::InvalidModel(_))
        ));
    }
}
