//! Calibration and flattening configuration.
//!
//! Files use the key names of the original calibration tools so existing
//! settings carry over unchanged. Raw files deserialize into `Raw*` structs;
//! `from_raw` validates them into immutable settings. Everything that changes
//! while a run progresses lives in the run loop, not here.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lenscal_core::{
    BoardSize, CameraModel, Distortion, ImageSize, ModelVariant, PatternKind, PinholeFlags,
    WideAngleFlags,
};
use lenscal_detect::DetectorParams;
use nalgebra::Matrix3;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ConfigError, OutputError};
use crate::persist::CalibrationRecord;

const MIN_SQUARE_SIZE: f32 = 10e-6;

/// Read a JSON document, unwrapping an optional top-level `"Settings"` node.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let json_err = |source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    };
    let mut value: serde_json::Value = serde_json::from_str(&text).map_err(json_err)?;
    if let Some(inner) = value.get_mut("Settings") {
        value = inner.take();
    }
    serde_json::from_value(value).map_err(json_err)
}

/// Write `value` as pretty JSON under a top-level `"Settings"` node.
pub fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<(), OutputError> {
    let wrapped = serde_json::json!({ "Settings": value });
    let text = serde_json::to_string_pretty(&wrapped).map_err(|e| OutputError::Serialize {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    fs::write(path, text).map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Accepts `true`/`false` as well as the numeric `0`/`1` of older files.
fn flag<'de, D: Deserializer<'de>>(de: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Float(f64),
    }
    Ok(match Flag::deserialize(de)? {
        Flag::Bool(b) => b,
        Flag::Int(i) => i != 0,
        Flag::Float(f) => f != 0.0,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RawCalibrationSettings {
    #[serde(rename = "BoardSize_Width")]
    pub board_width: i64,
    #[serde(rename = "BoardSize_Height")]
    pub board_height: i64,
    #[serde(rename = "Square_Size")]
    pub square_size: f32,
    #[serde(rename = "Calibrate_Pattern")]
    pub pattern: String,
    #[serde(rename = "Calibrate_NrOfFrameToUse")]
    pub frame_count: i64,
    /// `0` leaves the aspect ratio free.
    #[serde(rename = "Calibrate_FixAspectRatio")]
    pub fix_aspect_ratio: f64,
    #[serde(
        rename = "Calibrate_AssumeZeroTangentialDistortion",
        deserialize_with = "flag"
    )]
    pub zero_tangent_dist: bool,
    #[serde(
        rename = "Calibrate_FixPrincipalPointAtTheCenter",
        deserialize_with = "flag"
    )]
    pub fix_principal_point: bool,
    #[serde(rename = "Calibrate_UseFisheyeModel", deserialize_with = "flag")]
    pub use_fisheye: bool,
    #[serde(rename = "Fix_K1", deserialize_with = "flag")]
    pub fix_k1: bool,
    #[serde(rename = "Fix_K2", deserialize_with = "flag")]
    pub fix_k2: bool,
    #[serde(rename = "Fix_K3", deserialize_with = "flag")]
    pub fix_k3: bool,
    #[serde(rename = "Fix_K4", deserialize_with = "flag")]
    pub fix_k4: bool,
    #[serde(rename = "Fix_K5", deserialize_with = "flag")]
    pub fix_k5: bool,
    #[serde(rename = "Write_DetectedFeaturePoints", deserialize_with = "flag")]
    pub write_points: bool,
    #[serde(rename = "Write_extrinsicParameters", deserialize_with = "flag")]
    pub write_extrinsics: bool,
    #[serde(rename = "Write_gridPoints", deserialize_with = "flag")]
    pub write_grid: bool,
    #[serde(rename = "Write_outputFileName")]
    pub output_file: String,
    #[serde(rename = "Show_UndistortedImage", deserialize_with = "flag")]
    pub show_undistorted: bool,
    #[serde(rename = "Input_FlipAroundHorizontalAxis", deserialize_with = "flag")]
    pub flip_vertical: bool,
    /// Milliseconds between accepted live frames.
    #[serde(rename = "Input_Delay")]
    pub delay_ms: i64,
    #[serde(rename = "Input")]
    pub input: String,
    #[serde(rename = "Calibrate_ClearObservationsOnFailure", deserialize_with = "flag")]
    pub clear_on_failure: bool,
    #[serde(rename = "Detector")]
    pub detector: DetectorParams,
}

impl Default for RawCalibrationSettings {
    fn default() -> Self {
        Self {
            board_width: 9,
            board_height: 6,
            square_size: 50.0,
            pattern: PatternKind::Chessboard.as_str().to_string(),
            frame_count: 25,
            fix_aspect_ratio: 0.0,
            zero_tangent_dist: false,
            fix_principal_point: false,
            use_fisheye: false,
            fix_k1: false,
            fix_k2: false,
            fix_k3: false,
            fix_k4: true,
            fix_k5: true,
            write_points: true,
            write_extrinsics: true,
            write_grid: false,
            output_file: "out_camera_data.json".to_string(),
            show_undistorted: false,
            flip_vertical: false,
            delay_ms: 100,
            input: String::new(),
            clear_on_failure: false,
            detector: DetectorParams::default(),
        }
    }
}

/// Where frames come from.
#[derive(Debug, Clone, PartialEq)]
pub enum InputSpec {
    Camera(u32),
    ImageList { list: PathBuf, images: Vec<PathBuf> },
    Video(PathBuf),
}

impl InputSpec {
    /// Leading digit: camera id. `.json`/`.yaml`/`.yml`: image list.
    /// Anything else: a video file.
    pub fn classify(input: &str) -> Result<Self, ConfigError> {
        if input.is_empty() {
            return Err(ConfigError::MissingInput);
        }
        if input.starts_with(|c: char| c.is_ascii_digit()) {
            let digits: String = input.chars().take_while(|c| c.is_ascii_digit()).collect();
            let id = digits
                .parse()
                .map_err(|_| ConfigError::InputNotFound(input.to_string()))?;
            return Ok(InputSpec::Camera(id));
        }
        let path = PathBuf::from(input);
        if is_image_list(&path) {
            let images = read_image_list(&path)?;
            return Ok(InputSpec::ImageList { list: path, images });
        }
        if !path.is_file() {
            return Err(ConfigError::InputNotFound(input.to_string()));
        }
        Ok(InputSpec::Video(path))
    }

    /// Live sources are rate limited and can be reset by the operator.
    pub fn is_live(&self) -> bool {
        matches!(self, InputSpec::Camera(_))
    }
}

fn is_image_list(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "json" | "yaml" | "yml"))
}

/// Parse an image list: a bare sequence of paths, or a mapping whose first
/// value is that sequence. Relative entries resolve against the list's
/// directory.
pub fn read_image_list(path: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let bad = |reason: &str| ConfigError::BadImageList {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| !e.eq_ignore_ascii_case("json"));
    let entries: Vec<String> = if is_yaml {
        let value: serde_yaml::Value =
            serde_yaml::from_str(&text).map_err(|source| ConfigError::Yaml {
                path: path.to_path_buf(),
                source,
            })?;
        let seq = match value {
            serde_yaml::Value::Sequence(seq) => seq,
            serde_yaml::Value::Mapping(map) => match map.into_iter().next() {
                Some((_, serde_yaml::Value::Sequence(seq))) => seq,
                _ => return Err(bad("first node is not a sequence")),
            },
            _ => return Err(bad("first node is not a sequence")),
        };
        seq.into_iter()
            .map(|v| match v {
                serde_yaml::Value::String(s) => Ok(s),
                _ => Err(bad("entries must be strings")),
            })
            .collect::<Result<_, _>>()?
    } else {
        let value: serde_json::Value =
            serde_json::from_str(&text).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        let seq = match value {
            serde_json::Value::Array(seq) => seq,
            serde_json::Value::Object(map) => match map.into_iter().next() {
                Some((_, serde_json::Value::Array(seq))) => seq,
                _ => return Err(bad("first node is not a sequence")),
            },
            _ => return Err(bad("first node is not a sequence")),
        };
        seq.into_iter()
            .map(|v| match v {
                serde_json::Value::String(s) => Ok(s),
                _ => Err(bad("entries must be strings")),
            })
            .collect::<Result<_, _>>()?
    };

    let base = path.parent().unwrap_or(Path::new(""));
    Ok(entries
        .into_iter()
        .map(|e| {
            let p = PathBuf::from(e);
            if p.is_absolute() {
                p
            } else {
                base.join(p)
            }
        })
        .collect())
}

/// Validated calibration settings.
#[derive(Debug, Clone)]
pub struct CalibrationSettings {
    pub board: BoardSize,
    pub square_size: f32,
    pub pattern: PatternKind,
    /// Observations needed before estimation; clamped to the list length.
    pub frame_target: usize,
    pub variant: ModelVariant,
    pub write_points: bool,
    pub write_extrinsics: bool,
    pub write_grid: bool,
    pub output_path: PathBuf,
    pub show_undistorted: bool,
    pub flip_vertical: bool,
    pub delay: Duration,
    pub input: InputSpec,
    pub clear_on_failure: bool,
    pub detector: DetectorParams,
}

impl CalibrationSettings {
    pub fn load_json(path: &Path) -> Result<Self, ConfigError> {
        let raw: RawCalibrationSettings = load_json(path)?;
        Self::from_raw(raw)
    }

    pub fn from_raw(raw: RawCalibrationSettings) -> Result<Self, ConfigError> {
        if raw.board_width <= 0 || raw.board_height <= 0 {
            return Err(ConfigError::InvalidBoardSize {
                width: raw.board_width,
                height: raw.board_height,
            });
        }
        if raw.square_size.is_nan() || raw.square_size <= MIN_SQUARE_SIZE {
            return Err(ConfigError::InvalidSquareSize(raw.square_size));
        }
        if raw.frame_count <= 0 {
            return Err(ConfigError::InvalidFrameCount(raw.frame_count));
        }
        let input = InputSpec::classify(&raw.input)?;
        let pattern: PatternKind = raw.pattern.parse()?;

        let mut frame_target = raw.frame_count as usize;
        if let InputSpec::ImageList { images, .. } = &input {
            frame_target = frame_target.min(images.len());
        }

        let variant = if raw.use_fisheye {
            ModelVariant::WideAngle(WideAngleFlags {
                fix_principal_point: raw.fix_principal_point,
                fix_k: [raw.fix_k1, raw.fix_k2, raw.fix_k3, raw.fix_k4],
            })
        } else {
            ModelVariant::Pinhole(PinholeFlags {
                fix_aspect_ratio: (raw.fix_aspect_ratio != 0.0).then_some(raw.fix_aspect_ratio),
                fix_principal_point: raw.fix_principal_point,
                zero_tangent_dist: raw.zero_tangent_dist,
                fix_k: [raw.fix_k1, raw.fix_k2, raw.fix_k3, raw.fix_k4, raw.fix_k5],
            })
        };

        Ok(Self {
            board: BoardSize::new(raw.board_width as usize, raw.board_height as usize),
            square_size: raw.square_size,
            pattern,
            frame_target,
            variant,
            write_points: raw.write_points,
            write_extrinsics: raw.write_extrinsics,
            write_grid: raw.write_grid,
            output_path: PathBuf::from(raw.output_file),
            show_undistorted: raw.show_undistorted,
            flip_vertical: raw.flip_vertical,
            delay: Duration::from_millis(raw.delay_ms.max(0) as u64),
            input,
            clear_on_failure: raw.clear_on_failure,
            detector: raw.detector,
        })
    }
}

/// Matrix as a flat row-major list, nested rows, or an OpenCV matrix node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MatrixRepr {
    Flat(Vec<f64>),
    Rows(Vec<Vec<f64>>),
    OpenCv {
        rows: usize,
        cols: usize,
        data: Vec<f64>,
    },
}

impl MatrixRepr {
    /// Row-major values.
    pub fn values(&self) -> Vec<f64> {
        match self {
            MatrixRepr::Flat(v) => v.clone(),
            MatrixRepr::Rows(rows) => rows.iter().flatten().copied().collect(),
            MatrixRepr::OpenCv { data, .. } => data.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawFlattenSettings {
    pub input: String,
    pub original_image_width: i64,
    pub original_image_height: i64,
    pub intermediate_image_width: i64,
    pub intermediate_image_height: i64,
    pub final_image_width: i64,
    pub final_image_height: i64,
    #[serde(deserialize_with = "flag")]
    pub use_fisheye_model: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_matrix: Option<MatrixRepr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distortion_coefficients: Option<MatrixRepr>,
    /// Persisted calibration record to take the model from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibration_file: Option<String>,
}

impl Default for RawFlattenSettings {
    fn default() -> Self {
        Self {
            input: String::new(),
            original_image_width: 0,
            original_image_height: 0,
            intermediate_image_width: 0,
            intermediate_image_height: 0,
            final_image_width: 0,
            final_image_height: 0,
            use_fisheye_model: false,
            camera_matrix: None,
            distortion_coefficients: None,
            calibration_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlattenInput {
    ImageList(Vec<PathBuf>),
    Video(PathBuf),
}

/// Validated flattening settings.
#[derive(Debug, Clone)]
pub struct FlattenSettings {
    pub input: FlattenInput,
    pub original: ImageSize,
    pub intermediate: ImageSize,
    pub final_size: ImageSize,
    pub model: CameraModel,
}

fn positive_size(name: &'static str, width: i64, height: i64) -> Result<ImageSize, ConfigError> {
    if width <= 0 || height <= 0 {
        return Err(ConfigError::InvalidSize {
            name,
            width,
            height,
        });
    }
    Ok(ImageSize::new(width as usize, height as usize))
}

fn model_from_parts(
    wide_angle: bool,
    camera_matrix: Option<&MatrixRepr>,
    distortion: Option<&MatrixRepr>,
) -> Result<CameraModel, ConfigError> {
    let k = camera_matrix
        .map(MatrixRepr::values)
        .ok_or_else(|| ConfigError::InvalidModel("camera_matrix is missing".into()))?;
    if k.len() != 9 {
        return Err(ConfigError::InvalidModel(format!(
            "camera_matrix needs 9 values, got {}",
            k.len()
        )));
    }
    let coeffs = distortion.map(MatrixRepr::values).unwrap_or_default();
    let distortion = Distortion::from_coefficients(wide_angle, &coeffs).ok_or_else(|| {
        ConfigError::InvalidModel(format!(
            "{} distortion coefficients do not fit the {} model",
            coeffs.len(),
            if wide_angle { "wide-angle" } else { "pinhole" }
        ))
    })?;
    let model = CameraModel::new(Matrix3::from_row_slice(&k), distortion);
    if !model.check_range() {
        return Err(ConfigError::InvalidModel("values out of range".into()));
    }
    Ok(model)
}

impl FlattenSettings {
    pub fn load_json(path: &Path) -> Result<Self, ConfigError> {
        let raw: RawFlattenSettings = load_json(path)?;
        Self::from_raw(raw)
    }

    pub fn from_raw(raw: RawFlattenSettings) -> Result<Self, ConfigError> {
        let original = positive_size(
            "original",
            raw.original_image_width,
            raw.original_image_height,
        )?;
        let intermediate = positive_size(
            "intermediate",
            raw.intermediate_image_width,
            raw.intermediate_image_height,
        )?;
        let final_size = positive_size("final", raw.final_image_width, raw.final_image_height)?;
        if intermediate.width < original.width || intermediate.height < original.height {
            return Err(ConfigError::IntermediateTooSmall {
                original,
                intermediate,
            });
        }
        if final_size.width > intermediate.width || final_size.height > intermediate.height {
            return Err(ConfigError::FinalTooLarge {
                intermediate,
                final_size,
            });
        }

        let model = match &raw.calibration_file {
            Some(file) => CalibrationRecord::load(Path::new(file))?.camera_model()?,
            None => model_from_parts(
                raw.use_fisheye_model,
                raw.camera_matrix.as_ref(),
                raw.distortion_coefficients.as_ref(),
            )?,
        };

        if raw.input.is_empty() {
            return Err(ConfigError::MissingInput);
        }
        let path = PathBuf::from(&raw.input);
        let input = if is_image_list(&path) {
            FlattenInput::ImageList(read_image_list(&path)?)
        } else if path.is_file() {
            FlattenInput::Video(path)
        } else {
            return Err(ConfigError::InputNotFound(raw.input));
        };

        Ok(Self {
            input,
            original,
            intermediate,
            final_size,
            model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn list_file(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).expect("write list");
        path
    }

    fn raw_with_input(input: &Path) -> RawCalibrationSettings {
        RawCalibrationSettings {
            input: input.to_string_lossy().into_owned(),
            ..RawCalibrationSettings::default()
        }
    }

    #[test]
    fn original_key_names_and_numeric_flags_parse() {
        let dir = tempdir().expect("tempdir");
        let list = list_file(dir.path(), "list.json", r#"["a.png", "b.png"]"#);
        let cfg = dir.path().join("settings.json");
        let body = serde_json::json!({
            "Settings": {
                "BoardSize_Width": 7,
                "BoardSize_Height": 5,
                "Square_Size": 0.03,
                "Calibrate_Pattern": "ASYMMETRIC_CIRCLES_GRID",
                "Calibrate_NrOfFrameToUse": 10,
                "Calibrate_FixAspectRatio": 1,
                "Calibrate_AssumeZeroTangentialDistortion": 1,
                "Calibrate_FixPrincipalPointAtTheCenter": 0,
                "Fix_K3": true,
                "Input": list.to_string_lossy(),
            }
        });
        fs::write(&cfg, body.to_string()).expect("write settings");

        let s = CalibrationSettings::load_json(&cfg).expect("valid");
        assert_eq!(s.board, BoardSize::new(7, 5));
        assert_eq!(s.pattern, PatternKind::AsymmetricCirclesGrid);
        // Clamped to the two listed images.
        assert_eq!(s.frame_target, 2);
        match s.variant {
            ModelVariant::Pinhole(flags) => {
                assert_eq!(flags.fix_aspect_ratio, Some(1.0));
                assert!(flags.zero_tangent_dist);
                assert!(!flags.fix_principal_point);
                assert_eq!(flags.fix_k, [false, false, true, true, true]);
            }
            other => panic!("unexpected variant {other:?}"),
        }
        assert_eq!(
            s.input,
            InputSpec::ImageList {
                list: list.clone(),
                images: vec![dir.path().join("a.png"), dir.path().join("b.png")],
            }
        );
    }

    #[test]
    fn validation_rejects_bad_values() {
        let dir = tempdir().expect("tempdir");
        let list = list_file(dir.path(), "list.json", r#"["a.png"]"#);

        let mut raw = raw_with_input(&list);
        raw.board_width = 0;
        assert!(matches!(
            CalibrationSettings::from_raw(raw),
            Err(ConfigError::InvalidBoardSize { .. })
        ));

        let mut raw = raw_with_input(&list);
        raw.square_size = 1e-6;
        assert!(matches!(
            CalibrationSettings::from_raw(raw),
            Err(ConfigError::InvalidSquareSize(_))
        ));

        let mut raw = raw_with_input(&list);
        raw.frame_count = 0;
        assert!(matches!(
            CalibrationSettings::from_raw(raw),
            Err(ConfigError::InvalidFrameCount(0))
        ));

        let mut raw = raw_with_input(&list);
        raw.pattern = "CHARUCO".into();
        assert!(matches!(
            CalibrationSettings::from_raw(raw),
            Err(ConfigError::UnknownPattern(_))
        ));

        let raw = raw_with_input(&dir.path().join("missing.y4m"));
        assert!(matches!(
            CalibrationSettings::from_raw(raw),
            Err(ConfigError::InputNotFound(_))
        ));
    }

    #[test]
    fn input_classification() {
        assert_eq!(InputSpec::classify("0").expect("camera"), InputSpec::Camera(0));
        assert_eq!(InputSpec::classify("12abc").expect("camera"), InputSpec::Camera(12));
        assert!(InputSpec::classify("1").expect("camera").is_live());
        assert!(matches!(InputSpec::classify(""), Err(ConfigError::MissingInput)));
    }

    #[test]
    fn yaml_list_takes_first_sequence() {
        let dir = tempdir().expect("tempdir");
        let list = list_file(
            dir.path(),
            "views.yaml",
            "images:\n  - one.png\n  - /abs/two.png\nother: [x]\n",
        );
        let images = read_image_list(&list).expect("list");
        assert_eq!(
            images,
            vec![dir.path().join("one.png"), PathBuf::from("/abs/two.png")]
        );

        let bad = list_file(dir.path(), "bad.json", r#"{"images": 3}"#);
        assert!(matches!(
            read_image_list(&bad),
            Err(ConfigError::BadImageList { .. })
        ));
    }

    fn flatten_raw(dir: &Path) -> RawFlattenSettings {
        let list = list_file(dir, "frames.json", r#"["f.png"]"#);
        RawFlattenSettings {
            input: list.to_string_lossy().into_owned(),
            original_image_width: 640,
            original_image_height: 480,
            intermediate_image_width: 640,
            intermediate_image_height: 480,
            final_image_width: 600,
            final_image_height: 440,
            use_fisheye_model: false,
            camera_matrix: Some(MatrixRepr::Flat(vec![
                500.0, 0.0, 320.0, 0.0, 500.0, 240.0, 0.0, 0.0, 1.0,
            ])),
            distortion_coefficients: Some(MatrixRepr::Flat(vec![-0.1, 0.01, 0.0, 0.0, 0.0])),
            calibration_file: None,
        }
    }

    #[test]
    fn flatten_sizes_are_checked_before_anything_else() {
        let dir = tempdir().expect("tempdir");
        let ok = FlattenSettings::from_raw(flatten_raw(dir.path())).expect("valid");
        assert_eq!(ok.final_size, ImageSize::new(600, 440));
        assert_eq!(ok.model.distortion.coefficients().len(), 8);

        let mut raw = flatten_raw(dir.path());
        raw.final_image_width = 641;
        assert!(matches!(
            FlattenSettings::from_raw(raw),
            Err(ConfigError::FinalTooLarge { .. })
        ));

        let mut raw = flatten_raw(dir.path());
        raw.intermediate_image_height = 479;
        assert!(matches!(
            FlattenSettings::from_raw(raw),
            Err(ConfigError::IntermediateTooSmall { .. })
        ));

        let mut raw = flatten_raw(dir.path());
        raw.use_fisheye_model = true;
        assert!(matches!(
            FlattenSettings::from_raw(raw),
            Err(ConfigError::InvalidModel(_))
        ));
    }

    #[test]
    fn opencv_matrix_nodes_are_accepted() {
        let m: MatrixRepr = serde_json::from_str(
            r#"{"type_id": "opencv-matrix", "rows": 1, "cols": 4, "dt": "d", "data": [1, 2, 3, 4]}"#,
        )
        .expect("node");
        assert_eq!(m.values(), vec![1.0, 2.0, 3.0, 4.0]);
        let rows: MatrixRepr = serde_json::from_str("[[1, 0], [0, 1]]").expect("rows");
        assert_eq!(rows.values(), vec![1.0, 0.0, 0.0, 1.0]);
    }
}
