//! Lens-distortion flattening of image lists and Y4M video.
//!
//! Every frame is remapped into an `intermediate`-sized canvas that keeps all
//! source pixels, then cropped to a centred `final`-sized window.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::RgbImage;
use lenscal_core::{centered_crop, crop, CropRect, ImageSize, UndistortionMap};
use log::{info, warn};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::convert::{image_size, pixel_view, rgb_from_buffer};
use crate::error::{FlattenError, OutputError, SourceError};
use crate::settings::{FlattenInput, FlattenSettings};
use crate::source::{suffixed_path, FrameSource, ImageListSource, Y4mSource};
use crate::yuv::{rgb_to_planes, Subsampling};

/// Suffix of flattened artifacts, distinct from the calibration views.
pub const FLATTENED_SUFFIX: &str = "-flat";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlattenSummary {
    pub frames: usize,
    pub written: usize,
    pub skipped: usize,
    /// Output stream for video input.
    pub output: Option<PathBuf>,
}

/// Output path of a flattened video.
pub fn flattened_video_path(input: &Path) -> PathBuf {
    suffixed_path(input, FLATTENED_SUFFIX).with_extension("y4m")
}

/// Remap table plus crop window, built once per run.
#[derive(Debug, Clone)]
pub struct FlattenPipeline {
    original: ImageSize,
    final_size: ImageSize,
    roi: CropRect,
    map: UndistortionMap,
}

impl FlattenPipeline {
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(intermediate = %settings.intermediate))
    )]
    pub fn new(settings: &FlattenSettings) -> Result<Self, FlattenError> {
        let roi = centered_crop(settings.intermediate, settings.final_size)?;
        let map = UndistortionMap::build(&settings.model, settings.original, settings.intermediate)?;
        info!(
            "flattening {} -> {} cropped to {} at ({}, {})",
            settings.original, settings.intermediate, settings.final_size, roi.x, roi.y
        );
        Ok(Self {
            original: settings.original,
            final_size: settings.final_size,
            roi,
            map,
        })
    }

    pub fn roi(&self) -> CropRect {
        self.roi
    }

    pub fn map(&self) -> &UndistortionMap {
        &self.map
    }

    /// Remap and crop one `original`-sized frame.
    pub fn flatten_frame(&self, frame: &RgbImage) -> Result<RgbImage, FlattenError> {
        let size = image_size(frame);
        if size != self.original {
            return Err(FlattenError::StreamMismatch {
                declared: self.original,
                actual: size,
            });
        }
        let remapped = self.map.remap(&pixel_view(frame));
        let cropped = crop(&remapped.view(), self.roi)?;
        rgb_from_buffer(cropped)
            .ok_or(FlattenError::Output(OutputError::FrameGeometry(self.final_size)))
    }

    pub fn run(&self, input: &FlattenInput) -> Result<FlattenSummary, FlattenError> {
        match input {
            FlattenInput::ImageList(images) => Ok(self.run_image_list(images)),
            FlattenInput::Video(path) => self.run_video(path),
        }
    }

    /// One `<stem>-flat.<ext>` per readable list entry. Per-entry failures
    /// are logged and skipped.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip_all))]
    pub fn run_image_list(&self, images: &[PathBuf]) -> FlattenSummary {
        let mut summary = FlattenSummary::default();
        let mut source = ImageListSource::new(images.to_vec());
        loop {
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    warn!("{e}");
                    break;
                }
            };
            summary.frames += 1;
            let Some(path) = frame.path.as_deref() else {
                continue;
            };
            let flat = match self.flatten_frame(&frame.image) {
                Ok(flat) => flat,
                Err(e) => {
                    warn!("frame {} ({}): {e}", frame.index, path.display());
                    summary.skipped += 1;
                    continue;
                }
            };
            let out = suffixed_path(path, FLATTENED_SUFFIX);
            match flat.save(&out) {
                Ok(()) => summary.written += 1,
                Err(source) => {
                    let e = OutputError::Image { path: out, source };
                    warn!("frame {}: {e}", frame.index);
                    summary.skipped += 1;
                }
            }
        }
        summary.skipped += images.len() - summary.frames;
        summary
    }

    /// Flatten a Y4M stream into `<stem>-flat.y4m` with the input's size,
    /// frame rate and chroma layout. The declared original size is checked
    /// against the stream header before the output is created.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip_all))]
    pub fn run_video(&self, input: &Path) -> Result<FlattenSummary, FlattenError> {
        let mut source = Y4mSource::open(input)?;
        let info = *source.info();
        if info.size != self.original {
            return Err(FlattenError::StreamMismatch {
                declared: self.original,
                actual: info.size,
            });
        }
        let layout = Subsampling::of(info.colorspace)
            .ok_or(SourceError::UnsupportedColorspace(info.colorspace))?;

        let out_path = flattened_video_path(input);
        let file = File::create(&out_path).map_err(|source| OutputError::Io {
            path: out_path.clone(),
            source,
        })?;
        let mut encoder = y4m::encode(self.original.width, self.original.height, info.framerate)
            .with_colorspace(info.colorspace)
            .with_pixel_aspect(info.pixel_aspect)
            .write_header(BufWriter::new(file))
            .map_err(OutputError::from)?;

        let mut summary = FlattenSummary {
            output: Some(out_path),
            ..FlattenSummary::default()
        };
        while let Some(frame) = source.next_frame()? {
            summary.frames += 1;
            let mut flat = self.flatten_frame(&frame.image)?;
            if self.final_size != self.original {
                flat = imageops::resize(
                    &flat,
                    self.original.width as u32,
                    self.original.height as u32,
                    FilterType::CatmullRom,
                );
            }
            let [y, u, v] = rgb_to_planes(layout, &flat);
            encoder
                .write_frame(&y4m::Frame::new([y.as_slice(), u.as_slice(), v.as_slice()], None))
                .map_err(OutputError::from)?;
            summary.written += 1;
        }
        info!("wrote {} frames", summary.written);
        Ok(summary)
    }
}
