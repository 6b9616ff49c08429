//! Frame sources: image lists, Y4M video files, and the camera slot.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use image::RgbImage;
use lenscal_core::ImageSize;
use log::warn;

use crate::error::{ConfigError, SourceError};
use crate::settings::InputSpec;
use crate::yuv::{planes_to_rgb, Subsampling};

/// `<dir>/<stem><suffix>.<ext>` next to `path`.
pub fn suffixed_path(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}{suffix}"),
    };
    path.with_file_name(name)
}

/// One decoded frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Position in the stream, counting skipped entries.
    pub index: usize,
    /// Originating file for list entries.
    pub path: Option<PathBuf>,
    pub image: RgbImage,
}

impl Frame {
    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.image.width() as usize, self.image.height() as usize)
    }
}

/// Sequential frame provider. `Ok(None)` marks the end of the stream and
/// repeats on every later call.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError>;

    /// Live sources are rate limited and can be reset by the operator.
    fn is_live(&self) -> bool {
        false
    }
}

/// Decodes list entries in order. Unreadable entries are logged and
/// skipped.
#[derive(Debug, Clone)]
pub struct ImageListSource {
    images: Vec<PathBuf>,
    cursor: usize,
}

impl ImageListSource {
    pub fn new(images: Vec<PathBuf>) -> Self {
        Self { images, cursor: 0 }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

impl FrameSource for ImageListSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        while self.cursor < self.images.len() {
            let index = self.cursor;
            let path = &self.images[index];
            self.cursor += 1;
            match image::open(path) {
                Ok(img) => {
                    return Ok(Some(Frame {
                        index,
                        path: Some(path.clone()),
                        image: img.to_rgb8(),
                    }))
                }
                Err(source) => {
                    let err = SourceError::Decode {
                        path: path.clone(),
                        source,
                    };
                    warn!("skipping list entry {index}: {err}");
                }
            }
        }
        Ok(None)
    }
}

/// Stream parameters copied to flattened output.
#[derive(Debug, Clone, Copy)]
pub struct VideoInfo {
    pub size: ImageSize,
    pub framerate: y4m::Ratio,
    pub pixel_aspect: y4m::Ratio,
    pub colorspace: y4m::Colorspace,
}

/// 8-bit Y4M file reader.
pub struct Y4mSource {
    decoder: y4m::Decoder<BufReader<File>>,
    layout: Subsampling,
    info: VideoInfo,
    next_index: usize,
    finished: bool,
}

impl Y4mSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let file = File::open(path).map_err(|source| SourceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let decoder = y4m::decode(BufReader::new(file))?;
        let colorspace = decoder.get_colorspace();
        let layout =
            Subsampling::of(colorspace).ok_or(SourceError::UnsupportedColorspace(colorspace))?;
        let info = VideoInfo {
            size: ImageSize::new(decoder.get_width(), decoder.get_height()),
            framerate: decoder.get_framerate(),
            pixel_aspect: decoder.get_pixel_aspect(),
            colorspace,
        };
        Ok(Self {
            decoder,
            layout,
            info,
            next_index: 0,
            finished: false,
        })
    }

    pub fn info(&self) -> &VideoInfo {
        &self.info
    }
}

impl FrameSource for Y4mSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        if self.finished {
            return Ok(None);
        }
        let size = self.info.size;
        let frame = match self.decoder.read_frame() {
            Ok(frame) => frame,
            Err(y4m::Error::EOF) => {
                self.finished = true;
                return Ok(None);
            }
            Err(e) => {
                self.finished = true;
                return Err(e.into());
            }
        };
        let image = planes_to_rgb(
            self.layout,
            size.width,
            size.height,
            frame.get_y_plane(),
            frame.get_u_plane(),
            frame.get_v_plane(),
        )
        .ok_or(SourceError::Video(y4m::Error::BadInput))?;
        let index = self.next_index;
        self.next_index += 1;
        Ok(Some(Frame {
            index,
            path: None,
            image,
        }))
    }
}

/// Open the configured input. Cameras have no backend in this build.
pub fn open_source(input: &InputSpec) -> Result<Box<dyn FrameSource>, ConfigError> {
    match input {
        InputSpec::Camera(id) => Err(ConfigError::CameraUnsupported(*id)),
        InputSpec::ImageList { images, .. } => Ok(Box::new(ImageListSource::new(images.clone()))),
        InputSpec::Video(path) => Ok(Box::new(Y4mSource::open(path)?)),
    }
}
