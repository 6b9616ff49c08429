//! Glue between `image` buffers and the core pixel types.

use image::RgbImage;
use lenscal_core::{GrayImage, ImageSize, PixelBuffer, PixelView};

pub fn image_size(img: &RgbImage) -> ImageSize {
    ImageSize::new(img.width() as usize, img.height() as usize)
}

pub fn pixel_view(img: &RgbImage) -> PixelView<'_> {
    PixelView {
        width: img.width() as usize,
        height: img.height() as usize,
        channels: 3,
        data: img.as_raw(),
    }
}

/// `None` unless the buffer holds three channels of the declared size.
pub fn rgb_from_buffer(buf: PixelBuffer) -> Option<RgbImage> {
    if buf.channels != 3 {
        return None;
    }
    RgbImage::from_raw(buf.width as u32, buf.height as u32, buf.data)
}

pub fn to_gray(img: &RgbImage) -> GrayImage {
    let luma = image::imageops::grayscale(img);
    GrayImage {
        width: luma.width() as usize,
        height: luma.height() as usize,
        data: luma.into_raw(),
    }
}
