//! PNG encoding and image resizing helpers.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, ImageOutputFormat, RgbaImage};
use slides_models::Frame;

use crate::error::{MediaError, MediaResult};

/// View a frame as an `image` buffer.
pub fn frame_to_image(frame: &Frame) -> MediaResult<RgbaImage> {
    RgbaImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
        .ok_or_else(|| MediaError::internal("frame buffer does not match its dimensions"))
}

/// Convert any decoded image into an RGBA frame.
pub fn image_to_frame(image: &DynamicImage) -> MediaResult<Frame> {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(Frame::from_rgba(width, height, rgba.into_raw())?)
}

/// Encode a frame as PNG.
pub fn encode_png(frame: &Frame) -> MediaResult<Vec<u8>> {
    let image = DynamicImage::ImageRgba8(frame_to_image(frame)?);
    encode_image(&image)
}

fn encode_image(image: &DynamicImage) -> MediaResult<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageOutputFormat::Png)?;
    Ok(out.into_inner())
}

/// Decode PNG or JPEG bytes.
pub fn decode_image(bytes: &[u8]) -> MediaResult<DynamicImage> {
    if bytes.is_empty() {
        return Err(MediaError::invalid_image("empty image data"));
    }
    Ok(image::load_from_memory(bytes)?)
}

/// Resize encoded image bytes to exactly `width`x`height`, returning PNG.
///
/// When the target is at least as large as the source in both dimensions the
/// input is returned unchanged.
pub fn resize_encoded(bytes: &[u8], width: u32, height: u32) -> MediaResult<Vec<u8>> {
    let image = decode_image(bytes)?;
    if width >= image.width() && height >= image.height() {
        return Ok(bytes.to_vec());
    }
    if width == 0 || height == 0 {
        return Err(MediaError::invalid_config(format!(
            "resize target must be non-zero, got {}x{}",
            width, height
        )));
    }

    let resized = image.resize_exact(width, height, FilterType::Triangle);
    encode_image(&resized)
}
