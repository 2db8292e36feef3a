// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Frame conversion between `FrameBuffer` and the `image` crate, plus file
// and in-memory encoding for front-ends and tests.

use std::time::Duration;

use image::{DynamicImage, GrayImage, ImageFormat, RgbImage, RgbaImage};
use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::types::{FrameBuffer, PixelFormat};
use tracing::{debug, info, instrument};

/// Single-channel intensity view of a frame (BT.601 luma weights).
pub fn to_gray_image(frame: &FrameBuffer) -> GrayImage {
    let (w, h) = (frame.width(), frame.height());
    match frame.format() {
        PixelFormat::Gray8 => {
            let mut data = Vec::with_capacity(w as usize * h as usize);
            for y in 0..h {
                data.extend_from_slice(frame.row(y));
            }
            GrayImage::from_vec(w, h, data).unwrap_or_else(|| GrayImage::new(w, h))
        }
        PixelFormat::Rgb8 | PixelFormat::Rgba8 => {
            let c = frame.format().channels();
            let mut data = Vec::with_capacity(w as usize * h as usize);
            for y in 0..h {
                for px in frame.row(y).chunks_exact(c) {
                    data.push(luma(px[0], px[1], px[2]));
                }
            }
            GrayImage::from_vec(w, h, data).unwrap_or_else(|| GrayImage::new(w, h))
        }
    }
}

#[inline]
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((77 * r as u32 + 150 * g as u32 + 29 * b as u32 + 128) >> 8) as u8
}

/// Copy a frame into a `DynamicImage` of the matching layout.
pub fn to_dynamic(frame: &FrameBuffer) -> DynamicImage {
    let (w, h) = (frame.width(), frame.height());
    let format = frame.format();
    let data = frame.clone().into_packed_data();
    let converted = match format {
        PixelFormat::Gray8 => GrayImage::from_vec(w, h, data).map(DynamicImage::ImageLuma8),
        PixelFormat::Rgb8 => RgbImage::from_vec(w, h, data).map(DynamicImage::ImageRgb8),
        PixelFormat::Rgba8 => RgbaImage::from_vec(w, h, data).map(DynamicImage::ImageRgba8),
    };
    // FrameBuffer construction guarantees the packed length matches.
    converted.unwrap_or_else(|| DynamicImage::new_luma8(w, h))
}

/// Wrap a decoded image as a frame, keeping grey / RGB / RGBA layouts and
/// converting anything else to RGBA.
pub fn from_dynamic(image: DynamicImage, timestamp: Duration) -> Result<FrameBuffer> {
    let (w, h) = (image.width(), image.height());
    match image {
        DynamicImage::ImageLuma8(buf) => {
            FrameBuffer::new(w, h, PixelFormat::Gray8, buf.into_raw(), timestamp)
        }
        DynamicImage::ImageRgb8(buf) => {
            FrameBuffer::new(w, h, PixelFormat::Rgb8, buf.into_raw(), timestamp)
        }
        DynamicImage::ImageRgba8(buf) => {
            FrameBuffer::new(w, h, PixelFormat::Rgba8, buf.into_raw(), timestamp)
        }
        other => FrameBuffer::new(
            w,
            h,
            PixelFormat::Rgba8,
            other.to_rgba8().into_raw(),
            timestamp,
        ),
    }
}

/// Wrap a greyscale buffer as a `Gray8` frame.
pub fn from_gray_image(image: GrayImage, timestamp: Duration) -> Result<FrameBuffer> {
    let (w, h) = image.dimensions();
    FrameBuffer::new(w, h, PixelFormat::Gray8, image.into_raw(), timestamp)
}

/// Load a frame from an image file (JPEG, PNG, TIFF, etc.).
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn load_frame(path: impl AsRef<std::path::Path>) -> Result<FrameBuffer> {
    let img = image::open(path.as_ref()).map_err(|err| {
        ScanError::ImageError(format!(
            "failed to open {}: {}",
            path.as_ref().display(),
            err
        ))
    })?;
    info!(width = img.width(), height = img.height(), "Image loaded");
    from_dynamic(img, Duration::ZERO)
}

/// Decode a frame from encoded bytes.
#[instrument(skip(data), fields(data_len = data.len()))]
pub fn decode_frame(data: &[u8]) -> Result<FrameBuffer> {
    let img = image::load_from_memory(data)
        .map_err(|err| ScanError::ImageError(format!("failed to decode image: {}", err)))?;
    debug!(
        width = img.width(),
        height = img.height(),
        "Image decoded from bytes"
    );
    from_dynamic(img, Duration::ZERO)
}

/// Write a frame to a file. The format is inferred from the file extension.
pub fn save_frame(frame: &FrameBuffer, path: impl AsRef<std::path::Path>) -> Result<()> {
    let img = to_dynamic(frame);
    // JPEG has no alpha channel.
    let img = match (frame.format(), ImageFormat::from_path(path.as_ref())) {
        (PixelFormat::Rgba8, Ok(ImageFormat::Jpeg)) => DynamicImage::ImageRgb8(img.to_rgb8()),
        _ => img,
    };
    img.save(path.as_ref()).map_err(|err| {
        ScanError::ImageError(format!(
            "failed to save image to {}: {}",
            path.as_ref().display(),
            err
        ))
    })
}

/// Encode a frame as PNG bytes.
pub fn encode_png(frame: &FrameBuffer) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);
    to_dynamic(frame)
        .write_to(&mut cursor, ImageFormat::Png)
        .map_err(|err| ScanError::ImageError(format!("image encoding failed: {}", err)))?;
    Ok(buffer)
}
