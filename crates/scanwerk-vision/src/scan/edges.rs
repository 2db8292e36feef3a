// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Edge map: per-pixel gradient magnitude of a (downscaled, smoothed) frame.

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma};
use imageproc::filter::gaussian_blur_f32;
use imageproc::gradients::sobel_gradients;
use scanwerk_core::config::DetectionConfig;
use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::types::FrameBuffer;
use tracing::{debug, instrument};

use crate::image::convert::to_gray_image;

/// Sobel magnitude buffer.
pub type MagnitudeImage = ImageBuffer<Luma<u16>, Vec<u16>>;

/// Gradient magnitude of a frame at working resolution.
///
/// The working image is the frame scaled so that its longest side fits
/// `DetectionConfig::max_dimension`. `scale()` maps working pixels back to
/// frame pixels.
#[derive(Debug, Clone)]
pub struct EdgeMap {
    magnitude: MagnitudeImage,
    frame_width: u32,
    frame_height: u32,
}

impl EdgeMap {
    /// Luma conversion, downscale, Gaussian blur, then Sobel magnitude.
    #[instrument(skip_all, fields(width = frame.width(), height = frame.height()))]
    pub fn compute(frame: &FrameBuffer, config: &DetectionConfig) -> Result<Self> {
        let gray = to_gray_image(frame);
        let working = downscale(gray, config.max_dimension);
        let blurred = gaussian_blur_f32(&working, config.blur_sigma);
        let magnitude = sobel_gradients(&blurred);
        debug!(
            working_width = magnitude.width(),
            working_height = magnitude.height(),
            "Edge map computed"
        );
        Ok(Self {
            magnitude,
            frame_width: frame.width(),
            frame_height: frame.height(),
        })
    }

    /// Wrap a precomputed magnitude buffer for a frame of the given size.
    ///
    /// Both the buffer and the frame must be non-empty.
    pub fn from_magnitude(
        magnitude: MagnitudeImage,
        frame_width: u32,
        frame_height: u32,
    ) -> Result<Self> {
        let (width, height) = magnitude.dimensions();
        if frame_width == 0 || frame_height == 0 || width == 0 || height == 0 {
            return Err(ScanError::InvalidFrame(format!(
                "edge map {width}x{height} for frame {frame_width}x{frame_height}"
            )));
        }
        Ok(Self {
            magnitude,
            frame_width,
            frame_height,
        })
    }

    pub fn width(&self) -> u32 {
        self.magnitude.width()
    }

    pub fn height(&self) -> u32 {
        self.magnitude.height()
    }

    pub fn frame_width(&self) -> u32 {
        self.frame_width
    }

    pub fn frame_height(&self) -> u32 {
        self.frame_height
    }

    pub fn magnitude(&self) -> &MagnitudeImage {
        &self.magnitude
    }

    /// Multipliers `(sx, sy)` from working pixels to frame pixels.
    pub fn scale(&self) -> (f64, f64) {
        let sx = if self.width() > 1 {
            (self.frame_width - 1) as f64 / (self.width() - 1) as f64
        } else {
            1.0
        };
        let sy = if self.height() > 1 {
            (self.frame_height - 1) as f64 / (self.height() - 1) as f64
        } else {
            1.0
        };
        (sx, sy)
    }

    /// Strongest gradient response in the map.
    pub fn max_magnitude(&self) -> u16 {
        self.magnitude.as_raw().iter().copied().max().unwrap_or(0)
    }

    /// Magnitudes stretched to 0..=255 for previews and debugging output.
    pub fn to_preview(&self) -> GrayImage {
        let max = self.max_magnitude().max(1) as u32;
        let (w, h) = self.magnitude.dimensions();
        GrayImage::from_fn(w, h, |x, y| {
            let v = self.magnitude.get_pixel(x, y).0[0] as u32;
            Luma([((v * 255) / max) as u8])
        })
    }
}

fn downscale(gray: GrayImage, max_dimension: u32) -> GrayImage {
    let (w, h) = gray.dimensions();
    let longest = w.max(h);
    if longest <= max_dimension {
        return gray;
    }
    let factor = max_dimension as f64 / longest as f64;
    let nw = ((w as f64 * factor).round() as u32).max(1);
    let nh = ((h as f64 * factor).round() as u32).max(1);
    imageops::resize(&gray, nw, nh, FilterType::Triangle)
}
