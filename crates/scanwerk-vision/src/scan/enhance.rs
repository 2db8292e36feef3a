// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scan enhancement: high-contrast black-and-white rendering of a rectified
// page for text capture.

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::integral_image::integral_image;
use scanwerk_core::config::EnhanceConfig;
use scanwerk_core::error::Result;
use scanwerk_core::types::{FrameBuffer, RenderMode};
use tracing::{debug, info, instrument};

use crate::image::convert::{from_gray_image, to_gray_image};

/// Post-processes rectified images according to a [`RenderMode`].
#[derive(Debug, Clone, Default)]
pub struct Enhancer {
    config: EnhanceConfig,
}

impl Enhancer {
    pub fn new(config: EnhanceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EnhanceConfig {
        &self.config
    }

    /// `Normal` passes the image through. `Monochrome` returns a `Gray8`
    /// image of the same size containing only 0 and 255.
    pub fn enhance(&self, image: &FrameBuffer, mode: RenderMode) -> Result<FrameBuffer> {
        match mode {
            RenderMode::Normal => Ok(image.clone()),
            RenderMode::Monochrome => self.monochrome(image),
        }
    }

    /// Grayscale, contrast stretch, then local adaptive threshold.
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn monochrome(&self, image: &FrameBuffer) -> Result<FrameBuffer> {
        let gray = to_gray_image(image);
        let stretched = stretch_contrast(&gray, self.config.contrast_factor);
        let binary = binarize(&stretched, self.config.block_radius, self.config.offset);
        info!(
            block_radius = self.config.block_radius,
            offset = self.config.offset,
            "Monochrome enhancement applied"
        );
        from_gray_image(binary, image.timestamp())
    }
}

/// Scale intensities about mid-grey by `factor`.
fn stretch_contrast(gray: &GrayImage, factor: f32) -> GrayImage {
    let mut lut = [0u8; 256];
    for (v, slot) in lut.iter_mut().enumerate() {
        *slot = ((v as f32 - 128.0) * factor + 128.0).round().clamp(0.0, 255.0) as u8;
    }
    let mut out = gray.clone();
    for pixel in out.pixels_mut() {
        pixel.0[0] = lut[pixel.0[0] as usize];
    }
    out
}

/// Per-pixel window sums over a summed-area table.
struct LocalMeans {
    table: ImageBuffer<Luma<u64>, Vec<u64>>,
    radius: u32,
}

impl LocalMeans {
    fn new(gray: &GrayImage, radius: u32) -> Self {
        Self {
            table: integral_image::<_, u64>(gray),
            radius,
        }
    }

    /// Mean over the `(2r+1)^2` window centred on `(x, y)`, clipped to the
    /// image. The table is one pixel wider and taller than the image.
    fn at(&self, x: u32, y: u32) -> f64 {
        let (w, h) = (self.table.width() - 1, self.table.height() - 1);
        let (left, top) = (x.saturating_sub(self.radius), y.saturating_sub(self.radius));
        let right = x.saturating_add(self.radius).saturating_add(1).min(w);
        let bottom = y.saturating_add(self.radius).saturating_add(1).min(h);
        let count = u64::from(right - left) * u64::from(bottom - top);
        if count == 0 {
            return 128.0;
        }
        let corner = |cx, cy| self.table.get_pixel(cx, cy).0[0];
        let sum =
            corner(right, bottom) + corner(left, top) - corner(left, bottom) - corner(right, top);
        sum as f64 / count as f64
    }
}

/// Local-mean thresholding: a pixel darker than the mean of its
/// neighbourhood minus `offset` becomes black, others white.
fn binarize(gray: &GrayImage, block_radius: u32, offset: i32) -> GrayImage {
    let means = LocalMeans::new(gray, block_radius);
    let binary = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let threshold = (means.at(x, y).round() as i32 - offset).clamp(0, 255);
        let value = i32::from(gray.get_pixel(x, y).0[0]);
        Luma([if value < threshold { 0 } else { 255 }])
    });
    debug!("Binarization complete");
    binary
}
