// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Perspective correction: warp the region inside a quadrilateral onto an
// upright rectangle.

use rayon::prelude::*;
use scanwerk_core::config::CorrectionConfig;
use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::geometry::{Point2D, Quadrilateral};
use scanwerk_core::types::FrameBuffer;
use tracing::{debug, info, instrument};

use super::homography::Homography;

/// Resamples a quadrilateral region of a frame into a rectangle.
#[derive(Debug, Clone, Default)]
pub struct PerspectiveCorrector {
    config: CorrectionConfig,
}

impl PerspectiveCorrector {
    pub fn new(config: CorrectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CorrectionConfig {
        &self.config
    }

    /// Output size for a quadrilateral: averaged opposite sides plus one
    /// (corner-to-corner pixel convention), shrunk uniformly to fit
    /// `max_output_dimension`.
    pub fn target_size(&self, quad: &Quadrilateral) -> (u32, u32) {
        let [top, right, bottom, left] = quad.side_lengths();
        let mut w = ((top + bottom) / 2.0).round() + 1.0;
        let mut h = ((left + right) / 2.0).round() + 1.0;

        let limit = self.config.max_output_dimension as f64;
        let longest = w.max(h);
        if longest > limit {
            let factor = limit / longest;
            w = (w * factor).round();
            h = (h * factor).round();
        }
        (w.max(1.0) as u32, h.max(1.0) as u32)
    }

    /// Reject quadrilaterals that cannot be inverted into a rectangle.
    pub fn check_geometry(&self, quad: &Quadrilateral) -> Result<()> {
        let area = quad.area();
        if area < self.config.min_area_px {
            return Err(ScanError::GeometryDegenerate(format!(
                "area {area:.1} px below minimum {}",
                self.config.min_area_px
            )));
        }
        let min_turn = self.config.min_corner_angle_deg;
        for (i, angle) in quad.interior_angles().iter().enumerate() {
            if *angle < min_turn || 180.0 - *angle < min_turn {
                return Err(ScanError::GeometryDegenerate(format!(
                    "corner {i} is nearly collinear with its neighbours ({angle:.1} degrees)"
                )));
            }
        }
        Ok(())
    }

    /// Warp `frame` so that `quad` fills the output. The output keeps the
    /// pixel format of the input.
    #[instrument(skip_all, fields(width = frame.width(), height = frame.height()))]
    pub fn rectify(&self, frame: &FrameBuffer, quad: &Quadrilateral) -> Result<FrameBuffer> {
        if quad.frame_width() != frame.width() || quad.frame_height() != frame.height() {
            return Err(ScanError::InvalidFrame(format!(
                "quadrilateral belongs to a {}x{} frame, got {}x{}",
                quad.frame_width(),
                quad.frame_height(),
                frame.width(),
                frame.height()
            )));
        }
        self.check_geometry(quad)?;

        let (out_w, out_h) = self.target_size(quad);
        let (max_x, max_y) = ((out_w - 1) as f64, (out_h - 1) as f64);
        let target = [
            Point2D::new(0.0, 0.0),
            Point2D::new(max_x, 0.0),
            Point2D::new(max_x, max_y),
            Point2D::new(0.0, max_y),
        ];
        let forward = Homography::from_correspondences(quad.corners(), &target)?;
        let inverse = forward.inverse()?;
        debug!(out_w, out_h, "Homography computed");

        let channels = frame.format().channels();
        let row_bytes = out_w as usize * channels;
        let mut data = vec![0u8; row_bytes * out_h as usize];

        data.par_chunks_mut(row_bytes)
            .enumerate()
            .for_each(|(y, row)| {
                for x in 0..out_w as usize {
                    let Some(src) = inverse.project(Point2D::new(x as f64, y as f64)) else {
                        continue;
                    };
                    sample_bilinear(frame, src, &mut row[x * channels..(x + 1) * channels]);
                }
            });

        info!(out_w, out_h, "Perspective correction applied");
        FrameBuffer::new(out_w, out_h, frame.format(), data, frame.timestamp())
    }
}

/// Bilinear sample at `p`, clamped to the nearest valid pixel.
#[inline]
fn sample_bilinear(frame: &FrameBuffer, p: Point2D, out: &mut [u8]) {
    let max_x = (frame.width() - 1) as f64;
    let max_y = (frame.height() - 1) as f64;
    let x = p.x.clamp(0.0, max_x);
    let y = p.y.clamp(0.0, max_y);

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(frame.width() - 1);
    let y1 = (y0 + 1).min(frame.height() - 1);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let p00 = frame.pixel(x0, y0);
    let p10 = frame.pixel(x1, y0);
    let p01 = frame.pixel(x0, y1);
    let p11 = frame.pixel(x1, y1);
    for (c, slot) in out.iter_mut().enumerate() {
        let top = p00[c] as f64 * (1.0 - fx) + p10[c] as f64 * fx;
        let bottom = p01[c] as f64 * (1.0 - fx) + p11[c] as f64 * fx;
        *slot = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanwerk_core::types::PixelFormat;
    use std::time::Duration;

    fn p(x: f64, y: f64) -> Point2D {
        Point2D::new(x, y)
    }

    fn gradient_frame(w: u32, h: u32) -> FrameBuffer {
        let mut data = Vec::with_capacity((w * h * 3) as usize);
        for y in 0..h {
            for x in 0..w {
                data.extend_from_slice(&[(x % 256) as u8, (y % 256) as u8, 128]);
            }
        }
        FrameBuffer::new(w, h, PixelFormat::Rgb8, data, Duration::from_millis(7)).unwrap()
    }

    #[test]
    fn full_frame_quad_is_identity() {
        let frame = gradient_frame(64, 48);
        let quad = Quadrilateral::full_frame(64, 48).unwrap();
        let out = PerspectiveCorrector::default().rectify(&frame, &quad).unwrap();
        assert_eq!((out.width(), out.height()), (64, 48));
        assert_eq!(out.format(), PixelFormat::Rgb8);
        assert_eq!(out.timestamp(), Duration::from_millis(7));
        assert_eq!(out.data(), frame.data());
    }

    #[test]
    fn target_size_follows_side_lengths() {
        let quad = Quadrilateral::new(
            [p(10.0, 10.0), p(110.0, 10.0), p(110.0, 60.0), p(10.0, 60.0)],
            1.0,
            200,
            100,
        )
        .unwrap();
        assert_eq!(PerspectiveCorrector::default().target_size(&quad), (101, 51));
    }

    #[test]
    fn target_size_is_capped() {
        let quad = Quadrilateral::full_frame(4000, 3000).unwrap();
        let corrector = PerspectiveCorrector::default();
        assert_eq!(corrector.target_size(&quad), (2000, 1500));
    }

    #[test]
    fn collinear_corners_are_degenerate() {
        let quad = Quadrilateral::new(
            [p(0.0, 0.0), p(50.0, 0.0), p(100.0, 0.0), p(0.0, 80.0)],
            1.0,
            128,
            128,
        )
        .unwrap();
        let frame = gradient_frame(128, 128);
        let result = PerspectiveCorrector::default().rectify(&frame, &quad);
        assert!(matches!(result, Err(ScanError::GeometryDegenerate(_))));
    }

    #[test]
    fn tiny_quad_is_degenerate() {
        let quad = Quadrilateral::new(
            [p(0.0, 0.0), p(4.0, 0.0), p(4.0, 4.0), p(0.0, 4.0)],
            1.0,
            32,
            32,
        )
        .unwrap();
        let err = PerspectiveCorrector::default().check_geometry(&quad).unwrap_err();
        assert!(matches!(err, ScanError::GeometryDegenerate(_)));
    }

    #[test]
    fn mismatched_frame_is_invalid() {
        let quad = Quadrilateral::full_frame(100, 100).unwrap();
        let frame = gradient_frame(64, 48);
        let result = PerspectiveCorrector::default().rectify(&frame, &quad);
        assert!(matches!(result, Err(ScanError::InvalidFrame(_))));
    }
}
