// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Shared helpers for the vision integration tests: synthetic content and
// rendering of that content into a camera frame under a known projection.

#![allow(dead_code)]

use std::time::Duration;

use scanwerk_core::geometry::Point2D;
use scanwerk_core::types::{FrameBuffer, PixelFormat};
use scanwerk_vision::Homography;

/// Smooth RGB test card: red ramps left to right, green top to bottom, blue
/// carries a low-frequency wave.
pub fn test_card(w: u32, h: u32) -> FrameBuffer {
    let mut data = Vec::with_capacity((w * h * 3) as usize);
    for y in 0..h {
        for x in 0..w {
            let r = x * 255 / (w - 1);
            let g = y * 255 / (h - 1);
            let b = 128.0 + 100.0 * (x as f64 / 9.0).sin() * (y as f64 / 7.0).cos();
            data.extend_from_slice(&[r as u8, g as u8, b.round() as u8]);
        }
    }
    FrameBuffer::new(w, h, PixelFormat::Rgb8, data, Duration::ZERO).expect("valid test card")
}

/// Light page with dark text-like bars, the way a printed sheet looks.
pub fn printed_page(w: u32, h: u32) -> FrameBuffer {
    let mut data = Vec::with_capacity((w * h * 3) as usize);
    for y in 0..h {
        for x in 0..w {
            let margin = x < w / 10 || x > w - w / 10 || y < h / 10 || y > h - h / 10;
            let line = !margin && (y % 14) < 4 && (x % 60) < 52;
            let v = if line { 50 } else { 235 };
            data.extend_from_slice(&[v, v, v]);
        }
    }
    FrameBuffer::new(w, h, PixelFormat::Rgb8, data, Duration::ZERO).expect("valid page")
}

/// The corners of a `w x h` image in clockwise order from the top-left.
pub fn image_corners(w: u32, h: u32) -> [Point2D; 4] {
    let (mx, my) = ((w - 1) as f64, (h - 1) as f64);
    [
        Point2D::new(0.0, 0.0),
        Point2D::new(mx, 0.0),
        Point2D::new(mx, my),
        Point2D::new(0.0, my),
    ]
}

/// Paint `content` into a `canvas_w x canvas_h` frame so its corners land on
/// `corners` (clockwise from top-left). Everything else is `background`.
pub fn render_projected(
    content: &FrameBuffer,
    canvas_w: u32,
    canvas_h: u32,
    corners: [Point2D; 4],
    background: u8,
) -> FrameBuffer {
    let to_content =
        Homography::from_correspondences(&corners, &image_corners(content.width(), content.height()))
            .expect("non-degenerate placement");
    let c = content.format().channels();
    let (max_u, max_v) = ((content.width() - 1) as f64, (content.height() - 1) as f64);

    let mut data = vec![background; (canvas_w * canvas_h) as usize * c];
    for y in 0..canvas_h {
        for x in 0..canvas_w {
            let Some(src) = to_content.project(Point2D::new(x as f64, y as f64)) else {
                continue;
            };
            if src.x < 0.0 || src.y < 0.0 || src.x > max_u || src.y > max_v {
                continue;
            }
            let offset = (y * canvas_w + x) as usize * c;
            for (ch, slot) in data[offset..offset + c].iter_mut().enumerate() {
                *slot = bilinear(content, src.x, src.y, ch).round() as u8;
            }
        }
    }
    FrameBuffer::new(canvas_w, canvas_h, content.format(), data, Duration::ZERO)
        .expect("valid canvas")
}

/// Bilinear sample of one channel, clamped to the image.
pub fn bilinear(frame: &FrameBuffer, x: f64, y: f64, channel: usize) -> f64 {
    let x = x.clamp(0.0, (frame.width() - 1) as f64);
    let y = y.clamp(0.0, (frame.height() - 1) as f64);
    let (x0, y0) = (x.floor() as u32, y.floor() as u32);
    let x1 = (x0 + 1).min(frame.width() - 1);
    let y1 = (y0 + 1).min(frame.height() - 1);
    let (fx, fy) = (x - x0 as f64, y - y0 as f64);
    let at = |px: u32, py: u32| frame.pixel(px, py)[channel] as f64;
    let top = at(x0, y0) * (1.0 - fx) + at(x1, y0) * fx;
    let bottom = at(x0, y1) * (1.0 - fx) + at(x1, y1) * fx;
    top * (1.0 - fy) + bottom * fy
}
