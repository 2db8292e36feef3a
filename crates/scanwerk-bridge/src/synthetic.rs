// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Synthetic camera: renders a printed page lying on a desk, seen in
// perspective, with per-frame sensor noise. Used by the demo front-end and
// by tests that need a realistic frame stream without hardware.

use std::time::Duration;

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::geometry::Point2D;
use scanwerk_core::types::{FrameBuffer, PixelFormat};
use tracing::{debug, trace};

use crate::traits::*;

/// Brightness added to every sample while the torch is on.
const TORCH_GAIN: u8 = 25;

/// What the synthetic camera is looking at.
#[derive(Debug, Clone)]
pub struct SyntheticScene {
    pub width: u32,
    pub height: u32,
    /// Page corners in frame pixels, clockwise from the top-left.
    pub page: [Point2D; 4],
    pub background: u8,
    pub paper: u8,
    pub ink: u8,
    /// Number of printed text lines on the page.
    pub text_lines: u32,
    /// Noise amplitude per frame, cycled. Each sample is offset by a uniform
    /// value in `[-amplitude, amplitude]`.
    pub noise_levels: Vec<u8>,
    /// Random displacement of each page corner per frame (hand shake).
    pub jitter: f64,
    pub frame_interval: Duration,
    pub seed: u64,
}

impl Default for SyntheticScene {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            page: [
                Point2D::new(190.0, 40.0),
                Point2D::new(450.0, 60.0),
                Point2D::new(470.0, 440.0),
                Point2D::new(160.0, 420.0),
            ],
            background: 45,
            paper: 225,
            ink: 40,
            text_lines: 12,
            noise_levels: vec![0, 4, 8, 12, 16],
            jitter: 0.0,
            frame_interval: Duration::from_millis(33),
            seed: 7,
        }
    }
}

/// A [`CameraDevice`] that renders a [`SyntheticScene`].
pub struct SyntheticCamera {
    scene: SyntheticScene,
    rng: StdRng,
    delivered: u64,
    frame_limit: Option<u64>,
    torch: bool,
    last_focus: Option<Point2D>,
}

impl SyntheticCamera {
    pub fn new(scene: SyntheticScene) -> Self {
        let rng = StdRng::seed_from_u64(scene.seed);
        Self {
            scene,
            rng,
            delivered: 0,
            frame_limit: None,
            torch: false,
            last_focus: None,
        }
    }

    /// End the stream after `frames` frames.
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    pub fn scene(&self) -> &SyntheticScene {
        &self.scene
    }

    pub fn frames_delivered(&self) -> u64 {
        self.delivered
    }

    /// The most recent tap-to-focus point.
    pub fn last_focus(&self) -> Option<Point2D> {
        self.last_focus
    }

    fn render(&mut self) -> Result<FrameBuffer> {
        let scene = &self.scene;
        let mut canvas = RgbImage::from_pixel(scene.width, scene.height, Rgb([scene.background; 3]));

        let jitter = scene.jitter;
        let page = if jitter > 0.0 {
            scene.page.map(|p| {
                Point2D::new(
                    p.x + self.rng.gen_range(-jitter..=jitter),
                    p.y + self.rng.gen_range(-jitter..=jitter),
                )
            })
        } else {
            scene.page
        };

        draw_polygon_mut(&mut canvas, &to_polygon(&page), Rgb([scene.paper; 3]));

        let lines = scene.text_lines.max(1) as f64;
        for i in 0..scene.text_lines {
            let t0 = 0.15 + 0.7 * i as f64 / lines;
            let t1 = t0 + 0.35 / lines;
            // Every third line is a short paragraph end.
            let s1 = if i % 3 == 2 { 0.55 } else { 0.88 };
            let bar = [
                page_point(&page, 0.12, t0),
                page_point(&page, s1, t0),
                page_point(&page, s1, t1),
                page_point(&page, 0.12, t1),
            ];
            draw_polygon_mut(&mut canvas, &to_polygon(&bar), Rgb([scene.ink; 3]));
        }

        let amplitude: i16 = match scene.noise_levels.len() {
            0 => 0,
            n => scene.noise_levels[(self.delivered % n as u64) as usize].into(),
        };
        let gain = if self.torch { TORCH_GAIN } else { 0 };
        for sample in canvas.iter_mut() {
            let noise = if amplitude > 0 {
                self.rng.gen_range(-amplitude..=amplitude)
            } else {
                0
            };
            *sample = (*sample as i16 + gain as i16 + noise).clamp(0, 255) as u8;
        }

        let timestamp = scene.frame_interval * self.delivered as u32;
        trace!(index = self.delivered, amplitude, "Synthetic frame rendered");
        FrameBuffer::new(
            scene.width,
            scene.height,
            PixelFormat::Rgb8,
            canvas.into_raw(),
            timestamp,
        )
    }
}

/// Bilinear position inside the page: `s` across, `t` down, both in [0, 1].
fn page_point(page: &[Point2D; 4], s: f64, t: f64) -> Point2D {
    let top = (
        page[0].x + (page[1].x - page[0].x) * s,
        page[0].y + (page[1].y - page[0].y) * s,
    );
    let bottom = (
        page[3].x + (page[2].x - page[3].x) * s,
        page[3].y + (page[2].y - page[3].y) * s,
    );
    Point2D::new(top.0 + (bottom.0 - top.0) * t, top.1 + (bottom.1 - top.1) * t)
}

fn to_polygon(points: &[Point2D; 4]) -> Vec<Point<i32>> {
    points
        .iter()
        .map(|p| Point::new(p.x.round() as i32, p.y.round() as i32))
        .collect()
}

impl CameraDevice for SyntheticCamera {
    fn platform_name(&self) -> &str {
        "Synthetic"
    }
}

impl FrameSource for SyntheticCamera {
    fn next_frame(&mut self) -> Result<Option<FrameBuffer>> {
        if self.frame_limit.is_some_and(|limit| self.delivered >= limit) {
            return Ok(None);
        }
        let frame = self.render()?;
        self.delivered += 1;
        Ok(Some(frame))
    }
}

impl TorchControl for SyntheticCamera {
    fn set_torch(&mut self, enabled: bool) -> Result<()> {
        debug!(enabled, "Synthetic torch switched");
        self.torch = enabled;
        Ok(())
    }

    fn torch_enabled(&self) -> bool {
        self.torch
    }
}

impl FocusControl for SyntheticCamera {
    fn focus_at(&mut self, point: Point2D) -> FocusCompletion {
        let inside = point.x >= 0.0
            && point.y >= 0.0
            && point.x < self.scene.width as f64
            && point.y < self.scene.height as f64;
        if !inside {
            return resolved_focus(Err(ScanError::Bridge(format!(
                "focus point ({:.1}, {:.1}) is outside the frame",
                point.x, point.y
            ))));
        }
        debug!(x = point.x, y = point.y, "Synthetic focus settled");
        self.last_focus = Some(point);
        resolved_focus(Ok(()))
    }
}
