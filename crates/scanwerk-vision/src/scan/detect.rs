// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document quadrilateral search over an edge map.
//
// 1. Adaptive threshold of the gradient magnitude, floored at the minimum
//    edge strength, then dilation to close gaps
// 2. Border following to extract closed contours
// 3. Douglas-Peucker over an epsilon ladder, keeping 4-vertex results
// 4. Scoring by area, convexity, and corner angles
// 5. Best candidate above the acceptance threshold, mapped to frame pixels

use image::{GrayImage, Luma};
use imageproc::contours::{Contour, find_contours};
use imageproc::distance_transform::Norm;
use imageproc::morphology::dilate;
use scanwerk_core::config::DetectionConfig;
use scanwerk_core::error::Result;
use scanwerk_core::geometry::{self, Point2D, Quadrilateral};
use scanwerk_core::types::FrameBuffer;
use tracing::{debug, instrument, trace};

use super::contour::approximate_quad;
use super::edges::EdgeMap;
use super::threshold;

/// Contours shorter than this cannot describe a page boundary.
const MIN_CONTOUR_POINTS: usize = 8;

/// Area fraction at which the area term of the confidence saturates.
const FULL_AREA_SCORE_FRACTION: f64 = 0.5;

/// Finds the most document-like quadrilateral in a frame.
#[derive(Debug, Clone, Default)]
pub struct QuadrilateralFinder {
    config: DetectionConfig,
}

impl QuadrilateralFinder {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Edge extraction followed by [`find`](Self::find).
    pub fn detect(&self, frame: &FrameBuffer) -> Result<Option<Quadrilateral>> {
        let edges = EdgeMap::compute(frame, &self.config)?;
        Ok(self.find(&edges))
    }

    /// Search an edge map. `None` means no plausible document.
    #[instrument(skip_all, fields(width = edges.width(), height = edges.height()))]
    pub fn find(&self, edges: &EdgeMap) -> Option<Quadrilateral> {
        let cfg = &self.config;
        let strongest = edges.max_magnitude();
        if (strongest as f32) < cfg.min_edge_strength {
            debug!(strongest, "No edges above minimum strength");
            return None;
        }

        let mask = self.edge_mask(edges);
        let contours = find_contours::<i32>(&mask);
        let (w, h) = (edges.width(), edges.height());
        let working_area = w as f64 * h as f64;

        let candidates = self.preselect(&contours, working_area);
        debug!(
            contours = contours.len(),
            candidates = candidates.len(),
            "Contours extracted"
        );

        let mut best: Option<([Point2D; 4], f64)> = None;
        for contour in candidates {
            let points: Vec<Point2D> = contour
                .points
                .iter()
                .map(|p| Point2D::new(p.x as f64, p.y as f64))
                .collect();
            let Some(corners) = approximate_quad(
                &points,
                cfg.approx_epsilon_min,
                cfg.approx_epsilon_max,
                cfg.approx_epsilon_step,
            ) else {
                continue;
            };
            let Some(score) = score_quad(&corners, working_area, cfg) else {
                continue;
            };
            trace!(score, ?corners, "Quadrilateral candidate");
            if best.as_ref().is_none_or(|(_, s)| score > *s) {
                best = Some((corners, score));
            }
        }

        let (corners, score) = best?;
        if score < cfg.acceptance_threshold {
            debug!(score, threshold = cfg.acceptance_threshold, "Best candidate rejected");
            return None;
        }

        let (sx, sy) = edges.scale();
        let quad = Quadrilateral::new(corners, score, w, h)
            .and_then(|q| q.scaled(sx, sy, edges.frame_width(), edges.frame_height()));
        match quad {
            Ok(quad) => {
                debug!(confidence = quad.confidence(), corners = ?quad.corners(), "Document detected");
                Some(quad)
            }
            Err(err) => {
                debug!(%err, "Best candidate failed quadrilateral validation");
                None
            }
        }
    }

    /// Binary mask of edge pixels at or above the adaptive level.
    fn edge_mask(&self, edges: &EdgeMap) -> GrayImage {
        let cfg = &self.config;
        let magnitude = edges.magnitude();
        let adaptive = threshold::level(magnitude.as_raw(), cfg.threshold);
        let floor = cfg.min_edge_strength.ceil().clamp(0.0, u16::MAX as f32) as u16;
        let level = adaptive.max(floor).max(1);
        trace!(adaptive, level, "Edge mask level");

        let mask = GrayImage::from_fn(magnitude.width(), magnitude.height(), |x, y| {
            if magnitude.get_pixel(x, y).0[0] >= level {
                Luma([255u8])
            } else {
                Luma([0u8])
            }
        });
        if cfg.dilate_radius == 0 {
            mask
        } else {
            dilate(&mask, Norm::LInf, cfg.dilate_radius)
        }
    }

    /// Largest contours by bounding box, dropping those that cannot reach
    /// the minimum area.
    fn preselect<'a>(&self, contours: &'a [Contour<i32>], working_area: f64) -> Vec<&'a Contour<i32>> {
        let min_box = self.config.min_area_fraction * working_area;
        let mut sized: Vec<(f64, &Contour<i32>)> = contours
            .iter()
            .filter(|c| c.points.len() >= MIN_CONTOUR_POINTS)
            .map(|c| (bounding_box_area(c), c))
            .filter(|(area, _)| *area >= min_box)
            .collect();
        sized.sort_by(|a, b| b.0.total_cmp(&a.0));
        sized
            .into_iter()
            .take(self.config.max_candidates)
            .map(|(_, c)| c)
            .collect()
    }
}

fn bounding_box_area(contour: &Contour<i32>) -> f64 {
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (i32::MAX, i32::MAX, i32::MIN, i32::MIN);
    for p in &contour.points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    if max_x < min_x {
        return 0.0;
    }
    (max_x - min_x) as f64 * (max_y - min_y) as f64
}

/// Confidence of a 4-vertex candidate, or `None` if it fails a hard limit.
///
/// `0.6 * angle_score + 0.4 * area_score`, where the angle score falls
/// linearly with the mean deviation from 90 degrees and the area score
/// saturates at half the frame.
fn score_quad(corners: &[Point2D; 4], working_area: f64, cfg: &DetectionConfig) -> Option<f64> {
    let area_fraction = geometry::polygon_area(corners) / working_area;
    if area_fraction < cfg.min_area_fraction {
        return None;
    }
    if !geometry::is_convex(corners) {
        return None;
    }
    let deviations = geometry::interior_angles(corners).map(|a| (a - 90.0).abs());
    if deviations.iter().any(|d| *d > cfg.angle_tolerance_deg) {
        return None;
    }
    let mean_deviation = deviations.iter().sum::<f64>() / 4.0;
    let angle_score = (1.0 - mean_deviation / cfg.angle_tolerance_deg).clamp(0.0, 1.0);
    let area_score = (area_fraction / FULL_AREA_SCORE_FRACTION).min(1.0);
    Some(0.6 * angle_score + 0.4 * area_score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn p(x: f64, y: f64) -> Point2D {
        Point2D::new(x, y)
    }

    /// Dark background with a bright axis-aligned page.
    fn page_frame(w: u32, h: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> FrameBuffer {
        let mut data = vec![30u8; (w * h) as usize];
        for y in y0..y1 {
            for x in x0..x1 {
                data[(y * w + x) as usize] = 230;
            }
        }
        FrameBuffer::new(w, h, scanwerk_core::PixelFormat::Gray8, data, Duration::ZERO).unwrap()
    }

    #[test]
    fn rectangle_scores_high() {
        let cfg = DetectionConfig::default();
        let corners = [p(0.0, 0.0), p(80.0, 0.0), p(80.0, 60.0), p(0.0, 60.0)];
        let score = score_quad(&corners, 100.0 * 100.0, &cfg).expect("accepted");
        assert!((score - (0.6 + 0.4 * 0.96)).abs() < 1e-9);
    }

    #[test]
    fn small_quad_is_rejected() {
        let cfg = DetectionConfig::default();
        let corners = [p(0.0, 0.0), p(10.0, 0.0), p(10.0, 10.0), p(0.0, 10.0)];
        assert!(score_quad(&corners, 100.0 * 100.0, &cfg).is_none());
    }

    #[test]
    fn sharp_corner_is_rejected() {
        let cfg = DetectionConfig::default();
        // Convex kite with a 41 degree tip.
        let corners = [p(0.0, 40.0), p(80.0, 10.0), p(100.0, 40.0), p(80.0, 70.0)];
        assert!(score_quad(&corners, 100.0 * 100.0, &cfg).is_none());
    }

    #[test]
    fn axis_aligned_page_is_found() {
        let frame = page_frame(320, 240, 60, 40, 260, 200);
        let finder = QuadrilateralFinder::default();
        let quad = finder.detect(&frame).unwrap().expect("page detected");
        assert!(quad.confidence() >= finder.config().acceptance_threshold);
        let expected = [p(60.0, 40.0), p(259.0, 40.0), p(259.0, 199.0), p(60.0, 199.0)];
        for (got, want) in quad.corners().iter().zip(expected) {
            assert!(got.distance(&want) < 8.0, "corner {got:?} vs {want:?}");
        }
    }

    #[test]
    fn uniform_frame_has_no_document() {
        let frame = FrameBuffer::filled_gray(320, 240, 128, Duration::ZERO).unwrap();
        assert!(QuadrilateralFinder::default().detect(&frame).unwrap().is_none());
    }

    #[test]
    fn page_below_min_area_is_ignored() {
        let frame = page_frame(320, 240, 140, 100, 180, 140);
        assert!(QuadrilateralFinder::default().detect(&frame).unwrap().is_none());
    }
}
