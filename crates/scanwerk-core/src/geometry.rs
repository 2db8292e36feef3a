// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Planar geometry shared by detection, correction, and overlay consumers.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};

/// A point in frame-pixel coordinates (x right, y down).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point2D) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Z component of `(a - self) x (b - self)`.
    pub fn cross(&self, a: &Point2D, b: &Point2D) -> f64 {
        (a.x - self.x) * (b.y - self.y) - (a.y - self.y) * (b.x - self.x)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Four document corners in a specific frame.
///
/// Corners are always ordered clockwise on screen, starting with the corner
/// nearest the top-left of the frame: `[top_left, top_right, bottom_right,
/// bottom_left]` for an upright document. Every corner lies inside
/// `[0, width-1] x [0, height-1]` and the polygon never self-intersects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quadrilateral {
    corners: [Point2D; 4],
    confidence: f64,
    frame_width: u32,
    frame_height: u32,
}

impl Quadrilateral {
    /// Build a quadrilateral from four corners in any order.
    ///
    /// Corners are clamped into the frame, then reordered. Non-finite or
    /// self-intersecting input is rejected with `GeometryDegenerate`.
    pub fn new(
        corners: [Point2D; 4],
        confidence: f64,
        frame_width: u32,
        frame_height: u32,
    ) -> Result<Self> {
        if frame_width == 0 || frame_height == 0 {
            return Err(ScanError::InvalidFrame(format!(
                "zero dimension ({frame_width}x{frame_height})"
            )));
        }
        if corners.iter().any(|p| !p.is_finite()) || !confidence.is_finite() {
            return Err(ScanError::GeometryDegenerate(
                "non-finite corner or confidence".into(),
            ));
        }

        let max_x = (frame_width - 1) as f64;
        let max_y = (frame_height - 1) as f64;
        let clamped = corners.map(|p| Point2D::new(p.x.clamp(0.0, max_x), p.y.clamp(0.0, max_y)));
        let ordered = order_clockwise(clamped);

        if !is_simple(&ordered) {
            return Err(ScanError::GeometryDegenerate(
                "corners form a self-intersecting polygon".into(),
            ));
        }

        Ok(Self {
            corners: ordered,
            confidence: confidence.clamp(0.0, 1.0),
            frame_width,
            frame_height,
        })
    }

    /// The quadrilateral covering an entire frame, with full confidence.
    pub fn full_frame(frame_width: u32, frame_height: u32) -> Result<Self> {
        let max_x = frame_width.saturating_sub(1) as f64;
        let max_y = frame_height.saturating_sub(1) as f64;
        Self::new(
            [
                Point2D::new(0.0, 0.0),
                Point2D::new(max_x, 0.0),
                Point2D::new(max_x, max_y),
                Point2D::new(0.0, max_y),
            ],
            1.0,
            frame_width,
            frame_height,
        )
    }

    pub fn corners(&self) -> &[Point2D; 4] {
        &self.corners
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn frame_width(&self) -> u32 {
        self.frame_width
    }

    pub fn frame_height(&self) -> u32 {
        self.frame_height
    }

    /// Enclosed area in square pixels.
    pub fn area(&self) -> f64 {
        polygon_area(&self.corners)
    }

    /// Enclosed area as a fraction of the frame area.
    pub fn area_fraction(&self) -> f64 {
        self.area() / (self.frame_width as f64 * self.frame_height as f64)
    }

    /// Side lengths `[top, right, bottom, left]`.
    pub fn side_lengths(&self) -> [f64; 4] {
        let c = &self.corners;
        [
            c[0].distance(&c[1]),
            c[1].distance(&c[2]),
            c[2].distance(&c[3]),
            c[3].distance(&c[0]),
        ]
    }

    /// Interior angles in degrees, one per corner.
    pub fn interior_angles(&self) -> [f64; 4] {
        interior_angles(&self.corners)
    }

    pub fn is_convex(&self) -> bool {
        is_convex(&self.corners)
    }

    /// Map the corners into a frame of another resolution, e.g. from a
    /// downscaled working image back to the camera frame.
    pub fn scaled(&self, sx: f64, sy: f64, frame_width: u32, frame_height: u32) -> Result<Self> {
        Self::new(
            self.corners.map(|p| Point2D::new(p.x * sx, p.y * sy)),
            self.confidence,
            frame_width,
            frame_height,
        )
    }
}

/// Absolute shoelace area of a closed polygon.
pub fn polygon_area(points: &[Point2D]) -> f64 {
    signed_area(points).abs()
}

/// Signed shoelace area. Positive for clockwise-on-screen winding (y down).
pub fn signed_area(points: &[Point2D]) -> f64 {
    let n = points.len();
    let mut area = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        area += points[i].x * points[j].y;
        area -= points[j].x * points[i].y;
    }
    area / 2.0
}

/// Whether a closed polygon turns consistently in one direction.
pub fn is_convex(points: &[Point2D]) -> bool {
    let n = points.len();
    if n < 3 {
        return false;
    }
    let mut sign = 0.0f64;
    for i in 0..n {
        let turn = points[i].cross(&points[(i + 1) % n], &points[(i + 2) % n]);
        if turn.abs() < f64::EPSILON {
            return false;
        }
        if sign == 0.0 {
            sign = turn.signum();
        } else if turn.signum() != sign {
            return false;
        }
    }
    true
}

/// Interior angle at each vertex of a closed 4-gon, in degrees.
pub fn interior_angles(points: &[Point2D; 4]) -> [f64; 4] {
    let mut out = [0.0; 4];
    for (i, angle) in out.iter_mut().enumerate() {
        let prev = points[(i + 3) % 4];
        let cur = points[i];
        let next = points[(i + 1) % 4];
        let (ax, ay) = (prev.x - cur.x, prev.y - cur.y);
        let (bx, by) = (next.x - cur.x, next.y - cur.y);
        let norm = ax.hypot(ay) * bx.hypot(by);
        *angle = if norm <= f64::EPSILON {
            0.0
        } else {
            ((ax * bx + ay * by) / norm).clamp(-1.0, 1.0).acos().to_degrees()
        };
    }
    out
}

/// Order four points clockwise on screen starting from the one nearest the
/// top-left corner of the frame.
///
/// "Nearest" is Euclidean distance to `(0, 0)`. Equidistant corners, as on a
/// square tilted by 45 degrees, resolve to the leftmost one.
pub fn order_clockwise(points: [Point2D; 4]) -> [Point2D; 4] {
    let cx = points.iter().map(|p| p.x).sum::<f64>() / 4.0;
    let cy = points.iter().map(|p| p.y).sum::<f64>() / 4.0;

    let mut sorted = points;
    // With y pointing down, increasing atan2 sweeps clockwise on screen.
    sorted.sort_by(|a, b| {
        let ta = (a.y - cy).atan2(a.x - cx);
        let tb = (b.y - cy).atan2(b.x - cx);
        ta.total_cmp(&tb)
    });

    let start = sorted
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            let (da, db) = (a.x * a.x + a.y * a.y, b.x * b.x + b.y * b.y);
            if (da - db).abs() <= 1e-9 * da.max(db).max(1.0) {
                a.x.total_cmp(&b.x)
            } else {
                da.total_cmp(&db)
            }
        })
        .map(|(i, _)| i)
        .unwrap_or(0);
    sorted.rotate_left(start);
    sorted
}

fn is_simple(points: &[Point2D; 4]) -> bool {
    !segments_cross(&points[0], &points[1], &points[2], &points[3])
        && !segments_cross(&points[1], &points[2], &points[3], &points[0])
}

/// Proper intersection test for segments `ab` and `cd`.
fn segments_cross(a: &Point2D, b: &Point2D, c: &Point2D, d: &Point2D) -> bool {
    let d1 = a.cross(b, c);
    let d2 = a.cross(b, d);
    let d3 = c.cross(d, a);
    let d4 = c.cross(d, b);
    d1 * d2 < 0.0 && d3 * d4 < 0.0
}
