// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Four-point homography.
//
// Exactly four correspondences give an 8x8 linear system in the entries of H
// (h33 fixed to 1). Points are Hartley-normalised before the LU solve.

use nalgebra::{Matrix3, SMatrix, SVector, Vector3};
use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::geometry::Point2D;

/// Below this `|det|` (of the normalised matrix) H is treated as singular.
const SINGULAR_EPS: f64 = 1e-10;

/// A 3x3 projective transform between two planes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    matrix: Matrix3<f64>,
}

impl Homography {
    /// Wrap an existing matrix.
    pub fn from_matrix(matrix: Matrix3<f64>) -> Self {
        Self { matrix }
    }

    pub fn identity() -> Self {
        Self {
            matrix: Matrix3::identity(),
        }
    }

    /// H such that `project(src[i]) == dst[i]` for all four pairs.
    pub fn from_correspondences(src: &[Point2D; 4], dst: &[Point2D; 4]) -> Result<Self> {
        if src.iter().chain(dst.iter()).any(|p| !p.is_finite()) {
            return Err(ScanError::GeometryDegenerate("non-finite control point".into()));
        }
        let (t_src, src_n) = normalize(src);
        let (t_dst, dst_n) = normalize(dst);

        let mut a = SMatrix::<f64, 8, 8>::zeros();
        let mut b = SVector::<f64, 8>::zeros();
        for i in 0..4 {
            let (x, y) = (src_n[i].x, src_n[i].y);
            let (u, v) = (dst_n[i].x, dst_n[i].y);
            let r = 2 * i;
            // u = (h11 x + h12 y + h13) / (h31 x + h32 y + 1)
            a[(r, 0)] = x;
            a[(r, 1)] = y;
            a[(r, 2)] = 1.0;
            a[(r, 6)] = -x * u;
            a[(r, 7)] = -y * u;
            b[r] = u;
            // v = (h21 x + h22 y + h23) / (h31 x + h32 y + 1)
            a[(r + 1, 3)] = x;
            a[(r + 1, 4)] = y;
            a[(r + 1, 5)] = 1.0;
            a[(r + 1, 6)] = -x * v;
            a[(r + 1, 7)] = -y * v;
            b[r + 1] = v;
        }

        let h = a
            .lu()
            .solve(&b)
            .ok_or_else(|| ScanError::GeometryDegenerate("singular correspondence system".into()))?;
        if h.iter().any(|v| !v.is_finite()) {
            return Err(ScanError::GeometryDegenerate("non-finite homography".into()));
        }
        let normalized = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0);
        if normalized.determinant().abs() < SINGULAR_EPS {
            return Err(ScanError::GeometryDegenerate("homography is rank deficient".into()));
        }

        let t_dst_inv = t_dst
            .try_inverse()
            .ok_or_else(|| ScanError::GeometryDegenerate("degenerate target points".into()))?;
        let mut matrix = t_dst_inv * normalized * t_src;
        let scale = matrix[(2, 2)];
        if scale.abs() > f64::EPSILON {
            matrix /= scale;
        }
        Ok(Self { matrix })
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    /// The reverse mapping.
    pub fn inverse(&self) -> Result<Self> {
        self.matrix
            .try_inverse()
            .map(|matrix| Self { matrix })
            .ok_or_else(|| ScanError::GeometryDegenerate("homography is not invertible".into()))
    }

    /// Map a point. `None` when it lands on the line at infinity.
    #[inline]
    pub fn project(&self, p: Point2D) -> Option<Point2D> {
        let v = self.matrix * Vector3::new(p.x, p.y, 1.0);
        let w = v[2];
        if !w.is_finite() || w.abs() <= 1e-12 {
            return None;
        }
        let out = Point2D::new(v[0] / w, v[1] / w);
        out.is_finite().then_some(out)
    }
}

/// Translate the centroid to the origin and scale the mean radius to sqrt(2).
fn normalize(points: &[Point2D; 4]) -> (Matrix3<f64>, [Point2D; 4]) {
    let cx = points.iter().map(|p| p.x).sum::<f64>() / 4.0;
    let cy = points.iter().map(|p| p.y).sum::<f64>() / 4.0;
    let mean_dist = points
        .iter()
        .map(|p| (p.x - cx).hypot(p.y - cy))
        .sum::<f64>()
        / 4.0;
    let s = if mean_dist > 1e-15 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };
    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    (t, points.map(|p| Point2D::new(s * (p.x - cx), s * (p.y - cy))))
}
