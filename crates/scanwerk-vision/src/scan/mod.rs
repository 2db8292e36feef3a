// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanning pipeline stages -- edge map, quadrilateral search, homography,
// rectification, and monochrome enhancement.

mod contour;
pub mod detect;
pub mod edges;
pub mod enhance;
pub mod homography;
pub mod rectify;
mod threshold;

pub use detect::QuadrilateralFinder;
pub use edges::EdgeMap;
pub use enhance::Enhancer;
pub use homography::Homography;
pub use rectify::PerspectiveCorrector;
