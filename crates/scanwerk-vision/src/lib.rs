// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// scanwerk-vision -- The image side of the Scanwerk document scanner.
//
// Provides edge extraction, the document quadrilateral search, homography
// estimation, perspective rectification, monochrome scan enhancement, and
// conversion between `FrameBuffer` and the `image` crate types.

pub mod image;
pub mod scan;

// Re-export the primary structs so callers can use `scanwerk_vision::QuadrilateralFinder` etc.
pub use crate::image::convert::{decode_frame, encode_png, load_frame, save_frame, to_dynamic, to_gray_image};
pub use scan::detect::QuadrilateralFinder;
pub use scan::edges::EdgeMap;
pub use scan::enhance::Enhancer;
pub use scan::homography::Homography;
pub use scan::rectify::PerspectiveCorrector;
