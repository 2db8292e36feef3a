// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image module -- conversion between `FrameBuffer` and `image` crate buffers,
// plus file and in-memory encode/decode.

pub mod convert;

pub use convert::{decode_frame, encode_png, load_frame, save_frame, to_dynamic, to_gray_image};
