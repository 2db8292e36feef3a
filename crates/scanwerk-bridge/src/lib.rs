// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// scanwerk-bridge: camera device abstractions.
//
// The scanning pipeline never talks to hardware directly. Hosts hand it
// frames from a `FrameSource` and route torch / focus requests through the
// same device object. `SyntheticCamera` renders a document scene for demos
// and tests; `StubCamera` stands in where no camera is wired up.

pub mod stub;
pub mod synthetic;
pub mod traits;

pub use stub::StubCamera;
pub use synthetic::{SyntheticCamera, SyntheticScene};
pub use traits::{CameraDevice, FocusCompletion, FocusControl, FrameSource, TorchControl};

/// The camera for the current platform.
///
/// No native capture backend is linked into this build, so this is always
/// the stub; hosts with a real camera implement [`CameraDevice`] themselves.
pub fn platform_camera() -> Box<dyn CameraDevice> {
    Box::new(StubCamera)
}
