// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stub camera for builds without a capture backend.
//
// Every operation returns `PlatformUnavailable`.

use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::geometry::Point2D;
use scanwerk_core::types::FrameBuffer;

use crate::traits::*;

/// No-op camera returned by [`crate::platform_camera`].
pub struct StubCamera;

impl CameraDevice for StubCamera {
    fn platform_name(&self) -> &str {
        "Desktop (stub)"
    }
}

impl FrameSource for StubCamera {
    fn next_frame(&mut self) -> Result<Option<FrameBuffer>> {
        tracing::warn!("FrameSource::next_frame called on stub camera");
        Err(ScanError::PlatformUnavailable)
    }
}

impl TorchControl for StubCamera {
    fn set_torch(&mut self, _enabled: bool) -> Result<()> {
        tracing::warn!("TorchControl::set_torch called on stub camera");
        Err(ScanError::PlatformUnavailable)
    }

    fn torch_enabled(&self) -> bool {
        false
    }
}

impl FocusControl for StubCamera {
    fn focus_at(&mut self, _point: Point2D) -> FocusCompletion {
        tracing::warn!("FocusControl::focus_at called on stub camera");
        resolved_focus(Err(ScanError::PlatformUnavailable))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_capability_is_unavailable() {
        let mut camera = StubCamera;
        assert!(matches!(camera.next_frame(), Err(ScanError::PlatformUnavailable)));
        assert!(matches!(camera.set_torch(true), Err(ScanError::PlatformUnavailable)));
        assert!(!camera.torch_enabled());
    }

    #[tokio::test]
    async fn focus_resolves_with_error() {
        let mut camera = StubCamera;
        let outcome = camera.focus_at(Point2D::new(1.0, 2.0)).await.expect("sender kept");
        assert!(matches!(outcome, Err(ScanError::PlatformUnavailable)));
    }

    #[test]
    fn platform_camera_is_the_stub() {
        assert_eq!(crate::platform_camera().platform_name(), "Desktop (stub)");
    }
}
