// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Platform-agnostic camera capabilities.

use scanwerk_core::error::Result;
use scanwerk_core::geometry::Point2D;
use scanwerk_core::types::FrameBuffer;
use tokio::sync::oneshot;

/// Resolves once the device has settled focus (or failed to).
///
/// Detection keeps running while focus is in progress; nothing in the
/// pipeline waits on this.
pub type FocusCompletion = oneshot::Receiver<Result<()>>;

/// A camera as seen by the scanner: frames plus the controls the scanner UI
/// exposes.
pub trait CameraDevice: FrameSource + TorchControl + FocusControl + Send {
    /// Human-readable device name (e.g. "Rear camera", "Synthetic").
    fn platform_name(&self) -> &str;
}

/// Continuous frame delivery.
pub trait FrameSource {
    /// The next frame, or `Ok(None)` when the stream has ended.
    fn next_frame(&mut self) -> Result<Option<FrameBuffer>>;
}

/// Flash / torch control.
pub trait TorchControl {
    /// Switch the torch on or off.
    fn set_torch(&mut self, enabled: bool) -> Result<()>;

    /// Whether the torch is currently on.
    fn torch_enabled(&self) -> bool;
}

/// Tap-to-focus.
pub trait FocusControl {
    /// Focus (and meter exposure) at a point in frame pixels.
    fn focus_at(&mut self, point: Point2D) -> FocusCompletion;
}

/// A focus completion that has already resolved with `result`.
pub fn resolved_focus(result: Result<()>) -> FocusCompletion {
    let (tx, rx) = oneshot::channel();
    // The receiver is still held here, so this send cannot fail.
    let _ = tx.send(result);
    rx
}
