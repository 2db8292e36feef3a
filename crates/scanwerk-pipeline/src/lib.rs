// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// scanwerk-pipeline -- live detection loop and one-shot capture.
//
// Frames enter through a `FrameSink`, detections leave through a watch
// channel, and captures resolve through a `CaptureTicket` or a callback.

pub mod capture;
pub mod orchestrator;
pub mod sink;
mod stats;

pub use capture::{CallbackDelivery, CaptureCallback, CaptureTicket, capture_frame, scan_frame};
pub use orchestrator::ScanPipeline;
pub use sink::FrameSink;
pub use stats::StatsSnapshot;
