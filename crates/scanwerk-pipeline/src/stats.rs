// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline counters, shared between the frame sink and the worker.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Live counters. All updates are relaxed; readers get a best-effort view.
#[derive(Debug, Default)]
pub(crate) struct PipelineStats {
    pub frames_received: AtomicU64,
    pub frames_processed: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub frames_invalid: AtomicU64,
    pub documents_detected: AtomicU64,
    pub captures_completed: AtomicU64,
    /// Sequence number of the newest frame the worker has taken.
    pub last_taken: AtomicU64,
}

impl PipelineStats {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_invalid: self.frames_invalid.load(Ordering::Relaxed),
            documents_detected: self.documents_detected.load(Ordering::Relaxed),
            captures_completed: self.captures_completed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the pipeline counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    /// Frames accepted by the sink.
    pub frames_received: u64,
    /// Frames that went through a detection pass.
    pub frames_processed: u64,
    /// Frames overwritten in the sink before the worker took them.
    pub frames_dropped: u64,
    /// Raw frames rejected by validation.
    pub frames_invalid: u64,
    /// Processed frames in which a document was found.
    pub documents_detected: u64,
    /// Capture requests resolved with a result.
    pub captures_completed: u64,
}
