// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Frame sink: the frame source's entry point into a running pipeline.
//
// A latest-value slot. Pushing never blocks; a frame the worker has not
// picked up yet is replaced and counted as dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::types::{FrameBuffer, PixelFormat};
use tokio::sync::watch;
use tracing::{trace, warn};

use crate::stats::PipelineStats;

/// A frame tagged with the sink's sequence number.
#[derive(Debug, Clone)]
pub(crate) struct SequencedFrame {
    pub sequence: u64,
    pub frame: Arc<FrameBuffer>,
}

/// Handle for delivering camera frames. Cheap to clone.
#[derive(Debug, Clone)]
pub struct FrameSink {
    slot: watch::Sender<Option<SequencedFrame>>,
    next_sequence: Arc<AtomicU64>,
    stats: Arc<PipelineStats>,
}

impl FrameSink {
    pub(crate) fn new(slot: watch::Sender<Option<SequencedFrame>>, stats: Arc<PipelineStats>) -> Self {
        Self {
            slot,
            next_sequence: Arc::new(AtomicU64::new(1)),
            stats,
        }
    }

    /// Hand a frame to the pipeline. Returns its sequence number.
    ///
    /// Fails with `NotRunning` once the pipeline this sink belongs to has
    /// stopped.
    pub fn push(&self, frame: FrameBuffer) -> Result<u64> {
        if self.slot.is_closed() {
            return Err(ScanError::NotRunning);
        }
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        PipelineStats::bump(&self.stats.frames_received);

        let previous = self.slot.send_replace(Some(SequencedFrame {
            sequence,
            frame: Arc::new(frame),
        }));
        if let Some(stale) = previous {
            if stale.sequence > self.stats.last_taken.load(Ordering::Relaxed) {
                PipelineStats::bump(&self.stats.frames_dropped);
                trace!(sequence = stale.sequence, "Stale frame replaced");
            }
        }
        Ok(sequence)
    }

    /// Validate raw camera memory and push it.
    pub fn push_raw(
        &self,
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
        data: Vec<u8>,
        timestamp: Duration,
    ) -> Result<u64> {
        match FrameBuffer::with_stride(width, height, stride, format, data, timestamp) {
            Ok(frame) => self.push(frame),
            Err(err) => {
                PipelineStats::bump(&self.stats.frames_invalid);
                warn!(%err, width, height, "Rejected invalid frame");
                Err(err)
            }
        }
    }

    /// Whether the owning pipeline is still accepting frames.
    pub fn is_open(&self) -> bool {
        !self.slot.is_closed()
    }
}
