// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// One-shot capture: the correction + enhancement step, and the completion
// plumbing (tickets and callbacks) that hands its result back to the caller.

use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::Utc;
use scanwerk_core::config::PipelineConfig;
use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::geometry::Quadrilateral;
use scanwerk_core::types::{
    CaptureId, CaptureResult, Correction, FallbackReason, FrameBuffer, RenderMode,
};
use scanwerk_vision::{Enhancer, PerspectiveCorrector, QuadrilateralFinder};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, error, info, instrument, warn};

/// Boxed completion callback for [`crate::ScanPipeline::request_capture_with`].
pub type CaptureCallback = Box<dyn FnOnce(Result<CaptureResult>) + Send + 'static>;

// ---------------------------------------------------------------------------
// Capture step
// ---------------------------------------------------------------------------

/// Turn a frame and its detection into a capture result.
///
/// Without a usable quadrilateral the full frame is returned, with the
/// reason recorded in [`CaptureResult::correction`]. A degenerate
/// quadrilateral is not an error here.
#[instrument(skip_all, fields(id = %id, mode = ?mode, width = frame.width(), height = frame.height()))]
pub fn capture_frame(
    frame: &FrameBuffer,
    quad: Option<&Quadrilateral>,
    mode: RenderMode,
    config: &PipelineConfig,
    id: CaptureId,
) -> Result<CaptureResult> {
    let (image, correction) = match quad {
        _ if !config.border_detection_enabled => (
            frame.clone(),
            Correction::FullFrame(FallbackReason::DetectionDisabled),
        ),
        None => (
            frame.clone(),
            Correction::FullFrame(FallbackReason::NoDetection),
        ),
        Some(quad) => {
            let corrector = PerspectiveCorrector::new(config.correction.clone());
            match corrector.rectify(frame, quad) {
                Ok(rectified) => (rectified, Correction::Rectified(quad.clone())),
                Err(ScanError::GeometryDegenerate(reason)) => {
                    warn!(%reason, "Degenerate quadrilateral, falling back to full frame");
                    (
                        frame.clone(),
                        Correction::FullFrame(FallbackReason::GeometryDegenerate),
                    )
                }
                Err(err) => return Err(err),
            }
        }
    };

    let image = match mode {
        RenderMode::Normal => image,
        RenderMode::Monochrome => Enhancer::new(config.enhance.clone()).monochrome(&image)?,
    };

    info!(
        width = image.width(),
        height = image.height(),
        rectified = matches!(correction, Correction::Rectified(_)),
        "Capture complete"
    );

    Ok(CaptureResult {
        id,
        image,
        correction,
        mode,
        source_timestamp: frame.timestamp(),
        completed_at: Utc::now(),
    })
}

/// Detect, rectify and enhance a single still frame.
///
/// The synchronous counterpart of a live capture, for callers that already
/// hold the image (file import, command-line use).
pub fn scan_frame(
    frame: &FrameBuffer,
    mode: RenderMode,
    config: &PipelineConfig,
) -> Result<CaptureResult> {
    config.validate()?;
    let quad = if config.border_detection_enabled {
        QuadrilateralFinder::new(config.detection.clone()).detect(frame)?
    } else {
        None
    };
    capture_frame(frame, quad.as_ref(), mode, config, CaptureId::new())
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

/// Where a capture callback runs.
#[derive(Debug, Clone, Default)]
pub enum CallbackDelivery {
    /// On the pipeline worker, right after the capture finishes.
    #[default]
    Worker,
    /// Spawned onto the given runtime.
    Runtime(Handle),
}

/// Pending result of [`crate::ScanPipeline::request_capture`].
///
/// Resolves exactly once. If the pipeline goes away without producing a
/// result the ticket resolves to `CaptureCancelled`.
#[derive(Debug)]
pub struct CaptureTicket {
    id: CaptureId,
    rx: oneshot::Receiver<Result<CaptureResult>>,
}

impl CaptureTicket {
    pub fn id(&self) -> CaptureId {
        self.id
    }

    /// Wait at most `timeout` for the result.
    ///
    /// On timeout the ticket is consumed; the capture itself still runs to
    /// completion on the worker and its result is discarded.
    pub async fn wait_timeout(self, timeout: Duration) -> Result<CaptureResult> {
        match tokio::time::timeout(timeout, self).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ScanError::CaptureTimedOut(timeout)),
        }
    }
}

impl Future for CaptureTicket {
    type Output = Result<CaptureResult>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(ScanError::CaptureCancelled)))
    }
}

enum ReplyTarget {
    Ticket(oneshot::Sender<Result<CaptureResult>>),
    Callback {
        callback: CaptureCallback,
        delivery: CallbackDelivery,
    },
}

/// The worker's half of a capture request.
///
/// Dropping an unsent reply resolves the caller with `CaptureCancelled`.
pub(crate) struct Reply {
    id: CaptureId,
    target: Option<ReplyTarget>,
}

impl Reply {
    pub fn ticket(id: CaptureId) -> (Self, CaptureTicket) {
        let (tx, rx) = oneshot::channel();
        let reply = Self {
            id,
            target: Some(ReplyTarget::Ticket(tx)),
        };
        (reply, CaptureTicket { id, rx })
    }

    pub fn callback(id: CaptureId, callback: CaptureCallback, delivery: CallbackDelivery) -> Self {
        Self {
            id,
            target: Some(ReplyTarget::Callback { callback, delivery }),
        }
    }

    pub fn id(&self) -> CaptureId {
        self.id
    }

    pub fn send(mut self, outcome: Result<CaptureResult>) {
        if let Some(target) = self.target.take() {
            deliver(self.id, target, outcome);
        }
    }

    /// Drop without notifying the caller. Used when the request was
    /// rejected synchronously and the caller already has the error.
    pub fn disarm(mut self) {
        self.target = None;
    }
}

impl Drop for Reply {
    fn drop(&mut self) {
        if let Some(target) = self.target.take() {
            debug!(id = %self.id, "Capture reply dropped unsent");
            deliver(self.id, target, Err(ScanError::CaptureCancelled));
        }
    }
}

fn deliver(id: CaptureId, target: ReplyTarget, outcome: Result<CaptureResult>) {
    match target {
        ReplyTarget::Ticket(tx) => {
            if tx.send(outcome).is_err() {
                debug!(%id, "Capture ticket dropped before completion");
            }
        }
        ReplyTarget::Callback { callback, delivery } => match delivery {
            CallbackDelivery::Worker => invoke(id, callback, outcome),
            CallbackDelivery::Runtime(handle) => {
                handle.spawn(async move { invoke(id, callback, outcome) });
            }
        },
    }
}

fn invoke(id: CaptureId, callback: CaptureCallback, outcome: Result<CaptureResult>) {
    if catch_unwind(AssertUnwindSafe(|| callback(outcome))).is_err() {
        error!(%id, "Capture callback panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanwerk_core::geometry::Point2D;

    fn gray_frame() -> FrameBuffer {
        let data: Vec<u8> = (0..120u32 * 90).map(|i| (i % 251) as u8).collect();
        FrameBuffer::new(120, 90, scanwerk_core::PixelFormat::Gray8, data, Duration::from_millis(40))
            .unwrap()
    }

    fn inner_quad() -> Quadrilateral {
        Quadrilateral::new(
            [
                Point2D::new(10.0, 10.0),
                Point2D::new(100.0, 12.0),
                Point2D::new(105.0, 80.0),
                Point2D::new(8.0, 78.0),
            ],
            0.9,
            120,
            90,
        )
        .unwrap()
    }

    #[test]
    fn rectifies_with_a_quad() {
        let frame = gray_frame();
        let quad = inner_quad();
        let result = capture_frame(
            &frame,
            Some(&quad),
            RenderMode::Normal,
            &PipelineConfig::default(),
            CaptureId::new(),
        )
        .unwrap();
        assert_eq!(result.correction, Correction::Rectified(quad));
        assert!(result.is_rectified());
        assert_eq!(result.source_timestamp, Duration::from_millis(40));
        assert!(result.image.width() < frame.width());
    }

    #[test]
    fn falls_back_without_a_quad() {
        let frame = gray_frame();
        let result = capture_frame(
            &frame,
            None,
            RenderMode::Normal,
            &PipelineConfig::default(),
            CaptureId::new(),
        )
        .unwrap();
        assert_eq!(
            result.correction,
            Correction::FullFrame(FallbackReason::NoDetection)
        );
        assert_eq!(result.image, frame);
    }

    #[test]
    fn disabled_detection_ignores_the_quad() {
        let config = PipelineConfig {
            border_detection_enabled: false,
            ..PipelineConfig::default()
        };
        let result = capture_frame(
            &gray_frame(),
            Some(&inner_quad()),
            RenderMode::Normal,
            &config,
            CaptureId::new(),
        )
        .unwrap();
        assert_eq!(
            result.correction,
            Correction::FullFrame(FallbackReason::DetectionDisabled)
        );
    }

    #[test]
    fn degenerate_quad_falls_back_to_full_frame() {
        let frame = gray_frame();
        let sliver = Quadrilateral::new(
            [
                Point2D::new(10.0, 10.0),
                Point2D::new(60.0, 10.5),
                Point2D::new(110.0, 11.0),
                Point2D::new(60.0, 12.0),
            ],
            0.9,
            120,
            90,
        )
        .unwrap();
        let result = capture_frame(
            &frame,
            Some(&sliver),
            RenderMode::Monochrome,
            &PipelineConfig::default(),
            CaptureId::new(),
        )
        .unwrap();
        assert_eq!(
            result.correction,
            Correction::FullFrame(FallbackReason::GeometryDegenerate)
        );
        assert_eq!(result.image.format(), scanwerk_core::PixelFormat::Gray8);
        assert_eq!((result.image.width(), result.image.height()), (120, 90));
    }

    #[test]
    fn scan_frame_of_blank_image_is_full_frame() {
        let frame = FrameBuffer::filled_gray(64, 48, 128, Duration::ZERO).unwrap();
        let result = scan_frame(&frame, RenderMode::Normal, &PipelineConfig::default()).unwrap();
        assert_eq!(
            result.correction,
            Correction::FullFrame(FallbackReason::NoDetection)
        );
    }

    #[tokio::test]
    async fn dropped_reply_cancels_the_ticket() {
        let (reply, ticket) = Reply::ticket(CaptureId::new());
        drop(reply);
        assert!(matches!(ticket.await, Err(ScanError::CaptureCancelled)));
    }

    #[tokio::test]
    async fn ticket_times_out() {
        let (_reply, ticket) = Reply::ticket(CaptureId::new());
        let outcome = ticket.wait_timeout(Duration::from_millis(10)).await;
        assert!(matches!(outcome, Err(ScanError::CaptureTimedOut(_))));
    }

    #[test]
    fn disarmed_reply_stays_silent() {
        let called = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = std::sync::Arc::clone(&called);
        let reply = Reply::callback(
            CaptureId::new(),
            Box::new(move |_| flag.store(true, std::sync::atomic::Ordering::SeqCst)),
            CallbackDelivery::Worker,
        );
        reply.disarm();
        assert!(!called.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn panicking_callback_is_contained() {
        let reply = Reply::callback(
            CaptureId::new(),
            Box::new(|_| panic!("callback failure")),
            CallbackDelivery::Worker,
        );
        reply.send(Err(ScanError::NoFrameAvailable));
    }
}
