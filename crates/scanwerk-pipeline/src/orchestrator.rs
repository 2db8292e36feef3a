// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Live scanning pipeline -- runs document detection on every frame the camera
// delivers and services one-shot capture requests.
//
// # Task layout
//
// A single Tokio task owns the detection loop. It waits on three sources:
//
//   - the shutdown flag (highest priority),
//   - the capture request queue,
//   - the frame slot filled by `FrameSink`.
//
// CPU work (edge map, quadrilateral search, rectification, enhancement) runs
// on the blocking pool so the loop itself never stalls the runtime. Because
// captures are serviced by the same loop, a capture always waits for the
// detection pass in progress and then uses the newest processed frame.
//
// # States
//
//   Idle --start--> Detecting --request_capture--> Capturing
//   Capturing --completion--> Detecting
//   Detecting | Capturing --stop--> Idle

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use scanwerk_core::config::{PipelineConfig, StopPolicy};
use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::geometry::Quadrilateral;
use scanwerk_core::types::{
    CaptureId, CaptureResult, FrameBuffer, FrameDetection, PipelineState, RenderMode,
};
use scanwerk_vision::QuadrilateralFinder;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::capture::{CallbackDelivery, CaptureCallback, CaptureTicket, Reply, capture_frame};
use crate::sink::{FrameSink, SequencedFrame};
use crate::stats::{PipelineStats, StatsSnapshot};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// State visible to both the pipeline handle and the worker task.
struct Shared {
    state: Mutex<PipelineState>,
    config: watch::Sender<Arc<PipelineConfig>>,
    detection: watch::Sender<Option<FrameDetection>>,
    stats: Arc<PipelineStats>,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, PipelineState> {
        // The guarded value is a plain enum; a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: PipelineState) {
        let mut state = self.lock_state();
        if *state != next {
            debug!(from = ?*state, to = ?next, "Pipeline state change");
            *state = next;
        }
    }

    fn config(&self) -> Arc<PipelineConfig> {
        Arc::clone(&self.config.borrow())
    }
}

struct CaptureRequest {
    mode: RenderMode,
    reply: Reply,
}

/// Called on the blocking pool with the frame sequence number, before the
/// stage it is attached to.
type StageHook = Arc<dyn Fn(u64) + Send + Sync>;

/// Instrumentation points inside the worker's blocking stages. Empty outside
/// tests.
#[derive(Clone, Default)]
struct StageHooks {
    detect: Option<StageHook>,
    capture: Option<StageHook>,
}

// ---------------------------------------------------------------------------
// Pipeline handle
// ---------------------------------------------------------------------------

/// Continuous document detection with on-demand capture.
///
/// ```ignore
/// let mut pipeline = ScanPipeline::new(PipelineConfig::default())?;
/// let sink = pipeline.start()?;
/// sink.push(frame)?;
/// let result = pipeline.request_capture(RenderMode::Monochrome)?.await?;
/// pipeline.stop().await?;
/// ```
pub struct ScanPipeline {
    shared: Arc<Shared>,
    callback_delivery: CallbackDelivery,
    capture_tx: Option<mpsc::UnboundedSender<CaptureRequest>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    task_handle: Option<JoinHandle<()>>,
    sink: Option<FrameSink>,
    hooks: StageHooks,
}

impl ScanPipeline {
    /// Create an idle pipeline. The configuration is validated here.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let (config_tx, _) = watch::channel(Arc::new(config));
        let (detection_tx, _) = watch::channel(None);
        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(PipelineState::Idle),
                config: config_tx,
                detection: detection_tx,
                stats: Arc::new(PipelineStats::default()),
            }),
            callback_delivery: CallbackDelivery::default(),
            capture_tx: None,
            shutdown_tx: None,
            task_handle: None,
            sink: None,
            hooks: StageHooks::default(),
        })
    }

    /// Choose where callbacks passed to [`Self::request_capture_with`] run.
    pub fn with_callback_delivery(mut self, delivery: CallbackDelivery) -> Self {
        self.callback_delivery = delivery;
        self
    }

    #[cfg(test)]
    fn with_stage_hooks(mut self, hooks: StageHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Spawn the detection loop on the current Tokio runtime and return the
    /// sink the frame source pushes into.
    ///
    /// Calling `start` on a running pipeline returns the existing sink.
    ///
    /// # Errors
    ///
    /// Returns `Worker` when called outside a Tokio runtime.
    pub fn start(&mut self) -> Result<FrameSink> {
        if let Some(sink) = &self.sink {
            debug!("Scan pipeline already running");
            return Ok(sink.clone());
        }

        let runtime = Handle::try_current()
            .map_err(|err| ScanError::Worker(format!("no Tokio runtime: {err}")))?;

        let (frame_tx, frame_rx) = watch::channel(None);
        let (capture_tx, capture_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        self.shared.stats.last_taken.store(0, Ordering::Relaxed);
        self.shared.detection.send_replace(None);

        let sink = FrameSink::new(frame_tx, Arc::clone(&self.shared.stats));
        let worker = Worker {
            shared: Arc::clone(&self.shared),
            frames: frame_rx,
            captures: capture_rx,
            shutdown: shutdown_rx,
            hooks: self.hooks.clone(),
            held: None,
        };

        self.shared.set_state(PipelineState::Detecting);
        self.task_handle = Some(runtime.spawn(worker.run()));
        self.capture_tx = Some(capture_tx);
        self.shutdown_tx = Some(shutdown_tx);
        self.sink = Some(sink.clone());

        info!("Scan pipeline started");
        Ok(sink)
    }

    /// Stop the detection loop and wait for it to exit.
    ///
    /// A capture that is queued or running is finished or cancelled according
    /// to the configured [`StopPolicy`]. Sinks handed out by `start` reject
    /// frames afterwards.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.task_handle.take() else {
            return Ok(());
        };

        info!(policy = ?self.shared.config().stop_policy, "Stopping scan pipeline");

        self.capture_tx = None;
        self.sink = None;
        if let Some(shutdown) = self.shutdown_tx.take() {
            shutdown.send_replace(true);
        }

        let joined = handle.await;
        self.shared.set_state(PipelineState::Idle);
        joined.map_err(|err| ScanError::Worker(format!("pipeline task join: {err}")))?;

        let stats = self.stats();
        info!(
            received = stats.frames_received,
            processed = stats.frames_processed,
            dropped = stats.frames_dropped,
            captures = stats.captures_completed,
            "Scan pipeline stopped"
        );
        Ok(())
    }

    /// Replace the configuration. Takes effect from the next detection pass
    /// or capture.
    pub fn reconfigure(&self, config: PipelineConfig) -> Result<()> {
        config.validate()?;
        info!(
            border_detection = config.border_detection_enabled,
            torch = config.torch_enabled,
            "Pipeline reconfigured"
        );
        self.shared.config.send_replace(Arc::new(config));
        Ok(())
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<PipelineConfig> {
        self.shared.config()
    }

    pub fn state(&self) -> PipelineState {
        *self.shared.lock_state()
    }

    /// Result of the most recently processed frame.
    pub fn latest_detection(&self) -> Option<FrameDetection> {
        self.shared.detection.borrow().clone()
    }

    /// Receiver that is notified after every processed frame.
    pub fn detections(&self) -> watch::Receiver<Option<FrameDetection>> {
        self.shared.detection.subscribe()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Capture the newest processed frame.
    ///
    /// # Errors
    ///
    /// `NotRunning` when the pipeline is idle, `CaptureAlreadyInProgress`
    /// when another capture has not finished yet. Both are returned
    /// immediately; everything else arrives through the ticket.
    pub fn request_capture(&self, mode: RenderMode) -> Result<CaptureTicket> {
        let (reply, ticket) = Reply::ticket(CaptureId::new());
        self.submit(mode, reply)?;
        Ok(ticket)
    }

    /// Like [`Self::request_capture`], delivering the outcome to `callback`
    /// according to the pipeline's [`CallbackDelivery`].
    ///
    /// The callback is not invoked when this returns an error.
    pub fn request_capture_with<F>(&self, mode: RenderMode, callback: F) -> Result<CaptureId>
    where
        F: FnOnce(Result<CaptureResult>) + Send + 'static,
    {
        let id = CaptureId::new();
        let callback: CaptureCallback = Box::new(callback);
        self.submit(mode, Reply::callback(id, callback, self.callback_delivery.clone()))?;
        Ok(id)
    }

    fn submit(&self, mode: RenderMode, reply: Reply) -> Result<()> {
        let Some(tx) = &self.capture_tx else {
            reply.disarm();
            return Err(ScanError::NotRunning);
        };

        {
            let mut state = self.shared.lock_state();
            match *state {
                PipelineState::Idle => {
                    reply.disarm();
                    return Err(ScanError::NotRunning);
                }
                PipelineState::Capturing => {
                    debug!("Capture rejected, another capture is in flight");
                    reply.disarm();
                    return Err(ScanError::CaptureAlreadyInProgress);
                }
                PipelineState::Detecting => *state = PipelineState::Capturing,
            }
        }

        let id = reply.id();
        if let Err(rejected) = tx.send(CaptureRequest { mode, reply }) {
            rejected.0.reply.disarm();
            self.shared.set_state(PipelineState::Idle);
            return Err(ScanError::NotRunning);
        }
        info!(%id, ?mode, "Capture requested");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// A frame after its detection pass.
struct Processed {
    sequence: u64,
    frame: Arc<FrameBuffer>,
    quad: Option<Quadrilateral>,
}

struct Worker {
    shared: Arc<Shared>,
    frames: watch::Receiver<Option<SequencedFrame>>,
    captures: mpsc::UnboundedReceiver<CaptureRequest>,
    shutdown: watch::Receiver<bool>,
    hooks: StageHooks,
    held: Option<Processed>,
}

impl Worker {
    async fn run(mut self) {
        let mut frames_open = true;
        loop {
            tokio::select! {
                biased;
                () = stopped(&mut self.shutdown) => break,
                Some(request) = self.captures.recv() => self.serve(request).await,
                changed = self.frames.changed(), if frames_open => match changed {
                    Ok(()) => self.process_latest().await,
                    Err(_) => frames_open = false,
                },
            }
        }
        self.drain().await;
        debug!("Detection loop exited");
    }

    /// Resolve captures still queued at shutdown.
    async fn drain(&mut self) {
        self.captures.close();
        let policy = self.shared.config().stop_policy;
        while let Ok(request) = self.captures.try_recv() {
            match policy {
                StopPolicy::FinishInFlight => self.serve(request).await,
                StopPolicy::DiscardInFlight => {
                    debug!(id = %request.reply.id(), "Discarding queued capture");
                    request.reply.send(Err(ScanError::CaptureCancelled));
                }
            }
        }
    }

    /// Run a detection pass on the newest frame in the slot.
    async fn process_latest(&mut self) {
        let Some(latest) = self.frames.borrow_and_update().clone() else {
            return;
        };
        let sequence = latest.sequence;
        let stats = &self.shared.stats;
        stats.last_taken.store(sequence, Ordering::Relaxed);

        let config = self.shared.config();
        let started = Instant::now();
        let quad = if config.border_detection_enabled {
            let finder = QuadrilateralFinder::new(config.detection.clone());
            let frame = Arc::clone(&latest.frame);
            let hook = self.hooks.detect.clone();
            let pass = tokio::task::spawn_blocking(move || {
                if let Some(hook) = hook {
                    hook(sequence);
                }
                finder.detect(&frame)
            });
            match pass.await {
                Ok(Ok(quad)) => quad,
                Ok(Err(err)) => {
                    warn!(sequence, %err, "Frame rejected by detector");
                    PipelineStats::bump(&stats.frames_invalid);
                    return;
                }
                Err(err) => {
                    error!(sequence, %err, panicked = err.is_panic(), "Detection pass failed");
                    return;
                }
            }
        } else {
            None
        };
        let processing_time = started.elapsed();

        PipelineStats::bump(&stats.frames_processed);
        if quad.is_some() {
            PipelineStats::bump(&stats.documents_detected);
        }
        debug!(
            sequence,
            detected = quad.is_some(),
            confidence = ?quad.as_ref().map(|q| q.confidence()),
            elapsed_us = processing_time.as_micros() as u64,
            "Frame processed"
        );

        self.shared.detection.send_replace(Some(FrameDetection {
            sequence,
            frame_timestamp: latest.frame.timestamp(),
            quad: quad.clone(),
            processing_time,
        }));
        self.held = Some(Processed {
            sequence,
            frame: latest.frame,
            quad,
        });
    }

    async fn serve(&mut self, request: CaptureRequest) {
        // A frame that arrived before the request is processed first.
        if self.frames.has_changed().unwrap_or(false) {
            self.process_latest().await;
        }

        let CaptureRequest { mode, reply } = request;
        let id = reply.id();
        let outcome = match &self.held {
            None => Err(ScanError::NoFrameAvailable),
            Some(processed) => {
                let sequence = processed.sequence;
                let frame = Arc::clone(&processed.frame);
                let quad = processed.quad.clone();
                let config = self.shared.config();
                let policy = config.stop_policy;
                let hook = self.hooks.capture.clone();
                let mut task = tokio::task::spawn_blocking(move || {
                    if let Some(hook) = hook {
                        hook(sequence);
                    }
                    capture_frame(&frame, quad.as_ref(), mode, &config, id)
                });
                match policy {
                    StopPolicy::FinishInFlight => join_capture(task.await),
                    StopPolicy::DiscardInFlight => tokio::select! {
                        biased;
                        () = stopped(&mut self.shutdown) => {
                            debug!(%id, "Capture cancelled by stop");
                            Err(ScanError::CaptureCancelled)
                        }
                        joined = &mut task => join_capture(joined),
                    },
                }
            }
        };

        match &outcome {
            Ok(_) => PipelineStats::bump(&self.shared.stats.captures_completed),
            Err(err) => warn!(%id, %err, "Capture failed"),
        }
        if !*self.shutdown.borrow() {
            self.shared.set_state(PipelineState::Detecting);
        }
        reply.send(outcome);
    }
}

/// Resolves once stop is requested or the pipeline handle is gone.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

fn join_capture(
    joined: std::result::Result<Result<CaptureResult>, JoinError>,
) -> Result<CaptureResult> {
    joined.unwrap_or_else(|err| {
        error!(%err, "Capture task failed");
        Err(ScanError::Worker(format!("capture task: {err}")))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use std::sync::mpsc as std_mpsc;

    use scanwerk_core::PixelFormat;

    const WAIT: Duration = Duration::from_secs(10);

    fn gray_frame(level: u8) -> FrameBuffer {
        FrameBuffer::filled_gray(64, 48, level, Duration::ZERO).unwrap()
    }

    async fn wait_for_sequence(pipeline: &ScanPipeline, sequence: u64) -> FrameDetection {
        let mut rx = pipeline.detections();
        let detection = tokio::time::timeout(
            WAIT,
            rx.wait_for(|d| d.as_ref().is_some_and(|d| d.sequence >= sequence)),
        )
        .await
        .expect("detection in time")
        .expect("pipeline alive")
        .clone();
        detection.expect("some detection")
    }

    /// Hooks that hold the capture stage until the test releases it.
    fn held_capture() -> (StageHooks, std_mpsc::Receiver<()>, std_mpsc::Sender<()>) {
        let (started_tx, started_rx) = std_mpsc::channel();
        let (release_tx, release_rx) = std_mpsc::channel::<()>();
        let started_tx = Mutex::new(started_tx);
        let release_rx = Mutex::new(release_rx);
        let hooks = StageHooks {
            capture: Some(Arc::new(move |_: u64| {
                let _ = started_tx.lock().unwrap().send(());
                let _ = release_rx.lock().unwrap().recv_timeout(WAIT);
            })),
            ..StageHooks::default()
        };
        (hooks, started_rx, release_tx)
    }

    /// A running pipeline whose capture stage has started and is blocked.
    async fn capture_in_flight(
        policy: StopPolicy,
    ) -> (ScanPipeline, CaptureTicket, std_mpsc::Sender<()>) {
        let (hooks, started, release) = held_capture();
        let mut pipeline = pipeline_with(policy).with_stage_hooks(hooks);
        let sink = pipeline.start().unwrap();
        let sequence = sink.push(gray_frame(200)).unwrap();
        wait_for_sequence(&pipeline, sequence).await;

        let ticket = pipeline.request_capture(RenderMode::Normal).unwrap();
        tokio::task::spawn_blocking(move || started.recv_timeout(WAIT))
            .await
            .unwrap()
            .expect("capture stage started");
        assert_eq!(pipeline.state(), PipelineState::Capturing);
        (pipeline, ticket, release)
    }

    fn pipeline_with(policy: StopPolicy) -> ScanPipeline {
        ScanPipeline::new(PipelineConfig {
            stop_policy: policy,
            ..PipelineConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn capture_before_start_is_rejected() {
        let pipeline = ScanPipeline::new(PipelineConfig::default()).unwrap();
        assert_eq!(pipeline.state(), PipelineState::Idle);
        assert!(matches!(
            pipeline.request_capture(RenderMode::Normal),
            Err(ScanError::NotRunning)
        ));
    }

    #[test]
    fn start_outside_runtime_fails() {
        let mut pipeline = ScanPipeline::new(PipelineConfig::default()).unwrap();
        assert!(matches!(pipeline.start(), Err(ScanError::Worker(_))));
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = PipelineConfig::default();
        config.detection.max_dimension = 0;
        assert!(matches!(
            ScanPipeline::new(config),
            Err(ScanError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn start_twice_is_a_noop() {
        let mut pipeline = ScanPipeline::new(PipelineConfig::default()).unwrap();
        let first = pipeline.start().unwrap();
        let second = pipeline.start().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Detecting);
        first.push(gray_frame(10)).unwrap();
        assert_eq!(second.push(gray_frame(10)).unwrap(), 2);
        pipeline.stop().await.unwrap();
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }

    #[tokio::test]
    async fn capture_without_frames_reports_no_frame() {
        let mut pipeline = ScanPipeline::new(PipelineConfig::default()).unwrap();
        pipeline.start().unwrap();
        let ticket = pipeline.request_capture(RenderMode::Normal).unwrap();
        let outcome = ticket.wait_timeout(WAIT).await;
        assert!(matches!(outcome, Err(ScanError::NoFrameAvailable)));
        assert_eq!(pipeline.state(), PipelineState::Detecting);
        pipeline.stop().await.unwrap();
    }

    #[tokio::test]
    async fn second_immediate_capture_is_rejected() {
        let mut pipeline = ScanPipeline::new(PipelineConfig::default()).unwrap();
        let sink = pipeline.start().unwrap();
        sink.push(gray_frame(90)).unwrap();
        wait_for_sequence(&pipeline, 1).await;

        let first = pipeline.request_capture(RenderMode::Normal).unwrap();
        let second = pipeline.request_capture(RenderMode::Normal);
        assert!(matches!(second, Err(ScanError::CaptureAlreadyInProgress)));

        let result = first.wait_timeout(WAIT).await.unwrap();
        assert_eq!(result.image, gray_frame(90));
        assert_eq!(pipeline.stats().captures_completed, 1);

        // The pipeline accepts captures again once the first completes.
        let third = pipeline.request_capture(RenderMode::Monochrome).unwrap();
        assert!(third.wait_timeout(WAIT).await.is_ok());
        pipeline.stop().await.unwrap();
    }

    #[tokio::test]
    async fn blank_frames_publish_empty_detections() {
        let mut pipeline = ScanPipeline::new(PipelineConfig::default()).unwrap();
        let sink = pipeline.start().unwrap();
        sink.push(gray_frame(128)).unwrap();
        let detection = wait_for_sequence(&pipeline, 1).await;
        assert!(detection.quad.is_none());
        assert_eq!(pipeline.latest_detection(), Some(detection));
        assert_eq!(pipeline.stats().frames_processed, 1);
        pipeline.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_discards_queued_capture() {
        let mut pipeline = pipeline_with(StopPolicy::DiscardInFlight);
        let sink = pipeline.start().unwrap();
        sink.push(gray_frame(60)).unwrap();
        wait_for_sequence(&pipeline, 1).await;

        let ticket = pipeline.request_capture(RenderMode::Normal).unwrap();
        pipeline.stop().await.unwrap();
        assert!(matches!(
            ticket.wait_timeout(WAIT).await,
            Err(ScanError::CaptureCancelled)
        ));
    }

    #[tokio::test]
    async fn stop_finishes_queued_capture() {
        let mut pipeline = pipeline_with(StopPolicy::FinishInFlight);
        let sink = pipeline.start().unwrap();
        sink.push(gray_frame(60)).unwrap();
        wait_for_sequence(&pipeline, 1).await;

        let ticket = pipeline.request_capture(RenderMode::Normal).unwrap();
        pipeline.stop().await.unwrap();
        let result = ticket.wait_timeout(WAIT).await.unwrap();
        assert_eq!(result.image, gray_frame(60));
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }

    #[tokio::test]
    async fn sink_rejects_frames_after_stop() {
        let mut pipeline = ScanPipeline::new(PipelineConfig::default()).unwrap();
        let sink = pipeline.start().unwrap();
        pipeline.stop().await.unwrap();
        assert!(matches!(sink.push(gray_frame(1)), Err(ScanError::NotRunning)));
        assert!(matches!(
            pipeline.request_capture(RenderMode::Normal),
            Err(ScanError::NotRunning)
        ));
    }

    #[tokio::test]
    async fn invalid_raw_frames_are_counted() {
        let mut pipeline = ScanPipeline::new(PipelineConfig::default()).unwrap();
        let sink = pipeline.start().unwrap();
        let err = sink
            .push_raw(0, 10, 0, PixelFormat::Gray8, Vec::new(), Duration::ZERO)
            .unwrap_err();
        assert!(matches!(err, ScanError::InvalidFrame(_)));
        assert_eq!(pipeline.stats().frames_invalid, 1);
        assert_eq!(pipeline.stats().frames_received, 0);
        pipeline.stop().await.unwrap();
    }

    #[tokio::test]
    async fn callback_runs_on_the_worker() {
        let mut pipeline = ScanPipeline::new(PipelineConfig::default()).unwrap();
        let sink = pipeline.start().unwrap();
        sink.push(gray_frame(30)).unwrap();
        wait_for_sequence(&pipeline, 1).await;

        let (tx, rx) = tokio::sync::oneshot::channel();
        let id = pipeline
            .request_capture_with(RenderMode::Normal, move |outcome| {
                let _ = tx.send(outcome.map(|result| result.id));
            })
            .unwrap();
        let delivered = tokio::time::timeout(WAIT, rx).await.unwrap().unwrap();
        assert_eq!(delivered.unwrap(), id);
        pipeline.stop().await.unwrap();
    }

    #[tokio::test]
    async fn callback_can_be_sent_to_a_runtime() {
        let mut pipeline = ScanPipeline::new(PipelineConfig::default())
            .unwrap()
            .with_callback_delivery(CallbackDelivery::Runtime(Handle::current()));
        let sink = pipeline.start().unwrap();
        sink.push(gray_frame(30)).unwrap();
        wait_for_sequence(&pipeline, 1).await;

        let (tx, rx) = tokio::sync::oneshot::channel();
        pipeline
            .request_capture_with(RenderMode::Monochrome, move |outcome| {
                let _ = tx.send(outcome.map(|result| result.image.format()));
            })
            .unwrap();
        let format = tokio::time::timeout(WAIT, rx).await.unwrap().unwrap();
        assert_eq!(format.unwrap(), PixelFormat::Gray8);
        pipeline.stop().await.unwrap();
    }

    #[tokio::test]
    async fn rejected_request_does_not_invoke_callback() {
        let pipeline = ScanPipeline::new(PipelineConfig::default()).unwrap();
        let called = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&called);
        let outcome = pipeline.request_capture_with(RenderMode::Normal, move |_| {
            flag.store(true, Ordering::SeqCst);
        });
        assert!(matches!(outcome, Err(ScanError::NotRunning)));
        assert!(!called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn reconfigure_disables_detection() {
        let mut pipeline = ScanPipeline::new(PipelineConfig::default()).unwrap();
        let sink = pipeline.start().unwrap();
        pipeline
            .reconfigure(PipelineConfig {
                border_detection_enabled: false,
                ..PipelineConfig::default()
            })
            .unwrap();
        assert!(!pipeline.config().border_detection_enabled);

        sink.push(gray_frame(200)).unwrap();
        wait_for_sequence(&pipeline, 1).await;
        let result = pipeline
            .request_capture(RenderMode::Normal)
            .unwrap()
            .wait_timeout(WAIT)
            .await
            .unwrap();
        assert_eq!(
            result.correction,
            scanwerk_core::Correction::FullFrame(scanwerk_core::FallbackReason::DetectionDisabled)
        );
        pipeline.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_cancels_running_capture_when_discarding() {
        let (mut pipeline, ticket, release) =
            capture_in_flight(StopPolicy::DiscardInFlight).await;

        pipeline.stop().await.unwrap();
        let outcome = ticket.wait_timeout(WAIT).await;
        assert!(matches!(outcome, Err(ScanError::CaptureCancelled)));
        assert_eq!(pipeline.state(), PipelineState::Idle);
        assert_eq!(pipeline.stats().captures_completed, 0);

        // Let the abandoned blocking task finish before the runtime shuts down.
        let _ = release.send(());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_waits_for_running_capture_when_finishing() {
        let (mut pipeline, ticket, release) =
            capture_in_flight(StopPolicy::FinishInFlight).await;

        let (stopped, outcome) = tokio::join!(pipeline.stop(), async move {
            release.send(()).unwrap();
            ticket.wait_timeout(WAIT).await
        });
        stopped.unwrap();
        let result = outcome.unwrap();
        assert_eq!(result.image.width(), 64);
        assert_eq!(pipeline.state(), PipelineState::Idle);
        assert_eq!(pipeline.stats().captures_completed, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panicked_detection_pass_does_not_stop_the_loop() {
        let hooks = StageHooks {
            detect: Some(Arc::new(|sequence: u64| {
                if sequence == 1 {
                    panic!("detector failure on frame {sequence}");
                }
            })),
            ..StageHooks::default()
        };
        let mut pipeline = ScanPipeline::new(PipelineConfig::default())
            .unwrap()
            .with_stage_hooks(hooks);
        let sink = pipeline.start().unwrap();

        sink.push(gray_frame(10)).unwrap();
        tokio::time::timeout(WAIT, async {
            while pipeline.shared.stats.last_taken.load(Ordering::Relaxed) < 1 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("first frame taken");

        let second = sink.push(gray_frame(20)).unwrap();
        let detection = wait_for_sequence(&pipeline, second).await;
        assert_eq!(detection.sequence, 2);
        assert_eq!(pipeline.state(), PipelineState::Detecting);
        assert_eq!(pipeline.stats().frames_processed, 1);
        pipeline.stop().await.unwrap();
    }
}
