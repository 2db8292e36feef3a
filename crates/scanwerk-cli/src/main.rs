// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanwerk -- command-line document scanner.
//
// Entry point. Initialises logging, parses the command line, and runs one of
// the `detect`, `scan` or `demo` commands. Errors are printed in plain
// language; the raw error goes to the log.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use scanwerk_bridge::{
    CameraDevice, FocusControl, FrameSource, SyntheticCamera, SyntheticScene, TorchControl,
    platform_camera,
};
use scanwerk_core::config::PipelineConfig;
use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::geometry::Point2D;
use scanwerk_core::human_errors::humanize_error;
use scanwerk_core::types::{Correction, FrameBuffer, RenderMode};
use scanwerk_pipeline::{FrameSink, ScanPipeline, scan_frame};
use scanwerk_vision::image::convert::from_gray_image;
use scanwerk_vision::{EdgeMap, QuadrilateralFinder, decode_frame, encode_png, load_frame, save_frame};
use tracing::{debug, error, info, warn};

/// Path value meaning stdin (input) or stdout (output).
const STDIO_PATH: &str = "-";

/// Longest the demo waits for a single frame or the capture.
const DEMO_WAIT: Duration = Duration::from_secs(30);

#[derive(Debug, Parser)]
#[command(name = "scanwerk")]
#[command(about = "Find documents in photos, straighten them, and clean them up for reading")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the document outline found in an image as JSON.
    Detect(DetectArgs),

    /// Detect, straighten and optionally binarize a document image.
    Scan(ScanArgs),

    /// Run the live pipeline against a camera and take one capture.
    Demo(DemoArgs),
}

#[derive(Debug, Clone, Args)]
struct DetectArgs {
    /// Input image (`-` reads stdin).
    image: PathBuf,

    /// Pipeline settings (JSON).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Also write the edge-strength map as a PNG.
    #[arg(long)]
    edges: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct ScanArgs {
    /// Input image (`-` reads stdin).
    image: PathBuf,

    /// Output image; the format follows the extension (`-` writes PNG to stdout).
    output: PathBuf,

    /// Rendering of the straightened page. Defaults to the config value.
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Pipeline settings (JSON).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct DemoArgs {
    /// Number of frames to stream before capturing.
    #[arg(long, default_value = "10")]
    frames: u64,

    /// Rendering of the capture. Defaults to the config value.
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Where to write the captured image.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Frame source.
    #[arg(long, value_enum, default_value_t = CameraArg::Synthetic)]
    camera: CameraArg,

    /// Per-frame corner shake of the synthetic page, in pixels.
    #[arg(long, default_value = "1.5")]
    jitter: f64,

    /// Pipeline settings (JSON).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Normal,
    Monochrome,
}

impl From<ModeArg> for RenderMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Normal => RenderMode::Normal,
            ModeArg::Monochrome => RenderMode::Monochrome,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CameraArg {
    Synthetic,
    Platform,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::Detect(args) => run_detect(&args),
        Commands::Scan(args) => run_scan(&args),
        Commands::Demo(args) => run_demo(&args).await,
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "command failed");
            let human = humanize_error(&err);
            eprintln!("{}\n{}", human.message, human.suggestion);
            ExitCode::FAILURE
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn run_detect(args: &DetectArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let frame = read_frame(&args.image)?;
    info!(width = frame.width(), height = frame.height(), "Image loaded");

    let edges = EdgeMap::compute(&frame, &config.detection)?;
    if let Some(path) = &args.edges {
        let preview = from_gray_image(edges.to_preview(), frame.timestamp())?;
        save_frame(&preview, path)?;
        info!(path = %path.display(), "Edge map written");
    }

    match QuadrilateralFinder::new(config.detection.clone()).find(&edges) {
        Some(quad) => println!("{}", serde_json::to_string_pretty(&quad)?),
        None => println!("no document detected"),
    }
    Ok(())
}

fn run_scan(args: &ScanArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let mode = args.mode.map_or(config.default_render_mode, RenderMode::from);
    let frame = read_frame(&args.image)?;

    let result = scan_frame(&frame, mode, &config)?;
    describe_correction(&result.correction);
    write_frame(&result.image, &args.output)?;
    info!(
        id = %result.id,
        width = result.image.width(),
        height = result.image.height(),
        "Scan written"
    );
    Ok(())
}

async fn run_demo(args: &DemoArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let mode = args.mode.map_or(config.default_render_mode, RenderMode::from);

    let mut camera: Box<dyn CameraDevice> = match args.camera {
        CameraArg::Synthetic => Box::new(
            SyntheticCamera::new(SyntheticScene {
                jitter: args.jitter.max(0.0),
                ..SyntheticScene::default()
            })
            .with_frame_limit(args.frames),
        ),
        CameraArg::Platform => platform_camera(),
    };
    info!(camera = camera.platform_name(), frames = args.frames, ?mode, "Demo starting");

    if config.torch_enabled {
        if let Err(err) = camera.set_torch(true) {
            warn!(error = %err, "Torch unavailable, continuing without it");
        }
    }

    let mut pipeline = ScanPipeline::new(config)?;
    let sink = pipeline.start()?;

    // The pipeline is stopped on every path, including a failing camera.
    let streamed = stream_frames(camera.as_mut(), &pipeline, &sink, args.frames).await;
    let captured = match streamed {
        Ok(()) => match pipeline.request_capture(mode) {
            Ok(ticket) => ticket.wait_timeout(DEMO_WAIT).await,
            Err(err) => Err(err),
        },
        Err(err) => Err(err),
    };
    pipeline.stop().await?;
    let result = captured?;

    describe_correction(&result.correction);
    if let Some(path) = &args.output {
        write_frame(&result.image, path)?;
    }
    println!("{}", serde_json::to_string_pretty(&pipeline.stats())?);
    Ok(())
}

/// Push up to `frames` camera frames, waiting for each detection pass.
async fn stream_frames(
    camera: &mut dyn CameraDevice,
    pipeline: &ScanPipeline,
    sink: &FrameSink,
    frames: u64,
) -> Result<()> {
    let mut detections = pipeline.detections();
    for index in 0..frames {
        let Some(frame) = camera.next_frame()? else {
            debug!(index, "Camera stream ended early");
            break;
        };
        if index == 0 {
            focus_on_centre(camera, &frame);
        }

        let sequence = sink.push(frame)?;
        let detection = tokio::time::timeout(
            DEMO_WAIT,
            detections.wait_for(|d| d.as_ref().is_some_and(|d| d.sequence >= sequence)),
        )
        .await
        .map_err(|_| ScanError::Worker(format!("frame {sequence} was not processed in time")))?
        .map_err(|_| ScanError::NotRunning)?
        .clone();

        let Some(detection) = detection else {
            continue;
        };
        match &detection.quad {
            Some(quad) => info!(
                sequence = detection.sequence,
                confidence = quad.confidence(),
                corners = ?quad.corners(),
                elapsed_ms = detection.processing_time.as_millis() as u64,
                "Document detected"
            ),
            None => info!(sequence = detection.sequence, "No document in frame"),
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::load(path),
        None => Ok(PipelineConfig::default()),
    }
}

fn read_frame(path: &Path) -> Result<FrameBuffer> {
    if path.as_os_str() == STDIO_PATH {
        let mut data = Vec::new();
        std::io::stdin().lock().read_to_end(&mut data)?;
        decode_frame(&data)
    } else {
        load_frame(path)
    }
}

fn write_frame(frame: &FrameBuffer, path: &Path) -> Result<()> {
    if path.as_os_str() == STDIO_PATH {
        let png = encode_png(frame)?;
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(&png)?;
        stdout.flush()?;
        Ok(())
    } else {
        save_frame(frame, path)
    }
}

fn describe_correction(correction: &Correction) {
    match correction {
        Correction::Rectified(quad) => {
            info!(confidence = quad.confidence(), "Page straightened")
        }
        Correction::FullFrame(reason) => warn!(?reason, "Kept the full frame"),
    }
}

/// Tap-to-focus at the frame centre. The outcome is only logged; detection
/// does not wait for it.
fn focus_on_centre(camera: &mut dyn CameraDevice, frame: &FrameBuffer) {
    let centre = Point2D::new(frame.width() as f64 / 2.0, frame.height() as f64 / 2.0);
    let completion = camera.focus_at(centre);
    tokio::spawn(async move {
        match completion.await {
            Ok(Ok(())) => debug!(x = centre.x, y = centre.y, "Focus settled"),
            Ok(Err(err)) => warn!(error = %err, "Focus failed"),
            Err(_) => warn!("Camera dropped the focus request"),
        }
    });
}
