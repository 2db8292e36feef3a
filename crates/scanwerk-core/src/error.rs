// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Scanwerk.
//
// "No document detected" is deliberately absent: it is a normal per-frame
// outcome and is modelled as `Option<Quadrilateral>`.

use std::time::Duration;

use thiserror::Error;

/// Top-level error type for all Scanwerk operations.
#[derive(Debug, Error)]
pub enum ScanError {
    // -- Frame / geometry errors --
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("degenerate quadrilateral: {0}")]
    GeometryDegenerate(String),

    // -- Capture errors --
    #[error("a capture is already in progress")]
    CaptureAlreadyInProgress,

    #[error("pipeline is not running")]
    NotRunning,

    #[error("no frame has been processed yet")]
    NoFrameAvailable,

    #[error("capture was cancelled before completion")]
    CaptureCancelled,

    #[error("capture did not complete within {0:?}")]
    CaptureTimedOut(Duration),

    // -- Configuration --
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // -- Image I/O --
    #[error("image processing failed: {0}")]
    ImageError(String),

    // -- Worker --
    #[error("pipeline worker failed: {0}")]
    Worker(String),

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // -- Platform bridge --
    #[error("camera bridge error: {0}")]
    Bridge(String),

    #[error("feature not available on this platform")]
    PlatformUnavailable,
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScanError>;
