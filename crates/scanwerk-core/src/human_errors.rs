// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for scanner front-ends.
//
// Maps each `ScanError` to a short message, a next step, and a severity.

use crate::error::ScanError;

/// How serious a failure is for the person scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Momentary problem; trying again usually works.
    Transient,
    /// The user has to do something (hold still, improve lighting, wait).
    ActionRequired,
    /// Retrying will not help.
    Permanent,
}

/// What a front-end shows for a failed scan operation.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// One-line summary.
    pub message: String,
    /// What to try next.
    pub suggestion: String,
    /// Whether the front-end may retry without asking.
    pub retriable: bool,
    /// How the UI should present it.
    pub severity: Severity,
}

/// Convert a `ScanError` into a `HumanError`.
pub fn humanize_error(err: &ScanError) -> HumanError {
    match err {
        ScanError::InvalidFrame(_) => HumanError {
            message: "The camera sent a damaged picture.".into(),
            suggestion: "This usually fixes itself on the next frame. If it keeps happening, restart the camera.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        ScanError::GeometryDegenerate(_) => HumanError {
            message: "The page edges couldn't be straightened.".into(),
            suggestion: "Hold the camera more directly above the page so all four corners are visible.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        ScanError::CaptureAlreadyInProgress => HumanError {
            message: "A photo is already being taken.".into(),
            suggestion: "Wait a moment for the current scan to finish.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        ScanError::NotRunning => HumanError {
            message: "The scanner isn't running.".into(),
            suggestion: "Start the camera, then try again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        ScanError::NoFrameAvailable => HumanError {
            message: "The camera hasn't delivered a picture yet.".into(),
            suggestion: "Give the camera a second to warm up, then try again.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        ScanError::CaptureCancelled => HumanError {
            message: "The scan was cancelled.".into(),
            suggestion: "The scanner was stopped before the photo was ready. Start it and scan again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        ScanError::CaptureTimedOut(_) => HumanError {
            message: "The scan took too long.".into(),
            suggestion: "Try again. Closing other apps may help on slower devices.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        ScanError::InvalidConfig(detail) => HumanError {
            message: "The scanner settings are invalid.".into(),
            suggestion: format!("Reset the scanner settings to their defaults. ({detail})"),
            retriable: false,
            severity: Severity::Permanent,
        },

        ScanError::ImageError(_) => HumanError {
            message: "That picture couldn't be opened.".into(),
            suggestion: "Use a PNG or JPEG photo of the page.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        ScanError::Worker(_) => HumanError {
            message: "The scanner had an internal problem.".into(),
            suggestion: "Try again. If this keeps happening, restart the scanner.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        ScanError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::NotFound => HumanError {
                message: "That image or settings file doesn't exist.".into(),
                suggestion: "Check the path and pick the file again.".into(),
                retriable: false,
                severity: Severity::ActionRequired,
            },
            std::io::ErrorKind::PermissionDenied => HumanError {
                message: "The scanner isn't allowed to open or save that file.".into(),
                suggestion: "Save the scan somewhere you can write to, or fix the file permissions.".into(),
                retriable: false,
                severity: Severity::ActionRequired,
            },
            _ => HumanError {
                message: "The scan couldn't be read from or written to disk.".into(),
                suggestion: "Try again. A full disk is the usual cause.".into(),
                retriable: true,
                severity: Severity::Transient,
            },
        },

        ScanError::Serialization(_) => HumanError {
            message: "The settings file couldn't be read.".into(),
            suggestion: "The file may be damaged. Delete it to go back to the default settings.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        ScanError::Bridge(_) => HumanError {
            message: "The camera didn't respond.".into(),
            suggestion: "Try restarting the scanner. Another app may be using the camera.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        ScanError::PlatformUnavailable => HumanError {
            message: "No camera is available here.".into(),
            suggestion: "Some camera features (torch, tap to focus) need specific hardware.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },
    }
}
