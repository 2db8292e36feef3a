// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Scanwerk scanning pipeline.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, ScanError};
use crate::geometry::Quadrilateral;

/// Unique identifier for a capture request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureId(pub Uuid);

impl CaptureId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CaptureId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CaptureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sample layout of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Gray8,
    Rgb8,
    Rgba8,
}

impl PixelFormat {
    /// Bytes per pixel.
    pub fn channels(&self) -> usize {
        match self {
            Self::Gray8 => 1,
            Self::Rgb8 => 3,
            Self::Rgba8 => 4,
        }
    }
}

/// A decoded camera frame (or an image derived from one).
///
/// Immutable once constructed. Rows may be padded: `stride` is the number of
/// bytes between the starts of consecutive rows and is at least
/// `width * channels`.
#[derive(Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
    data: Vec<u8>,
    timestamp: Duration,
}

impl FrameBuffer {
    /// Build a tightly packed frame (`stride == width * channels`).
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
        timestamp: Duration,
    ) -> Result<Self> {
        let stride = width as usize * format.channels();
        Self::with_stride(width, height, stride, format, data, timestamp)
    }

    /// Build a frame whose rows are `stride` bytes apart.
    pub fn with_stride(
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
        data: Vec<u8>,
        timestamp: Duration,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ScanError::InvalidFrame(format!(
                "zero dimension ({width}x{height})"
            )));
        }
        let row_bytes = (width as usize)
            .checked_mul(format.channels())
            .ok_or_else(|| ScanError::InvalidFrame(format!("row of {width} pixels overflows")))?;
        if stride < row_bytes {
            return Err(ScanError::InvalidFrame(format!(
                "stride {stride} shorter than row of {row_bytes} bytes"
            )));
        }
        let required = stride
            .checked_mul(height as usize - 1)
            .and_then(|rows| rows.checked_add(row_bytes))
            .ok_or_else(|| {
                ScanError::InvalidFrame(format!("stride {stride} x {height} rows overflows"))
            })?;
        if data.len() < required {
            return Err(ScanError::InvalidFrame(format!(
                "buffer holds {} bytes, {width}x{height} {format:?} needs {required}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            stride,
            format,
            data,
            timestamp,
        })
    }

    /// A frame filled with a single grey level. Handy for tests and fallbacks.
    pub fn filled_gray(width: u32, height: u32, level: u8, timestamp: Duration) -> Result<Self> {
        Self::new(
            width,
            height,
            PixelFormat::Gray8,
            vec![level; width as usize * height as usize],
            timestamp,
        )
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    /// Raw sample storage, including any row padding.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The visible bytes of row `y` (padding excluded).
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.width as usize * self.format.channels()]
    }

    /// Samples of the pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let c = self.format.channels();
        let start = y as usize * self.stride + x as usize * c;
        &self.data[start..start + c]
    }

    /// Consume the frame, returning tightly packed sample data.
    pub fn into_packed_data(self) -> Vec<u8> {
        let row_bytes = self.width as usize * self.format.channels();
        if self.stride == row_bytes {
            let mut data = self.data;
            data.truncate(row_bytes * self.height as usize);
            return data;
        }
        let mut packed = Vec::with_capacity(row_bytes * self.height as usize);
        for y in 0..self.height {
            packed.extend_from_slice(self.row(y));
        }
        packed
    }
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("format", &self.format)
            .field("bytes", &self.data.len())
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

/// How a captured image is rendered after rectification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// Colour/greyscale as captured.
    #[default]
    Normal,
    /// High-contrast black and white for text capture.
    Monochrome,
}

/// Lifecycle states of the scanning pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    /// No active frame source.
    Idle,
    /// Computing a quadrilateral for every incoming frame.
    Detecting,
    /// A one-shot capture is in flight.
    Capturing,
}

/// Detection outcome for one processed frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameDetection {
    /// Sequence number assigned by the frame sink (starts at 1).
    pub sequence: u64,
    /// Capture timestamp of the source frame.
    pub frame_timestamp: Duration,
    /// `None` means no plausible document in this frame.
    pub quad: Option<Quadrilateral>,
    /// Wall time spent on edge extraction and the quadrilateral search.
    pub processing_time: Duration,
}

/// Why a capture returned the uncorrected frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FallbackReason {
    /// `border_detection_enabled` was off.
    DetectionDisabled,
    /// No quadrilateral was found in the captured frame.
    NoDetection,
    /// The quadrilateral could not be inverted into a rectangle.
    GeometryDegenerate,
}

/// What the capture did to the source frame geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Correction {
    Rectified(Quadrilateral),
    FullFrame(FallbackReason),
}

/// The deliverable of a capture request.
#[derive(Debug, Clone)]
pub struct CaptureResult {
    pub id: CaptureId,
    pub image: FrameBuffer,
    pub correction: Correction,
    pub mode: RenderMode,
    /// Capture timestamp of the frame the image was taken from.
    pub source_timestamp: Duration,
    pub completed_at: DateTime<Utc>,
}

impl CaptureResult {
    /// Whether the output went through perspective correction.
    pub fn is_rectified(&self) -> bool {
        matches!(self.correction, Correction::Rectified(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_dimension_frame_is_invalid() {
        let err = FrameBuffer::new(0, 10, PixelFormat::Gray8, Vec::new(), Duration::ZERO)
            .expect_err("zero width must be rejected");
        assert!(matches!(err, ScanError::InvalidFrame(_)));
    }

    #[test]
    fn short_buffer_is_invalid() {
        let result = FrameBuffer::new(4, 4, PixelFormat::Rgb8, vec![0; 47], Duration::ZERO);
        assert!(matches!(result, Err(ScanError::InvalidFrame(_))));
    }

    #[test]
    fn corrupt_stride_is_invalid_not_a_panic() {
        let stride = usize::MAX / 2 + 1;
        let result =
            FrameBuffer::with_stride(2, 3, stride, PixelFormat::Gray8, vec![0; 8], Duration::ZERO);
        assert!(matches!(result, Err(ScanError::InvalidFrame(_))));

        let result = FrameBuffer::with_stride(
            2,
            2,
            usize::MAX,
            PixelFormat::Rgba8,
            vec![0; 16],
            Duration::ZERO,
        );
        assert!(matches!(result, Err(ScanError::InvalidFrame(_))));
    }

    #[test]
    fn padded_rows_are_addressed_through_stride() {
        // 2x2 RGB with 8-byte rows (2 bytes padding each).
        let data = vec![
            1, 2, 3, 4, 5, 6, 0, 0, //
            7, 8, 9, 10, 11, 12, 0, 0,
        ];
        let frame =
            FrameBuffer::with_stride(2, 2, 8, PixelFormat::Rgb8, data, Duration::ZERO).unwrap();
        assert_eq!(frame.pixel(1, 1), &[10, 11, 12]);
        assert_eq!(frame.row(1), &[7, 8, 9, 10, 11, 12]);
        assert_eq!(
            frame.into_packed_data(),
            vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]
        );
    }

    #[test]
    fn last_row_may_omit_padding() {
        let data = vec![0u8; 8 + 6];
        assert!(FrameBuffer::with_stride(2, 2, 8, PixelFormat::Rgb8, data, Duration::ZERO).is_ok());
    }

    #[test]
    fn render_mode_serializes_snake_case() {
        let json = serde_json::to_string(&RenderMode::Monochrome).unwrap();
        assert_eq!(json, "\"monochrome\"");
    }
}
