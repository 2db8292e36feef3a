// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline configuration.
//
// One immutable value carries every option and tuning constant. The pipeline
// takes an `Arc` snapshot per frame, so reconfiguring never races with a pass
// that is already running.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, ScanError};
use crate::types::RenderMode;

/// Complete pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// When false, the quadrilateral search is skipped and captures return
    /// the full frame.
    pub border_detection_enabled: bool,
    /// Requested torch state, forwarded to the camera bridge by the host.
    pub torch_enabled: bool,
    /// Render mode used by front-ends that do not pass one explicitly.
    pub default_render_mode: RenderMode,
    /// What happens to an in-flight capture when the pipeline stops.
    pub stop_policy: StopPolicy,
    pub detection: DetectionConfig,
    pub correction: CorrectionConfig,
    pub enhance: EnhanceConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            border_detection_enabled: true,
            torch_enabled: false,
            default_render_mode: RenderMode::Normal,
            stop_policy: StopPolicy::FinishInFlight,
            detection: DetectionConfig::default(),
            correction: CorrectionConfig::default(),
            enhance: EnhanceConfig::default(),
        }
    }
}

/// Handling of a capture that is still running when `stop` is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopPolicy {
    /// Let the capture finish and deliver its result.
    #[default]
    FinishInFlight,
    /// Resolve the capture with `CaptureCancelled`.
    DiscardInFlight,
}

/// How the edge map is turned into a binary mask.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ThresholdPolicy {
    /// Otsu's between-class variance maximum.
    Otsu,
    /// Keep the strongest `100 - percentile` percent of edge responses.
    Percentile { percentile: f32 },
}

/// Edge extraction and quadrilateral search tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Frames are downscaled so their longest side is at most this many pixels.
    pub max_dimension: u32,
    /// Gaussian smoothing applied before the gradient operator.
    pub blur_sigma: f32,
    pub threshold: ThresholdPolicy,
    /// Sobel magnitude below which a pixel can never be an edge.
    pub min_edge_strength: f32,
    /// Dilation radius applied to the edge mask to close small gaps.
    pub dilate_radius: u8,
    /// Minimum quadrilateral area as a fraction of the frame area.
    pub min_area_fraction: f64,
    /// Maximum deviation of any interior angle from 90 degrees.
    pub angle_tolerance_deg: f64,
    /// Polygon simplification tolerance ladder, as fractions of the perimeter.
    pub approx_epsilon_min: f64,
    pub approx_epsilon_max: f64,
    pub approx_epsilon_step: f64,
    /// Candidates scoring below this are discarded.
    pub acceptance_threshold: f64,
    /// Only the largest contours are simplified and scored.
    pub max_candidates: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            max_dimension: 480,
            blur_sigma: 1.5,
            threshold: ThresholdPolicy::Otsu,
            min_edge_strength: 40.0,
            dilate_radius: 1,
            min_area_fraction: 0.15,
            angle_tolerance_deg: 30.0,
            approx_epsilon_min: 0.01,
            approx_epsilon_max: 0.05,
            approx_epsilon_step: 0.01,
            acceptance_threshold: 0.5,
            max_candidates: 16,
        }
    }
}

/// Perspective correction limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionConfig {
    /// Output is scaled down uniformly so neither side exceeds this.
    pub max_output_dimension: u32,
    /// Quadrilaterals smaller than this (square pixels) are degenerate.
    pub min_area_px: f64,
    /// Consecutive corners turning by less than this are treated as collinear.
    pub min_corner_angle_deg: f64,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            max_output_dimension: 2000,
            min_area_px: 64.0,
            min_corner_angle_deg: 5.0,
        }
    }
}

/// Monochrome enhancement tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhanceConfig {
    /// Half-size of the local-mean window.
    pub block_radius: u32,
    /// Subtracted from the local mean before comparison.
    pub offset: i32,
    /// Contrast stretch about mid-grey applied before thresholding.
    pub contrast_factor: f32,
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            block_radius: 15,
            offset: 10,
            contrast_factor: 1.4,
        }
    }
}

impl PipelineConfig {
    /// Load settings from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        info!(path = %path.as_ref().display(), "pipeline config loaded");
        Ok(config)
    }

    /// Write settings as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), raw)?;
        debug!(path = %path.as_ref().display(), "pipeline config saved");
        Ok(())
    }

    /// Reject settings that would make a stage panic or never succeed.
    pub fn validate(&self) -> Result<()> {
        let d = &self.detection;
        if d.max_dimension < 32 {
            return Err(invalid("detection.max_dimension must be at least 32"));
        }
        if !(d.blur_sigma > 0.0) {
            return Err(invalid("detection.blur_sigma must be positive"));
        }
        if let ThresholdPolicy::Percentile { percentile } = d.threshold {
            if !(0.0..100.0).contains(&percentile) {
                return Err(invalid("detection.threshold.percentile must be in [0, 100)"));
            }
        }
        if !(0.0..1.0).contains(&d.min_area_fraction) {
            return Err(invalid("detection.min_area_fraction must be in [0, 1)"));
        }
        if !(d.angle_tolerance_deg > 0.0 && d.angle_tolerance_deg < 90.0) {
            return Err(invalid("detection.angle_tolerance_deg must be in (0, 90)"));
        }
        if !(d.approx_epsilon_min > 0.0
            && d.approx_epsilon_step > 0.0
            && d.approx_epsilon_max >= d.approx_epsilon_min)
        {
            return Err(invalid(
                "detection.approx_epsilon_* must be positive with max >= min",
            ));
        }
        if !(0.0..=1.0).contains(&d.acceptance_threshold) {
            return Err(invalid("detection.acceptance_threshold must be in [0, 1]"));
        }
        if d.max_candidates == 0 {
            return Err(invalid("detection.max_candidates must be at least 1"));
        }

        let c = &self.correction;
        if c.max_output_dimension == 0 {
            return Err(invalid("correction.max_output_dimension must be positive"));
        }
        if !(c.min_corner_angle_deg >= 0.0 && c.min_corner_angle_deg < 90.0) {
            return Err(invalid("correction.min_corner_angle_deg must be in [0, 90)"));
        }

        let e = &self.enhance;
        if e.block_radius == 0 {
            return Err(invalid("enhance.block_radius must be at least 1"));
        }
        if !(e.contrast_factor > 0.0) {
            return Err(invalid("enhance.contrast_factor must be positive"));
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> ScanError {
    ScanError::InvalidConfig(msg.to_string())
}
