// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Adaptive levels for turning a gradient-magnitude map into a binary mask.

use scanwerk_core::config::ThresholdPolicy;

const BINS: usize = 256;

/// Pick the mask level for `values` according to `policy`.
pub(crate) fn level(values: &[u16], policy: ThresholdPolicy) -> u16 {
    match policy {
        ThresholdPolicy::Otsu => otsu_level(values),
        ThresholdPolicy::Percentile { percentile } => percentile_level(values, percentile),
    }
}

/// Otsu's method over a 256-bin histogram spanning `[0, max(values)]`.
///
/// Returns the smallest magnitude belonging to the upper class.
pub(crate) fn otsu_level(values: &[u16]) -> u16 {
    let max = values.iter().copied().max().unwrap_or(0);
    if max == 0 {
        return 0;
    }
    let bin_of = |v: u16| (v as usize * (BINS - 1)) / max as usize;

    let mut histogram = [0u64; BINS];
    for &v in values {
        histogram[bin_of(v)] += 1;
    }

    let total = values.len() as u64;
    let sum_total: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &count)| i as f64 * count as f64)
        .sum();

    let mut sum_background = 0.0f64;
    let mut weight_background = 0u64;
    let mut max_variance = 0.0f64;
    let mut best_bin = 0usize;

    for (t, &count) in histogram.iter().enumerate() {
        weight_background += count;
        if weight_background == 0 {
            continue;
        }
        let weight_foreground = total - weight_background;
        if weight_foreground == 0 {
            break;
        }

        sum_background += t as f64 * count as f64;
        let mean_background = sum_background / weight_background as f64;
        let mean_foreground = (sum_total - sum_background) / weight_foreground as f64;
        let between_variance = weight_background as f64
            * weight_foreground as f64
            * (mean_background - mean_foreground).powi(2);

        if between_variance > max_variance {
            max_variance = between_variance;
            best_bin = t;
        }
    }

    // First magnitude that lands in a bin above the split.
    let upper = best_bin + 1;
    ((upper * max as usize).div_ceil(BINS - 1)).min(max as usize) as u16
}

/// The magnitude below which `percentile` percent of `values` fall.
pub(crate) fn percentile_level(values: &[u16], percentile: f32) -> u16 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    let rank = ((percentile.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f32).round() as usize;
    let (_, nth, _) = sorted.select_nth_unstable(rank);
    *nth
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otsu_splits_bimodal_values() {
        let mut values = vec![10u16; 900];
        values.extend(std::iter::repeat_n(800u16, 100));
        let level = otsu_level(&values);
        assert!(level > 10 && level <= 800, "level {level}");
    }

    #[test]
    fn all_zero_map_has_zero_level() {
        assert_eq!(otsu_level(&[0; 64]), 0);
        assert_eq!(otsu_level(&[]), 0);
    }

    #[test]
    fn percentile_picks_rank() {
        let values: Vec<u16> = (0..101).collect();
        assert_eq!(percentile_level(&values, 90.0), 90);
        assert_eq!(percentile_level(&values, 0.0), 0);
    }

    #[test]
    fn policy_dispatch() {
        let values: Vec<u16> = (0..11).map(|v| v * 10).collect();
        assert_eq!(level(&values, ThresholdPolicy::Percentile { percentile: 50.0 }), 50);
    }
}
