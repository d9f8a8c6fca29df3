use crate::{
    config::{PipelineConfig, TrailingSegmentPolicy},
    detectors::ppg::detect_peak_indices,
    error::{HrvError, Result},
    signal::Window,
};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Independent per-segment quality checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SegmentCheck {
    Flatline,
    Clipping,
    Jump,
    PeakImplausible,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentQualityResult {
    pub index: usize,
    /// First sample of the segment within the window.
    pub start: usize,
    pub len: usize,
    pub passed: bool,
    pub failed_checks: BTreeSet<SegmentCheck>,
    pub peak_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityDecision {
    pub accepted: bool,
    pub bad_segments: usize,
    pub max_allowed: usize,
    pub total_segments: usize,
    /// Union of the checks that failed across all segments.
    pub reasons: BTreeSet<SegmentCheck>,
}

impl QualityDecision {
    pub fn message(&self) -> String {
        if self.accepted {
            format!(
                "Signal quality accepted: {} of {} segments bad (max allowed: {})",
                self.bad_segments, self.total_segments, self.max_allowed
            )
        } else {
            format!(
                "Poor signal quality: {} bad segments detected (max allowed: {})",
                self.bad_segments, self.max_allowed
            )
        }
    }

    pub fn into_result(self) -> Result<QualityDecision> {
        if self.accepted {
            Ok(self)
        } else {
            Err(HrvError::PoorSignalQuality {
                bad_segments: self.bad_segments,
                max_allowed: self.max_allowed,
                reasons: self.reasons,
            })
        }
    }
}

pub fn compute_std(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mean = data.iter().copied().sum::<f64>() / data.len() as f64;
    (data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / data.len() as f64).sqrt()
}

/// Distinct values divided by sample count.
pub fn compute_unique_fraction(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted.dedup_by(|a, b| a == b);
    sorted.len() as f64 / data.len() as f64
}

pub fn compute_max_jump(data: &[f64]) -> f64 {
    data.windows(2)
        .map(|w| (w[1] - w[0]).abs())
        .fold(0.0, f64::max)
}

/// Score one segment against all four checks.
pub fn score_segment(
    index: usize,
    start: usize,
    data: &[f64],
    fs: f64,
    cfg: &PipelineConfig,
    peak_bounds: (usize, usize),
) -> SegmentQualityResult {
    let mut failed = BTreeSet::new();
    if compute_std(data) < cfg.flatline_std_threshold {
        failed.insert(SegmentCheck::Flatline);
    }
    if compute_unique_fraction(data) < cfg.unique_fraction_threshold {
        failed.insert(SegmentCheck::Clipping);
    }
    if compute_max_jump(data) > cfg.jump_threshold {
        failed.insert(SegmentCheck::Jump);
    }
    let peak_count = detect_peak_indices(data, fs, cfg).len();
    if peak_count < peak_bounds.0 || peak_count > peak_bounds.1 {
        failed.insert(SegmentCheck::PeakImplausible);
    }
    if !failed.is_empty() {
        debug!(
            "segment #{} failed {:?} ({} peaks)",
            index + 1,
            failed,
            peak_count
        );
    }
    SegmentQualityResult {
        index,
        start,
        len: data.len(),
        passed: failed.is_empty(),
        failed_checks: failed,
        peak_count,
    }
}

/// Split a window into consecutive segments and score each, in order.
pub fn analyze_segments(window: &Window, cfg: &PipelineConfig) -> Vec<SegmentQualityResult> {
    let fs = window.sampling_rate();
    let seg_len = cfg.segment_sample_count(fs);
    if seg_len == 0 {
        return Vec::new();
    }
    let data = window.amplitudes();
    let full = data.len() / seg_len;
    let bounds = (cfg.min_peaks_per_segment, cfg.max_peaks_per_segment);
    let mut results: Vec<SegmentQualityResult> = (0..full)
        .map(|i| {
            let start = i * seg_len;
            score_segment(i, start, &data[start..start + seg_len], fs, cfg, bounds)
        })
        .collect();

    let tail_start = full * seg_len;
    let tail = &data[tail_start..];
    if cfg.trailing_segment == TrailingSegmentPolicy::Score && tail.len() >= 2 {
        let fraction = tail.len() as f64 / seg_len as f64;
        let scaled = (
            (cfg.min_peaks_per_segment as f64 * fraction).floor() as usize,
            (cfg.max_peaks_per_segment as f64 * fraction).ceil() as usize,
        );
        results.push(score_segment(full, tail_start, tail, fs, cfg, scaled));
    }
    results
}

/// Count failed segments and compare with the allowed tolerance.
pub fn evaluate_gate(results: &[SegmentQualityResult], max_bad_segments: usize) -> QualityDecision {
    let bad_segments = results.iter().filter(|r| !r.passed).count();
    let reasons = results
        .iter()
        .flat_map(|r| r.failed_checks.iter().copied())
        .collect();
    QualityDecision {
        accepted: bad_segments <= max_bad_segments,
        bad_segments,
        max_allowed: max_bad_segments,
        total_segments: results.len(),
        reasons,
    }
}
