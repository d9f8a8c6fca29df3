use crate::error::{HrvError, Result};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Highest sampling rate the pipeline accepts (Hz).
pub const MAX_SAMPLING_RATE: f64 = 1000.0;

/// ADC range the default amplitude thresholds are calibrated for (12-bit).
pub const REFERENCE_ADC_FULL_SCALE: f64 = 4096.0;

/// What to do with a window tail shorter than one segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailingSegmentPolicy {
    #[default]
    Drop,
    Score,
}

/// Every recognised option of the quality-gated HRV pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Segment fails when its amplitude standard deviation is below this.
    pub flatline_std_threshold: f64,
    /// Segment fails when distinct values / samples is below this fraction.
    pub unique_fraction_threshold: f64,
    /// Segment fails when any sample-to-sample delta exceeds this.
    pub jump_threshold: f64,
    pub min_peaks_per_segment: usize,
    pub max_peaks_per_segment: usize,
    pub min_rr_ms: f64,
    pub max_rr_ms: f64,
    /// Running-mean outlier bound, in standard deviations.
    pub outlier_k: f64,
    /// Maximum change from the last accepted interval, in percent.
    pub relative_jump_pct: f64,
    pub max_bad_segments: usize,
    pub min_duration_seconds: f64,
    pub min_peak_distance_ms: f64,
    pub segment_seconds: f64,
    pub bandpass_low_hz: f64,
    pub bandpass_high_hz: f64,
    /// Minimum peak prominence as a multiple of the filtered signal's std.
    pub min_prominence_ratio: f64,
    pub trailing_segment: TrailingSegmentPolicy,
    /// Decimal places kept in reported metrics.
    pub metric_decimals: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            flatline_std_threshold: 1.0,
            unique_fraction_threshold: 0.02,
            jump_threshold: 2000.0,
            min_peaks_per_segment: 2,
            max_peaks_per_segment: 6,
            min_rr_ms: 300.0,
            max_rr_ms: 2000.0,
            outlier_k: 3.0,
            relative_jump_pct: 20.0,
            max_bad_segments: 0,
            min_duration_seconds: 10.0,
            min_peak_distance_ms: 300.0,
            segment_seconds: 3.0,
            bandpass_low_hz: 0.5,
            bandpass_high_hz: 8.0,
            min_prominence_ratio: 0.5,
            trailing_segment: TrailingSegmentPolicy::Drop,
            metric_decimals: 2,
        }
    }
}

impl PipelineConfig {
    /// Rescale amplitude-unit thresholds for a device whose ADC spans
    /// `full_scale` counts instead of the 12-bit reference.
    pub fn with_adc_full_scale(mut self, full_scale: f64) -> Self {
        let factor = full_scale / REFERENCE_ADC_FULL_SCALE;
        self.flatline_std_threshold *= factor;
        self.jump_threshold *= factor;
        self
    }

    pub fn with_max_bad_segments(mut self, max_bad_segments: usize) -> Self {
        self.max_bad_segments = max_bad_segments;
        self
    }

    /// Number of samples in one full quality segment.
    pub fn segment_sample_count(&self, sampling_rate: f64) -> usize {
        (self.segment_seconds * sampling_rate).round() as usize
    }

    /// Samples required before a window is analysed at all.
    pub fn min_sample_count(&self, sampling_rate: f64) -> usize {
        (sampling_rate * self.min_duration_seconds).ceil() as usize
    }

    pub fn validate(&self, sampling_rate: f64) -> Result<()> {
        if !(sampling_rate.is_finite() && sampling_rate > 0.0 && sampling_rate <= MAX_SAMPLING_RATE)
        {
            return Err(HrvError::Configuration(format!(
                "sampling rate must be in (0, {MAX_SAMPLING_RATE}] Hz, got {sampling_rate}"
            )));
        }
        let positive = [
            ("jump_threshold", self.jump_threshold),
            ("min_rr_ms", self.min_rr_ms),
            ("outlier_k", self.outlier_k),
            ("relative_jump_pct", self.relative_jump_pct),
            ("min_duration_seconds", self.min_duration_seconds),
            ("min_peak_distance_ms", self.min_peak_distance_ms),
            ("segment_seconds", self.segment_seconds),
            ("bandpass_low_hz", self.bandpass_low_hz),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(HrvError::Configuration(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        if !(self.flatline_std_threshold.is_finite() && self.flatline_std_threshold >= 0.0) {
            return Err(HrvError::Configuration(format!(
                "flatline_std_threshold must be non-negative, got {}",
                self.flatline_std_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.unique_fraction_threshold) {
            return Err(HrvError::Configuration(format!(
                "unique_fraction_threshold must be within [0, 1], got {}",
                self.unique_fraction_threshold
            )));
        }
        if !(self.min_prominence_ratio.is_finite() && self.min_prominence_ratio >= 0.0) {
            return Err(HrvError::Configuration(format!(
                "min_prominence_ratio must be non-negative, got {}",
                self.min_prominence_ratio
            )));
        }
        if self.min_peaks_per_segment > self.max_peaks_per_segment {
            return Err(HrvError::Configuration(format!(
                "min_peaks_per_segment ({}) exceeds max_peaks_per_segment ({})",
                self.min_peaks_per_segment, self.max_peaks_per_segment
            )));
        }
        if self.min_rr_ms >= self.max_rr_ms {
            return Err(HrvError::Configuration(format!(
                "min_rr_ms ({}) must be below max_rr_ms ({})",
                self.min_rr_ms, self.max_rr_ms
            )));
        }
        if self.bandpass_low_hz >= self.bandpass_high_hz {
            return Err(HrvError::Configuration(format!(
                "bandpass_low_hz ({}) must be below bandpass_high_hz ({})",
                self.bandpass_low_hz, self.bandpass_high_hz
            )));
        }
        if self.segment_sample_count(sampling_rate) < 2 {
            return Err(HrvError::Configuration(format!(
                "segment of {} s at {} Hz holds fewer than 2 samples",
                self.segment_seconds, sampling_rate
            )));
        }
        if self.metric_decimals > 9 {
            return Err(HrvError::Configuration(format!(
                "metric_decimals must be at most 9, got {}",
                self.metric_decimals
            )));
        }
        Ok(())
    }
}

/// Cadence and feedback options for rolling-window monitoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    pub window_size_seconds: f64,
    pub update_interval_seconds: f64,
    /// Fraction of the ring that must be filled before a window is analysed.
    pub min_fill_fraction: f64,
    /// RMSSD drop (ms) at or beyond which the trend is a significant drop.
    pub drop_threshold_ms: f64,
    /// Number of recent heart-rate readings averaged for display.
    pub hr_smoothing: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            window_size_seconds: 30.0,
            update_interval_seconds: 10.0,
            min_fill_fraction: 0.8,
            drop_threshold_ms: 5.0,
            hr_smoothing: 5,
        }
    }
}

impl RealtimeConfig {
    pub fn validate(&self, pipeline: &PipelineConfig) -> Result<()> {
        if !(self.window_size_seconds.is_finite() && self.window_size_seconds > 0.0) {
            return Err(HrvError::Configuration(format!(
                "window_size_seconds must be positive, got {}",
                self.window_size_seconds
            )));
        }
        if self.window_size_seconds < pipeline.min_duration_seconds {
            return Err(HrvError::Configuration(format!(
                "window_size_seconds ({}) is shorter than min_duration_seconds ({})",
                self.window_size_seconds, pipeline.min_duration_seconds
            )));
        }
        if !(self.update_interval_seconds.is_finite() && self.update_interval_seconds > 0.0) {
            return Err(HrvError::Configuration(format!(
                "update_interval_seconds must be positive, got {}",
                self.update_interval_seconds
            )));
        }
        if !(0.0..=1.0).contains(&self.min_fill_fraction) {
            return Err(HrvError::Configuration(format!(
                "min_fill_fraction must be within [0, 1], got {}",
                self.min_fill_fraction
            )));
        }
        if self.hr_smoothing == 0 {
            return Err(HrvError::Configuration(
                "hr_smoothing must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Contents of a TOML settings file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(flatten)]
    pub pipeline: PipelineConfig,
    pub realtime: RealtimeConfig,
    /// Device ADC range; rescales amplitude thresholds when present.
    pub adc_full_scale: Option<f64>,
}

impl Settings {
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let mut settings: Settings = toml::from_str(text).context("parsing settings TOML")?;
        if let Some(full_scale) = settings.adc_full_scale {
            anyhow::ensure!(
                full_scale.is_finite() && full_scale > 0.0,
                "adc_full_scale must be positive, got {full_scale}"
            );
            settings.pipeline = settings.pipeline.with_adc_full_scale(full_scale);
        }
        Ok(settings)
    }
}

/// Read settings from a TOML file.
pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Settings::from_toml_str(&text).with_context(|| format!("in {}", path.display()))
}
