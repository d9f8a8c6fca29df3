use crate::{
    error::{HrvError, Result},
    signal::RRSeries,
};
use serde::{Deserialize, Serialize};

/// Coarse rating of how much of the beat sequence survived cleaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalGrade {
    Good,
    Fair,
    Poor,
}

impl SignalGrade {
    pub fn assess(clean: usize, raw: usize) -> Self {
        if raw == 0 {
            return SignalGrade::Poor;
        }
        let valid = clean as f64 / raw as f64;
        if valid > 0.9 && clean > 50 {
            SignalGrade::Good
        } else if valid > 0.7 && clean > 30 {
            SignalGrade::Fair
        } else {
            SignalGrade::Poor
        }
    }
}

/// Time-domain HRV summary of one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HrvResult {
    /// Milliseconds.
    pub rmssd: f64,
    /// Population standard deviation of NN intervals, milliseconds.
    pub sdnn: f64,
    /// Beats per minute.
    pub mean_hr: f64,
    pub pnn50: f64,
    pub nn_intervals: Vec<f64>,
    /// Timestamp (ms) of the last sample in the analysed window.
    pub timestamp: f64,
    pub quality: SignalGrade,
    pub rejected_intervals: usize,
}

pub fn rmssd(nn: &[f64]) -> f64 {
    if nn.len() < 2 {
        return 0.0;
    }
    let sum_sq: f64 = nn.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum();
    (sum_sq / (nn.len() - 1) as f64).sqrt()
}

pub fn sdnn(nn: &[f64]) -> f64 {
    if nn.is_empty() {
        return 0.0;
    }
    let mean = nn.iter().sum::<f64>() / nn.len() as f64;
    (nn.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / nn.len() as f64).sqrt()
}

pub fn mean_hr(nn: &[f64]) -> f64 {
    if nn.is_empty() {
        return 0.0;
    }
    let mean = nn.iter().sum::<f64>() / nn.len() as f64;
    if mean > 0.0 {
        60000.0 / mean
    } else {
        0.0
    }
}

pub fn pnn50(nn: &[f64]) -> f64 {
    if nn.len() < 2 {
        return 0.0;
    }
    let count = nn.windows(2).filter(|w| (w[1] - w[0]).abs() > 50.0).count();
    count as f64 / (nn.len() - 1) as f64
}

pub fn round_to(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round() / scale
}

/// Compute metrics over the cleaned interval sequence.
///
/// `raw_count` is the number of intervals before artifact rejection.
pub fn compute_metrics(
    clean: &RRSeries,
    raw_count: usize,
    timestamp: f64,
    decimals: u32,
) -> Result<HrvResult> {
    if clean.len() < 2 {
        return Err(HrvError::InsufficientIntervals { found: clean.len() });
    }
    let nn = clean.values();
    Ok(HrvResult {
        rmssd: round_to(rmssd(&nn), decimals),
        sdnn: round_to(sdnn(&nn), decimals),
        mean_hr: round_to(mean_hr(&nn), decimals),
        pnn50: round_to(pnn50(&nn), decimals),
        nn_intervals: nn.iter().map(|&v| round_to(v, decimals)).collect(),
        timestamp,
        quality: SignalGrade::assess(clean.len(), raw_count),
        rejected_intervals: raw_count.saturating_sub(clean.len()),
    })
}
