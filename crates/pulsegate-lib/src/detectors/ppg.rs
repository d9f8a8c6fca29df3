use crate::{
    config::PipelineConfig,
    error::{HrvError, Result},
    signal::{Peaks, Window},
};
use log::debug;

/// Band-limit a PPG trace with zero phase shift.
///
/// The mean is removed, then a single-pole high-pass (baseline wander) and a
/// single-pole low-pass (high-frequency noise) are run forward and again
/// backward so peak positions are not delayed.
pub fn bandpass(data: &[f64], fs: f64, low_hz: f64, high_hz: f64) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let mean = data.iter().sum::<f64>() / data.len() as f64;
    let centred: Vec<f64> = data.iter().map(|x| x - mean).collect();
    let forward = bandpass_once(&centred, fs, low_hz, high_hz);
    let mut reversed: Vec<f64> = forward.into_iter().rev().collect();
    reversed = bandpass_once(&reversed, fs, low_hz, high_hz);
    reversed.reverse();
    reversed
}

fn bandpass_once(data: &[f64], fs: f64, low: f64, high: f64) -> Vec<f64> {
    let hp = if low > 0.0 {
        single_pole_highpass(data, fs, low)
    } else {
        data.to_vec()
    };
    if high <= 0.0 || high >= fs * 0.5 {
        hp
    } else {
        single_pole_lowpass(&hp, fs, high)
    }
}

fn single_pole_highpass(data: &[f64], fs: f64, cutoff: f64) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let dt = 1.0 / fs;
    let rc = 1.0 / (2.0 * std::f64::consts::PI * cutoff.max(0.01));
    let alpha = rc / (rc + dt);
    let mut out = Vec::with_capacity(data.len());
    // Start from rest so a DC offset does not produce an opening transient.
    let mut prev_y = 0.0;
    let mut prev_x = data[0];
    for &x in data {
        let y = alpha * (prev_y + x - prev_x);
        out.push(y);
        prev_y = y;
        prev_x = x;
    }
    out
}

fn single_pole_lowpass(data: &[f64], fs: f64, cutoff: f64) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let dt = 1.0 / fs;
    let rc = 1.0 / (2.0 * std::f64::consts::PI * cutoff.max(0.01));
    let alpha = dt / (rc + dt);
    let mut out = Vec::with_capacity(data.len());
    let mut prev = data[0];
    for &x in data {
        prev += alpha * (x - prev);
        out.push(prev);
    }
    out
}

fn std_dev(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mean = data.iter().sum::<f64>() / data.len() as f64;
    (data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / data.len() as f64).sqrt()
}

/// Height of a local maximum above the higher of its two flanking minima.
///
/// Each flank is searched until a sample higher than the peak or the end of
/// the signal, so shoulders riding on a larger wave score low.
fn prominence(data: &[f64], idx: usize) -> f64 {
    let peak = data[idx];
    let mut left_min = peak;
    for &v in data[..idx].iter().rev() {
        if v > peak {
            break;
        }
        left_min = left_min.min(v);
    }
    let mut right_min = peak;
    for &v in &data[idx + 1..] {
        if v > peak {
            break;
        }
        right_min = right_min.min(v);
    }
    peak - left_min.max(right_min)
}

/// Locate heartbeat maxima in an already band-limited trace.
///
/// Candidates are strict rises followed by a non-rise. Those below the
/// prominence floor are discarded, then the tallest are kept greedily so that
/// no two survivors are closer than the minimum peak distance.
pub fn pick_peaks(filtered: &[f64], fs: f64, cfg: &PipelineConfig) -> Vec<usize> {
    if filtered.len() < 3 {
        return Vec::new();
    }
    let floor = cfg.min_prominence_ratio * std_dev(filtered);
    let mut candidates: Vec<usize> = (1..filtered.len() - 1)
        .filter(|&i| filtered[i] > filtered[i - 1] && filtered[i] >= filtered[i + 1])
        .filter(|&i| {
            let p = prominence(filtered, i);
            p > 0.0 && p >= floor
        })
        .collect();
    if candidates.is_empty() {
        return candidates;
    }

    let distance = ((cfg.min_peak_distance_ms * fs / 1000.0).ceil() as usize).max(1);
    candidates.sort_by(|&a, &b| {
        filtered[b]
            .partial_cmp(&filtered[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
    let mut kept: Vec<usize> = Vec::with_capacity(candidates.len());
    for idx in candidates {
        if kept.iter().all(|&k| k.abs_diff(idx) >= distance) {
            kept.push(idx);
        }
    }
    kept.sort_unstable();
    kept
}

/// Filter and pick peaks on a raw amplitude slice.
pub fn detect_peak_indices(amplitudes: &[f64], fs: f64, cfg: &PipelineConfig) -> Vec<usize> {
    let filtered = bandpass(amplitudes, fs, cfg.bandpass_low_hz, cfg.bandpass_high_hz);
    pick_peaks(&filtered, fs, cfg)
}

/// Turn picked indices into timestamped peaks, failing when fewer than two
/// beats were found in the window.
pub fn peaks_from_indices(window: &Window, indices: Vec<usize>) -> Result<Peaks> {
    if indices.len() < 2 {
        return Err(HrvError::InsufficientPeaks {
            found: indices.len(),
        });
    }
    debug!("detected {} peaks", indices.len());
    Ok(Peaks::from_indices(window, indices))
}

/// Detect heartbeat peaks across a whole window.
pub fn detect_peaks(window: &Window, cfg: &PipelineConfig) -> Result<Peaks> {
    let indices = detect_peak_indices(&window.amplitudes(), window.sampling_rate(), cfg);
    peaks_from_indices(window, indices)
}
