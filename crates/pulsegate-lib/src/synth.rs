//! Synthetic PPG-like traces for demos, calibration and tests.

use rand::{rngs::StdRng, Rng, SeedableRng};
use std::f64::consts::PI;

/// `offset + amplitude * sin(2π·hz·t)` sampled at `fs` for `seconds`.
pub fn sinusoid(fs: f64, seconds: f64, hz: f64, offset: f64, amplitude: f64) -> Vec<f64> {
    let n = (fs * seconds).round() as usize;
    (0..n)
        .map(|i| {
            let t = i as f64 / fs;
            offset + amplitude * (2.0 * PI * hz * t).sin()
        })
        .collect()
}

/// Gaussian pulses on a flat baseline, one per beat.
///
/// The first beat lands 500 ms in and each following beat is offset by the
/// next entry of `rr_ms`. One second of baseline follows the last beat.
pub fn pulse_train(fs: f64, rr_ms: &[f64], baseline: f64, amplitude: f64) -> Vec<f64> {
    let mut beats = Vec::with_capacity(rr_ms.len() + 1);
    let mut t = 0.5;
    beats.push(t);
    for &rr in rr_ms {
        t += rr / 1000.0;
        beats.push(t);
    }
    let duration = t + 1.0;
    let n = (duration * fs).round() as usize;
    let width = 0.08;
    (0..n)
        .map(|i| {
            let time = i as f64 / fs;
            let pulse: f64 = beats
                .iter()
                .map(|&bt| (-0.5 * ((time - bt) / width).powi(2)).exp())
                .sum();
            baseline + amplitude * pulse
        })
        .collect()
}

/// Beat intervals (ms) around `mean_ms`, modulated by a breathing cycle of
/// `breath_seconds` with peak deviation `modulation_ms`.
pub fn respiratory_rr(
    count: usize,
    mean_ms: f64,
    modulation_ms: f64,
    breath_seconds: f64,
) -> Vec<f64> {
    let mut t = 0.0;
    (0..count)
        .map(|_| {
            let rr = mean_ms + modulation_ms * (2.0 * PI * t / breath_seconds).sin();
            t += rr / 1000.0;
            rr
        })
        .collect()
}

/// Add zero-mean uniform noise of the given peak magnitude, reproducibly.
pub fn add_noise(data: &mut [f64], magnitude: f64, seed: u64) {
    if magnitude <= 0.0 {
        return;
    }
    let mut rng = StdRng::seed_from_u64(seed);
    for v in data.iter_mut() {
        *v += rng.gen_range(-magnitude..=magnitude);
    }
}

/// Quantise to integer ADC counts, clamped to `[0, full_scale - 1]`.
pub fn quantize(data: &mut [f64], full_scale: f64) {
    let top = (full_scale - 1.0).max(0.0);
    for v in data.iter_mut() {
        *v = v.round().clamp(0.0, top);
    }
}
