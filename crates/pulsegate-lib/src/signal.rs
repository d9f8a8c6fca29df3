use serde::{Deserialize, Serialize};

/// One PPG reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Milliseconds, monotonic within a recording.
    pub timestamp: f64,
    pub amplitude: f64,
}

impl Sample {
    pub fn new(timestamp: f64, amplitude: f64) -> Self {
        Self {
            timestamp,
            amplitude,
        }
    }
}

/// Build evenly spaced samples from a bare amplitude series.
pub fn samples_from_amplitudes(amplitudes: &[f64], sampling_rate: f64) -> Vec<Sample> {
    let step = 1000.0 / sampling_rate;
    amplitudes
        .iter()
        .enumerate()
        .map(|(i, &amplitude)| Sample::new(i as f64 * step, amplitude))
        .collect()
}

/// Immutable span of samples handed to one pipeline invocation.
///
/// The sampling rate is the one reported by the producer; it is never inferred
/// from the timestamps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Window {
    sampling_rate: f64,
    samples: Vec<Sample>,
}

impl Window {
    /// Wraps samples without validation. Use [`crate::window::batch_window`] for
    /// caller-supplied data.
    pub(crate) fn from_parts(samples: Vec<Sample>, sampling_rate: f64) -> Self {
        Self {
            sampling_rate,
            samples,
        }
    }

    /// Rate reported by the producer, in Hz.
    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration implied by the sample count and the reported rate, in seconds.
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sampling_rate
    }

    pub fn amplitudes(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.amplitude).collect()
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.samples.last().map(|s| s.timestamp)
    }
}

/// Detected heartbeat peaks: sample indices into the window and their timestamps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Peaks {
    pub indices: Vec<usize>,
    pub timestamps: Vec<f64>,
}

impl Peaks {
    pub fn from_indices(window: &Window, indices: Vec<usize>) -> Self {
        let timestamps = indices
            .iter()
            .map(|&i| window.samples()[i].timestamp)
            .collect();
        Self {
            indices,
            timestamps,
        }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Interval between two consecutive peaks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RRInterval {
    /// Milliseconds.
    pub ms: f64,
    /// Indices (into [`Peaks`]) of the peak pair that produced this interval.
    pub from_peak: usize,
    pub to_peak: usize,
}

/// Chronologically ordered RR intervals (milliseconds).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RRSeries {
    pub intervals: Vec<RRInterval>,
}

impl RRSeries {
    pub fn from_peaks(peaks: &Peaks) -> Self {
        let intervals = peaks
            .timestamps
            .windows(2)
            .enumerate()
            .map(|(i, w)| RRInterval {
                ms: w[1] - w[0],
                from_peak: i,
                to_peak: i + 1,
            })
            .collect();
        Self { intervals }
    }

    pub fn from_millis(values: &[f64]) -> Self {
        let intervals = values
            .iter()
            .enumerate()
            .map(|(i, &ms)| RRInterval {
                ms,
                from_peak: i,
                to_peak: i + 1,
            })
            .collect();
        Self { intervals }
    }

    pub fn values(&self) -> Vec<f64> {
        self.intervals.iter().map(|rr| rr.ms).collect()
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_exposes_rate_and_duration() {
        let window = Window::from_parts(samples_from_amplitudes(&[1.0; 250], 125.0), 125.0);
        assert_eq!(window.sampling_rate(), 125.0);
        assert_eq!(window.duration(), 2.0);
        assert_eq!(window.last_timestamp(), Some(1992.0));
    }

    #[test]
    fn intervals_follow_peak_pairs() {
        let peaks = Peaks {
            indices: vec![0, 80, 160, 240],
            timestamps: vec![0.0, 800.0, 1600.0, 2400.0],
        };
        let rr = RRSeries::from_peaks(&peaks);
        assert_eq!(rr.values(), vec![800.0, 800.0, 800.0]);
        assert_eq!(rr.intervals[2].from_peak, 2);
        assert_eq!(rr.intervals[2].to_peak, 3);
    }

    #[test]
    fn single_peak_has_no_intervals() {
        let peaks = Peaks {
            indices: vec![10],
            timestamps: vec![100.0],
        };
        assert!(RRSeries::from_peaks(&peaks).is_empty());
    }

    #[test]
    fn synthesised_timestamps_use_nominal_spacing() {
        let samples = samples_from_amplitudes(&[1.0, 2.0, 3.0], 100.0);
        assert_eq!(samples[2].timestamp, 20.0);
        let window = Window::from_parts(samples, 100.0);
        assert!((window.duration() - 0.03).abs() < 1e-12);
        assert_eq!(window.last_timestamp(), Some(20.0));
    }
}
