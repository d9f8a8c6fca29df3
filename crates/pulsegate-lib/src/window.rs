use crate::{
    config::PipelineConfig,
    error::{HrvError, Result},
    signal::{Sample, Window},
};
use log::debug;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// Check that samples are usable as an analysis window: finite values and
/// non-decreasing timestamps.
pub fn validate_samples(samples: &[Sample]) -> Result<()> {
    let mut prev: Option<f64> = None;
    for (i, s) in samples.iter().enumerate() {
        if !s.timestamp.is_finite() || !s.amplitude.is_finite() {
            return Err(HrvError::InvalidInput(format!(
                "sample {i} is not finite ({}, {})",
                s.timestamp, s.amplitude
            )));
        }
        if let Some(p) = prev {
            if s.timestamp < p {
                return Err(HrvError::InvalidInput(format!(
                    "timestamps decrease at sample {i} ({} < {p})",
                    s.timestamp
                )));
            }
        }
        prev = Some(s.timestamp);
    }
    Ok(())
}

/// Bound a complete recording into an analysis window.
///
/// Checks, in order: configuration bounds, sample validity, minimum duration.
pub fn batch_window(
    samples: Vec<Sample>,
    sampling_rate: f64,
    cfg: &PipelineConfig,
) -> Result<Window> {
    cfg.validate(sampling_rate)?;
    validate_samples(&samples)?;
    let required = cfg.min_sample_count(sampling_rate);
    if samples.len() < required {
        return Err(HrvError::InsufficientData {
            samples: samples.len(),
            required,
        });
    }
    Ok(Window::from_parts(samples, sampling_rate))
}

/// Fixed-capacity ring of the most recent samples.
///
/// A single producer appends; when full the oldest sample is evicted so the
/// producer never waits. Readers take a [`Window`] copy with [`snapshot`];
/// the lock is held only for one append or one copy.
///
/// [`snapshot`]: RollingWindow::snapshot
#[derive(Debug)]
pub struct RollingWindow {
    sampling_rate: f64,
    capacity: usize,
    ring: Mutex<Ring>,
}

#[derive(Debug, Default)]
struct Ring {
    samples: VecDeque<Sample>,
    evicted: u64,
}

impl RollingWindow {
    pub fn new(sampling_rate: f64, window_size_seconds: f64) -> Result<Self> {
        if !(sampling_rate.is_finite()
            && sampling_rate > 0.0
            && sampling_rate <= crate::config::MAX_SAMPLING_RATE)
        {
            return Err(HrvError::Configuration(format!(
                "sampling rate must be in (0, {}] Hz, got {sampling_rate}",
                crate::config::MAX_SAMPLING_RATE
            )));
        }
        let capacity = (window_size_seconds * sampling_rate).round();
        if !(capacity.is_finite() && capacity >= 1.0) {
            return Err(HrvError::Configuration(format!(
                "window of {window_size_seconds} s at {sampling_rate} Hz holds no samples"
            )));
        }
        let capacity = capacity as usize;
        Ok(Self {
            sampling_rate,
            capacity,
            ring: Mutex::new(Ring {
                samples: VecDeque::with_capacity(capacity),
                evicted: 0,
            }),
        })
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, Ring> {
        // A panic while holding the lock cannot leave the deque half-updated.
        self.ring.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append one sample, evicting the oldest when full. Returns true when a
    /// sample was evicted.
    pub fn push(&self, sample: Sample) -> bool {
        let mut ring = self.lock();
        let evicted = if ring.samples.len() == self.capacity {
            ring.samples.pop_front();
            ring.evicted += 1;
            true
        } else {
            false
        };
        ring.samples.push_back(sample);
        evicted
    }

    pub fn extend<I: IntoIterator<Item = Sample>>(&self, samples: I) -> usize {
        let mut ring = self.lock();
        let mut evicted = 0;
        for sample in samples {
            if ring.samples.len() == self.capacity {
                ring.samples.pop_front();
                evicted += 1;
            }
            ring.samples.push_back(sample);
        }
        ring.evicted += evicted as u64;
        if evicted > 0 {
            debug!("rolling window evicted {} oldest sample(s)", evicted);
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.lock().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity
    }

    pub fn fill_fraction(&self) -> f64 {
        self.len() as f64 / self.capacity as f64
    }

    /// Total samples dropped to make room since creation.
    pub fn evicted(&self) -> u64 {
        self.lock().evicted
    }

    /// Copy the current contents into an owned window.
    pub fn snapshot(&self) -> Window {
        let samples: Vec<Sample> = self.lock().samples.iter().copied().collect();
        Window::from_parts(samples, self.sampling_rate)
    }

    pub fn clear(&self) {
        self.lock().samples.clear();
    }
}
