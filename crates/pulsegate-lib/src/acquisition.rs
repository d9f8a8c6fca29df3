//! Boundary between a sampling loop and the analysis core.
//!
//! The acquisition side pushes samples into a bounded single-producer /
//! single-consumer queue that never blocks the producer: when the queue is
//! full the oldest queued sample is discarded. The consumer drains the queue
//! into a [`RollingWindow`].

use crate::{signal::Sample, window::RollingWindow};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use log::warn;
use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

/// Outcome of one non-blocking push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// The queue was full; the oldest sample was dropped to make room.
    DroppedOldest,
    /// The consumer is gone.
    Disconnected,
}

/// Producer half. Not `Clone`: there is exactly one producer.
pub struct SampleSender {
    tx: Sender<Sample>,
    // Held only to evict the head of a full queue; it keeps the channel open,
    // so consumer liveness is tracked by `connected`.
    evict: Receiver<Sample>,
    connected: Arc<AtomicBool>,
    dropped: u64,
}

/// Consumer half. Dropping it disconnects the producer.
pub struct SampleReceiver {
    rx: Receiver<Sample>,
    connected: Arc<AtomicBool>,
}

impl Drop for SampleReceiver {
    fn drop(&mut self) {
        self.connected.store(false, Ordering::Release);
    }
}

/// Create a bounded sample queue holding at most `capacity` samples.
pub fn sample_channel(capacity: usize) -> (SampleSender, SampleReceiver) {
    let (tx, rx) = bounded(capacity.max(1));
    let connected = Arc::new(AtomicBool::new(true));
    (
        SampleSender {
            tx,
            evict: rx.clone(),
            connected: Arc::clone(&connected),
            dropped: 0,
        },
        SampleReceiver { rx, connected },
    )
}

impl SampleSender {
    pub fn push(&mut self, sample: Sample) -> PushOutcome {
        if !self.connected.load(Ordering::Acquire) {
            return PushOutcome::Disconnected;
        }
        let mut pending = sample;
        let mut evicted = false;
        loop {
            match self.tx.try_send(pending) {
                Ok(()) => {
                    return if evicted {
                        PushOutcome::DroppedOldest
                    } else {
                        PushOutcome::Queued
                    };
                }
                Err(TrySendError::Full(back)) => {
                    pending = back;
                    if self.evict.try_recv().is_ok() {
                        evicted = true;
                        self.dropped += 1;
                        if self.dropped.is_power_of_two() {
                            warn!(
                                "sample queue full; {} sample(s) dropped so far",
                                self.dropped
                            );
                        }
                    }
                }
                Err(TrySendError::Disconnected(_)) => return PushOutcome::Disconnected,
            }
        }
    }

    /// Samples discarded because the consumer fell behind.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl SampleReceiver {
    /// Move everything currently queued into `window`. Returns the count moved.
    pub fn drain_into(&self, window: &RollingWindow) -> usize {
        let mut moved = 0;
        loop {
            match self.rx.try_recv() {
                Ok(sample) => {
                    window.push(sample);
                    moved += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return moved,
            }
        }
    }

    /// Wait up to `timeout` for one sample. `None` on timeout or when the
    /// producer has gone and the queue is empty.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Sample> {
        match self.rx.recv_timeout(timeout) {
            Ok(sample) => Some(sample),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Mean of the most recent `capacity` values.
#[derive(Debug, Clone)]
pub struct RunningAverage {
    capacity: usize,
    values: VecDeque<f64>,
    sum: f64,
}

impl RunningAverage {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            values: VecDeque::with_capacity(capacity),
            sum: 0.0,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            if let Some(old) = self.values.pop_front() {
                self.sum -= old;
            }
        }
        self.values.push_back(value);
        self.sum += value;
    }

    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            None
        } else {
            Some(self.sum / self.values.len() as f64)
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Pull an amplitude out of one line of serial output.
///
/// A leading `[...]` capture stamp, as written by serial loggers, is skipped.
/// The rest of the line must hold exactly one run of digits; banner and
/// status lines with several numbers yield `None`.
pub fn parse_sample_line(line: &str) -> Option<f64> {
    let mut rest = line.trim();
    if rest.starts_with('[') {
        rest = rest.find(']').map(|end| &rest[end + 1..])?;
    }
    let mut runs = rest
        .split(|c: char| !c.is_ascii_digit())
        .filter(|run| !run.is_empty());
    let reading = runs.next()?;
    if runs.next().is_some() {
        return None;
    }
    reading.parse::<u64>().ok().map(|v| v as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn full_queue_drops_oldest() {
        let (mut tx, rx) = sample_channel(3);
        for i in 0..5 {
            tx.push(Sample::new(i as f64, i as f64));
        }
        assert_eq!(tx.dropped(), 2);
        let ring = RollingWindow::new(10.0, 1.0).unwrap();
        assert_eq!(rx.drain_into(&ring), 3);
        assert_eq!(ring.snapshot().amplitudes(), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn push_reports_outcome() {
        let (mut tx, rx) = sample_channel(1);
        assert_eq!(tx.push(Sample::new(0.0, 1.0)), PushOutcome::Queued);
        assert_eq!(tx.push(Sample::new(1.0, 2.0)), PushOutcome::DroppedOldest);
        assert_eq!(
            rx.recv_timeout(Duration::from_millis(10)).map(|s| s.amplitude),
            Some(2.0)
        );
        drop(rx);
        assert_eq!(tx.push(Sample::new(2.0, 3.0)), PushOutcome::Disconnected);
    }

    #[test]
    fn producer_stops_once_consumer_is_dropped() {
        let (mut tx, rx) = sample_channel(8);
        let producer = thread::spawn(move || {
            let mut pushed = 0u64;
            while tx.push(Sample::new(pushed as f64, 0.0)) != PushOutcome::Disconnected {
                pushed += 1;
            }
            pushed
        });
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_some());
        drop(rx);
        assert!(producer.join().unwrap() >= 1);
    }

    #[test]
    fn producer_thread_feeds_window() {
        let (mut tx, rx) = sample_channel(64);
        let ring = RollingWindow::new(100.0, 5.0).unwrap();
        let producer = thread::spawn(move || {
            for i in 0..2000 {
                tx.push(Sample::new(i as f64 * 10.0, i as f64));
            }
            tx.dropped()
        });
        let mut received = 0;
        while let Some(sample) = rx.recv_timeout(Duration::from_millis(200)) {
            ring.push(sample);
            received += 1;
        }
        let dropped = producer.join().unwrap();
        received += rx.drain_into(&ring);
        assert_eq!(received as u64 + dropped, 2000);
        let snap = ring.snapshot();
        assert_eq!(snap.last_timestamp(), Some(19990.0));
        assert!(snap
            .samples()
            .windows(2)
            .all(|w| w[1].timestamp > w[0].timestamp));
    }

    #[test]
    fn running_average_is_bounded() {
        let mut avg = RunningAverage::new(3);
        assert_eq!(avg.mean(), None);
        for v in [60.0, 70.0, 80.0, 90.0] {
            avg.push(v);
        }
        assert_eq!(avg.len(), 3);
        assert_eq!(avg.mean(), Some(80.0));
    }

    #[test]
    fn parses_serial_lines() {
        assert_eq!(parse_sample_line("438"), Some(438.0));
        assert_eq!(parse_sample_line("  Signal: 2051\r"), Some(2051.0));
        assert_eq!(
            parse_sample_line("[2024-05-01 10:00:00.123] 512"),
            Some(512.0)
        );
        assert_eq!(parse_sample_line("Waiting for heart beat..."), None);
        assert_eq!(parse_sample_line("[unterminated 12"), None);
        assert_eq!(parse_sample_line("Port: COM5 | Baud Rate: 9600"), None);
    }
}
