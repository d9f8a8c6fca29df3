use crate::{
    config::PipelineConfig,
    signal::{Peaks, RRInterval, RRSeries},
};
use log::debug;
use serde::{Deserialize, Serialize};

/// Accepted intervals needed before the running-mean outlier test applies.
pub const OUTLIER_MIN_HISTORY: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    OutOfRange,
    Outlier,
    RelativeJump,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RejectedInterval {
    pub interval: RRInterval,
    pub reason: RejectReason,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactReport {
    pub clean: RRSeries,
    pub rejected: Vec<RejectedInterval>,
}

impl ArtifactReport {
    pub fn raw_count(&self) -> usize {
        self.clean.len() + self.rejected.len()
    }
}

/// Consecutive peak-to-peak intervals, in order.
pub fn extract_intervals(peaks: &Peaks) -> RRSeries {
    RRSeries::from_peaks(peaks)
}

/// Mean and variance of the accepted intervals, updated one value at a time.
#[derive(Debug, Default, Clone, Copy)]
struct RunningStats {
    n: usize,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    fn push(&mut self, x: f64) {
        self.n += 1;
        let delta = x - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (x - self.mean);
    }

    fn std(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            (self.m2 / self.n as f64).sqrt()
        }
    }
}

/// Drop implausible intervals in a single ordered pass.
///
/// An interval is rejected when it is outside `[min_rr_ms, max_rr_ms]`, when
/// it lies more than `outlier_k` standard deviations from the mean of the
/// intervals accepted so far, or when it differs from the last accepted
/// interval by more than `relative_jump_pct` percent. Only accepted intervals
/// move the running statistics and the jump reference. Nothing is
/// interpolated and the result may be empty.
pub fn reject_artifacts(rr: &RRSeries, cfg: &PipelineConfig) -> ArtifactReport {
    let mut report = ArtifactReport::default();
    let mut stats = RunningStats::default();
    let mut last_accepted: Option<f64> = None;

    for &interval in &rr.intervals {
        let value = interval.ms;
        let reason = if value < cfg.min_rr_ms || value > cfg.max_rr_ms {
            Some(RejectReason::OutOfRange)
        } else if stats.n >= OUTLIER_MIN_HISTORY
            && stats.std() > 0.0
            && (value - stats.mean).abs() > cfg.outlier_k * stats.std()
        {
            Some(RejectReason::Outlier)
        } else if last_accepted
            .map(|last| (value - last).abs() / last * 100.0 > cfg.relative_jump_pct)
            .unwrap_or(false)
        {
            Some(RejectReason::RelativeJump)
        } else {
            None
        };

        match reason {
            Some(reason) => {
                debug!(
                    "rejected RR {:.1} ms (peaks {}-{}): {:?}",
                    value, interval.from_peak, interval.to_peak, reason
                );
                report.rejected.push(RejectedInterval { interval, reason });
            }
            None => {
                stats.push(value);
                last_accepted = Some(value);
                report.clean.intervals.push(interval);
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reasons(report: &ArtifactReport) -> Vec<RejectReason> {
        report.rejected.iter().map(|r| r.reason).collect()
    }

    #[test]
    fn extracts_from_peak_timestamps() {
        let peaks = Peaks {
            indices: vec![0, 80, 160, 240],
            timestamps: vec![0.0, 800.0, 1600.0, 2400.0],
        };
        let rr = extract_intervals(&peaks);
        assert_eq!(rr.values(), vec![800.0, 800.0, 800.0]);
    }

    #[test]
    fn hard_bounds() {
        let rr = RRSeries::from_millis(&[250.0, 800.0, 2100.0, 810.0]);
        let report = reject_artifacts(&rr, &PipelineConfig::default());
        assert_eq!(report.clean.values(), vec![800.0, 810.0]);
        assert_eq!(
            reasons(&report),
            vec![RejectReason::OutOfRange, RejectReason::OutOfRange]
        );
    }

    #[test]
    fn ectopic_jump_uses_last_accepted_reference() {
        // 1100 is a 37.5% jump; the next beat is compared with 800, not 1100.
        let rr = RRSeries::from_millis(&[800.0, 1100.0, 820.0, 980.0]);
        let report = reject_artifacts(&rr, &PipelineConfig::default());
        assert_eq!(report.clean.values(), vec![800.0, 820.0, 980.0]);
        assert_eq!(reasons(&report), vec![RejectReason::RelativeJump]);
    }

    #[test]
    fn statistical_outlier() {
        let cfg = PipelineConfig {
            relative_jump_pct: 100.0,
            ..PipelineConfig::default()
        };
        let rr = RRSeries::from_millis(&[800.0, 810.0, 790.0, 805.0, 1000.0, 800.0]);
        let report = reject_artifacts(&rr, &cfg);
        assert_eq!(reasons(&report), vec![RejectReason::Outlier]);
        assert_eq!(report.rejected[0].interval.ms, 1000.0);
        assert_eq!(report.clean.len(), 5);
    }

    #[test]
    fn everything_rejected_is_not_an_error() {
        let rr = RRSeries::from_millis(&[100.0, 150.0, 5000.0]);
        let report = reject_artifacts(&rr, &PipelineConfig::default());
        assert!(report.clean.is_empty());
        assert_eq!(report.raw_count(), 3);
    }

    #[test]
    fn traceability_survives_rejection() {
        let rr = RRSeries::from_millis(&[800.0, 100.0, 810.0]);
        let report = reject_artifacts(&rr, &PipelineConfig::default());
        assert_eq!(report.clean.intervals[1].from_peak, 2);
        assert_eq!(report.rejected[0].interval.to_peak, 2);
    }
}
