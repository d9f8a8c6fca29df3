use crate::{
    acquisition::RunningAverage,
    config::{PipelineConfig, RealtimeConfig},
    error::Result,
    pipeline::{AnalysisResponse, Pipeline, QualityGatedPipeline},
    signal::Sample,
    window::RollingWindow,
};
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Direction of RMSSD between two successful windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendStatus {
    Improving,
    SlightDecrease,
    SignificantDrop,
}

impl TrendStatus {
    pub fn classify(current: f64, previous: Option<f64>, drop_threshold_ms: f64) -> Self {
        let Some(previous) = previous else {
            return TrendStatus::SlightDecrease;
        };
        let change = current - previous;
        if change >= 0.0 {
            TrendStatus::Improving
        } else if change > -drop_threshold_ms {
            TrendStatus::SlightDecrease
        } else {
            TrendStatus::SignificantDrop
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorUpdate {
    pub window_number: usize,
    /// Recording time (s) at which the window was analysed.
    pub data_time_s: f64,
    pub response: AnalysisResponse,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status: Option<TrendStatus>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub change_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub smoothed_hr: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub improving: usize,
    pub slight_decrease: usize,
    pub significant_drop: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub windows_analysed: usize,
    pub windows_failed: usize,
    pub status_counts: StatusCounts,
    pub final_rmssd: Option<f64>,
    pub smoothed_hr: Option<f64>,
    pub samples_evicted: u64,
}

/// Rolling-window HRV monitoring on a fixed cadence.
///
/// Every run analyses a fresh snapshot of the ring and is independent of the
/// runs before it; only the trend feedback looks back at the previous RMSSD.
pub struct RealtimeMonitor<P: Pipeline = QualityGatedPipeline> {
    window: Arc<RollingWindow>,
    pipeline: P,
    cfg: RealtimeConfig,
    last_run_s: f64,
    previous_rmssd: Option<f64>,
    windows_analysed: usize,
    windows_failed: usize,
    counts: StatusCounts,
    heart_rate: RunningAverage,
}

impl RealtimeMonitor<QualityGatedPipeline> {
    pub fn new(
        sampling_rate: f64,
        pipeline_cfg: PipelineConfig,
        cfg: RealtimeConfig,
    ) -> Result<Self> {
        pipeline_cfg.validate(sampling_rate)?;
        Self::with_pipeline(sampling_rate, QualityGatedPipeline::new(pipeline_cfg), cfg)
    }
}

impl<P: Pipeline> RealtimeMonitor<P> {
    pub fn with_pipeline(sampling_rate: f64, pipeline: P, cfg: RealtimeConfig) -> Result<Self> {
        cfg.validate(pipeline.config())?;
        let window = Arc::new(RollingWindow::new(sampling_rate, cfg.window_size_seconds)?);
        let heart_rate = RunningAverage::new(cfg.hr_smoothing);
        Ok(Self {
            window,
            pipeline,
            cfg,
            last_run_s: 0.0,
            previous_rmssd: None,
            windows_analysed: 0,
            windows_failed: 0,
            counts: StatusCounts::default(),
            heart_rate,
        })
    }

    /// Shared handle to the ring, for a producer running elsewhere.
    pub fn window(&self) -> Arc<RollingWindow> {
        Arc::clone(&self.window)
    }

    pub fn push(&self, sample: Sample) {
        self.window.push(sample);
    }

    /// True when a run is due at recording time `data_time_s`.
    pub fn is_due(&self, data_time_s: f64) -> bool {
        data_time_s >= self.cfg.window_size_seconds
            && data_time_s - self.last_run_s >= self.cfg.update_interval_seconds
            && self.window.fill_fraction() >= self.cfg.min_fill_fraction
    }

    /// Analyse the current window if a run is due.
    pub fn poll(&mut self, data_time_s: f64) -> Option<MonitorUpdate> {
        if !self.is_due(data_time_s) {
            return None;
        }
        self.last_run_s = data_time_s;
        self.windows_analysed += 1;
        let snapshot = self.window.snapshot();
        let outcome = self.pipeline.run(&snapshot);
        let response = AnalysisResponse::from(&outcome);

        let mut update = MonitorUpdate {
            window_number: self.windows_analysed,
            data_time_s,
            response,
            status: None,
            change_ms: None,
            smoothed_hr: None,
        };
        match &outcome.result {
            Ok(hrv) => {
                let status =
                    TrendStatus::classify(hrv.rmssd, self.previous_rmssd, self.cfg.drop_threshold_ms);
                match status {
                    TrendStatus::Improving => self.counts.improving += 1,
                    TrendStatus::SlightDecrease => self.counts.slight_decrease += 1,
                    TrendStatus::SignificantDrop => self.counts.significant_drop += 1,
                }
                update.change_ms = self.previous_rmssd.map(|prev| hrv.rmssd - prev);
                update.status = Some(status);
                self.previous_rmssd = Some(hrv.rmssd);
                self.heart_rate.push(hrv.mean_hr);
                update.smoothed_hr = self.heart_rate.mean();
                info!(
                    "window #{}: rmssd {:.2} ms, {:?}",
                    update.window_number, hrv.rmssd, status
                );
            }
            Err(err) => {
                self.windows_failed += 1;
                info!("window #{}: {}", update.window_number, err);
            }
        }
        Some(update)
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            windows_analysed: self.windows_analysed,
            windows_failed: self.windows_failed,
            status_counts: self.counts.clone(),
            final_rmssd: self.previous_rmssd,
            smoothed_hr: self.heart_rate.mean(),
            samples_evicted: self.window.evicted(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::signal::samples_from_amplitudes;
    use crate::synth;

    fn replay(monitor: &mut RealtimeMonitor, data: &[f64], fs: f64) -> Vec<MonitorUpdate> {
        let mut updates = Vec::new();
        for (i, sample) in samples_from_amplitudes(data, fs).into_iter().enumerate() {
            monitor.push(sample);
            if let Some(update) = monitor.poll((i + 1) as f64 / fs) {
                updates.push(update);
            }
        }
        updates
    }

    #[test]
    fn trend_classification() {
        assert_eq!(
            TrendStatus::classify(40.0, None, 5.0),
            TrendStatus::SlightDecrease
        );
        assert_eq!(
            TrendStatus::classify(40.0, Some(40.0), 5.0),
            TrendStatus::Improving
        );
        assert_eq!(
            TrendStatus::classify(36.0, Some(40.0), 5.0),
            TrendStatus::SlightDecrease
        );
        assert_eq!(
            TrendStatus::classify(35.0, Some(40.0), 5.0),
            TrendStatus::SignificantDrop
        );
    }

    #[test]
    fn sinusoid_session_updates_every_interval() {
        let fs = 100.0;
        let mut monitor =
            RealtimeMonitor::new(fs, PipelineConfig::default(), RealtimeConfig::default()).unwrap();
        let data = synth::sinusoid(fs, 60.0, 1.2, 500.0, 50.0);
        let updates = replay(&mut monitor, &data, fs);
        let times: Vec<f64> = updates.iter().map(|u| u.data_time_s).collect();
        assert_eq!(times, vec![30.0, 40.0, 50.0, 60.0]);
        assert!(updates.iter().all(|u| u.response.success));
        assert_eq!(updates[0].status, Some(TrendStatus::SlightDecrease));
        assert!(updates[0].change_ms.is_none());
        assert!(updates[1].change_ms.is_some());

        let summary = monitor.summary();
        assert_eq!(summary.windows_analysed, 4);
        assert_eq!(summary.windows_failed, 0);
        let counts = &summary.status_counts;
        assert_eq!(
            counts.improving + counts.slight_decrease + counts.significant_drop,
            4
        );
        assert_eq!(summary.samples_evicted, 3000);
        let hr = summary.smoothed_hr.unwrap();
        assert!((65.0..=80.0).contains(&hr));
    }

    #[test]
    fn poor_windows_are_counted_not_fatal() {
        let fs = 50.0;
        let mut monitor =
            RealtimeMonitor::new(fs, PipelineConfig::default(), RealtimeConfig::default()).unwrap();
        let updates = replay(&mut monitor, &vec![300.0; 50 * 45], fs);
        assert_eq!(updates.len(), 2);
        for u in &updates {
            assert!(!u.response.success);
            assert_eq!(u.response.error_kind, Some(ErrorKind::PoorSignalQuality));
            assert_eq!(u.response.bad_segments, 10);
            assert!(u.status.is_none());
        }
        assert_eq!(monitor.summary().windows_failed, 2);
        assert_eq!(monitor.summary().final_rmssd, None);
    }

    #[test]
    fn short_window_config_is_rejected() {
        let cfg = RealtimeConfig {
            window_size_seconds: 5.0,
            ..RealtimeConfig::default()
        };
        assert!(RealtimeMonitor::new(100.0, PipelineConfig::default(), cfg).is_err());
    }
}
