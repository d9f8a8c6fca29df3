//! Quality-gated HRV extraction.
//!
//! One invocation walks a fixed sequence of stages over an immutable window:
//! validation, segment quality, band-pass filtering, peak picking, interval
//! extraction, artifact rejection and metric computation. Stages only move
//! forward and the first failure ends the run.

use crate::{
    config::PipelineConfig,
    detectors::ppg::{bandpass, peaks_from_indices, pick_peaks},
    error::{ErrorKind, HrvError, Result},
    metrics::{
        hrv::{compute_metrics, HrvResult},
        intervals::{extract_intervals, reject_artifacts, ArtifactReport},
        sqi::{analyze_segments, evaluate_gate, QualityDecision, SegmentQualityResult},
    },
    signal::{Peaks, RRSeries, Sample, Window},
    window::{batch_window, validate_samples},
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Validating,
    QualityChecking,
    Filtering,
    PeakDetecting,
    IntervalExtracting,
    ArtifactRejecting,
    MetricsComputing,
    Done,
    Failed,
}

impl Stage {
    fn next(self) -> Option<Stage> {
        use Stage::*;
        match self {
            Idle => Some(Validating),
            Validating => Some(QualityChecking),
            QualityChecking => Some(Filtering),
            Filtering => Some(PeakDetecting),
            PeakDetecting => Some(IntervalExtracting),
            IntervalExtracting => Some(ArtifactRejecting),
            ArtifactRejecting => Some(MetricsComputing),
            MetricsComputing => Some(Done),
            Done | Failed => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Validating => "validating",
            Stage::QualityChecking => "quality checking",
            Stage::Filtering => "filtering",
            Stage::PeakDetecting => "peak detecting",
            Stage::IntervalExtracting => "interval extracting",
            Stage::ArtifactRejecting => "artifact rejecting",
            Stage::MetricsComputing => "metrics computing",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Shared flag a caller sets to stop a run at the next stage boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything one invocation produced, including the diagnostics gathered
/// before a failure.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    pub result: Result<HrvResult>,
    /// Stages entered, in order; always ends with `Done` or `Failed`.
    pub trace: Vec<Stage>,
    pub segments: Vec<SegmentQualityResult>,
    pub decision: Option<QualityDecision>,
    pub peaks: Option<Peaks>,
    pub intervals: Option<RRSeries>,
    pub artifacts: Option<ArtifactReport>,
}

impl PipelineOutcome {
    pub fn final_stage(&self) -> Stage {
        self.trace.last().copied().unwrap_or(Stage::Idle)
    }

    pub fn bad_segments(&self) -> usize {
        self.decision.as_ref().map(|d| d.bad_segments).unwrap_or(0)
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// A window-in, metrics-out HRV processor.
pub trait Pipeline {
    fn config(&self) -> &PipelineConfig;

    /// Run every stage on `window`, checking `cancel` at each stage boundary.
    /// `progress` sees every stage entered after `Idle`, terminal one included.
    fn run_observed(
        &self,
        window: &Window,
        cancel: &CancelToken,
        progress: &mut dyn FnMut(Stage),
    ) -> PipelineOutcome;

    fn run_with_cancel(&self, window: &Window, cancel: &CancelToken) -> PipelineOutcome {
        self.run_observed(window, cancel, &mut |_| {})
    }

    fn run(&self, window: &Window) -> PipelineOutcome {
        self.run_with_cancel(window, &CancelToken::new())
    }
}

/// The in-process quality-gated pipeline.
#[derive(Debug, Clone, Default)]
pub struct QualityGatedPipeline {
    cfg: PipelineConfig,
}

/// Forward-only walk through [`Stage`]s for one run, collecting diagnostics
/// until the outcome is assembled.
struct Run<'a, 'p> {
    stage: Stage,
    cancel: &'a CancelToken,
    progress: &'p mut dyn FnMut(Stage),
    trace: Vec<Stage>,
    segments: Vec<SegmentQualityResult>,
    decision: Option<QualityDecision>,
    peaks: Option<Peaks>,
    intervals: Option<RRSeries>,
    artifacts: Option<ArtifactReport>,
}

impl<'a, 'p> Run<'a, 'p> {
    fn new(cancel: &'a CancelToken, progress: &'p mut dyn FnMut(Stage)) -> Self {
        Self {
            stage: Stage::Idle,
            cancel,
            progress,
            trace: vec![Stage::Idle],
            segments: Vec::new(),
            decision: None,
            peaks: None,
            intervals: None,
            artifacts: None,
        }
    }

    fn enter(&mut self, stage: Stage) {
        self.stage = stage;
        self.trace.push(stage);
        (self.progress)(stage);
    }

    fn advance(&mut self) -> Result<()> {
        let Some(next) = self.stage.next() else {
            return Ok(());
        };
        if self.cancel.is_cancelled() {
            return Err(HrvError::Cancelled {
                stage: next.to_string(),
            });
        }
        self.enter(next);
        Ok(())
    }

    fn finish(mut self, result: Result<HrvResult>) -> PipelineOutcome {
        if result.is_err() {
            self.enter(Stage::Failed);
        }
        PipelineOutcome {
            result,
            trace: self.trace,
            segments: self.segments,
            decision: self.decision,
            peaks: self.peaks,
            intervals: self.intervals,
            artifacts: self.artifacts,
        }
    }
}

impl QualityGatedPipeline {
    pub fn new(cfg: PipelineConfig) -> Self {
        Self { cfg }
    }

    fn stages(&self, window: &Window, run: &mut Run<'_, '_>) -> Result<HrvResult> {
        let cfg = &self.cfg;
        let fs = window.sampling_rate();

        run.advance()?;
        cfg.validate(fs)?;
        validate_samples(window.samples())?;
        let required = cfg.min_sample_count(fs);
        if window.len() < required {
            return Err(HrvError::InsufficientData {
                samples: window.len(),
                required,
            });
        }

        run.advance()?;
        let segments = analyze_segments(window, cfg);
        let decision = evaluate_gate(&segments, cfg.max_bad_segments);
        run.segments = segments;
        run.decision = Some(decision.clone());
        if !decision.accepted {
            warn!("{}", decision.message());
        }
        decision.into_result()?;

        run.advance()?;
        let filtered = bandpass(
            &window.amplitudes(),
            fs,
            cfg.bandpass_low_hz,
            cfg.bandpass_high_hz,
        );

        run.advance()?;
        let peaks = peaks_from_indices(window, pick_peaks(&filtered, fs, cfg))?;
        run.peaks = Some(peaks.clone());

        run.advance()?;
        let intervals = extract_intervals(&peaks);
        run.intervals = Some(intervals.clone());

        run.advance()?;
        let report = reject_artifacts(&intervals, cfg);
        run.artifacts = Some(report.clone());

        run.advance()?;
        let timestamp = window.last_timestamp().unwrap_or(0.0);
        let result = compute_metrics(
            &report.clean,
            report.raw_count(),
            timestamp,
            cfg.metric_decimals,
        )?;

        run.advance()?;
        Ok(result)
    }
}

impl Pipeline for QualityGatedPipeline {
    fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    fn run_observed(
        &self,
        window: &Window,
        cancel: &CancelToken,
        progress: &mut dyn FnMut(Stage),
    ) -> PipelineOutcome {
        let mut run = Run::new(cancel, progress);
        let result = self.stages(window, &mut run);
        if let Ok(hrv) = &result {
            info!(
                "HRV computed: rmssd={} ms, mean_hr={} bpm over {} intervals",
                hrv.rmssd,
                hrv.mean_hr,
                hrv.nn_intervals.len()
            );
        }
        run.finish(result)
    }
}

/// Reply to one batch request: metrics on success, a classified message on
/// failure, and the bad segment count either way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub rmssd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sdnn: Option<f64>,
    #[serde(rename = "meanHR", skip_serializing_if = "Option::is_none", default)]
    pub mean_hr: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pnn50: Option<f64>,
    #[serde(
        rename = "nnIntervals",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub nn_intervals: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timestamp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_kind: Option<ErrorKind>,
    pub bad_segments: usize,
}

impl AnalysisResponse {
    pub fn failure(err: &HrvError, bad_segments: usize) -> Self {
        Self {
            success: false,
            rmssd: None,
            sdnn: None,
            mean_hr: None,
            pnn50: None,
            nn_intervals: None,
            timestamp: None,
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
            bad_segments,
        }
    }
}

impl From<&PipelineOutcome> for AnalysisResponse {
    fn from(outcome: &PipelineOutcome) -> Self {
        let bad_segments = outcome.bad_segments();
        match &outcome.result {
            Ok(hrv) => Self {
                success: true,
                rmssd: Some(hrv.rmssd),
                sdnn: Some(hrv.sdnn),
                mean_hr: Some(hrv.mean_hr),
                pnn50: Some(hrv.pnn50),
                nn_intervals: Some(hrv.nn_intervals.clone()),
                timestamp: Some(hrv.timestamp),
                error: None,
                error_kind: None,
                bad_segments,
            },
            Err(err) => Self::failure(err, bad_segments),
        }
    }
}

/// Batch entry point: validate, window and run one recording.
///
/// `max_bad_segments` overrides the configured tolerance when given.
pub fn analyze(
    samples: Vec<Sample>,
    sampling_rate: f64,
    max_bad_segments: Option<usize>,
    cfg: &PipelineConfig,
) -> AnalysisResponse {
    let cfg = match max_bad_segments {
        Some(max) => cfg.clone().with_max_bad_segments(max),
        None => cfg.clone(),
    };
    let window = match batch_window(samples, sampling_rate, &cfg) {
        Ok(window) => window,
        Err(err) => return AnalysisResponse::failure(&err, 0),
    };
    let outcome = QualityGatedPipeline::new(cfg).run(&window);
    AnalysisResponse::from(&outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::samples_from_amplitudes;
    use crate::synth;

    fn sinus_window() -> Window {
        let data = synth::sinusoid(100.0, 30.0, 1.2, 500.0, 50.0);
        Window::from_parts(samples_from_amplitudes(&data, 100.0), 100.0)
    }

    #[test]
    fn sinusoid_runs_to_done() {
        let outcome = QualityGatedPipeline::default().run(&sinus_window());
        let hrv = outcome.result.as_ref().unwrap();
        assert!(hrv.rmssd > 0.0);
        assert!((65.0..=80.0).contains(&hrv.mean_hr), "hr {}", hrv.mean_hr);
        assert_eq!(hrv.timestamp, 29990.0);
        assert_eq!(
            outcome.trace,
            vec![
                Stage::Idle,
                Stage::Validating,
                Stage::QualityChecking,
                Stage::Filtering,
                Stage::PeakDetecting,
                Stage::IntervalExtracting,
                Stage::ArtifactRejecting,
                Stage::MetricsComputing,
                Stage::Done,
            ]
        );
        assert_eq!(outcome.bad_segments(), 0);
    }

    #[test]
    fn flatline_stops_at_quality_gate() {
        let window = Window::from_parts(samples_from_amplitudes(&vec![600.0; 1500], 100.0), 100.0);
        let outcome = QualityGatedPipeline::default().run(&window);
        assert_eq!(outcome.final_stage(), Stage::Failed);
        assert_eq!(
            outcome.trace[outcome.trace.len() - 2],
            Stage::QualityChecking
        );
        assert_eq!(outcome.bad_segments(), 5);
        assert_eq!(
            outcome.result.unwrap_err().kind(),
            ErrorKind::PoorSignalQuality
        );
        assert!(outcome.peaks.is_none());
    }

    #[test]
    fn cancellation_between_stages() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let outcome = QualityGatedPipeline::default().run_with_cancel(&sinus_window(), &cancel);
        assert_eq!(outcome.trace, vec![Stage::Idle, Stage::Failed]);
        assert_eq!(outcome.result.unwrap_err().kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn cancellation_mid_run_keeps_diagnostics() {
        let cancel = CancelToken::new();
        let outcome = QualityGatedPipeline::default().run_observed(&sinus_window(), &cancel, &mut |stage| {
            if stage == Stage::QualityChecking {
                cancel.cancel();
            }
        });
        assert_eq!(
            outcome.trace,
            vec![Stage::Idle, Stage::Validating, Stage::QualityChecking, Stage::Failed]
        );
        match &outcome.result {
            Err(HrvError::Cancelled { stage }) => assert_eq!(stage, "filtering"),
            other => panic!("expected cancellation, got {other:?}"),
        }
        assert_eq!(outcome.segments.len(), 10);
        assert!(outcome.decision.as_ref().unwrap().accepted);
        assert!(outcome.peaks.is_none());
        assert!(outcome.intervals.is_none());
    }

    #[test]
    fn progress_sees_every_stage_after_idle() {
        let mut seen = Vec::new();
        let outcome = QualityGatedPipeline::default().run_observed(
            &sinus_window(),
            &CancelToken::new(),
            &mut |stage| seen.push(stage),
        );
        assert_eq!(seen.first(), Some(&Stage::Validating));
        assert_eq!(seen.last(), Some(&Stage::Done));
        assert_eq!(&outcome.trace[1..], &seen[..]);
    }

    #[test]
    fn identical_input_identical_output() {
        let pipeline = QualityGatedPipeline::default();
        let a = AnalysisResponse::from(&pipeline.run(&sinus_window()));
        let b = AnalysisResponse::from(&pipeline.run(&sinus_window()));
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn analyze_reports_short_input() {
        let samples = samples_from_amplitudes(&vec![500.0; 500], 100.0);
        let response = analyze(samples, 100.0, None, &PipelineConfig::default());
        assert!(!response.success);
        assert_eq!(response.error_kind, Some(ErrorKind::InsufficientData));
        assert_eq!(response.bad_segments, 0);
        assert_eq!(
            response.error.as_deref(),
            Some("Insufficient data: need at least 1000 samples, got 500")
        );
    }

    #[test]
    fn analyze_validates_rate_first() {
        let samples = samples_from_amplitudes(&vec![500.0; 10], 100.0);
        let response = analyze(samples, 1500.0, None, &PipelineConfig::default());
        assert_eq!(response.error_kind, Some(ErrorKind::Configuration));
    }

    #[test]
    fn analyze_success_shape() {
        let data = synth::sinusoid(100.0, 30.0, 1.2, 500.0, 50.0);
        let response = analyze(
            samples_from_amplitudes(&data, 100.0),
            100.0,
            Some(0),
            &PipelineConfig::default(),
        );
        assert!(response.success);
        let js = serde_json::to_value(&response).unwrap();
        assert!(js.get("error").is_none());
        assert!(js["rmssd"].as_f64().unwrap() > 0.0);
        assert!(js.get("meanHR").is_some());
        assert_eq!(js["bad_segments"], 0);
    }

    #[test]
    fn poor_quality_shape() {
        let response = analyze(
            samples_from_amplitudes(&vec![600.0; 1200], 100.0),
            100.0,
            None,
            &PipelineConfig::default(),
        );
        assert!(!response.success);
        assert_eq!(response.bad_segments, 4);
        assert_eq!(
            response.error.as_deref(),
            Some("Poor signal quality: 4 bad segments detected (max allowed: 0)")
        );
    }
}
