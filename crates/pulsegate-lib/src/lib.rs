//! Quality-gated heart rate variability from raw photoplethysmography.
//!
//! A recording (or a rolling window of a live stream) passes through
//! segment quality checks, band-pass filtering, peak picking, RR interval
//! extraction and artifact rejection before time-domain metrics are computed.
//! [`pipeline::analyze`] is the batch entry point; [`realtime::RealtimeMonitor`]
//! runs the same pipeline on a fixed cadence.

pub mod acquisition;
pub mod config;
pub mod detectors;
pub mod error;
pub mod io;
pub mod metrics;
pub mod pipeline;
pub mod plot;
pub mod realtime;
pub mod signal;
pub mod synth;
pub mod window;

pub use config::{PipelineConfig, RealtimeConfig, Settings};
pub use error::{ErrorKind, HrvError};
pub use metrics::hrv::HrvResult;
pub use pipeline::{analyze, AnalysisResponse, Pipeline, QualityGatedPipeline};
pub use signal::*;
