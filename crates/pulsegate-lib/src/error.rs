use crate::metrics::sqi::SegmentCheck;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Failure classification shared by the library and its callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    InvalidInput,
    InsufficientData,
    PoorSignalQuality,
    InsufficientPeaks,
    InsufficientIntervals,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HrvError {
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("Insufficient data: need at least {required} samples, got {samples}")]
    InsufficientData { samples: usize, required: usize },
    #[error(
        "Poor signal quality: {bad_segments} bad segments detected (max allowed: {max_allowed})"
    )]
    PoorSignalQuality {
        bad_segments: usize,
        max_allowed: usize,
        reasons: BTreeSet<SegmentCheck>,
    },
    #[error("HRV calculation failed: {found} peak(s) detected, at least 2 required")]
    InsufficientPeaks { found: usize },
    #[error("HRV calculation failed: {found} clean interval(s), at least 2 required")]
    InsufficientIntervals { found: usize },
    #[error("analysis cancelled before {stage}")]
    Cancelled { stage: String },
}

impl HrvError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HrvError::Configuration(_) => ErrorKind::Configuration,
            HrvError::InvalidInput(_) => ErrorKind::InvalidInput,
            HrvError::InsufficientData { .. } => ErrorKind::InsufficientData,
            HrvError::PoorSignalQuality { .. } => ErrorKind::PoorSignalQuality,
            HrvError::InsufficientPeaks { .. } => ErrorKind::InsufficientPeaks,
            HrvError::InsufficientIntervals { .. } => ErrorKind::InsufficientIntervals,
            HrvError::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Bad segment count carried by a quality rejection.
    pub fn bad_segments(&self) -> Option<usize> {
        match self {
            HrvError::PoorSignalQuality { bad_segments, .. } => Some(*bad_segments),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, HrvError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_message_names_count_and_threshold() {
        let err = HrvError::PoorSignalQuality {
            bad_segments: 3,
            max_allowed: 1,
            reasons: BTreeSet::from([SegmentCheck::Flatline]),
        };
        assert_eq!(
            err.to_string(),
            "Poor signal quality: 3 bad segments detected (max allowed: 1)"
        );
        assert_eq!(err.kind(), ErrorKind::PoorSignalQuality);
        assert_eq!(err.bad_segments(), Some(3));
    }

    #[test]
    fn kind_serializes_snake_case() {
        let js = serde_json::to_string(&ErrorKind::InsufficientIntervals).unwrap();
        assert_eq!(js, "\"insufficient_intervals\"");
    }
}
