use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::signal::{samples_from_amplitudes, Sample};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp: f64,
    pub value: f64,
}

/// Timestamped session upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub data_points: Vec<DataPoint>,
    pub sample_rate: f64,
    #[serde(default)]
    pub max_bad_segments: Option<usize>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Bare amplitude upload; timestamps follow from the rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub ppg_data: Vec<f64>,
    pub sampling_rate: f64,
    #[serde(default)]
    pub max_bad_segments: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalysisRequest {
    Session(SessionRequest),
    Batch(BatchRequest),
}

impl AnalysisRequest {
    /// Samples, sampling rate and optional bad-segment tolerance.
    pub fn into_parts(self) -> (Vec<Sample>, f64, Option<usize>) {
        match self {
            AnalysisRequest::Session(req) => {
                let samples = req
                    .data_points
                    .into_iter()
                    .map(|p| Sample::new(p.timestamp, p.value))
                    .collect();
                (samples, req.sample_rate, req.max_bad_segments)
            }
            AnalysisRequest::Batch(req) => {
                let samples = samples_from_amplitudes(&req.ppg_data, req.sampling_rate);
                (samples, req.sampling_rate, req.max_bad_segments)
            }
        }
    }
}

pub fn parse_request(text: &str) -> Result<AnalysisRequest> {
    serde_json::from_str(text)
        .context("request must hold either dataPoints/sampleRate or ppg_data/sampling_rate")
}

pub fn read_request(path: &Path) -> Result<AnalysisRequest> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_request(&text).with_context(|| format!("in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_payload() {
        let text = r#"{"dataPoints":[{"timestamp":1000,"value":438},{"timestamp":1008,"value":441}],
                      "sampleRate":125,"sessionId":"abc"}"#;
        let (samples, rate, max_bad) = parse_request(text).unwrap().into_parts();
        assert_eq!(samples[1], Sample::new(1008.0, 441.0));
        assert_eq!(rate, 125.0);
        assert_eq!(max_bad, None);
    }

    #[test]
    fn batch_payload() {
        let text = r#"{"ppg_data":[438,445,452],"sampling_rate":100,"max_bad_segments":2}"#;
        let (samples, rate, max_bad) = parse_request(text).unwrap().into_parts();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[2].timestamp, 20.0);
        assert_eq!(rate, 100.0);
        assert_eq!(max_bad, Some(2));
    }

    #[test]
    fn unknown_shape_is_rejected() {
        assert!(parse_request(r#"{"samples":[1,2,3]}"#).is_err());
    }
}
