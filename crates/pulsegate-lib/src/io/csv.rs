use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::io::Read;
use std::path::Path;

use crate::signal::Sample;

fn locate(headers: &StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.iter().any(|n| h.eq_ignore_ascii_case(n)))
}

/// Read `timestamp,amplitude` rows (the amplitude column may also be named
/// `value` or `ppg`). Timestamps are milliseconds.
pub fn read_samples_csv_from<R: Read>(reader: R) -> Result<Vec<Sample>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(reader);
    let headers = reader.headers().context("reading header")?.clone();
    let ts_idx = locate(&headers, &["timestamp", "timestamp_ms", "time_ms"])
        .context("missing timestamp column")?;
    let amp_idx = locate(&headers, &["amplitude", "value", "ppg"])
        .context("missing amplitude column (amplitude/value/ppg)")?;

    let mut samples = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("reading record {}", row + 1))?;
        let timestamp_str = record
            .get(ts_idx)
            .ok_or_else(|| anyhow::anyhow!("row {}: missing timestamp", row + 1))?;
        let timestamp: f64 = timestamp_str
            .parse()
            .with_context(|| format!("row {}: parsing timestamp {}", row + 1, timestamp_str))?;
        let value_str = record
            .get(amp_idx)
            .ok_or_else(|| anyhow::anyhow!("row {}: missing amplitude", row + 1))?;
        let amplitude: f64 = value_str
            .parse()
            .with_context(|| format!("row {}: parsing amplitude {}", row + 1, value_str))?;
        samples.push(Sample::new(timestamp, amplitude));
    }
    if samples.is_empty() {
        anyhow::bail!("no samples found");
    }
    Ok(samples)
}

pub fn read_samples_csv(path: &Path) -> Result<Vec<Sample>> {
    let file =
        std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    read_samples_csv_from(file).with_context(|| format!("in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_columns() {
        let text = "timestamp, value\n0, 438\n10, 445\n20, 452\n";
        let samples = read_samples_csv_from(text.as_bytes()).unwrap();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[1], Sample::new(10.0, 445.0));
    }

    #[test]
    fn missing_column_is_an_error() {
        let err = read_samples_csv_from("time,foo\n0,1\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("timestamp"));
    }
}
