use crate::acquisition::parse_sample_line;
use anyhow::{Context, Result};
use std::path::Path;

/// Parse amplitudes separated by newlines, commas or whitespace. Blank lines
/// and `#` comments are skipped.
pub fn parse_f64_series(text: &str) -> Result<Vec<f64>> {
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let content = line.split('#').next().unwrap_or_default();
        for token in content
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
        {
            let value: f64 = token
                .parse()
                .with_context(|| format!("line {}: {:?} is not a number", idx + 1, token))?;
            out.push(value);
        }
    }
    if out.is_empty() {
        anyhow::bail!("no numeric samples found");
    }
    Ok(out)
}

/// Read an amplitude series from disk.
pub fn read_f64_series(path: &Path) -> Result<Vec<f64>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_f64_series(&text)
}

/// Parse a serial monitor capture: one reading per line, possibly prefixed
/// with a bracketed capture time. Lines without a reading (banners, status
/// messages) are skipped.
pub fn parse_serial_capture(text: &str) -> Result<Vec<f64>> {
    let out: Vec<f64> = text.lines().filter_map(parse_sample_line).collect();
    if out.is_empty() {
        anyhow::bail!("no readings found in serial capture");
    }
    Ok(out)
}
