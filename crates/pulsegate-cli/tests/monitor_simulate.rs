use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use std::{error::Error, f64::consts::PI, fs};
use tempfile::TempDir;

#[test]
fn monitor_emits_one_line_per_window_and_a_summary() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let input = dir.path().join("session.txt");
    let text: String = (0..6000)
        .map(|i| {
            let v = 500.0 + 50.0 * (2.0 * PI * 1.2 * i as f64 / 100.0).sin();
            format!("{v}\n")
        })
        .collect();
    fs::write(&input, text)?;

    let mut cmd = cargo_bin_cmd!("pulsegate");
    cmd.args(["monitor", "--fs", "100", "--input", input.to_str().unwrap()]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let lines: Vec<Value> = String::from_utf8(output)?
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;
    assert_eq!(lines.len(), 5);
    for (n, update) in lines[..4].iter().enumerate() {
        assert_eq!(update["window_number"], n + 1);
        assert_eq!(update["response"]["success"], true);
    }
    assert_eq!(lines[0]["status"], "slight_decrease");
    let summary = &lines[4];
    assert_eq!(summary["windows_analysed"], 4);
    assert_eq!(summary["windows_failed"], 0);
    assert_eq!(summary["samples_evicted"], 3000);
    Ok(())
}

#[test]
fn simulated_recording_round_trips_through_analyze() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let out = dir.path().join("sim.csv");

    let mut sim = cargo_bin_cmd!("pulsegate");
    sim.args([
        "simulate",
        "--seconds",
        "30",
        "--format",
        "csv",
        "--out",
        out.to_str().unwrap(),
    ]);
    sim.assert().success();
    let written = fs::read_to_string(&out)?;
    assert!(written.starts_with("timestamp,value\n"));
    assert_eq!(written.lines().count(), 3001);

    let mut cmd = cargo_bin_cmd!("pulsegate");
    cmd.args(["analyze", "--fs", "100", "--input", out.to_str().unwrap()]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let js: Value = serde_json::from_slice(&output)?;
    assert_eq!(js["success"], true);
    let hr = js["meanHR"].as_f64().unwrap();
    assert!((60.0..=85.0).contains(&hr), "meanHR {hr}");
    Ok(())
}

#[test]
fn simulate_is_reproducible() -> Result<(), Box<dyn Error>> {
    let run = || -> Result<Vec<u8>, Box<dyn Error>> {
        let mut cmd = cargo_bin_cmd!("pulsegate");
        cmd.args(["simulate", "--seconds", "12", "--noise", "5", "--seed", "7"]);
        Ok(cmd.assert().success().get_output().stdout.clone())
    };
    let first = run()?;
    assert_eq!(first, run()?);
    assert_eq!(String::from_utf8(first)?.lines().count(), 1200);
    Ok(())
}

#[test]
fn live_monitor_rejects_vanishing_speed() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let input = dir.path().join("session.txt");
    let text: String = (0..3000)
        .map(|i| format!("{}\n", 500.0 + 50.0 * (2.0 * PI * 1.2 * i as f64 / 100.0).sin()))
        .collect();
    fs::write(&input, text)?;

    let mut cmd = cargo_bin_cmd!("pulsegate");
    cmd.args([
        "monitor",
        "--live",
        "--speed",
        "1e-300",
        "--fs",
        "100",
        "--input",
        input.to_str().unwrap(),
    ]);
    let output = cmd.assert().failure().code(1).get_output().clone();
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8(output.stderr)?.contains("--speed"));
    Ok(())
}
