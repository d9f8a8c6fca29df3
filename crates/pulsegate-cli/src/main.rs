use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, warn};
use plotters::prelude::*;
use pulsegate_lib::{
    acquisition::{sample_channel, PushOutcome},
    config::{load_settings, Settings},
    detectors::ppg::detect_peaks,
    io::{csv as csv_io, request, text as text_io},
    metrics::{
        intervals::{extract_intervals, reject_artifacts, ArtifactReport},
        sqi::{analyze_segments, evaluate_gate, QualityDecision, SegmentQualityResult},
    },
    pipeline::{analyze, Pipeline, QualityGatedPipeline},
    plot::{figure_from_rr, figure_from_window, Figure, Series},
    realtime::RealtimeMonitor,
    signal::{samples_from_amplitudes, Sample},
    synth,
    window::batch_window,
};
use serde::Serialize;
use std::{
    fs,
    io::{self, Read, Write},
    path::{Path, PathBuf},
    process::ExitCode,
    thread,
    time::Duration,
};

#[derive(Parser)]
#[command(
    name = "pulsegate",
    version,
    about = "Quality-gated HRV analysis of raw PPG recordings"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum InputFormat {
    /// One amplitude per line.
    Text,
    /// Serial monitor capture, optionally with `[...]` line stamps.
    Serial,
    /// `timestamp,amplitude` columns, timestamps in ms.
    Csv,
    /// Analysis request body (`dataPoints`/`sampleRate` or `ppg_data`/`sampling_rate`).
    Json,
}

impl InputFormat {
    fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase())
            .as_deref()
        {
            Some("csv") => InputFormat::Csv,
            Some("json") => InputFormat::Json,
            Some("log") => InputFormat::Serial,
            _ => InputFormat::Text,
        }
    }
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Recording to read; stdin when omitted.
    #[arg(long)]
    input: Option<PathBuf>,
    /// Input format; inferred from the file extension when omitted.
    #[arg(long, value_enum)]
    format: Option<InputFormat>,
    /// Sampling rate in Hz. Required unless the input is a JSON request.
    #[arg(long)]
    fs: Option<f64>,
    /// Bad segments tolerated before the recording is rejected.
    #[arg(long)]
    max_bad_segments: Option<usize>,
    /// TOML settings file.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum PlotKind {
    /// Cleaned NN intervals.
    Tachogram,
    /// Raw signal with detected peaks.
    Signal,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum SimFormat {
    Text,
    Csv,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the quality-gated pipeline and print the analysis response as JSON
    Analyze {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Per-segment signal quality and the gate decision
    Quality {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Detected peaks and RR intervals before and after artifact rejection
    Peaks {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Replay a recording through the rolling-window monitor
    Monitor {
        #[command(flatten)]
        input: InputArgs,
        /// Feed samples from a paced producer thread instead of directly.
        #[arg(long)]
        live: bool,
        /// Replay speed multiplier for --live.
        #[arg(long, default_value_t = 1.0)]
        speed: f64,
        /// Producer queue capacity in samples for --live.
        #[arg(long, default_value_t = 1024)]
        queue_capacity: usize,
    },
    /// Write a synthetic PPG recording
    Simulate {
        #[arg(long, default_value_t = 100.0)]
        fs: f64,
        #[arg(long, default_value_t = 60.0)]
        seconds: f64,
        #[arg(long, default_value_t = 72.0)]
        bpm: f64,
        /// Peak beat-to-beat modulation in ms from a 4 s breathing cycle.
        #[arg(long, default_value_t = 30.0)]
        modulation_ms: f64,
        /// Peak uniform noise in ADC counts.
        #[arg(long, default_value_t = 0.0)]
        noise: f64,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long, value_enum, default_value = "text")]
        format: SimFormat,
        /// Output file; stdout when omitted.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Render a PNG of the tachogram or of the signal with its peaks
    Plot {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, value_enum, default_value = "tachogram")]
        kind: PlotKind,
        #[arg(long)]
        out: PathBuf,
    },
}

fn main() -> Result<ExitCode> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Analyze { input } => return cmd_analyze(&input),
        Commands::Quality { input } => cmd_quality(&input)?,
        Commands::Peaks { input } => cmd_peaks(&input)?,
        Commands::Monitor {
            input,
            live,
            speed,
            queue_capacity,
        } => cmd_monitor(&input, live, speed, queue_capacity)?,
        Commands::Simulate {
            fs,
            seconds,
            bpm,
            modulation_ms,
            noise,
            seed,
            format,
            out,
        } => cmd_simulate(
            fs,
            seconds,
            bpm,
            modulation_ms,
            noise,
            seed,
            format,
            out.as_deref(),
        )?,
        Commands::Plot { input, kind, out } => cmd_plot(&input, kind, &out)?,
    }
    Ok(ExitCode::SUCCESS)
}

/// A loaded recording with the options that travel with it.
struct Recording {
    samples: Vec<Sample>,
    sampling_rate: f64,
    max_bad_segments: Option<usize>,
    settings: Settings,
}

fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .context("failed to read stdin")?;
    Ok(buf)
}

fn require_fs(fs: Option<f64>, format: InputFormat) -> Result<f64> {
    fs.with_context(|| format!("--fs is required for {format:?} input"))
}

fn load_recording(args: &InputArgs) -> Result<Recording> {
    let settings = match &args.config {
        Some(path) => load_settings(path)?,
        None => Settings::default(),
    };
    let input = args.input.as_deref();
    let format = args
        .format
        .or_else(|| input.map(InputFormat::from_path))
        .unwrap_or(InputFormat::Text);

    let (samples, sampling_rate, request_max_bad) = match format {
        InputFormat::Text => {
            let rate = require_fs(args.fs, format)?;
            let values = match input {
                Some(path) => text_io::read_f64_series(path)?,
                None => text_io::parse_f64_series(&read_stdin()?)?,
            };
            (samples_from_amplitudes(&values, rate), rate, None)
        }
        InputFormat::Serial => {
            let rate = require_fs(args.fs, format)?;
            let text = match input {
                Some(path) => fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                None => read_stdin()?,
            };
            let values = text_io::parse_serial_capture(&text)?;
            (samples_from_amplitudes(&values, rate), rate, None)
        }
        InputFormat::Csv => {
            let rate = require_fs(args.fs, format)?;
            let samples = match input {
                Some(path) => csv_io::read_samples_csv(path)?,
                None => csv_io::read_samples_csv_from(io::stdin())?,
            };
            (samples, rate, None)
        }
        InputFormat::Json => {
            let req = match input {
                Some(path) => request::read_request(path)?,
                None => request::parse_request(&read_stdin()?)?,
            };
            let (samples, rate, max_bad) = req.into_parts();
            (samples, args.fs.unwrap_or(rate), max_bad)
        }
    };
    info!(
        "loaded {} samples at {} Hz ({:?})",
        samples.len(),
        sampling_rate,
        format
    );
    Ok(Recording {
        samples,
        sampling_rate,
        max_bad_segments: args.max_bad_segments.or(request_max_bad),
        settings,
    })
}

impl Recording {
    fn pipeline_config(&self) -> pulsegate_lib::PipelineConfig {
        let cfg = self.settings.pipeline.clone();
        match self.max_bad_segments {
            Some(max) => cfg.with_max_bad_segments(max),
            None => cfg,
        }
    }
}

fn cmd_analyze(args: &InputArgs) -> Result<ExitCode> {
    let rec = load_recording(args)?;
    let response = analyze(
        rec.samples,
        rec.sampling_rate,
        rec.max_bad_segments,
        &rec.settings.pipeline,
    );
    println!("{}", serde_json::to_string(&response)?);
    if response.success {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(2))
    }
}

#[derive(Serialize)]
struct QualityReport {
    segments: Vec<SegmentQualityResult>,
    decision: QualityDecision,
}

fn cmd_quality(args: &InputArgs) -> Result<()> {
    let rec = load_recording(args)?;
    let cfg = rec.pipeline_config();
    let window = batch_window(rec.samples, rec.sampling_rate, &cfg)?;
    let segments = analyze_segments(&window, &cfg);
    let decision = evaluate_gate(&segments, cfg.max_bad_segments);
    let report = QualityReport { segments, decision };
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

#[derive(Serialize)]
struct PeakReport {
    peak_timestamps: Vec<f64>,
    intervals: Vec<f64>,
    artifacts: ArtifactReport,
}

fn cmd_peaks(args: &InputArgs) -> Result<()> {
    let rec = load_recording(args)?;
    let cfg = rec.pipeline_config();
    let window = batch_window(rec.samples, rec.sampling_rate, &cfg)?;
    let peaks = detect_peaks(&window, &cfg)?;
    let rr = extract_intervals(&peaks);
    let artifacts = reject_artifacts(&rr, &cfg);
    let report = PeakReport {
        peak_timestamps: peaks.timestamps,
        intervals: rr.values(),
        artifacts,
    };
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

/// Wall-clock gap between replayed samples at `speed` times real time.
fn sample_period(rate: f64, speed: f64) -> Result<Duration> {
    if !(speed.is_finite() && speed > 0.0) {
        bail!("--speed must be positive, got {speed}");
    }
    Duration::try_from_secs_f64(1.0 / (rate * speed))
        .with_context(|| format!("--speed {speed} gives no usable sample period at {rate} Hz"))
}

fn cmd_monitor(args: &InputArgs, live: bool, speed: f64, queue_capacity: usize) -> Result<()> {
    let rec = load_recording(args)?;
    let rate = rec.sampling_rate;
    let mut monitor =
        RealtimeMonitor::new(rate, rec.pipeline_config(), rec.settings.realtime.clone())?;
    let Some(origin) = rec.samples.first().map(|s| s.timestamp) else {
        bail!("recording is empty");
    };
    let data_time = |sample: &Sample| (sample.timestamp - origin) / 1000.0 + 1.0 / rate;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    if live {
        let period = sample_period(rate, speed)?;
        let (mut tx, rx) = sample_channel(queue_capacity);
        let samples = rec.samples;
        let producer = thread::spawn(move || {
            for sample in samples {
                if tx.push(sample) == PushOutcome::Disconnected {
                    break;
                }
                thread::sleep(period);
            }
            tx.dropped()
        });
        while let Some(sample) = rx.recv_timeout(Duration::from_secs(1)) {
            monitor.push(sample);
            if let Some(update) = monitor.poll(data_time(&sample)) {
                writeln!(out, "{}", serde_json::to_string(&update)?)?;
            }
        }
        let dropped = producer
            .join()
            .map_err(|_| anyhow::anyhow!("producer thread panicked"))?;
        if dropped > 0 {
            warn!("{dropped} sample(s) dropped by the acquisition queue");
        }
    } else {
        for (i, sample) in rec.samples.into_iter().enumerate() {
            monitor.push(sample);
            if let Some(update) = monitor.poll((i + 1) as f64 / rate) {
                writeln!(out, "{}", serde_json::to_string(&update)?)?;
            }
        }
    }
    writeln!(out, "{}", serde_json::to_string(&monitor.summary())?)?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_simulate(
    fs: f64,
    seconds: f64,
    bpm: f64,
    modulation_ms: f64,
    noise: f64,
    seed: u64,
    format: SimFormat,
    out: Option<&Path>,
) -> Result<()> {
    if !(fs.is_finite() && fs > 0.0 && seconds > 0.0 && bpm > 0.0) {
        bail!("--fs, --seconds and --bpm must be positive");
    }
    let mean_ms = 60_000.0 / bpm;
    let beats = (seconds * 1000.0 / mean_ms).ceil() as usize + 2;
    let rr = synth::respiratory_rr(beats, mean_ms, modulation_ms, 4.0);
    let mut data = synth::pulse_train(fs, &rr, 2048.0, 600.0);
    data.truncate((seconds * fs).round() as usize);
    synth::add_noise(&mut data, noise, seed);
    synth::quantize(&mut data, 4096.0);

    let mut text = String::new();
    match format {
        SimFormat::Text => {
            for v in &data {
                text.push_str(&format!("{v}\n"));
            }
        }
        SimFormat::Csv => {
            text.push_str("timestamp,value\n");
            for sample in samples_from_amplitudes(&data, fs) {
                text.push_str(&format!("{},{}\n", sample.timestamp, sample.amplitude));
            }
        }
    }
    match out {
        Some(path) => std::fs::write(path, text)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => io::stdout().write_all(text.as_bytes())?,
    }
    Ok(())
}

fn cmd_plot(args: &InputArgs, kind: PlotKind, out: &Path) -> Result<()> {
    let rec = load_recording(args)?;
    let cfg = rec.pipeline_config();
    let window = batch_window(rec.samples, rec.sampling_rate, &cfg)?;
    let fig = match kind {
        PlotKind::Tachogram => {
            let outcome = QualityGatedPipeline::new(cfg).run(&window);
            if let Err(err) = &outcome.result {
                bail!("cannot plot tachogram: {err}");
            }
            match &outcome.artifacts {
                Some(report) => figure_from_rr(&report.clean),
                None => bail!("pipeline produced no intervals"),
            }
        }
        PlotKind::Signal => {
            let peaks = detect_peaks(&window, &cfg).ok();
            figure_from_window(&window, peaks.as_ref(), 4000)
        }
    };
    draw_plotters_figure(out, &fig)
}

fn draw_plotters_figure(path: &Path, fig: &Figure) -> Result<()> {
    let Some((x_min, x_max, y_min, y_max)) = fig.bounds() else {
        bail!("nothing to plot");
    };
    // Degenerate ranges make plotters divide by zero.
    let (x_max, y_max) = (x_max.max(x_min + 1.0), y_max.max(y_min + 1.0));
    let backend = BitMapBackend::new(path, (800, 480));
    let root = backend.into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .caption(
            fig.title.clone().unwrap_or_else(|| "Plot".into()),
            ("sans-serif", 24),
        )
        .x_label_area_size(30)
        .y_label_area_size(50)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;
    chart
        .configure_mesh()
        .x_desc(fig.x.label.clone().unwrap_or_default())
        .y_desc(fig.y.label.clone().unwrap_or_default())
        .draw()?;
    for series in &fig.series {
        match series {
            Series::Line(line) => {
                let (r, g, b) = line.style.color.rgb();
                chart.draw_series(LineSeries::new(
                    line.points.iter().map(|p| (p[0], p[1])),
                    RGBColor(r, g, b).stroke_width(line.style.width.round() as u32),
                ))?;
            }
            Series::Markers(markers) => {
                let (r, g, b) = markers.color.rgb();
                let color = RGBColor(r, g, b);
                chart.draw_series(
                    markers
                        .points
                        .iter()
                        .map(|p| Circle::new((p[0], p[1]), markers.radius, color.filled())),
                )?;
            }
        }
    }
    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_period_scales_with_speed() {
        assert_eq!(sample_period(100.0, 1.0).unwrap(), Duration::from_millis(10));
        assert_eq!(sample_period(100.0, 10.0).unwrap(), Duration::from_millis(1));
    }

    #[test]
    fn sample_period_rejects_unusable_speed() {
        assert!(sample_period(100.0, 0.0).is_err());
        assert!(sample_period(100.0, f64::NAN).is_err());
        let err = sample_period(100.0, 1e-300).unwrap_err();
        assert!(err.to_string().contains("--speed"));
    }
}
