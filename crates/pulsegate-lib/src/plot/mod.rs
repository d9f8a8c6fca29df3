use crate::signal::{Peaks, RRSeries, Window};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axis {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Style {
    pub width: f32,
    pub dash: Option<[f32; 2]>,
    pub color: Color,
}

/// 0xRRGGBB.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub fn rgb(self) -> (u8, u8, u8) {
        (
            ((self.0 >> 16) & 0xFF) as u8,
            ((self.0 >> 8) & 0xFF) as u8,
            (self.0 & 0xFF) as u8,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub radius: u32,
    pub color: Color,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Series {
    Line(LineSeries),
    Markers(MarkerSeries),
}

impl Series {
    pub fn points(&self) -> &[[f64; 2]] {
        match self {
            Series::Line(line) => &line.points,
            Series::Markers(markers) => &markers.points,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    pub series: Vec<Series>,
}

impl Figure {
    pub fn new(title: impl Into<Option<String>>) -> Self {
        Self {
            title: title.into(),
            x: Axis { label: None },
            y: Axis { label: None },
            series: Vec::new(),
        }
    }

    pub fn with_axes(mut self, x: &str, y: &str) -> Self {
        self.x.label = Some(x.into());
        self.y.label = Some(y.into());
        self
    }

    pub fn add_series(&mut self, series: Series) {
        self.series.push(series);
    }

    /// `(x_min, x_max, y_min, y_max)` over every series, `None` when empty.
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let mut points = self.series.iter().flat_map(|s| s.points().iter());
        let first = points.next()?;
        let init = (first[0], first[0], first[1], first[1]);
        Some(points.fold(init, |(x0, x1, y0, y1), p| {
            (x0.min(p[0]), x1.max(p[0]), y0.min(p[1]), y1.max(p[1]))
        }))
    }
}

/// Keep at most `max_points`, sampling evenly across the input.
pub fn decimate_points(points: &[[f64; 2]], max_points: usize) -> Vec<[f64; 2]> {
    if points.len() <= max_points {
        return points.to_vec();
    }
    let bucket_size = points.len() as f64 / max_points as f64;
    (0..max_points)
        .map(|i| (i as f64 * bucket_size).floor() as usize)
        .take_while(|&start| start < points.len())
        .map(|start| points[start])
        .collect()
}

/// Tachogram: interval number against interval length (ms).
pub fn figure_from_rr_limit(rr: &RRSeries, max_points: usize) -> Figure {
    let mut fig = Figure::new(Some("NN intervals".into())).with_axes("beat", "interval (ms)");
    let points: Vec<[f64; 2]> = rr
        .values()
        .into_iter()
        .enumerate()
        .map(|(i, value)| [i as f64, value])
        .collect();
    fig.add_series(Series::Line(LineSeries {
        name: "NN".into(),
        points: decimate_points(&points, max_points),
        style: Style {
            width: 2.0,
            dash: None,
            color: Color(0xFF0077),
        },
    }));
    fig
}

pub fn figure_from_rr(rr: &RRSeries) -> Figure {
    figure_from_rr_limit(rr, 1024)
}

/// Raw signal over time (s from the first sample) with optional peak markers.
pub fn figure_from_window(window: &Window, peaks: Option<&Peaks>, max_points: usize) -> Figure {
    let origin = window.samples().first().map(|s| s.timestamp).unwrap_or(0.0);
    let points: Vec<[f64; 2]> = window
        .samples()
        .iter()
        .map(|s| [(s.timestamp - origin) / 1000.0, s.amplitude])
        .collect();
    let mut fig = Figure::new(Some("PPG".into())).with_axes("time (s)", "amplitude");
    fig.add_series(Series::Line(LineSeries {
        name: "signal".into(),
        points: decimate_points(&points, max_points),
        style: Style {
            width: 1.4,
            dash: None,
            color: Color(0x1F77B4),
        },
    }));
    if let Some(peaks) = peaks {
        let markers = peaks
            .indices
            .iter()
            .filter_map(|&i| points.get(i).copied())
            .collect();
        fig.add_series(Series::Markers(MarkerSeries {
            name: "peaks".into(),
            points: markers,
            radius: 3,
            color: Color(0xD62728),
        }));
    }
    fig
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::samples_from_amplitudes;

    #[test]
    fn decimation_caps_point_count() {
        let points: Vec<[f64; 2]> = (0..10_000).map(|i| [i as f64, 0.0]).collect();
        let out = decimate_points(&points, 500);
        assert_eq!(out.len(), 500);
        assert_eq!(out[0], [0.0, 0.0]);
        assert_eq!(decimate_points(&points[..10], 500).len(), 10);
    }

    #[test]
    fn tachogram_bounds() {
        let rr = RRSeries::from_millis(&[800.0, 820.0, 780.0]);
        let fig = figure_from_rr(&rr);
        assert_eq!(fig.bounds(), Some((0.0, 2.0, 780.0, 820.0)));
    }

    #[test]
    fn peak_markers_follow_signal() {
        let data = [1.0, 5.0, 1.0, 1.0, 6.0, 1.0];
        let window = Window::from_parts(samples_from_amplitudes(&data, 10.0), 10.0);
        let peaks = Peaks::from_indices(&window, vec![1, 4]);
        let fig = figure_from_window(&window, Some(&peaks), 1024);
        assert_eq!(fig.series.len(), 2);
        assert_eq!(fig.series[1].points(), &[[0.1, 5.0], [0.4, 6.0]]);
        assert!(Figure::new(None).bounds().is_none());
    }
}
