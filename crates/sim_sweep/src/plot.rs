//! Line charts of result columns, rendered to SVG.

use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use plotters::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::table::ResultTable;

const CHART_SIZE: (u32, u32) = (960, 640);
const POINT_SIZE: u32 = 4;

#[derive(Debug, Error)]
pub enum PlotError {
    #[error("chart '{chart}' refers to unknown column '{column}'")]
    UnknownColumn { chart: String, column: String },
    #[error("failed to create output directory {}: {source}", .path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to render {}: {message}", .path.display())]
    Render { path: PathBuf, message: String },
}

/// One chart: a metric (and optionally a second metric on its own axis)
/// against a parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartSpec {
    /// Output file name, relative to the output directory.
    pub file: String,
    #[serde(default)]
    pub title: String,
    pub x: String,
    pub y: String,
    /// Drawn against a secondary y axis on the right.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y2_label: Option<String>,
}

impl ChartSpec {
    pub fn new(file: impl Into<String>, x: impl Into<String>, y: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            title: String::new(),
            x: x.into(),
            y: y.into(),
            y2: None,
            x_label: None,
            y_label: None,
            y2_label: None,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn secondary(mut self, y2: impl Into<String>, label: impl Into<String>) -> Self {
        self.y2 = Some(y2.into());
        self.y2_label = Some(label.into());
        self
    }

    pub fn labels(mut self, x_label: impl Into<String>, y_label: impl Into<String>) -> Self {
        self.x_label = Some(x_label.into());
        self.y_label = Some(y_label.into());
        self
    }

    /// Every column the chart reads.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        [Some(self.x.as_str()), Some(self.y.as_str()), self.y2.as_deref()]
            .into_iter()
            .flatten()
    }
}

/// Render every chart into `out_dir`, overwriting existing files.
///
/// All charts are checked against the table before anything is drawn.
pub fn render(table: &ResultTable, specs: &[ChartSpec], out_dir: &Path) -> Result<Vec<PathBuf>, PlotError> {
    for spec in specs {
        if let Some(column) = spec.columns().find(|column| table.numeric_column(column).is_none()) {
            return Err(PlotError::UnknownColumn {
                chart: spec.file.clone(),
                column: column.to_string(),
            });
        }
    }
    if specs.is_empty() {
        return Ok(Vec::new());
    }

    fs::create_dir_all(out_dir).map_err(|source| PlotError::OutputDir {
        path: out_dir.to_path_buf(),
        source,
    })?;

    let mut written = Vec::with_capacity(specs.len());
    for spec in specs {
        let path = out_dir.join(&spec.file);
        debug!(chart = %path.display(), "rendering chart");
        draw_chart(table, spec, &path).map_err(|error| PlotError::Render {
            path: path.clone(),
            message: error.to_string(),
        })?;
        written.push(path);
    }
    Ok(written)
}

fn series(table: &ResultTable, x: &str, y: &str) -> Vec<(f64, f64)> {
    let xs = table.numeric_column(x).unwrap_or_default();
    let ys = table.numeric_column(y).unwrap_or_default();
    xs.into_iter()
        .zip(ys)
        .filter_map(|(x, y)| Some((x?, y?)))
        .collect()
}

/// Value range padded by 5% of its span, or by one unit when flat.
fn axis_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (low, high) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(low, high), value| {
        (low.min(value), high.max(value))
    });
    if !low.is_finite() || !high.is_finite() {
        return 0.0..1.0;
    }
    let span = high - low;
    let pad = if span > 0.0 { span * 0.05 } else { 1.0 };
    (low - pad)..(high + pad)
}

fn draw_chart(table: &ResultTable, spec: &ChartSpec, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let primary = series(table, &spec.x, &spec.y);
    let secondary = spec
        .y2
        .as_deref()
        .map(|y2| series(table, &spec.x, y2))
        .unwrap_or_default();

    let x_range = axis_range(primary.iter().chain(&secondary).map(|(x, _)| *x));
    let y_range = axis_range(primary.iter().map(|(_, y)| *y));

    let root = SVGBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(&spec.title, ("sans-serif", 22))
        .margin(12)
        .x_label_area_size(44)
        .y_label_area_size(70)
        .right_y_label_area_size(if spec.y2.is_some() { 70 } else { 0 })
        .build_cartesian_2d(x_range.clone(), y_range)?
        .set_secondary_coord(x_range, axis_range(secondary.iter().map(|(_, y)| *y)));

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc(spec.x_label.as_deref().unwrap_or(&spec.x))
        .y_desc(spec.y_label.as_deref().unwrap_or(&spec.y))
        .draw()?;

    chart
        .draw_series(LineSeries::new(primary.iter().copied(), &BLUE))?
        .label(spec.y_label.as_deref().unwrap_or(&spec.y))
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE));
    chart.draw_series(
        primary
            .iter()
            .map(|point| Circle::new(*point, POINT_SIZE, BLUE.filled())),
    )?;

    if let Some(y2) = spec.y2.as_deref() {
        let label = spec.y2_label.as_deref().unwrap_or(y2);
        chart.configure_secondary_axes().y_desc(label).draw()?;
        chart
            .draw_secondary_series(LineSeries::new(secondary.iter().copied(), &RED))?
            .label(label)
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED));
        chart.draw_secondary_series(
            secondary
                .iter()
                .map(|point| Circle::new(*point, POINT_SIZE, RED.filled())),
        )?;
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }

    root.present()?;
    Ok(())
}
