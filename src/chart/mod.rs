// src/chart/mod.rs
//! SVG chart rendering for date-indexed country tables. Consumes finished
//! series; it never transforms data beyond what drawing requires, and a
//! failure here leaves the tables untouched.

use std::path::Path;

use chrono::NaiveDate;
use plotters::coord::cartesian::Cartesian2d;
use plotters::coord::ranged1d::{Ranged, ValueFormatter};
use plotters::coord::types::RangedDate;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::series::DashedLineSeries;

use crate::error::PipelineError;
use crate::metrics;
use crate::series::CountrySeries;

/// Samples between point markers on line series.
const MARK_EVERY: usize = 7;

/// Display options for one panel.
#[derive(Debug, Clone)]
pub struct PanelSpec {
    pub title: String,
    /// Fixed y window; computed from the data when absent.
    pub y_range: Option<(f64, f64)>,
    /// Logarithmic y axis.
    pub log_y: bool,
    /// Stacked-area mode instead of lines.
    pub stacked: bool,
    /// X-axis tick interval in days.
    pub tick_days: usize,
    /// Overlay a dashed least-squares trend over each series tail.
    pub trend: bool,
}

impl Default for PanelSpec {
    fn default() -> Self {
        Self {
            title: String::new(),
            y_range: None,
            log_y: false,
            stacked: false,
            tick_days: 28,
            trend: false,
        }
    }
}

fn render_err<E: std::fmt::Display>(e: E) -> PipelineError {
    PipelineError::Render(e.to_string())
}

/// Render `panels` into one SVG split into a `rows` × `cols` grid.
pub fn render_grid(
    path: &Path,
    size: (u32, u32),
    layout: (usize, usize),
    panels: &[(CountrySeries, PanelSpec)],
) -> Result<(), PipelineError> {
    let (rows, cols) = layout;
    if rows * cols < panels.len() {
        return Err(PipelineError::Render(format!(
            "{rows}x{cols} grid cannot hold {} panels",
            panels.len()
        )));
    }

    let root = SVGBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;
    let areas = root.split_evenly((rows, cols));
    for ((table, spec), area) in panels.iter().zip(areas.iter()) {
        draw_panel(area, table, spec)?;
    }
    root.present().map_err(render_err)?;
    Ok(())
}

fn draw_panel(
    area: &DrawingArea<SVGBackend, Shift>,
    table: &CountrySeries,
    spec: &PanelSpec,
) -> Result<(), PipelineError> {
    // nothing to place on a degenerate date axis
    if table.len() < 2 || table.columns().is_empty() {
        return Ok(());
    }
    let first = table.dates()[0];
    let last = table.dates()[table.len() - 1];

    let (mut y_min, mut y_max) = match spec.y_range {
        Some(range) => range,
        None => data_range(table, spec.stacked),
    };

    let span_days = (last - first).num_days().max(1) as usize;
    let x_labels = (span_days / spec.tick_days.max(1)).clamp(2, 12);

    let mut builder = ChartBuilder::on(area);
    builder
        .caption(&spec.title, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(50);

    if spec.log_y {
        if y_min <= 0.0 {
            y_min = 1.0;
        }
        if y_max <= y_min {
            y_max = y_min * 10.0;
        }
        let mut chart = builder
            .build_cartesian_2d(first..last, (y_min..y_max).log_scale())
            .map_err(render_err)?;
        draw_into(&mut chart, table, spec, x_labels)
    } else {
        if y_max <= y_min {
            y_max = y_min + 1.0;
        }
        let mut chart = builder
            .build_cartesian_2d(first..last, y_min..y_max)
            .map_err(render_err)?;
        draw_into(&mut chart, table, spec, x_labels)
    }
}

/// Extent of the values a panel will place: per-cell for lines, per-row
/// totals for stacked areas.
fn data_range(table: &CountrySeries, stacked: bool) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for row in 0..table.len() {
        let mut total = 0.0;
        for col in 0..table.columns().len() {
            if let Some(v) = table.value(row, col) {
                total += v;
                if !stacked {
                    min = min.min(v);
                    max = max.max(v);
                }
            }
        }
        if stacked {
            min = min.min(0.0);
            max = max.max(total);
        }
    }
    if min.is_finite() && max.is_finite() {
        (min, max)
    } else {
        (0.0, 1.0)
    }
}

fn draw_into<'a, YC>(
    chart: &mut ChartContext<'a, SVGBackend<'a>, Cartesian2d<RangedDate<NaiveDate>, YC>>,
    table: &CountrySeries,
    spec: &PanelSpec,
    x_labels: usize,
) -> Result<(), PipelineError>
where
    YC: Ranged<ValueType = f64> + ValueFormatter<f64>,
{
    chart
        .configure_mesh()
        .x_labels(x_labels)
        .y_labels(8)
        .light_line_style(WHITE.mix(0.3).filled())
        .draw()
        .map_err(render_err)?;

    let dates = table.dates();
    if spec.stacked {
        // running row totals; an absent cell adds nothing to the stack
        let width = table.columns().len();
        let mut tops: Vec<Vec<f64>> = Vec::with_capacity(dates.len());
        for row in 0..dates.len() {
            let mut acc = 0.0;
            let mut row_tops = Vec::with_capacity(width);
            for col in 0..width {
                acc += table.value(row, col).unwrap_or(0.0);
                row_tops.push(acc);
            }
            tops.push(row_tops);
        }
        // draw the tallest band first so lower bands overpaint it
        for idx in (0..width).rev() {
            let color = Palette99::pick(idx).to_rgba();
            let points: Vec<(NaiveDate, f64)> = dates
                .iter()
                .enumerate()
                .map(|(row, d)| (*d, tops[row][idx]))
                .collect();
            chart
                .draw_series(
                    AreaSeries::new(points, 0.0, color.mix(0.5).filled())
                        .border_style(color.stroke_width(1)),
                )
                .map_err(render_err)?
                .label(table.columns()[idx].as_str())
                .legend(move |(x, y)| {
                    PathElement::new(vec![(x, y), (x + 16, y)], color.stroke_width(2))
                });
        }
    } else {
        for (idx, name) in table.columns().iter().enumerate() {
            let color = Palette99::pick(idx).to_rgba();
            let column: Vec<Option<f64>> =
                (0..dates.len()).map(|row| table.value(row, idx)).collect();
            // absent points are skipped, never drawn as zero
            let points: Vec<(NaiveDate, f64)> = dates
                .iter()
                .zip(column.iter())
                .filter_map(|(d, v)| v.map(|v| (*d, v)))
                .filter(|(_, v)| !spec.log_y || *v > 0.0)
                .collect();
            if points.is_empty() {
                continue;
            }
            chart
                .draw_series(LineSeries::new(
                    points.iter().copied(),
                    color.stroke_width(2),
                ))
                .map_err(render_err)?
                .label(name.as_str())
                .legend(move |(x, y)| {
                    PathElement::new(vec![(x, y), (x + 16, y)], color.stroke_width(2))
                });
            chart
                .draw_series(
                    points
                        .iter()
                        .step_by(MARK_EVERY)
                        .map(|&(d, v)| Circle::new((d, v), 3, color.filled())),
                )
                .map_err(render_err)?;

            if spec.trend {
                if let Some(fit) = metrics::tail_trend(dates, &column) {
                    let origin = dates[0];
                    let trend_points: Vec<(NaiveDate, f64)> = dates
                        .iter()
                        .map(|d| (*d, fit.at((*d - origin).num_days() as f64)))
                        .filter(|(_, y)| y.is_finite() && (!spec.log_y || *y > 0.0))
                        .collect();
                    chart
                        .draw_series(DashedLineSeries::new(
                            trend_points,
                            4,
                            3,
                            color.stroke_width(1),
                        ))
                        .map_err(render_err)?;
                }
            }
        }
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(WHITE.mix(0.8).filled())
        .border_style(BLACK.stroke_width(1))
        .draw()
        .map_err(render_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample() -> CountrySeries {
        let start = NaiveDate::from_ymd_opt(2020, 2, 20).unwrap();
        let dates: Vec<NaiveDate> = (0..20).map(|i| start + Duration::days(i)).collect();
        let values = (0..20)
            .map(|i| {
                vec![
                    Some(10.0 + 2.0 * i as f64),
                    if i == 5 { None } else { Some(5.0 + i as f64) },
                ]
            })
            .collect();
        CountrySeries::new(dates, vec!["A".into(), "B".into()], values).unwrap()
    }

    #[test]
    fn renders_line_and_stacked_panels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fig.svg");
        let panels = vec![
            (
                sample(),
                PanelSpec {
                    title: "lines".into(),
                    log_y: true,
                    trend: true,
                    ..Default::default()
                },
            ),
            (
                sample(),
                PanelSpec {
                    title: "stack".into(),
                    stacked: true,
                    ..Default::default()
                },
            ),
        ];
        render_grid(&path, (900, 400), (1, 2), &panels).unwrap();
        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains("<svg"));
    }

    #[test]
    fn rejects_a_grid_too_small_for_its_panels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fig.svg");
        let panels = vec![
            (sample(), PanelSpec::default()),
            (sample(), PanelSpec::default()),
        ];
        assert!(matches!(
            render_grid(&path, (400, 400), (1, 1), &panels),
            Err(PipelineError::Render(_))
        ));
    }
}
