// src/metrics/mod.rs
//! Derived series: daily deltas, trailing rolling sums, and a smoothed
//! log-growth-rate estimate. Every transform consumes a table and produces
//! a fresh one of identical shape; absent cells propagate instead of being
//! zero-filled.

use chrono::NaiveDate;

use crate::error::PipelineError;
use crate::series::CountrySeries;

/// 3-tap weighted moving average applied by the growth-rate pipeline.
const SMOOTHING_KERNEL: [f64; 3] = [0.25, 0.5, 0.25];

/// Additive constant keeping the log transform away from log(0).
const LOG_EPSILON: f64 = 1e-3;

/// Leading rows of the growth-rate output left absent: the two dropped
/// history rows plus one per valid convolution.
const GROWTH_OFFSET: usize = 4;

/// Observations skipped before fitting the visual trend line.
pub const TREND_SKIP: usize = 4;

/// First differences per column: `delta[i] = value[i] - value[i-1]`.
///
/// The first row has no prior value and is absent; a delta with an absent
/// operand is absent.
pub fn delta(table: &CountrySeries) -> CountrySeries {
    let cells = table.cells();
    let width = table.columns().len();
    let values = (0..table.len())
        .map(|row| {
            (0..width)
                .map(|col| {
                    if row == 0 {
                        return None;
                    }
                    match (cells[row][col], cells[row - 1][col]) {
                        (Some(cur), Some(prev)) => Some(cur - prev),
                        _ => None,
                    }
                })
                .collect()
        })
        .collect();
    CountrySeries::from_parts(table.dates().to_vec(), table.columns().to_vec(), values)
}

/// Trailing sum of the last `window` values, scaled by `1 / divisor`.
///
/// A row is absent until `window` values have accumulated, and whenever any
/// value inside its window is absent. The window is causal, never centered.
pub fn rolling_sum(
    table: &CountrySeries,
    window: usize,
    divisor: f64,
) -> Result<CountrySeries, PipelineError> {
    if window == 0 {
        return Err(PipelineError::Computation(
            "rolling window must be at least 1".into(),
        ));
    }
    if divisor == 0.0 || !divisor.is_finite() {
        return Err(PipelineError::Computation(
            "rolling divisor must be non-zero and finite".into(),
        ));
    }

    let cells = table.cells();
    let width = table.columns().len();
    let values = (0..table.len())
        .map(|row| {
            (0..width)
                .map(|col| {
                    if row + 1 < window {
                        return None;
                    }
                    let mut sum = 0.0;
                    for r in row + 1 - window..=row {
                        sum += cells[r][col]?;
                    }
                    Some(sum / divisor)
                })
                .collect()
        })
        .collect();
    Ok(CountrySeries::from_parts(
        table.dates().to_vec(),
        table.columns().to_vec(),
        values,
    ))
}

/// Smoothed estimate of the local exponential growth rate of a cumulative
/// series, per column.
///
/// The stages run in a fixed order: drop the first two rows; first-difference
/// and edge-pad; 3-tap smooth; log(x + 1e-3) then first-difference; edge-pad;
/// 3-tap smooth again. The composition is load-bearing — a centered average
/// or a different epsilon changes the numbers. The computed values align
/// with the input from row 4 on, so the output keeps the full date index
/// with the first four rows absent.
pub fn growth_rate(table: &CountrySeries) -> CountrySeries {
    let rows = table.len();
    let width = table.columns().len();
    let mut values = vec![vec![None; width]; rows];
    for col in 0..width {
        // absent cells ride through the arithmetic as NaN
        let series: Vec<f64> = table
            .cells()
            .iter()
            .map(|row| row[col].unwrap_or(f64::NAN))
            .collect();
        for (i, v) in growth_rate_column(&series).into_iter().enumerate() {
            values[i + GROWTH_OFFSET][col] = if v.is_nan() { None } else { Some(v) };
        }
    }
    CountrySeries::from_parts(table.dates().to_vec(), table.columns().to_vec(), values)
}

fn growth_rate_column(cumulative: &[f64]) -> Vec<f64> {
    // two dropped rows plus two valid convolutions need at least 5 points
    if cumulative.len() < 5 {
        return Vec::new();
    }
    let daily = edge_pad(&diff(&cumulative[2..]));
    let smoothed = smooth3(&daily);
    let logged: Vec<f64> = smoothed.iter().map(|v| (v + LOG_EPSILON).ln()).collect();
    let log_rate = edge_pad(&diff(&logged));
    smooth3(&log_rate)
}

fn diff(v: &[f64]) -> Vec<f64> {
    v.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Replicate the first and last value once each.
fn edge_pad(v: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(v.len() + 2);
    out.push(v[0]);
    out.extend_from_slice(v);
    out.push(v[v.len() - 1]);
    out
}

/// Valid-mode convolution with [`SMOOTHING_KERNEL`]: two rows shorter than
/// its input, no padding.
fn smooth3(v: &[f64]) -> Vec<f64> {
    v.windows(3)
        .map(|w| SMOOTHING_KERNEL[0] * w[0] + SMOOTHING_KERNEL[1] * w[1] + SMOOTHING_KERNEL[2] * w[2])
        .collect()
}

/// A fitted line over a series tail, x in days since the series origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trend {
    pub slope: f64,
    pub intercept: f64,
}

impl Trend {
    /// Value of the fitted line `days` after the origin.
    pub fn at(&self, days: f64) -> f64 {
        self.intercept + self.slope * days
    }
}

/// Least-squares line through a column's tail: the first [`TREND_SKIP`]
/// observed values are left out of the fit. `None` when fewer than two
/// points survive or the tail is a single instant.
pub fn tail_trend(dates: &[NaiveDate], values: &[Option<f64>]) -> Option<Trend> {
    let origin = *dates.first()?;
    let points: Vec<(f64, f64)> = dates
        .iter()
        .zip(values.iter())
        .filter_map(|(d, v)| v.map(|v| ((*d - origin).num_days() as f64, v)))
        .skip(TREND_SKIP)
        .collect();
    if points.len() < 2 {
        return None;
    }

    let n = points.len() as f64;
    let sx: f64 = points.iter().map(|(x, _)| x).sum();
    let sy: f64 = points.iter().map(|(_, y)| y).sum();
    let sxx: f64 = points.iter().map(|(x, _)| x * x).sum();
    let sxy: f64 = points.iter().map(|(x, y)| x * y).sum();
    let denom = n * sxx - sx * sx;
    if denom == 0.0 {
        return None;
    }
    let slope = (n * sxy - sx * sy) / denom;
    let intercept = (sy - slope * sx) / n;
    Some(Trend { slope, intercept })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn days(n: usize) -> Vec<NaiveDate> {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        (0..n).map(|i| start + Duration::days(i as i64)).collect()
    }

    fn single(name: &str, column: Vec<Option<f64>>) -> CountrySeries {
        let values = column.iter().map(|v| vec![*v]).collect();
        CountrySeries::new(days(column.len()), vec![name.into()], values).unwrap()
    }

    #[test]
    fn delta_first_row_absent_and_differences_match() {
        let cumulative = single("Testland", vec![Some(1.0), Some(3.0), Some(4.0)]);
        let d = delta(&cumulative);
        assert_eq!(
            d.column_values("Testland").unwrap(),
            vec![None, Some(2.0), Some(1.0)]
        );
        // delta[i] + cumulative[i-1] == cumulative[i]
        for i in 1..cumulative.len() {
            assert_eq!(
                d.value(i, 0).unwrap() + cumulative.value(i - 1, 0).unwrap(),
                cumulative.value(i, 0).unwrap()
            );
        }
    }

    #[test]
    fn delta_propagates_absent_operands() {
        let table = single("A", vec![Some(1.0), None, Some(4.0)]);
        assert_eq!(delta(&table).column_values("A").unwrap(), vec![None, None, None]);
    }

    #[test]
    fn rolling_sum_of_constant_deltas() {
        let table = single("A", vec![Some(3.0); 8]);
        let rolled = rolling_sum(&table, 4, 2.0).unwrap();
        let col = rolled.column_values("A").unwrap();
        assert_eq!(&col[..3], &[None, None, None]);
        // k * w / d
        assert!(col[3..].iter().all(|v| *v == Some(6.0)));
    }

    #[test]
    fn rolling_sum_matches_spec_example() {
        let table = single("A", vec![None, Some(2.0), Some(1.0), Some(5.0)]);
        let rolled = rolling_sum(&table, 2, 1.0).unwrap();
        assert_eq!(
            rolled.column_values("A").unwrap(),
            vec![None, None, Some(3.0), Some(6.0)]
        );
    }

    #[test]
    fn rolling_sum_rejects_bad_parameters() {
        let table = single("A", vec![Some(1.0); 4]);
        assert!(matches!(
            rolling_sum(&table, 2, 0.0),
            Err(PipelineError::Computation(_))
        ));
        assert!(matches!(
            rolling_sum(&table, 0, 1.0),
            Err(PipelineError::Computation(_))
        ));
    }

    #[test]
    fn growth_rate_keeps_shape_with_four_leading_absences() {
        let table = single("A", (0..10).map(|i| Some(10.0 + i as f64)).collect());
        let g = growth_rate(&table);
        assert_eq!(g.dates(), table.dates());
        assert_eq!(g.columns(), table.columns());
        let col = g.column_values("A").unwrap();
        assert!(col[..4].iter().all(Option::is_none));
        assert!(col[4..].iter().all(Option::is_some));
    }

    #[test]
    fn growth_rate_recovers_exponential_rate() {
        let table = single(
            "A",
            (0..30).map(|i| Some(1000.0 * 1.1f64.powi(i))).collect(),
        );
        let col = growth_rate(&table).column_values("A").unwrap();
        // interior rows settle on ln(1.1); the padded edges are biased
        let expected = 1.1f64.ln();
        assert!((col[15].unwrap() - expected).abs() < 1e-4);
        assert!((col[20].unwrap() - expected).abs() < 1e-4);
    }

    #[test]
    fn growth_rate_is_deterministic() {
        let table = single(
            "A",
            (0..25)
                .map(|i| Some((i as f64 * 0.7).sin().abs() * 100.0 + i as f64))
                .collect(),
        );
        assert_eq!(growth_rate(&table), growth_rate(&table));
    }

    #[test]
    fn growth_rate_of_short_series_is_all_absent() {
        let table = single("A", vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)]);
        let col = growth_rate(&table).column_values("A").unwrap();
        assert!(col.iter().all(Option::is_none));
    }

    #[test]
    fn growth_rate_propagates_a_mid_series_hole() {
        let mut column: Vec<Option<f64>> = (0..12).map(|i| Some(100.0 + i as f64)).collect();
        column[6] = None;
        let col = growth_rate(&single("A", column)).column_values("A").unwrap();
        // the hole widens through diff and both smoothing passes
        assert!(col[8].is_none());
        assert_eq!(col.iter().filter(|v| v.is_some()).count(), 1);
        assert!(col[11].is_some());
    }

    #[test]
    fn tail_trend_fits_the_tail_exactly() {
        let dates = days(12);
        let values: Vec<Option<f64>> = (0..12).map(|i| Some(2.0 + 0.5 * i as f64)).collect();
        let fit = tail_trend(&dates, &values).unwrap();
        assert!((fit.slope - 0.5).abs() < 1e-12);
        assert!((fit.at(0.0) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn tail_trend_needs_two_observations() {
        let dates = days(6);
        let mut values = vec![None; 6];
        values[5] = Some(1.0);
        assert_eq!(tail_trend(&dates, &values), None);
    }
}
