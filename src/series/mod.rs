// src/series/mod.rs
use chrono::NaiveDate;

use crate::error::PipelineError;

/// Name of the synthetic total column appended by [`build`].
pub const WORLD: &str = "World";

/// A date-indexed, country-keyed numeric table.
///
/// Rows are ordered by date ascending with no duplicates, columns carry
/// unique country names, and every cell is `Option<f64>` — `None` marks an
/// absent observation, which is never the same thing as `0.0`. The same
/// type carries cumulative counts and every derived series, since the
/// transforms all preserve shape.
#[derive(Debug, Clone, PartialEq)]
pub struct CountrySeries {
    dates: Vec<NaiveDate>,
    columns: Vec<String>,
    /// Row-major: `values[row][col]`.
    values: Vec<Vec<Option<f64>>>,
}

impl CountrySeries {
    /// Construct a table, enforcing the shape invariants: strictly
    /// increasing date index, unique column names, rectangular cells.
    pub fn new(
        dates: Vec<NaiveDate>,
        columns: Vec<String>,
        values: Vec<Vec<Option<f64>>>,
    ) -> Result<Self, PipelineError> {
        if dates.windows(2).any(|w| w[0] >= w[1]) {
            return Err(PipelineError::Computation(
                "date index must be strictly increasing".into(),
            ));
        }
        for (i, name) in columns.iter().enumerate() {
            if columns[..i].contains(name) {
                return Err(PipelineError::Computation(format!(
                    "duplicate column {name:?}"
                )));
            }
        }
        if values.len() != dates.len() || values.iter().any(|r| r.len() != columns.len()) {
            return Err(PipelineError::Computation(
                "cell grid does not match index dimensions".into(),
            ));
        }
        Ok(Self {
            dates,
            columns,
            values,
        })
    }

    /// Internal constructor for transforms that preserve the invariants by
    /// construction.
    pub(crate) fn from_parts(
        dates: Vec<NaiveDate>,
        columns: Vec<String>,
        values: Vec<Vec<Option<f64>>>,
    ) -> Self {
        debug_assert!(dates.windows(2).all(|w| w[0] < w[1]));
        debug_assert!(values.len() == dates.len());
        debug_assert!(values.iter().all(|r| r.len() == columns.len()));
        Self {
            dates,
            columns,
            values,
        }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows (dates).
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn value(&self, row: usize, col: usize) -> Option<f64> {
        self.values.get(row).and_then(|r| r.get(col)).copied().flatten()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All cells of one column, top to bottom.
    pub fn column_values(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let idx = self.column_index(name)?;
        Some(self.values.iter().map(|r| r[idx]).collect())
    }

    pub(crate) fn cells(&self) -> &[Vec<Option<f64>>] {
        &self.values
    }

    /// Drop all rows strictly before `start` (rows dated `start` are kept).
    pub fn since(&self, start: NaiveDate) -> Self {
        let keep = self.dates.iter().position(|d| *d >= start);
        match keep {
            Some(first) => Self::from_parts(
                self.dates[first..].to_vec(),
                self.columns.clone(),
                self.values[first..].to_vec(),
            ),
            None => Self::from_parts(Vec::new(), self.columns.clone(), Vec::new()),
        }
    }

    /// Append a `World` column holding the row-wise sum of every existing
    /// column, absent cells contributing 0. The total is a snapshot taken
    /// now; projections and later transforms never recompute it.
    pub fn with_world_total(&self) -> Self {
        let mut columns = self.columns.clone();
        columns.push(WORLD.to_string());
        let values = self
            .values
            .iter()
            .map(|row| {
                let total: f64 = row.iter().flatten().sum();
                let mut row = row.clone();
                row.push(Some(total));
                row
            })
            .collect();
        Self::from_parts(self.dates.clone(), columns, values)
    }

    /// Project onto the named columns, preserving the requested order.
    /// Names the table does not carry are silently skipped.
    pub fn select(&self, names: &[&str]) -> Self {
        let picked: Vec<(usize, String)> = names
            .iter()
            .filter_map(|n| self.column_index(n).map(|i| (i, n.to_string())))
            .collect();
        let columns = picked.iter().map(|(_, n)| n.clone()).collect();
        let values = self
            .values
            .iter()
            .map(|row| picked.iter().map(|(i, _)| row[*i]).collect())
            .collect();
        Self::from_parts(self.dates.clone(), columns, values)
    }

    /// The `n` countries with the largest value in the final row, largest
    /// first. The synthetic `World` column is not a country and is skipped;
    /// columns absent in the final row rank below every observed one.
    pub fn top_countries(&self, n: usize) -> Vec<String> {
        let Some(last) = self.values.last() else {
            return Vec::new();
        };
        let mut ranked: Vec<(&String, Option<f64>)> = self
            .columns
            .iter()
            .zip(last.iter().copied())
            .filter(|(name, _)| name.as_str() != WORLD)
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or_else(|| b.1.is_some().cmp(&a.1.is_some()))
        });
        ranked.into_iter().take(n).map(|(n, _)| n.clone()).collect()
    }
}

/// Build the chart-ready series: filter to `start_date` and optionally
/// append the `World` total.
pub fn build(table: &CountrySeries, start_date: NaiveDate, add_total: bool) -> CountrySeries {
    let filtered = table.since(start_date);
    if add_total {
        filtered.with_world_total()
    } else {
        filtered
    }
}
