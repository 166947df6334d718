// src/process/reshape.rs
use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use tracing::info;

use crate::error::PipelineError;
use crate::process::parse::RawSnapshot;
use crate::series::CountrySeries;

/// Format of the per-date header columns, e.g. `1/22/20`.
const DATE_FORMAT: &str = "%m/%d/%y";

/// Which snapshot columns identify a row, and which country identifiers are
/// data-quality exclusions. The caller supplies this once per run; the
/// defaults match the published CSSE layout.
#[derive(Debug, Clone)]
pub struct ReshapeSpec {
    pub region_column: String,
    pub country_column: String,
    pub coordinate_columns: Vec<String>,
    /// Country identifiers dropped by exact match ("Cruise Ship" rows are
    /// vessels, not countries).
    pub excluded: Vec<String>,
}

impl Default for ReshapeSpec {
    fn default() -> Self {
        Self {
            region_column: "Province/State".into(),
            country_column: "Country/Region".into(),
            coordinate_columns: vec!["Lat".into(), "Long".into()],
            excluded: vec!["Cruise Ship".into()],
        }
    }
}

/// Reshape a wide per-snapshot table into a date × country grid.
///
/// Every date-column cell becomes a (country, date, value) tuple; tuples are
/// summed by (country, date) so sub-regions merge into their parent country;
/// excluded identifiers are dropped; the surviving tuples are pivoted into a
/// grid whose holes stay absent — a country with no contributing sub-region
/// on a date has no value there, not zero.
#[tracing::instrument(level = "info", skip(raw, spec), fields(rows = raw.rows.len()))]
pub fn reshape(raw: &RawSnapshot, spec: &ReshapeSpec) -> Result<CountrySeries, PipelineError> {
    let country_idx = raw
        .headers
        .iter()
        .position(|h| *h == spec.country_column)
        .ok_or_else(|| PipelineError::Schema(spec.country_column.clone()))?;
    if !raw.headers.contains(&spec.region_column) {
        return Err(PipelineError::Schema(spec.region_column.clone()));
    }

    // Everything that is not an id column must be a reporting date.
    let mut date_columns: Vec<(usize, NaiveDate)> = Vec::new();
    for (i, header) in raw.headers.iter().enumerate() {
        if *header == spec.country_column
            || *header == spec.region_column
            || spec.coordinate_columns.contains(header)
        {
            continue;
        }
        let date = NaiveDate::parse_from_str(header, DATE_FORMAT)
            .map_err(|_| PipelineError::Date(header.clone()))?;
        date_columns.push((i, date));
    }

    // Unpivot and group-by (country, date), summing sub-regions.
    let mut grid: BTreeMap<String, BTreeMap<NaiveDate, f64>> = BTreeMap::new();
    let mut dates: BTreeSet<NaiveDate> = BTreeSet::new();
    for row in &raw.rows {
        let country = row[country_idx].trim();
        if spec.excluded.iter().any(|e| e == country) {
            continue;
        }
        for (col, date) in &date_columns {
            let cell = row[*col].trim();
            if cell.is_empty() {
                // no observation, not zero
                continue;
            }
            let value: f64 = cell.parse().map_err(|_| PipelineError::Value {
                column: raw.headers[*col].clone(),
                value: cell.to_string(),
            })?;
            dates.insert(*date);
            *grid
                .entry(country.to_string())
                .or_default()
                .entry(*date)
                .or_insert(0.0) += value;
        }
    }

    // Materialize the sparse grid: BTree iteration gives the sorted date
    // index and lexicographic column order.
    let dates: Vec<NaiveDate> = dates.into_iter().collect();
    let columns: Vec<String> = grid.keys().cloned().collect();
    let values: Vec<Vec<Option<f64>>> = dates
        .iter()
        .map(|d| columns.iter().map(|c| grid[c].get(d).copied()).collect())
        .collect();

    info!(countries = columns.len(), days = dates.len(), "reshaped snapshot");
    Ok(CountrySeries::from_parts(dates, columns, values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::parse::parse_snapshot;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn snapshot(text: &str) -> RawSnapshot {
        parse_snapshot(text).unwrap()
    }

    #[test]
    fn sums_sub_regions_into_their_country() {
        let raw = snapshot(
            "Province/State,Country/Region,Lat,Long,1/1/20,1/2/20,1/3/20\n\
             North,Testland,0,0,1,2,3\n\
             South,Testland,0,0,0,1,1\n",
        );
        let table = reshape(&raw, &ReshapeSpec::default()).unwrap();
        assert_eq!(table.columns(), &["Testland".to_string()]);
        assert_eq!(
            table.column_values("Testland").unwrap(),
            vec![Some(1.0), Some(3.0), Some(4.0)]
        );
    }

    #[test]
    fn excluded_sentinel_never_appears() {
        let raw = snapshot(
            "Province/State,Country/Region,Lat,Long,1/1/20\n\
             ,Cruise Ship,0,0,10\n\
             ,Iceland,64.9,-19.0,2\n",
        );
        let table = reshape(&raw, &ReshapeSpec::default()).unwrap();
        assert_eq!(table.columns(), &["Iceland".to_string()]);
    }

    #[test]
    fn empty_cells_stay_absent_not_zero() {
        let raw = snapshot(
            "Province/State,Country/Region,Lat,Long,1/1/20,1/2/20\n\
             ,Iceland,64.9,-19.0,,2\n\
             ,Norway,60.5,8.5,1,3\n",
        );
        let table = reshape(&raw, &ReshapeSpec::default()).unwrap();
        let iceland = table.column_values("Iceland").unwrap();
        assert_eq!(iceland, vec![None, Some(2.0)]);
    }

    #[test]
    fn date_index_is_sorted_even_for_shuffled_columns() {
        let raw = snapshot(
            "Province/State,Country/Region,Lat,Long,1/3/20,1/1/20,1/2/20\n\
             ,Iceland,64.9,-19.0,3,1,2\n",
        );
        let table = reshape(&raw, &ReshapeSpec::default()).unwrap();
        assert_eq!(
            table.dates(),
            &[date("2020-01-01"), date("2020-01-02"), date("2020-01-03")]
        );
        assert_eq!(
            table.column_values("Iceland").unwrap(),
            vec![Some(1.0), Some(2.0), Some(3.0)]
        );
    }

    #[test]
    fn missing_country_column_is_a_schema_error() {
        let raw = snapshot("Province/State,Lat,Long,1/1/20\n,0,0,1\n");
        assert!(matches!(
            reshape(&raw, &ReshapeSpec::default()),
            Err(PipelineError::Schema(c)) if c == "Country/Region"
        ));
    }

    #[test]
    fn non_numeric_cell_is_a_value_error() {
        let raw = snapshot(
            "Province/State,Country/Region,Lat,Long,1/1/20\n,Iceland,64.9,-19.0,two\n",
        );
        assert!(matches!(
            reshape(&raw, &ReshapeSpec::default()),
            Err(PipelineError::Value { value, .. }) if value == "two"
        ));
    }

    #[test]
    fn unparseable_date_header_is_a_date_error() {
        let raw = snapshot(
            "Province/State,Country/Region,Lat,Long,NotADate\n,Iceland,64.9,-19.0,1\n",
        );
        assert!(matches!(
            reshape(&raw, &ReshapeSpec::default()),
            Err(PipelineError::Date(h)) if h == "NotADate"
        ));
    }
}
