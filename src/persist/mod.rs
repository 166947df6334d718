// src/persist/mod.rs
use std::{fs, path::Path};

use chrono::NaiveDate;
use csv::{ReaderBuilder, WriterBuilder};
use tracing::info;

use crate::error::PipelineError;
use crate::series::CountrySeries;

const DATE_HEADER: &str = "Date";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Write a series as delimited text: a `Date` column of ISO dates, one
/// column per country, absent cells left empty. The table is written under
/// a temporary name and renamed into place so a reader never observes a
/// partial file.
pub fn write_series(path: &Path, table: &CountrySeries) -> Result<(), PipelineError> {
    let tmp_path = path.with_extension("tmp");
    {
        let mut wtr = WriterBuilder::new().from_path(&tmp_path)?;
        let mut header = Vec::with_capacity(table.columns().len() + 1);
        header.push(DATE_HEADER.to_string());
        header.extend(table.columns().iter().cloned());
        wtr.write_record(&header)?;

        for (row, date) in table.dates().iter().enumerate() {
            let mut record = Vec::with_capacity(header.len());
            record.push(date.format(DATE_FORMAT).to_string());
            for col in 0..table.columns().len() {
                record.push(match table.value(row, col) {
                    Some(v) => v.to_string(),
                    None => String::new(),
                });
            }
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
    }
    fs::rename(&tmp_path, path)?;
    info!(path = %path.display(), rows = table.len(), "wrote series");
    Ok(())
}

/// Re-import a table previously written by [`write_series`], for offline
/// runs that skip the fetch. Empty cells come back absent.
pub fn read_series(path: &Path) -> Result<CountrySeries, PipelineError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)?;

    let mut columns: Option<Vec<String>> = None;
    let mut dates = Vec::new();
    let mut values = Vec::new();
    for result in rdr.records() {
        let record = result?;
        match &columns {
            None => {
                let mut fields = record.iter();
                if fields.next() != Some(DATE_HEADER) {
                    return Err(PipelineError::Schema(DATE_HEADER.into()));
                }
                columns = Some(fields.map(str::to_string).collect());
            }
            Some(cols) => {
                let date_field = record.get(0).unwrap_or_default();
                let date = NaiveDate::parse_from_str(date_field, DATE_FORMAT)
                    .map_err(|_| PipelineError::Date(date_field.to_string()))?;
                let mut row = Vec::with_capacity(cols.len());
                for (i, cell) in record.iter().skip(1).enumerate() {
                    if cell.is_empty() {
                        row.push(None);
                    } else {
                        let value: f64 = cell.parse().map_err(|_| PipelineError::Value {
                            column: cols.get(i).cloned().unwrap_or_default(),
                            value: cell.to_string(),
                        })?;
                        row.push(Some(value));
                    }
                }
                dates.push(date);
                values.push(row);
            }
        }
    }

    let columns = columns.ok_or_else(|| PipelineError::Schema(DATE_HEADER.into()))?;
    CountrySeries::new(dates, columns, values)
}
