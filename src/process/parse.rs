// src/process/parse.rs
use csv::ReaderBuilder;
use std::io::Cursor;

use crate::error::PipelineError;

/// One fetched snapshot, exactly as published: a header row naming the id
/// columns followed by one column per reporting date, then one row per
/// sub-region with cumulative counts as strings.
#[derive(Debug)]
pub struct RawSnapshot {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Parse delimited text into a [`RawSnapshot`].
///
/// The reader is strict: ragged rows surface as a parse error rather than
/// silently truncated data, so downstream indexing by header position is
/// safe.
pub fn parse_snapshot(text: &str) -> Result<RawSnapshot, PipelineError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .from_reader(Cursor::new(text.as_bytes()));

    let mut headers: Option<Vec<String>> = None;
    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let fields: Vec<String> = record.iter().map(str::to_string).collect();
        match headers {
            None => headers = Some(fields),
            Some(_) => rows.push(fields),
        }
    }

    let headers =
        headers.ok_or_else(|| PipelineError::Schema("empty snapshot: no header row".into()))?;
    Ok(RawSnapshot { headers, rows })
}
