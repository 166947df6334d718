use thiserror::Error;

/// Errors surfaced by the fetch/transform/persist pipeline.
///
/// Fetch, parse and schema errors are fatal for the source table they hit;
/// computation errors reject a transform before it can produce misleading
/// numbers. Persistence and render failures are reported by the caller
/// without discarding the in-memory tables.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("fetch failed for {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("CSV parse error: {0}")]
    Parse(#[from] csv::Error),

    #[error("unparseable date column {0:?}")]
    Date(String),

    #[error("non-numeric value {value:?} in column {column:?}")]
    Value { column: String, value: String },

    #[error("missing expected column: {0}")]
    Schema(String),

    #[error("invalid transform parameter: {0}")]
    Computation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("chart render error: {0}")]
    Render(String),
}
