//! Fetch remote epidemiological snapshot tables, reshape them into
//! per-country daily series, derive delta / rolling / growth-rate metrics,
//! persist the tables as delimited text, and render comparative charts.

pub mod chart;
pub mod error;
pub mod fetch;
pub mod metrics;
pub mod persist;
pub mod process;
pub mod series;

pub use error::PipelineError;
pub use series::CountrySeries;
