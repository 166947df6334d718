// src/fetch/urls.rs
use url::Url;

/// A remote snapshot source and the filenames its tables persist under.
#[derive(Debug, Clone, Copy)]
pub struct Source {
    pub name: &'static str,
    pub url: &'static str,
    /// Output filename for the cumulative table.
    pub cumulative_file: &'static str,
    /// Output filename for the daily-delta table.
    pub delta_file: &'static str,
}

/// The published CSSE global time-series feeds. Callers pass these (or their
/// own sources) into the pipeline; nothing below reads them implicitly.
pub static SOURCES: &[Source] = &[
    Source {
        name: "confirmed",
        url: "https://raw.githubusercontent.com/CSSEGISandData/COVID-19/master/csse_covid_19_data/csse_covid_19_time_series/time_series_covid19_confirmed_global.csv",
        cumulative_file: "conf.csv",
        delta_file: "conf_new.csv",
    },
    Source {
        name: "deaths",
        url: "https://raw.githubusercontent.com/CSSEGISandData/COVID-19/master/csse_covid_19_data/csse_covid_19_time_series/time_series_covid19_deaths_global.csv",
        cumulative_file: "dead.csv",
        delta_file: "dead_new.csv",
    },
];

/// Short display name for a source URL: its final path segment, or the full
/// string when it does not parse as a URL.
pub fn display_name(url_str: &str) -> String {
    Url::parse(url_str)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|segments| segments.last().map(str::to_string))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| url_str.to_string())
}
