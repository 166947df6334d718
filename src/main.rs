use anyhow::Result;
use chrono::NaiveDate;
use covidscraper::{
    chart::{self, PanelSpec},
    fetch::{self, Source, SOURCES},
    metrics, persist,
    process::{self, ReshapeSpec},
    series::{self, CountrySeries, WORLD},
};
use reqwest::Client;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

// Countries of interest for the comparative figures; `World` is the
// synthetic total the series builder appends.
static GROUP_ATLANTIC: &[&str] = &[
    "United Kingdom",
    "Ireland",
    "France",
    "Italy",
    "Spain",
    "US",
    "World",
];
static GROUP_NORTHERN: &[&str] = &[
    "Germany", "Austria", "Denmark", "Norway", "Sweden", "Finland", "Russia",
];
static GROWTH_FOCUS: &[&str] = &["World", "United Kingdom", "US", "Germany"];

const ROLLING_WINDOW: usize = 14;
const ROLLING_DIVISOR: f64 = 2.0;
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) configure dirs + client ──────────────────────────────────
    let out_dir = PathBuf::from("out");
    let charts_dir = PathBuf::from("charts");
    for d in [&out_dir, &charts_dir] {
        fs::create_dir_all(d)?;
    }
    let client = Client::builder().timeout(FETCH_TIMEOUT).build()?;
    let start_date = NaiveDate::from_ymd_opt(2020, 2, 20).unwrap();

    // ─── 3) fetch + transform both sources concurrently ──────────────
    let (confirmed, deaths) = tokio::try_join!(
        load_source(&client, &SOURCES[0], start_date),
        load_source(&client, &SOURCES[1], start_date),
    )?;

    info!(
        top = %confirmed.top_countries(10).join(", "),
        "largest cumulative case counts"
    );

    // ─── 4) derive daily deltas & persist all four tables ────────────
    let confirmed_new = metrics::delta(&confirmed);
    let deaths_new = metrics::delta(&deaths);

    let outputs: [(&CountrySeries, &str); 4] = [
        (&confirmed, SOURCES[0].cumulative_file),
        (&confirmed_new, SOURCES[0].delta_file),
        (&deaths, SOURCES[1].cumulative_file),
        (&deaths_new, SOURCES[1].delta_file),
    ];
    for (table, file) in outputs {
        let path = out_dir.join(file);
        // a failed write does not invalidate what we computed
        if let Err(e) = persist::write_series(&path, table) {
            error!(path = %path.display(), "persist failed: {e}");
        }
    }

    // ─── 5) comparative figures ──────────────────────────────────────
    if let Err(e) = render_weekly_figure(
        &charts_dir.join("weekly.svg"),
        &confirmed_new,
        &deaths_new,
    ) {
        error!("weekly figure failed: {e}");
    }
    if let Err(e) = render_growth_figure(&charts_dir.join("growth.svg"), &confirmed) {
        error!("growth figure failed: {e}");
    }

    info!("all done");
    Ok(())
}

/// Fetch one source and run it through the full transformation: parse,
/// reshape to a date × country grid, filter to the start date and append
/// the `World` total.
async fn load_source(
    client: &Client,
    source: &Source,
    start_date: NaiveDate,
) -> Result<CountrySeries> {
    info!(
        name = source.name,
        file = %fetch::display_name(source.url),
        "downloading"
    );
    let text = fetch::download_csv(client, source.url).await?;
    let raw = process::parse_snapshot(&text)?;
    let table = process::reshape(&raw, &ReshapeSpec::default())?;
    Ok(series::build(&table, start_date, true))
}

/// 2×2 figure: 14-day rolling sums (halved to a weekly scale) of cases and
/// deaths for the two country groups, log y.
fn render_weekly_figure(
    path: &Path,
    cases: &CountrySeries,
    deaths: &CountrySeries,
) -> Result<()> {
    let cases_atlantic =
        metrics::rolling_sum(&cases.select(GROUP_ATLANTIC), ROLLING_WINDOW, ROLLING_DIVISOR)?;
    let deaths_atlantic =
        metrics::rolling_sum(&deaths.select(GROUP_ATLANTIC), ROLLING_WINDOW, ROLLING_DIVISOR)?;
    let cases_northern =
        metrics::rolling_sum(&cases.select(GROUP_NORTHERN), ROLLING_WINDOW, ROLLING_DIVISOR)?;
    let deaths_northern =
        metrics::rolling_sum(&deaths.select(GROUP_NORTHERN), ROLLING_WINDOW, ROLLING_DIVISOR)?;

    let cases_northern_max = table_max(&cases_northern);
    let deaths_northern_max = table_max(&deaths_northern);
    let panels = vec![
        (
            cases_atlantic,
            weekly_panel(
                "Weekly cases",
                column_max(cases, WORLD).map(|m| (1.0, m * 50.0)),
            ),
        ),
        (
            deaths_atlantic,
            weekly_panel(
                "Weekly deaths",
                column_max(deaths, WORLD).map(|m| (1.0, m * 50.0)),
            ),
        ),
        (
            cases_northern,
            weekly_panel("Weekly cases", cases_northern_max.map(|m| (2.0, m * 10.0))),
        ),
        (
            deaths_northern,
            weekly_panel("Weekly deaths", deaths_northern_max.map(|m| (2.0, m * 10.0))),
        ),
    ];
    chart::render_grid(path, (1400, 700), (2, 2), &panels)?;
    info!(path = %path.display(), "rendered weekly figure");
    Ok(())
}

/// 2×2 figure of smoothed growth-rate estimates with trend overlays.
fn render_growth_figure(path: &Path, cumulative: &CountrySeries) -> Result<()> {
    let panels: Vec<(CountrySeries, PanelSpec)> = GROWTH_FOCUS
        .iter()
        .copied()
        .map(|country| {
            let rate = metrics::growth_rate(&cumulative.select(&[country]));
            (
                rate,
                PanelSpec {
                    title: "Growth factor".into(),
                    y_range: Some((-1.0, 1.0)),
                    trend: true,
                    ..Default::default()
                },
            )
        })
        .collect();
    chart::render_grid(path, (1400, 700), (2, 2), &panels)?;
    info!(path = %path.display(), "rendered growth figure");
    Ok(())
}

fn weekly_panel(title: &str, y_range: Option<(f64, f64)>) -> PanelSpec {
    PanelSpec {
        title: title.into(),
        y_range,
        log_y: true,
        ..Default::default()
    }
}

fn column_max(table: &CountrySeries, name: &str) -> Option<f64> {
    table
        .column_values(name)?
        .into_iter()
        .flatten()
        .reduce(f64::max)
}

fn table_max(table: &CountrySeries) -> Option<f64> {
    table
        .columns()
        .iter()
        .filter_map(|name| column_max(table, name))
        .reduce(f64::max)
}
