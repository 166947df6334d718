// src/fetch/mod.rs
pub mod urls;

use std::time::Duration;

use reqwest::Client;
use tokio::time::sleep;
use tracing::warn;

use crate::error::PipelineError;

pub use urls::{display_name, Source, SOURCES};

const MAX_RETRIES: usize = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Download one snapshot and decode it as UTF-8 text.
///
/// Non-2xx responses fail immediately; transport errors are retried up to
/// [`MAX_RETRIES`] times with a fixed delay. The request deadline comes from
/// the client (build it with a timeout), so a dead upstream fails fast
/// instead of hanging the run.
pub async fn download_csv(client: &Client, url: &str) -> Result<String, PipelineError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let err = match client.get(url).send().await {
            Ok(resp) => match resp.error_for_status() {
                Ok(resp) => match resp.text().await {
                    Ok(text) => return Ok(text),
                    Err(e) => e,
                },
                // a served error status will not improve on retry
                Err(e) => {
                    return Err(PipelineError::Fetch {
                        url: url.to_string(),
                        source: e,
                    })
                }
            },
            Err(e) => e,
        };

        if attempt < MAX_RETRIES {
            warn!(url, attempt, error = %err, "fetch failed, retrying");
            sleep(RETRY_DELAY).await;
        } else {
            return Err(PipelineError::Fetch {
                url: url.to_string(),
                source: err,
            });
        }
    }
}
