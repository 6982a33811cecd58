use std::time::Duration;

use anyhow::Result;
use reqwest::{Client, StatusCode};
use thiserror::Error;

const USER_AGENT: &str = concat!("etf_scraper/", env!("CARGO_PKG_VERSION"));
const TIMEOUT_SECS: u64 = 20;

/// Fetch failures. Only a `NotFound` on the primary profile page is fatal
/// for a ticker; everything else is handled as "source unavailable" by the
/// caller that hits it.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{url} not found (404)")]
    NotFound { url: String },
    #[error("fetch failed for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

pub fn client() -> Result<Client> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(TIMEOUT_SECS))
        .build()?;
    Ok(client)
}

/// GET a document as text. Bodies are decoded lossily: the holdings sources
/// serve legacy encodings and a replacement char beats a failed page.
pub async fn text(client: &Client, url: &str) -> Result<String, FetchError> {
    let transport = |source| FetchError::Transport { url: url.to_string(), source };

    let resp = client.get(url).send().await.map_err(transport)?;
    if resp.status() == StatusCode::NOT_FOUND {
        return Err(FetchError::NotFound { url: url.to_string() });
    }
    let resp = resp.error_for_status().map_err(transport)?;
    let bytes = resp.bytes().await.map_err(transport)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
