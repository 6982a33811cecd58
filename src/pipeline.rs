//! Per-ticker assembly and the concurrent batch driver.

use std::sync::Arc;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use rusqlite::Connection;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::db;
use crate::fetch::{self, FetchError};
use crate::parser::{holdings, profile};

pub const CONCURRENCY: usize = 8;

pub fn profile_url(ticker: &str) -> String {
    format!("https://etfdb.com/etf/{}/", ticker)
}

/// Build one profile: fetch the primary page (the only fatal failure point),
/// run the extraction pass, then resolve holdings from its own sources.
pub async fn build_profile(client: &Client, ticker: &str) -> Result<profile::EtfProfile, FetchError> {
    let ticker = ticker.trim().to_uppercase();
    let html = fetch::text(client, &profile_url(&ticker)).await?;
    let mut profile = profile::extract_profile(&ticker, &html);
    profile.holdings = holdings::resolve(client, &ticker).await;
    Ok(profile)
}

pub struct BatchStats {
    pub total: usize,
    pub ok: usize,
    pub errors: usize,
}

enum Outcome {
    Profile(Box<profile::EtfProfile>),
    Failed { ticker: String, error: String },
}

/// Fetch + extract the queued tickers concurrently, saving each profile to
/// the DB as it arrives. A failed ticker is recorded and the batch moves on.
pub async fn run_batch(conn: &Connection, tickers: Vec<String>) -> Result<BatchStats> {
    let client = Arc::new(fetch::client()?);
    let semaphore = Arc::new(Semaphore::new(CONCURRENCY));
    let total = tickers.len();

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    // Channel: workers send results, main loop saves to DB
    let (tx, mut rx) = tokio::sync::mpsc::channel::<Outcome>(CONCURRENCY * 2);

    for ticker in tickers {
        let client = Arc::clone(&client);
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();

        tokio::spawn(async move {
            let _permit = match sem.acquire().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            let outcome = match build_profile(&client, &ticker).await {
                Ok(profile) => Outcome::Profile(Box::new(profile)),
                Err(e) => {
                    warn!("profile failed for {}: {}", ticker, e);
                    Outcome::Failed { ticker, error: e.to_string() }
                }
            };
            let _ = tx.send(outcome).await;
        });
    }

    // Drop our copy of tx so rx closes when all spawned tasks finish
    drop(tx);

    let mut ok = 0usize;
    let mut errors = 0usize;
    while let Some(outcome) = rx.recv().await {
        match outcome {
            Outcome::Profile(profile) => {
                db::save_profile(conn, &profile)?;
                ok += 1;
            }
            Outcome::Failed { ticker, error } => {
                db::mark_error(conn, &ticker, &error)?;
                errors += 1;
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Fetched {} profiles ({} ok, {} errors)", total, ok, errors);

    Ok(BatchStats { total, ok, errors })
}
