mod db;
mod fetch;
mod parser;
mod pipeline;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};

use parser::profile::{to_record, EtfProfile};

#[derive(Parser)]
#[command(name = "etf_scraper", about = "ETF profile scraper (etfdb.com + fallback holdings sources)")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a ticker list (CSV or one-per-line) into the queue
    Init {
        /// Path to the ticker list file
        file: PathBuf,
    },
    /// Fetch profiles for queued tickers, skipping those already stored
    Run {
        /// Max tickers to fetch (default: all pending)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Fetch a single ticker and print its summary (not stored)
    Show { ticker: String },
    /// Print the JSON record for a ticker (stored, or fetched fresh)
    Export { ticker: String },
    /// Show queue statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { file } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let tickers = read_ticker_list(&file)?;
            let inserted = db::queue_tickers(&conn, &tickers)?;
            println!("Queued {} new tickers ({} in file)", inserted, tickers.len());
            Ok(())
        }
        Commands::Run { limit } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let pending = db::fetch_pending(&conn, limit)?;
            if pending.is_empty() {
                println!("No pending tickers. Run 'init' first or all profiles are stored.");
                return Ok(());
            }
            println!("Fetching {} profiles (streaming to DB)...", pending.len());
            let stats = pipeline::run_batch(&conn, pending).await?;
            println!("Done: {} fetched ({} ok, {} errors).", stats.total, stats.ok, stats.errors);
            Ok(())
        }
        Commands::Show { ticker } => {
            let client = fetch::client()?;
            let profile = pipeline::build_profile(&client, &ticker).await?;
            print_summary(&profile);
            Ok(())
        }
        Commands::Export { ticker } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let ticker = ticker.trim().to_uppercase();
            let stored = if db::profile_exists(&conn, &ticker)? {
                db::load_record(&conn, &ticker)?
            } else {
                None
            };
            match stored {
                Some(record) => println!("{}", record),
                None => {
                    let client = fetch::client()?;
                    let profile = pipeline::build_profile(&client, &ticker).await?;
                    db::save_profile(&conn, &profile)?;
                    println!("{}", to_record(&profile));
                }
            }
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Queued:   {}", s.queued);
            println!("Fetched:  {}", s.fetched);
            println!("Pending:  {}", s.pending);
            println!("Errors:   {}", s.errors);
            println!("Profiles: {}", s.profiles);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {:.1}s", elapsed.as_secs_f64());
    }

    result
}

/// Ticker lists come as a single CSV line or one ticker per line.
fn read_ticker_list(path: &PathBuf) -> anyhow::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .split([',', '\n', '\r'])
        .map(|t| t.trim().to_uppercase())
        .filter(|t| !t.is_empty())
        .collect())
}

fn print_summary(p: &EtfProfile) {
    let opt = |v: &Option<String>| v.clone().unwrap_or_else(|| "NA".into());

    println!();
    println!("Ticker             {}", p.ticker);
    println!("Name               {}", opt(&p.name));
    println!("Category           {}", opt(&p.category));
    println!("Asset class        {}", opt(&p.asset_class));
    match p.expense_ratio {
        Some(er) => println!("Expense ratio      {}%", er * 100.0),
        None => println!("Expense ratio      NA"),
    }
    match p.aum {
        Some(aum) => println!("AUM                {}", aum),
        None => println!("AUM                NA"),
    }
    match p.shares {
        Some(shares) => println!("Shares             {}", shares),
        None => println!("Shares             NA"),
    }
    if let Some(nav) = p.nav() {
        println!("NAV                {:.3}$", nav);
    }
    println!("Underlying Index   {}", opt(&p.index));
    if let Some(size) = p.detail("asset_class_size") {
        println!("Asset class size   {}", size);
    }
    if let Some(region) = p.detail("region_general") {
        println!("Region (general)   {}", region);
    }
    match &p.holdings {
        Some(holdings) => println!("Num. holdings      {}", holdings.len()),
        None => println!("Holdings           NA"),
    }
    println!();
    println!("Details:           {:?}", p.detail_keys());
    println!("Tables:            {:?}", p.table_keys());
    println!();
}
