use anyhow::Result;
use rusqlite::Connection;

use crate::parser::profile::{to_record, EtfProfile};

const DB_PATH: &str = "data/etf.sqlite";

pub fn connect() -> Result<Connection> {
    std::fs::create_dir_all("data")?;
    let conn = Connection::open(DB_PATH)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS tickers (
            ticker     TEXT PRIMARY KEY,
            queued_at  TEXT NOT NULL DEFAULT (datetime('now')),
            fetched    BOOLEAN NOT NULL DEFAULT 0,
            fetched_at TEXT,
            error      TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_tickers_fetched ON tickers(fetched);

        CREATE TABLE IF NOT EXISTS profiles (
            ticker        TEXT PRIMARY KEY,
            name          TEXT,
            category      TEXT,
            asset_class   TEXT,
            index_name    TEXT,
            expense_ratio REAL,
            aum           REAL,
            shares        INTEGER,
            details       TEXT NOT NULL,  -- JSON object
            record        TEXT NOT NULL,  -- full canonical JSON record
            fetched_at    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS breakdown_rows (
            id         INTEGER PRIMARY KEY,
            ticker     TEXT NOT NULL REFERENCES profiles(ticker),
            table_key  TEXT NOT NULL,
            position   INTEGER NOT NULL,
            label      TEXT NOT NULL,
            allocation REAL NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_breakdown_ticker ON breakdown_rows(ticker, table_key);

        CREATE TABLE IF NOT EXISTS holding_rows (
            id             INTEGER PRIMARY KEY,
            ticker         TEXT NOT NULL REFERENCES profiles(ticker),
            position       INTEGER NOT NULL,
            holding_ticker TEXT NOT NULL,
            name           TEXT NOT NULL,
            allocation     REAL NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_holding_ticker ON holding_rows(ticker);
        ",
    )?;
    Ok(())
}

// ── Ticker queue ──

pub fn queue_tickers(conn: &Connection, tickers: &[String]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare("INSERT OR IGNORE INTO tickers (ticker) VALUES (?1)")?;
        for ticker in tickers {
            count += stmt.execute(rusqlite::params![ticker.trim().to_uppercase()])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

/// Queued tickers with no stored profile yet. Already-fetched tickers are
/// never re-fetched.
pub fn fetch_pending(conn: &Connection, limit: Option<usize>) -> Result<Vec<String>> {
    let sql = format!(
        "SELECT t.ticker FROM tickers t
         LEFT JOIN profiles p ON p.ticker = t.ticker
         WHERE p.ticker IS NULL AND t.error IS NULL
         ORDER BY t.ticker{}",
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn profile_exists(conn: &Connection, ticker: &str) -> Result<bool> {
    let count: usize = conn.query_row(
        "SELECT COUNT(*) FROM profiles WHERE ticker = ?1",
        rusqlite::params![ticker],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}

// ── Profiles ──

pub fn save_profile(conn: &Connection, profile: &EtfProfile) -> Result<()> {
    let record = to_record(profile).to_string();
    let details = serde_json::to_string(&profile.details)?;

    let tx = conn.unchecked_transaction()?;
    {
        tx.execute(
            "INSERT OR REPLACE INTO profiles
             (ticker, name, category, asset_class, index_name,
              expense_ratio, aum, shares, details, record, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            rusqlite::params![
                profile.ticker,
                profile.name,
                profile.category,
                profile.asset_class,
                profile.index,
                profile.expense_ratio,
                profile.aum,
                profile.shares.map(|s| s as i64),
                details,
                record,
                profile.fetched_at.to_rfc3339(),
            ],
        )?;

        tx.execute(
            "DELETE FROM breakdown_rows WHERE ticker = ?1",
            rusqlite::params![profile.ticker],
        )?;
        let mut b_stmt = tx.prepare(
            "INSERT INTO breakdown_rows (ticker, table_key, position, label, allocation)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for (key, table) in &profile.tables {
            for (pos, (label, allocation)) in table.rows.iter().enumerate() {
                b_stmt.execute(rusqlite::params![
                    profile.ticker,
                    key,
                    pos as i64,
                    label,
                    allocation,
                ])?;
            }
        }

        tx.execute(
            "DELETE FROM holding_rows WHERE ticker = ?1",
            rusqlite::params![profile.ticker],
        )?;
        if let Some(holdings) = &profile.holdings {
            let mut h_stmt = tx.prepare(
                "INSERT INTO holding_rows (ticker, position, holding_ticker, name, allocation)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (pos, h) in holdings.iter().enumerate() {
                h_stmt.execute(rusqlite::params![
                    profile.ticker,
                    pos as i64,
                    h.ticker,
                    h.name,
                    h.allocation,
                ])?;
            }
        }

        tx.execute(
            "UPDATE tickers SET fetched = 1, fetched_at = datetime('now'), error = NULL
             WHERE ticker = ?1",
            rusqlite::params![profile.ticker],
        )?;
    }
    tx.commit()?;
    Ok(())
}

pub fn mark_error(conn: &Connection, ticker: &str, error: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO tickers (ticker, fetched, fetched_at, error)
         VALUES (?1, 1, datetime('now'), ?2)
         ON CONFLICT(ticker) DO UPDATE
         SET fetched = 1, fetched_at = datetime('now'), error = excluded.error",
        rusqlite::params![ticker, error],
    )?;
    Ok(())
}

pub fn load_record(conn: &Connection, ticker: &str) -> Result<Option<String>> {
    let mut stmt = conn.prepare("SELECT record FROM profiles WHERE ticker = ?1")?;
    let mut rows = stmt.query_map(rusqlite::params![ticker], |row| row.get(0))?;
    match rows.next() {
        Some(record) => Ok(Some(record?)),
        None => Ok(None),
    }
}

// ── Stats ──

pub struct Stats {
    pub queued: usize,
    pub fetched: usize,
    pub pending: usize,
    pub errors: usize,
    pub profiles: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let queued: usize = conn.query_row("SELECT COUNT(*) FROM tickers", [], |r| r.get(0))?;
    let fetched: usize =
        conn.query_row("SELECT COUNT(*) FROM tickers WHERE fetched = 1", [], |r| r.get(0))?;
    let errors: usize = conn.query_row(
        "SELECT COUNT(*) FROM tickers WHERE error IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let profiles: usize = conn.query_row("SELECT COUNT(*) FROM profiles", [], |r| r.get(0))?;
    Ok(Stats {
        queued,
        fetched,
        pending: queued - fetched,
        errors,
        profiles,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::holdings::Holding;
    use crate::parser::profile::Table;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn sample_profile() -> EtfProfile {
        let mut p = EtfProfile::new("spy");
        p.name = Some("SPDR S&P 500 ETF".into());
        p.expense_ratio = Some(0.0009);
        p.aum = Some(4.0e11);
        p.shares = Some(900_000_000);
        p.details.insert("currency".into(), "USD".into());
        p.tables.insert(
            "sector_breakdown".into(),
            Table {
                label_column: "sector",
                rows: vec![("Technology".into(), 0.31), ("Financials".into(), 0.13)],
            },
        );
        p.holdings = Some(vec![Holding {
            ticker: "AAPL".into(),
            name: "Apple Inc".into(),
            allocation: 0.071,
        }]);
        p.is_valid = true;
        p
    }

    #[test]
    fn queue_dedup_and_pending() {
        let conn = test_conn();
        let inserted =
            queue_tickers(&conn, &["spy".into(), "SPY".into(), "agg".into()]).unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(fetch_pending(&conn, None).unwrap(), vec!["AGG", "SPY"]);
        assert_eq!(fetch_pending(&conn, Some(1)).unwrap(), vec!["AGG"]);
    }

    #[test]
    fn save_and_reload_profile() {
        let conn = test_conn();
        queue_tickers(&conn, &["SPY".into()]).unwrap();
        save_profile(&conn, &sample_profile()).unwrap();

        assert!(profile_exists(&conn, "SPY").unwrap());
        assert!(fetch_pending(&conn, None).unwrap().is_empty());

        let record = load_record(&conn, "SPY").unwrap().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&record).unwrap();
        assert_eq!(parsed["ticker"], "SPY");
        assert_eq!(parsed["tables"]["sector_breakdown"].as_array().unwrap().len(), 2);
        assert_eq!(parsed["tables"]["holdings"][0]["ticker"], "AAPL");

        let rows: usize = conn
            .query_row("SELECT COUNT(*) FROM breakdown_rows WHERE ticker = 'SPY'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(rows, 2);
    }

    #[test]
    fn resave_replaces_rows() {
        let conn = test_conn();
        save_profile(&conn, &sample_profile()).unwrap();
        save_profile(&conn, &sample_profile()).unwrap();
        let rows: usize = conn
            .query_row("SELECT COUNT(*) FROM breakdown_rows", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 2);
        let holds: usize = conn
            .query_row("SELECT COUNT(*) FROM holding_rows", [], |r| r.get(0))
            .unwrap();
        assert_eq!(holds, 1);
    }

    #[test]
    fn mark_error_stamps_fetch_time() {
        let conn = test_conn();
        // Ticker not previously queued: exercises the insert path.
        mark_error(&conn, "GONE", "https://etfdb.com/etf/GONE/ not found (404)").unwrap();
        let fetched_at: Option<String> = conn
            .query_row("SELECT fetched_at FROM tickers WHERE ticker = 'GONE'", [], |r| r.get(0))
            .unwrap();
        assert!(fetched_at.is_some());
    }

    #[test]
    fn errors_counted_in_stats() {
        let conn = test_conn();
        queue_tickers(&conn, &["SPY".into(), "BAD".into()]).unwrap();
        save_profile(&conn, &sample_profile()).unwrap();
        mark_error(&conn, "BAD", "https://etfdb.com/etf/BAD/ not found (404)").unwrap();

        let s = get_stats(&conn).unwrap();
        assert_eq!(s.queued, 2);
        assert_eq!(s.fetched, 2);
        assert_eq!(s.pending, 0);
        assert_eq!(s.errors, 1);
        assert_eq!(s.profiles, 1);
    }
}
