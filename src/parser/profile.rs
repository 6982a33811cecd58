//! The assembled ETF profile: one record per ticker, built in a single
//! extraction pass and read-only afterwards.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use scraper::Html;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use super::holdings::Holding;
use super::{fields, normalize, tables};

/// Scalar labels that land in the `details` map, keyed as stored.
/// Present only when their source label was found.
const DETAIL_FIELDS: &[(&str, &str)] = &[
    ("region_general", "Region (General):"),
    ("region_specific", "Region (Specific):"),
    ("bond_type", "Bond Type(s):"),
    ("bond_duration", "Bond Duration:"),
    ("asset_class_size", "Asset Class Size:"),
    ("asset_class_style", "Asset Class Style:"),
    ("currency", "Currency:"),
    ("commodity_type", "Commodity Type:"),
    ("commodity", "Commodity:"),
    ("commodity_exposure", "Commodity Exposure:"),
    ("sector_general", "Sector (General):"),
    ("sector_specific", "Sector (Specific):"),
];

/// A two-column breakdown: ordered (label, allocation) rows plus the name
/// the label column gets when serialized.
#[derive(Debug, Clone, Serialize)]
pub struct Table {
    pub label_column: &'static str,
    pub rows: Vec<(String, f64)>,
}

#[derive(Debug, Serialize)]
pub struct EtfProfile {
    pub ticker: String,
    pub name: Option<String>,
    pub index: Option<String>,
    pub category: Option<String>,
    pub asset_class: Option<String>,
    /// Fraction in [0, 1].
    pub expense_ratio: Option<f64>,
    /// Assets under management, plain currency units.
    pub aum: Option<f64>,
    pub shares: Option<u64>,
    pub details: BTreeMap<String, String>,
    pub tables: BTreeMap<String, Table>,
    pub holdings: Option<Vec<Holding>>,
    pub is_valid: bool,
    pub fetched_at: DateTime<Utc>,
}

impl EtfProfile {
    pub fn new(ticker: &str) -> Self {
        EtfProfile {
            ticker: ticker.trim().to_uppercase(),
            name: None,
            index: None,
            category: None,
            asset_class: None,
            expense_ratio: None,
            aum: None,
            shares: None,
            details: BTreeMap::new(),
            tables: BTreeMap::new(),
            holdings: None,
            is_valid: false,
            fetched_at: Utc::now(),
        }
    }

    /// Detail lookup by key; a missing key is an explicit absence.
    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details.get(key).map(String::as_str)
    }

    pub fn detail_keys(&self) -> Vec<&str> {
        self.details.keys().map(String::as_str).collect()
    }

    /// Table keys present on this profile, holdings included.
    pub fn table_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        if self.holdings.is_some() {
            keys.push("holdings");
        }
        keys
    }

    /// Net asset value per share, when both inputs were extracted.
    pub fn nav(&self) -> Option<f64> {
        match (self.aum, self.shares) {
            (Some(aum), Some(shares)) if shares > 0 => Some(aum / shares as f64),
            _ => None,
        }
    }
}

/// Drive the full catalog of scalar labels and breakdown headings over one
/// parsed profile page. Every extraction is individually fallible and every
/// failure is a skipped assignment; the pass itself always completes, which
/// is what `is_valid` records.
pub fn extract_profile(ticker: &str, html: &str) -> EtfProfile {
    let doc = Html::parse_document(html);
    let mut p = EtfProfile::new(ticker);

    p.name = fields::fund_name(&doc);
    if p.name.is_none() {
        debug!("no fund name for {}", p.ticker);
    }

    p.expense_ratio = fields::field(&doc, "Expense Ratio")
        .and_then(|raw| normalize::percent(&raw).ok())
        .filter(|v| (0.0..=1.0).contains(v));
    p.aum = fields::field(&doc, "AUM")
        .and_then(|raw| normalize::magnitude(&raw).ok())
        .filter(|v| *v >= 0.0);
    p.shares = fields::field(&doc, "Shares:")
        .and_then(|raw| normalize::magnitude(&raw).ok())
        .filter(|v| *v >= 0.0)
        .map(|v| v as u64);
    p.index = fields::field(&doc, "Tracks This Index:");
    p.category = fields::field(&doc, "ETFdb.com Category:");
    p.asset_class = fields::field(&doc, "Asset Class:");

    if let Some(report) = fields::report(&doc) {
        p.details.insert("report".to_string(), report);
    }
    for (key, label) in DETAIL_FIELDS {
        if let Some(value) = fields::field(&doc, label) {
            p.details.insert(key.to_string(), value);
        }
    }

    for spec in tables::BREAKDOWNS {
        if let Some(rows) = tables::table(&doc, spec.heading) {
            // shared keys overwrite: last catalog entry wins
            p.tables.insert(
                spec.key.to_string(),
                Table { label_column: spec.label_column, rows },
            );
        }
    }

    p.is_valid = true;
    p
}

/// The canonical nested-map shape: scalars and details verbatim, each table
/// as an array of per-row maps keyed by its column names.
pub fn to_record(p: &EtfProfile) -> Value {
    let mut tables = serde_json::Map::new();
    for (key, t) in &p.tables {
        let rows: Vec<Value> = t
            .rows
            .iter()
            .map(|(label, allocation)| {
                let mut row = serde_json::Map::new();
                row.insert(t.label_column.to_string(), json!(label));
                row.insert("allocation".to_string(), json!(allocation));
                Value::Object(row)
            })
            .collect();
        tables.insert(key.clone(), Value::Array(rows));
    }
    if let Some(holdings) = &p.holdings {
        let rows: Vec<Value> = holdings
            .iter()
            .map(|h| {
                json!({
                    "ticker": h.ticker,
                    "name": h.name,
                    "allocation": h.allocation,
                })
            })
            .collect();
        tables.insert("holdings".to_string(), Value::Array(rows));
    }

    json!({
        "ticker": p.ticker,
        "name": p.name,
        "index": p.index,
        "category": p.category,
        "asset_class": p.asset_class,
        "expense_ratio": p.expense_ratio,
        "aum": p.aum,
        "shares": p.shares,
        "details": p.details,
        "tables": Value::Object(tables),
        "is_valid": p.is_valid,
        "fetched_at": p.fetched_at.to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(body: &str) -> String {
        format!("<html><body>{}</body></html>", body)
    }

    const SCALARS: &str = "\
        <h1><span>VTI</span><span>Vanguard Total Stock Market ETF</span></h1>\
        <ul>\
        <li><span>Expense Ratio</span><span>0.45%</span></li>\
        <li><span>AUM</span><span>$2.30B</span></li>\
        <li><span>Shares:</span><span>12.5M</span></li>\
        <li><span>Tracks This Index: </span><span>CRSP US Total Market</span></li>\
        <li><span>Asset Class:</span><span>Equity</span></li>\
        <li><span>Region (General):</span><span>North America</span></li>\
        </ul>";

    #[test]
    fn scalar_extraction_end_to_end() {
        let p = extract_profile("vti", &page(SCALARS));
        assert_eq!(p.ticker, "VTI");
        assert_eq!(p.name.as_deref(), Some("Vanguard Total Stock Market ETF"));
        assert!((p.expense_ratio.unwrap() - 0.0045).abs() < 1e-12);
        assert_eq!(p.aum, Some(2_300_000_000.0));
        assert_eq!(p.shares, Some(12_500_000));
        assert_eq!(p.asset_class.as_deref(), Some("Equity"));
        assert_eq!(p.detail("region_general"), Some("North America"));
        assert!(!p.tables.contains_key("sector_breakdown"));
        assert!(p.is_valid);
    }

    #[test]
    fn sparse_page_is_still_valid() {
        let p = extract_profile("XYZ", "<html><body><p>nothing here</p></body></html>");
        assert!(p.is_valid);
        assert!(p.name.is_none());
        assert!(p.details.is_empty());
        assert!(p.tables.is_empty());
        assert_eq!(p.detail("bond_duration"), None);
    }

    #[test]
    fn bond_sector_overwrites_equity_sector() {
        let body = page(
            "<h3>Sector Breakdown</h3>\
             <table><tbody><tr><td>Technology</td><td>40%</td></tr></tbody></table>\
             <h3>Bond Sector Breakdown</h3>\
             <table><tbody><tr><td>Treasury</td><td>70%</td></tr>\
             <tr><td>Corporate</td><td>30%</td></tr></tbody></table>",
        );
        let p = extract_profile("BND", &body);
        let sector = &p.tables["sector_breakdown"];
        assert_eq!(sector.rows.len(), 2);
        assert_eq!(sector.rows[0].0, "Treasury");
    }

    #[test]
    fn nav_needs_both_inputs() {
        let mut p = EtfProfile::new("SPY");
        assert_eq!(p.nav(), None);
        p.aum = Some(1_000_000.0);
        p.shares = Some(100_000);
        assert_eq!(p.nav(), Some(10.0));
    }

    #[test]
    fn record_round_trip() {
        let mut p = extract_profile(
            "agg",
            &page(
                "<h1><span>AGG</span><span>Core U.S. Aggregate Bond ETF</span></h1>\
                 <span>Expense Ratio</span><span>0.03%</span>\
                 <h3>Credit Quality</h3>\
                 <table><tbody><tr><td>AAA</td><td>71.9%</td></tr>\
                 <tr><td>BBB</td><td>12.1%</td></tr></tbody></table>",
            ),
        );
        p.holdings = Some(vec![Holding {
            ticker: "T".into(),
            name: "US Treasury".into(),
            allocation: 0.41,
        }]);

        let record = to_record(&p);
        let parsed: Value = serde_json::from_str(&record.to_string()).unwrap();

        assert_eq!(parsed["ticker"], "AGG");
        assert_eq!(parsed["name"], "Core U.S. Aggregate Bond ETF");
        assert_eq!(parsed["expense_ratio"], 0.0003);
        assert_eq!(parsed["is_valid"], true);

        let cq = parsed["tables"]["credit_quality"].as_array().unwrap();
        assert_eq!(cq.len(), 2);
        assert_eq!(cq[0]["rank"], "AAA");
        assert!((cq[0]["allocation"].as_f64().unwrap() - 0.719).abs() < 1e-12);

        let hold = parsed["tables"]["holdings"].as_array().unwrap();
        assert_eq!(hold.len(), 1);
        assert_eq!(hold[0]["ticker"], "T");
        assert_eq!(hold[0]["allocation"], 0.41);
    }

    #[test]
    fn table_keys_include_holdings() {
        let mut p = EtfProfile::new("SPY");
        p.tables.insert(
            "asset_allocation".into(),
            Table { label_column: "category", rows: vec![("Equity".into(), 0.99)] },
        );
        assert_eq!(p.table_keys(), vec!["asset_allocation"]);
        p.holdings = Some(vec![]);
        assert_eq!(p.table_keys(), vec!["asset_allocation", "holdings"]);
    }
}
