//! Two-source holdings resolution.
//!
//! The primary source exposes holdings as a tagged listing table keyed by
//! ticker. When that yields nothing (missing block, empty table, fetch
//! failure), a secondary source is consulted: its page embeds the holdings
//! as a script-level array literal between two fixed sentinels, with
//! markup-wrapped cells that need their own cleaning chain. Whichever source
//! answers first wins; the result is always a whole table or nothing.

use std::future::Future;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use serde::Serialize;
use tracing::{debug, warn};

use super::{normalize, text_of};
use crate::fetch;

static LISTING_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#etfs-that-own").unwrap());
static TR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static TD_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());

const LITERAL_START: &str = "etf_holdings.formatted_data = [ [ ";
const LITERAL_END: &str = " ] ];";

/// Embedded-literal rows carry six positional columns; only name, ticker and
/// allocation survive the mapping.
const LITERAL_ARITY: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Holding {
    pub ticker: String,
    pub name: String,
    pub allocation: f64,
}

pub fn listing_url(ticker: &str) -> String {
    format!("https://etfdailynews.com/tools/what-is-in-your-etf/?FundVariable={}", ticker)
}

pub fn fallback_url(ticker: &str) -> String {
    format!("https://www.zacks.com/funds/etf/{}/holding", ticker)
}

/// Resolve holdings for one ticker: primary listing page first, embedded
/// fallback only when the primary yields nothing. Fetch failures on either
/// source are downgraded to "source yielded nothing".
pub async fn resolve(client: &reqwest::Client, ticker: &str) -> Option<Vec<Holding>> {
    let primary = match fetch::text(client, &listing_url(ticker)).await {
        Ok(body) => Some(body),
        Err(e) => {
            debug!("holdings listing fetch failed for {}: {}", ticker, e);
            None
        }
    };

    let fallback = async {
        debug!("no holdings listing for {}, trying embedded source", ticker);
        match fetch::text(client, &fallback_url(ticker)).await {
            Ok(body) => Some(body),
            Err(e) => {
                warn!("holdings fallback fetch failed for {}: {}", ticker, e);
                None
            }
        }
    };

    resolve_with(primary.as_deref(), fallback).await
}

/// The source-selection rule, separated from fetching: first success wins,
/// and the fallback future is only awaited when the primary document yields
/// no table.
pub async fn resolve_with<F>(primary: Option<&str>, fallback: F) -> Option<Vec<Holding>>
where
    F: Future<Output = Option<String>>,
{
    if let Some(rows) = primary.and_then(listing_rows) {
        return Some(rows);
    }
    fallback.await.and_then(|body| embedded_rows(&body))
}

/// Rows of the tagged listing block: (ticker, name, allocation) per row.
pub fn listing_rows(html: &str) -> Option<Vec<Holding>> {
    let doc = Html::parse_document(html);
    let block = doc.select(&LISTING_SEL).next()?;

    let mut rows = Vec::new();
    for tr in block.select(&TR_SEL) {
        let cells: Vec<String> = tr.select(&TD_SEL).map(|td| text_of(&td)).collect();
        if cells.is_empty() {
            continue;
        }
        if cells.len() < 3 {
            return None;
        }
        let allocation = normalize::percent(&cells[2])
            .ok()
            .filter(|v| (0.0..=1.0).contains(v))?;
        rows.push(Holding { ticker: cells[0].clone(), name: cells[1].clone(), allocation });
    }
    if rows.is_empty() {
        None
    } else {
        Some(rows)
    }
}

/// Scan the fallback page for the embedded array literal and map its rows to
/// (name, ticker, allocation), dropping positional columns 2..=4. Arity is
/// checked per row before any column is touched so a format drift surfaces
/// as an absent table rather than misaligned data.
pub fn embedded_rows(body: &str) -> Option<Vec<Holding>> {
    let start = body.find(LITERAL_START)?;
    let end = body[start..].find(LITERAL_END)? + start;
    let literal = format!("[[{}]]", &body[start + LITERAL_START.len()..end]);

    let raw = parse_nested_literal(&literal)?;
    let mut rows = Vec::with_capacity(raw.len());
    for cols in raw {
        if cols.len() != LITERAL_ARITY {
            return None;
        }
        let allocation = normalize::allocation_or_na(&cols[5])
            .ok()
            .filter(|v| (0.0..=1.0).contains(v))?;
        rows.push(Holding {
            name: normalize::embedded_name(&cols[0]),
            ticker: normalize::embedded_ticker(&cols[1]),
            allocation,
        });
    }
    if rows.is_empty() {
        None
    } else {
        Some(rows)
    }
}

/// Micro-parser for the embedded literal: a list of lists of scalars, where
/// a scalar is a single- or double-quoted string (backslash escapes) or a
/// bare token such as a number. Nothing more is accepted.
fn parse_nested_literal(src: &str) -> Option<Vec<Vec<String>>> {
    let bytes = src.as_bytes();
    let mut i = skip_ws(bytes, 0);
    if bytes.get(i) != Some(&b'[') {
        return None;
    }
    i += 1;

    let mut rows = Vec::new();
    loop {
        i = skip_ws(bytes, i);
        match bytes.get(i)? {
            b']' => return Some(rows),
            b',' => {
                i += 1;
            }
            b'[' => {
                let (row, next) = parse_row(src, i + 1)?;
                rows.push(row);
                i = next;
            }
            _ => return None,
        }
    }
}

/// Parse one inner list starting just past its `[`; returns the items and
/// the index just past the closing `]`.
fn parse_row(src: &str, mut i: usize) -> Option<(Vec<String>, usize)> {
    let bytes = src.as_bytes();
    let mut items = Vec::new();
    loop {
        i = skip_ws(bytes, i);
        match bytes.get(i)? {
            b']' => return Some((items, i + 1)),
            b',' => {
                i += 1;
            }
            b'\'' | b'"' => {
                let (s, next) = parse_quoted(src, i)?;
                items.push(s);
                i = next;
            }
            _ => {
                let (s, next) = parse_bare(src, i);
                items.push(s);
                i = next;
            }
        }
    }
}

fn parse_quoted(src: &str, start: usize) -> Option<(String, usize)> {
    let bytes = src.as_bytes();
    let quote = bytes[start];
    let mut out = String::new();
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                let next = *bytes.get(i + 1)?;
                out.push(next as char);
                i += 2;
            }
            b if b == quote => return Some((out, i + 1)),
            _ => {
                // multi-byte chars pass through untouched
                let ch = src[i..].chars().next()?;
                out.push(ch);
                i += ch.len_utf8();
            }
        }
    }
    None
}

fn parse_bare(src: &str, start: usize) -> (String, usize) {
    let bytes = src.as_bytes();
    let mut i = start;
    while i < bytes.len() && bytes[i] != b',' && bytes[i] != b']' {
        i += 1;
    }
    (src[start..i].trim().to_string(), i)
}

fn skip_ws(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}
