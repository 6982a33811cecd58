use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

static TOOLTIP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"tooltip\.show\('(.*?)'\)").unwrap());
static SPAN_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span").unwrap());
static ANCHOR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());

/// A raw token that could not be converted to a typed value.
/// Always caught by the calling extractor and downgraded to "field absent".
#[derive(Debug, thiserror::Error)]
#[error("malformed value: {0:?}")]
pub struct MalformedValue(pub String);

/// Convert a percent string ("12.5%") or bare percent number ("12.5")
/// to a fraction in [0, 1].
pub fn percent(raw: &str) -> Result<f64, MalformedValue> {
    let t = raw.trim().trim_end_matches('%').replace(',', "");
    t.parse::<f64>()
        .map(|v| v / 100.0)
        .map_err(|_| MalformedValue(raw.to_string()))
}

/// Convert a magnitude-suffixed number ("$1.50B", "750.00M", "123.45")
/// to its bare value. `B` scales by 1e9, `M` by 1e6.
pub fn magnitude(raw: &str) -> Result<f64, MalformedValue> {
    let t = raw.trim().replace(',', "");
    let s = t.strip_prefix('$').unwrap_or(&t);
    let (num, mul) = match s.as_bytes().last() {
        Some(b'B') => (&s[..s.len() - 1], 1e9),
        Some(b'M') => (&s[..s.len() - 1], 1e6),
        _ => (s, 1.0),
    };
    num.trim()
        .parse::<f64>()
        .map(|v| v * mul)
        .map_err(|_| MalformedValue(raw.to_string()))
}

/// The fallback holdings source hides the full security name in a tooltip
/// attribute when the display name is truncated. Extract it; otherwise the
/// cell text is already the name.
pub fn embedded_name(raw: &str) -> String {
    if !raw.contains("<span") {
        return raw.trim().to_string();
    }
    let frag = Html::parse_fragment(raw);
    if let Some(attr) = frag
        .select(&SPAN_SEL)
        .next()
        .and_then(|s| s.value().attr("onmouseover"))
    {
        if let Some(caps) = TOOLTIP_RE.captures(attr) {
            return caps[1].trim_end_matches('.').trim().to_string();
        }
    }
    raw.trim().to_string()
}

/// Ticker cells from the fallback source are anchor-wrapped; take the link text.
pub fn embedded_ticker(raw: &str) -> String {
    if raw.contains("<a") {
        let frag = Html::parse_fragment(raw);
        if let Some(a) = frag.select(&ANCHOR_SEL).next() {
            return a.text().collect::<String>().trim().to_string();
        }
    }
    raw.trim().to_string()
}

/// Allocation cells from the fallback source are bare percent numbers,
/// with the literal token "NA" standing for zero.
pub fn allocation_or_na(raw: &str) -> Result<f64, MalformedValue> {
    let t = raw.trim();
    if t == "NA" {
        return Ok(0.0);
    }
    t.replace(',', "")
        .parse::<f64>()
        .map(|v| v / 100.0)
        .map_err(|_| MalformedValue(raw.to_string()))
}
