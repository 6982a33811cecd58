//! Label-anchored scalar extraction.
//!
//! The profile page lays scalar facts out as `<span>Label:</span>` followed
//! by a value span somewhere after it in document order. Every lookup here
//! returns `Option`: a missing label, a missing value node, or an empty value
//! all mean "field absent", never an error, so one broken label cannot take
//! down the rest of the extraction pass.

use std::sync::LazyLock;

use scraper::{Html, Selector};

use super::{following, text_of};

static SPAN_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span").unwrap());
static H1_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").unwrap());
static REPORT_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#analyst-collapse").unwrap());

/// Text of the value span following the innermost span whose text contains
/// `label`. Matching on concatenated descendant text means a wrapper span
/// around the whole row also matches; anchoring there would make the label
/// span itself the "value", so wrappers with a matching inner span are skipped.
pub fn field(doc: &Html, label: &str) -> Option<String> {
    let anchor = doc.select(&SPAN_SEL).find(|s| {
        text_of(s).contains(label)
            && !s
                .select(&SPAN_SEL)
                .any(|inner| inner.id() != s.id() && text_of(&inner).contains(label))
    })?;
    let value = following(doc, anchor, "span")?;
    let text = text_of(&value);
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// The fund name: second span under the page's first `<h1>`.
pub fn fund_name(doc: &Html) -> Option<String> {
    let h1 = doc.select(&H1_SEL).next()?;
    let span = h1.select(&SPAN_SEL).nth(1)?;
    let text = text_of(&span);
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// The analyst report paragraph: first `<p>` after the collapse block.
pub fn report(doc: &Html) -> Option<String> {
    let anchor = doc.select(&REPORT_SEL).next()?;
    let p = following(doc, anchor, "p")?;
    let text = text_of(&p);
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
