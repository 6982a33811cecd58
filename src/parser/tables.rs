//! Heading-anchored breakdown tables.
//!
//! Every breakdown on the profile page shares one shape: an `<h3>` heading
//! followed by a two-column table of (category label, percent allocation).
//! One catalog entry per breakdown drives the whole set; the allocation
//! column is percent-normalized on the way in, so stored rows always carry
//! fractions in [0, 1].

use std::sync::LazyLock;

use scraper::{Html, Selector};

use super::{following, normalize, text_of};

static H3_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h3").unwrap());
static TR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static TD_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());

/// One breakdown category: heading text to look for, the key the result is
/// stored under, and the name its label column gets when serialized.
pub struct TableSpec {
    pub heading: &'static str,
    pub key: &'static str,
    pub label_column: &'static str,
}

/// The fixed breakdown catalog, in extraction order. "Sector Breakdown" and
/// "Bond Sector Breakdown" share one key on purpose: when a document carries
/// both headings the later extraction wins (last-write-wins).
pub const BREAKDOWNS: &[TableSpec] = &[
    TableSpec { heading: "Asset Allocation", key: "asset_allocation", label_column: "category" },
    TableSpec { heading: "Sector Breakdown", key: "sector_breakdown", label_column: "sector" },
    TableSpec { heading: "Bond Sector Breakdown", key: "sector_breakdown", label_column: "sector" },
    TableSpec {
        heading: "Bond Detailed Sector Breakdown",
        key: "bond_detailed_sector_breakdown",
        label_column: "sector",
    },
    TableSpec { heading: "Coupon Breakdown", key: "coupon_breakdown", label_column: "coupon" },
    TableSpec { heading: "Credit Quality", key: "credit_quality", label_column: "rank" },
    TableSpec { heading: "Maturity Breakdown", key: "maturity_breakdown", label_column: "maturity" },
    TableSpec { heading: "Market Cap Breakdown", key: "market_cap_breakdown", label_column: "cap" },
    TableSpec { heading: "Region Breakdown", key: "region_breakdown", label_column: "region" },
    TableSpec {
        heading: "Market Tier Breakdown",
        key: "market_tier_breakdown",
        label_column: "tier",
    },
    TableSpec { heading: "Country Breakdown", key: "country_breakdown", label_column: "country" },
];

/// Rows of the nearest table following the first `<h3>` whose text contains
/// `heading`. Absent when the heading or table is missing, when the table has
/// no data rows, or when any data row is malformed or carries an allocation
/// outside [0, 1]: a table is either whole or not there at all.
pub fn table(doc: &Html, heading: &str) -> Option<Vec<(String, f64)>> {
    let anchor = doc.select(&H3_SEL).find(|h| text_of(h).contains(heading))?;
    let table = following(doc, anchor, "table")?;

    let mut rows = Vec::new();
    for tr in table.select(&TR_SEL) {
        let cells: Vec<String> = tr.select(&TD_SEL).map(|td| text_of(&td)).collect();
        if cells.is_empty() {
            // header-only row
            continue;
        }
        if cells.len() < 2 {
            return None;
        }
        let allocation = normalize::percent(&cells[1])
            .ok()
            .filter(|v| (0.0..=1.0).contains(v))?;
        rows.push((cells[0].clone(), allocation));
    }
    if rows.is_empty() {
        None
    } else {
        Some(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(body: &str) -> Html {
        Html::parse_document(&format!("<html><body>{}</body></html>", body))
    }

    const SECTOR: &str = r#"
        <h3>Sector Breakdown</h3>
        <table><tbody>
            <tr><td>Technology</td><td>32.1%</td></tr>
            <tr><td>Financials</td><td>14.9%</td></tr>
        </tbody></table>"#;

    #[test]
    fn rows_are_normalized() {
        let d = doc(SECTOR);
        let rows = table(&d, "Sector Breakdown").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], ("Technology".to_string(), 0.321));
        assert_eq!(rows[1].1, 0.149);
    }

    #[test]
    fn allocations_in_unit_range() {
        let d = doc(SECTOR);
        for (_, alloc) in table(&d, "Sector Breakdown").unwrap() {
            assert!((0.0..=1.0).contains(&alloc));
        }
    }

    #[test]
    fn missing_heading_is_absent() {
        let d = doc(SECTOR);
        assert!(table(&d, "Country Breakdown").is_none());
    }

    #[test]
    fn heading_without_table_is_absent() {
        let d = doc("<h3>Coupon Breakdown</h3><p>coming soon</p>");
        assert!(table(&d, "Coupon Breakdown").is_none());
    }

    #[test]
    fn malformed_row_drops_whole_table() {
        let d = doc(
            "<h3>Credit Quality</h3><table><tbody>\
             <tr><td>AAA</td><td>60%</td></tr>\
             <tr><td>AA</td><td>n/a</td></tr>\
             </tbody></table>",
        );
        assert!(table(&d, "Credit Quality").is_none());
    }

    #[test]
    fn out_of_range_row_drops_whole_table() {
        let d = doc(
            "<h3>Sector Breakdown</h3><table><tbody>\
             <tr><td>Technology</td><td>40%</td></tr>\
             <tr><td>Leveraged Tech</td><td>150%</td></tr>\
             </tbody></table>",
        );
        assert!(table(&d, "Sector Breakdown").is_none());
    }

    #[test]
    fn negative_allocation_drops_whole_table() {
        let d = doc(
            "<h3>Asset Allocation</h3><table><tbody>\
             <tr><td>Short Equity</td><td>-20%</td></tr>\
             </tbody></table>",
        );
        assert!(table(&d, "Asset Allocation").is_none());
    }

    #[test]
    fn header_rows_skipped() {
        let d = doc(
            "<h3>Country Breakdown</h3><table>\
             <thead><tr><th>Country</th><th>Weight</th></tr></thead>\
             <tbody><tr><td>Japan</td><td>8.0%</td></tr></tbody></table>",
        );
        let rows = table(&d, "Country Breakdown").unwrap();
        assert_eq!(rows, vec![("Japan".to_string(), 0.08)]);
    }

    #[test]
    fn table_in_following_container() {
        let d = doc(
            "<div><h3>Maturity Breakdown</h3></div>\
             <div><table><tbody><tr><td>1-3 Yrs</td><td>25%</td></tr></tbody></table></div>",
        );
        assert_eq!(table(&d, "Maturity Breakdown").unwrap().len(), 1);
    }
}
