pub mod fields;
pub mod holdings;
pub mod normalize;
pub mod profile;
pub mod tables;

use scraper::{ElementRef, Html};

/// First element named `name` that follows `from` in document order
/// (descendants of `from` included). The "nearest following value node"
/// lookup both the field and table extractors rely on.
pub(crate) fn following<'a>(
    doc: &'a Html,
    from: ElementRef<'a>,
    name: &str,
) -> Option<ElementRef<'a>> {
    let mut past_anchor = false;
    for node in doc.root_element().descendants() {
        if node.id() == from.id() {
            past_anchor = true;
            continue;
        }
        if !past_anchor {
            continue;
        }
        if let Some(el) = ElementRef::wrap(node) {
            if el.value().name() == name {
                return Some(el);
            }
        }
    }
    None
}

pub(crate) fn text_of(el: &ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}
