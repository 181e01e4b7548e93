//! DOM helpers over static HTML
//!
//! These functions answer the typed [`Script`](super::Script) requests on an
//! already-fetched HTML document. They back the static renderer and the proxy
//! relay path, which both receive raw HTML instead of a live page.

use crate::render::SelectorSpec;
use scraper::{Html, Node, Selector};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use url::Url;

/// Elements whose text is never visible
const INVISIBLE_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "head"];

/// Runs every selector spec against `html`
///
/// Each field resolves to a string (first non-empty match), an array of strings
/// (`multiple`), or `null` when nothing matched or the selector is invalid.
///
/// # Example
///
/// ```
/// use std::collections::BTreeMap;
/// use sumi_harvest::render::{dom::select_fields, SelectorSpec};
///
/// let html = r#"<div><span class="rate"> 17.25 </span></div>"#;
/// let mut fields = BTreeMap::new();
/// fields.insert("rate".to_string(), SelectorSpec::text(".rate"));
/// let data = select_fields(html, &fields);
/// assert_eq!(data["rate"], "17.25");
/// ```
pub fn select_fields(html: &str, fields: &BTreeMap<String, SelectorSpec>) -> Map<String, Value> {
    let document = Html::parse_document(html);
    let mut data = Map::new();

    for (name, spec) in fields {
        let value = match Selector::parse(&spec.selector) {
            Ok(selector) => {
                let values: Vec<String> = document
                    .select(&selector)
                    .filter_map(|element| match &spec.attribute {
                        Some(attr) => element.value().attr(attr).map(collapse_whitespace),
                        None => Some(collapse_whitespace(&element.text().collect::<String>())),
                    })
                    .filter(|v| !v.is_empty())
                    .collect();

                if values.is_empty() {
                    Value::Null
                } else if spec.multiple {
                    Value::Array(values.into_iter().map(Value::String).collect())
                } else {
                    Value::String(values[0].clone())
                }
            }
            Err(e) => {
                tracing::debug!("Invalid selector '{}' for field {}: {:?}", spec.selector, name, e);
                Value::Null
            }
        };
        data.insert(name.clone(), value);
    }

    data
}

/// Collects all followable links on the page as absolute URLs
///
/// Skips `download` anchors, `javascript:`/`mailto:`/`tel:`/`data:` hrefs and
/// fragment-only links. Fragments are stripped and duplicates removed while
/// keeping document order.
pub fn collect_links(html: &str, base_url: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    if let Ok(selector) = Selector::parse("a[href]") {
        for element in document.select(&selector) {
            if element.value().attr("download").is_some() {
                continue;
            }
            if let Some(link) = element
                .value()
                .attr("href")
                .and_then(|href| resolve_link(href, base_url))
            {
                if seen.insert(link.clone()) {
                    links.push(link);
                }
            }
        }
    }

    links
}

/// Extracts the visible text of the page, whitespace-collapsed and capped
pub fn visible_text(html: &str, max_chars: usize) -> String {
    let document = Html::parse_document(html);
    let mut parts: Vec<&str> = Vec::new();

    for node in document.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .map(|e| INVISIBLE_ELEMENTS.contains(&e.name()))
                .unwrap_or(false)
        });
        if !hidden {
            parts.push(&**text);
        }
    }

    let text = collapse_whitespace(&parts.join(" "));
    text.chars().take(max_chars).collect()
}

fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let mut absolute = base_url.join(href).ok()?;
    if absolute.scheme() != "http" && absolute.scheme() != "https" {
        return None;
    }
    absolute.set_fragment(None);
    Some(absolute.to_string())
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
