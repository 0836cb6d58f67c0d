//! Extraction helpers shared by the HTML scrapers.

use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Trimmed value of `attr` on the first element matching `css`, if non-blank.
pub fn attr(html: &Html, css: &str, attr: &str) -> Option<String> {
    let sel = selector(css)?;
    html.select(&sel)
        .filter_map(|e| e.value().attr(attr))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

/// `content` of the first `<meta property=..>` or `<meta name=..>` with the
/// given key.
pub fn meta(html: &Html, key: &str) -> Option<String> {
    attr(html, &format!("meta[property=\"{key}\"]"), "content")
        .or_else(|| attr(html, &format!("meta[name=\"{key}\"]"), "content"))
}

pub fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whitespace-normalized text of the first element matching `css`.
pub fn text(html: &Html, css: &str) -> Option<String> {
    let sel = selector(css)?;
    html.select(&sel)
        .map(|e| element_text(&e))
        .find(|t| !t.is_empty())
}

pub fn texts(html: &Html, css: &str) -> Vec<String> {
    let Some(sel) = selector(css) else {
        return Vec::new();
    };
    html.select(&sel)
        .map(|e| element_text(&e))
        .filter(|t| !t.is_empty())
        .collect()
}

/// Raw script body of the first element matching `css`.
pub fn script(html: &Html, css: &str) -> Option<String> {
    let sel = selector(css)?;
    html.select(&sel)
        .map(|e| e.text().collect::<String>())
        .find(|t| !t.trim().is_empty())
}

/// Every JSON-LD object on the page. Top-level arrays and `@graph` lists are
/// flattened; unparsable blocks are skipped.
pub fn json_ld_objects(html: &Html) -> Vec<Value> {
    let Some(sel) = selector("script[type=\"application/ld+json\"]") else {
        return Vec::new();
    };
    let mut objects = Vec::new();
    for script in html.select(&sel) {
        let body = script.text().collect::<String>();
        let Ok(value) = serde_json::from_str::<Value>(body.trim()) else {
            continue;
        };
        match value {
            Value::Array(items) => objects.extend(items.into_iter().filter(Value::is_object)),
            Value::Object(map) => match map.get("@graph") {
                Some(Value::Array(items)) => {
                    objects.extend(items.iter().filter(|i| i.is_object()).cloned())
                }
                _ => objects.push(Value::Object(map)),
            },
            _ => {}
        }
    }
    objects
}

/// `@type` of a JSON-LD object, lower-cased, whether given as a string or list.
pub fn json_ld_types(object: &Value) -> Vec<String> {
    match object.get("@type").or_else(|| object.get("type")) {
        Some(Value::String(t)) => vec![t.to_lowercase()],
        Some(Value::Array(ts)) => ts
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_lowercase)
            .collect(),
        _ => Vec::new(),
    }
}

/// Names from a JSON-LD person field: a string, an object with `name`, or a
/// list of either.
pub fn json_ld_names(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        Some(Value::Object(o)) => o
            .get("name")
            .and_then(Value::as_str)
            .map(|n| vec![n.to_string()])
            .unwrap_or_default(),
        Some(Value::Array(items)) => items
            .iter()
            .flat_map(|i| json_ld_names(Some(i)))
            .collect(),
        _ => Vec::new(),
    }
}

/// Keeps the first occurrence of every non-blank value.
pub fn uniq(values: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = Vec::new();
    for value in values {
        if !value.is_empty() && !seen.contains(&value) {
            seen.push(value);
        }
    }
    seen
}
