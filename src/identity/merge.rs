//! Field level merge rules shared by entity merges and document matching.

use crate::catalog_store::Item;
use crate::document::{is_empty_value, union_localized, NormalizedDocument};
use serde_json::{Map, Value};

/// Copies each of the kind's copy fields from `source` when `target` has no
/// value for it. Returns the names of the fields copied.
pub fn copy_missing_fields(target: &mut Item, source: &Value) -> Vec<&'static str> {
    let mut copied = Vec::new();
    if !target.metadata.is_object() {
        target.metadata = Value::Object(Map::new());
    }
    let Some(fields) = target.metadata.as_object_mut() else {
        return copied;
    };
    for field in target.kind.copy_fields() {
        let Some(value) = source.get(*field).filter(|v| !is_empty_value(v)) else {
            continue;
        };
        if fields.get(*field).map_or(true, is_empty_value) {
            fields.insert((*field).to_string(), value.clone());
            copied.push(*field);
        }
    }
    copied
}

/// Merges `source` into `target`: copy fields fill gaps, localized texts are
/// unioned, header values fill gaps.
pub fn merge_items(source: &Item, target: &mut Item) {
    copy_missing_fields(target, &source.metadata);
    union_localized(&mut target.localized_title, &source.localized_title);
    union_localized(&mut target.localized_description, &source.localized_description);
    if target.cover_image_url.is_none() {
        target.cover_image_url = source.cover_image_url.clone();
    }
    if target.primary_lookup_id.is_none() {
        target.primary_lookup_id = source.primary_lookup_id.clone();
    }
    if target.title.trim().is_empty() {
        target.title = source.title.clone();
    }
}

/// Folds a freshly scraped document into the item it matched.
pub fn absorb_document(target: &mut Item, document: &NormalizedDocument) {
    let header = &document.header;
    copy_missing_fields(target, &document.details.fields_json());
    union_localized(&mut target.localized_title, &header.localized_title);
    union_localized(&mut target.localized_description, &header.localized_description);
    if target.cover_image_url.is_none() {
        target.cover_image_url = header.cover_image_url.clone();
    }
}
