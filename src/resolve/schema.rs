//! Direct-API payload normalization and quality-tier selection.
//!
//! Providers answer the direct-link endpoint with one of two shapes:
//!
//! ```json
//! {"result":    {"versions":  [{"name": "h", "url": "..."}]}}
//! {"resultado": {"versiones": [{"name": "h", "url": "..."}]}}
//! ```
//!
//! Both spellings are accepted at each level independently, English first.
//! Everything downstream only ever sees `Vec<QualityVariant>`.

use serde_json::Value;

use super::types::QualityVariant;

const CONTAINER_KEYS: [&str; 2] = ["result", "resultado"];
const LIST_KEYS: [&str; 2] = ["versions", "versiones"];

/// Preferred tiers, best first. Anything else ranks after these.
const PREFERRED_TIERS: [&str; 2] = ["h", "n"];

/// Normalize a provider payload into its quality variants, in provider order.
///
/// A payload with neither container, or with an empty list, yields an
/// empty vec. Entries without a non-empty `url` string are dropped.
pub fn normalize(payload: &Value) -> Vec<QualityVariant> {
    let Some(container) = first_present(payload, &CONTAINER_KEYS) else {
        return Vec::new();
    };
    let Some(list) = first_present(container, &LIST_KEYS).and_then(Value::as_array) else {
        return Vec::new();
    };

    list.iter().filter_map(parse_variant).collect()
}

/// Pick the variant to play: `"h"`, else `"n"`, else the first one.
pub fn select_variant(variants: &[QualityVariant]) -> Option<&QualityVariant> {
    PREFERRED_TIERS
        .iter()
        .find_map(|tier| variants.iter().find(|v| v.name == *tier))
        .or_else(|| variants.first())
}

fn first_present<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| value.get(key))
        .find(|v| !v.is_null())
}

fn parse_variant(item: &Value) -> Option<QualityVariant> {
    let url = item
        .get("url")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|u| !u.is_empty())?;

    let name = item
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default();

    Some(QualityVariant {
        name: name.to_string(),
        url: url.to_string(),
    })
}
