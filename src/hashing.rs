//! Hashing System - SHA-256 fingerprints
//!
//! Deterministic digests of selections and catalogs so a saved design can be
//! matched against the catalog it was built from.

use serde::Serialize;
use serde_json::{to_string, Value};
use sha2::{Digest, Sha256};

use crate::catalog::CatalogData;
use crate::selection::SelectionState;

/// Compute SHA-256 hash of bytes, return hex string
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Convert to canonical JSON (sorted keys, no whitespace)
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let v: Value = serde_json::to_value(value)?;
    to_string(&sort_value(&v))
}

fn sort_value(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut sorted: Vec<_> = map.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                sorted
                    .into_iter()
                    .map(|(k, v)| (k.clone(), sort_value(v)))
                    .collect(),
            )
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_value).collect()),
        _ => v.clone(),
    }
}

/// Fingerprint of a selection. Empty sets do not contribute, and option
/// order inside a set does not matter.
pub fn selection_fingerprint(selection: &SelectionState) -> Result<String, serde_json::Error> {
    let normalized: Vec<(u64, Vec<u64>)> = selection
        .sets()
        .filter(|(_, ids)| !ids.is_empty())
        .map(|(set, ids)| {
            let mut ids: Vec<u64> = ids.iter().map(|id| id.0).collect();
            ids.sort_unstable();
            (set.0, ids)
        })
        .collect();
    let canonical = canonical_json(&normalized)?;
    Ok(sha256_hex(canonical.as_bytes()))
}

/// catalog_hash = sha256(canonical catalog document + engine_version)
pub fn catalog_fingerprint(
    data: &CatalogData,
    engine_version: &str,
) -> Result<String, serde_json::Error> {
    let canonical = canonical_json(data)?;
    Ok(sha256_hex(format!("{}:{}", canonical, engine_version).as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{OptionId, OptionSetId};
    use serde_json::json;

    #[test]
    fn test_canonical_json_sorted() {
        let obj = json!({"z": 1, "a": {"y": 2, "b": 3}});
        let canonical = canonical_json(&obj).unwrap();
        assert_eq!(canonical, r#"{"a":{"b":3,"y":2},"z":1}"#);
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_selection_fingerprint_ignores_order_and_empty_sets() {
        let mut a = SelectionState::new();
        a.append(OptionSetId(2), OptionId(21));
        a.append(OptionSetId(2), OptionId(20));
        a.replace(OptionSetId(1), OptionId(10));

        let mut b = SelectionState::new();
        b.replace(OptionSetId(1), OptionId(10));
        b.append(OptionSetId(2), OptionId(20));
        b.append(OptionSetId(2), OptionId(21));
        b.append(OptionSetId(5), OptionId(50));
        b.clear_set(OptionSetId(5));

        assert_eq!(
            selection_fingerprint(&a).unwrap(),
            selection_fingerprint(&b).unwrap()
        );

        b.replace(OptionSetId(1), OptionId(11));
        assert_ne!(
            selection_fingerprint(&a).unwrap(),
            selection_fingerprint(&b).unwrap()
        );
    }

    #[test]
    fn test_catalog_fingerprint_tracks_engine_version() {
        let data = CatalogData::default();
        let h1 = catalog_fingerprint(&data, "1.0.0").unwrap();
        let h2 = catalog_fingerprint(&data, "1.0.0").unwrap();
        let h3 = catalog_fingerprint(&data, "1.1.0").unwrap();
        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
    }
}
