//! Fingerprints — SHA-256 digests over canonicalized desired content.
//!
//! ## Raw manifests
//!
//! 1. Clone the document.
//! 2. Strip the fingerprint annotation and the managed label, then drop
//!    `annotations`/`labels` when null or empty, so a document that was
//!    already annotated hashes like its pristine form.
//! 3. Serialize with sorted keys and hash.
//!
//! [`annotate`] then writes the digest and the managed label onto the body.
//!
//! ## Release values
//!
//! Clone, treat `null` as `{}`, drop the top-level managed key, serialize with
//! sorted keys, hash.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::keys::{FINGERPRINT_ANNOTATION, MANAGED_LABEL, MANAGED_LABEL_VALUE, RELEASE_MANAGED_KEY};

/// Hex SHA-256 of the canonical serialization of `value`.
pub fn digest(value: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(value, &mut canonical);

    let mut h = Sha256::new();
    h.update(canonical.as_bytes());
    hex::encode(h.finalize())
}

/// Fingerprint of a raw manifest document, ignoring any injected markers.
pub fn raw_fingerprint(document: &Value) -> String {
    let mut stripped = document.clone();
    strip_markers(&mut stripped);
    digest(&stripped)
}

/// Fingerprint of a release values document, ignoring the managed key.
pub fn values_fingerprint(values: &Value) -> String {
    let mut values = match values {
        Value::Null => Value::Object(Map::new()),
        other => other.clone(),
    };
    if let Value::Object(map) = &mut values {
        map.remove(RELEASE_MANAGED_KEY);
    }
    digest(&values)
}

/// Record `fingerprint` and the managed label on `document` in place.
///
/// Creates `metadata`, `metadata.annotations` and `metadata.labels` when
/// absent. Non-mapping documents are left untouched.
pub fn annotate(document: &mut Value, fingerprint: &str) {
    let Value::Object(root) = document else { return };
    let metadata = ensure_object(root, "metadata");
    ensure_object(metadata, "annotations").insert(
        FINGERPRINT_ANNOTATION.to_string(),
        Value::String(fingerprint.to_string()),
    );
    ensure_object(metadata, "labels").insert(
        MANAGED_LABEL.to_string(),
        Value::String(MANAGED_LABEL_VALUE.to_string()),
    );
}

/// The fingerprint annotation recorded on a (live or desired) document.
pub fn recorded_fingerprint(document: &Value) -> Option<&str> {
    document
        .get("metadata")?
        .get("annotations")?
        .get(FINGERPRINT_ANNOTATION)?
        .as_str()
}

/// `true` when `document` carries the managed label with the expected value.
pub fn is_managed(document: &Value) -> bool {
    document
        .get("metadata")
        .and_then(|m| m.get("labels"))
        .and_then(|l| l.get(MANAGED_LABEL))
        .and_then(Value::as_str)
        == Some(MANAGED_LABEL_VALUE)
}

/// `true` when a release values document carries `{k8s-gitsync: {managed: true}}`.
pub fn is_managed_release(values: &Value) -> bool {
    values
        .get(RELEASE_MANAGED_KEY)
        .and_then(|m| m.get("managed"))
        .and_then(Value::as_bool)
        == Some(true)
}

/// Return `values` (null treated as `{}`) with the release managed key set.
pub fn mark_release_values(values: &Value) -> Value {
    let mut map = match values {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    let mut marker = Map::new();
    marker.insert("managed".to_string(), Value::Bool(true));
    map.insert(RELEASE_MANAGED_KEY.to_string(), Value::Object(marker));
    Value::Object(map)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

// Drops both markers, then treats a null or empty `annotations`/`labels`
// map as absent, so `{}`, `~` and a missing map all hash alike.
fn strip_markers(document: &mut Value) {
    let Some(metadata) = document.get_mut("metadata").and_then(Value::as_object_mut) else {
        return;
    };
    for (field, key) in [("annotations", FINGERPRINT_ANNOTATION), ("labels", MANAGED_LABEL)] {
        if let Some(map) = metadata.get_mut(field).and_then(Value::as_object_mut) {
            map.remove(key);
        }
        let vacant = match metadata.get(field) {
            Some(Value::Null) => true,
            Some(Value::Object(map)) => map.is_empty(),
            _ => false,
        };
        if vacant {
            metadata.remove(field);
        }
    }
}

fn ensure_object<'a>(map: &'a mut Map<String, Value>, key: &str) -> &'a mut Map<String, Value> {
    let slot = map.entry(key.to_string()).or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(inner) => inner,
        _ => unreachable!("slot was just replaced with an object"),
    }
}

// Sorted-key JSON. Independent of whether serde_json preserves insertion order.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
