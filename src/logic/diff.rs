use crate::model::Document;
use serde_json::{json, Map, Value};

/// Normalizing strip applied before any comparison: binary attachment
/// payloads are replaced by a stub sentinel (content type retained),
/// attachment metadata loses its freshness stamp, and the document-level
/// `created_at`, `last_modified_at` and `errors` fields are removed entirely.
/// What remains is the part of a document a human would call "its content".
pub fn stripped(doc: &Document) -> Value {
    // Document is plain data with string keys; serialization cannot fail.
    let mut value = serde_json::to_value(doc).unwrap_or(Value::Null);

    if let Some(metadata) = value.get_mut("metadata_").and_then(Value::as_object_mut) {
        metadata.remove("created_at");
        metadata.remove("last_modified_at");
        metadata.remove("errors");
        if let Some(attachments) = metadata.get_mut("attachments").and_then(Value::as_object_mut) {
            for entry in attachments.values_mut() {
                if let Some(entry) = entry.as_object_mut() {
                    entry.remove("updated_at");
                }
            }
        }
    }

    if let Some(blobs) = value.get_mut("attachments_").and_then(Value::as_object_mut) {
        for entry in blobs.values_mut() {
            let content_type = entry
                .get("content_type")
                .cloned()
                .unwrap_or(Value::Null);
            *entry = json!({"content_type": content_type, "stub": true});
        }
    }

    value
}

/// Deep structural equality of the stripped forms. Answers "is there anything
/// to save": two snapshots that differ only in timestamps, error state or
/// attachment payload bytes compare equal.
pub fn is_equal(a: &Document, b: &Document) -> bool {
    stripped(a) == stripped(b)
}

/// What specifically changed, as a partial object: walks `a`'s stripped keys
/// and records every key whose value disagrees with `b`'s, recursing where
/// both sides are plain objects. Arrays are treated as opaque values — a
/// changed element reports the whole array verbatim. Subtrees missing from
/// either side are tolerated.
pub fn difference(a: &Document, b: &Document) -> Map<String, Value> {
    let a = stripped(a);
    let b = stripped(b);
    match (a, b) {
        (Value::Object(a), Value::Object(b)) => diff_objects(&a, &b),
        _ => Map::new(),
    }
}

fn diff_objects(a: &Map<String, Value>, b: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, a_value) in a {
        let b_value = b.get(key).unwrap_or(&Value::Null);
        if a_value == b_value {
            continue;
        }
        match (a_value, b_value) {
            (Value::Object(a_child), Value::Object(b_child)) => {
                let nested = diff_objects(a_child, b_child);
                if !nested.is_empty() {
                    out.insert(key.clone(), Value::Object(nested));
                }
            }
            _ => {
                out.insert(key.clone(), a_value.clone());
            }
        }
    }
    out
}
