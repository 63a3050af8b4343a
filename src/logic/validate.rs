use crate::logic::path;
use crate::model::Document;
use anyhow::Result;
use serde_json::Value;

/// Which bag of the document a field edit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldScope {
    Data,
    Metadata,
}

impl FieldScope {
    fn prefix(&self) -> &'static str {
        match self {
            FieldScope::Data => "data_",
            FieldScope::Metadata => "metadata_",
        }
    }
}

/// Apply one field edit: write the validation errors at the mirrored path
/// under `metadata_.errors`, write the value at the target path, and refresh
/// `last_modified_at` — as a single logical step. The input document is never
/// mutated; on any failure the error propagates and no partial update can be
/// observed.
pub fn apply_field_update(
    doc: &Document,
    scope: FieldScope,
    field_path: &str,
    value: Value,
    errors: Vec<String>,
) -> Result<Document> {
    let mut next = doc.clone();
    let error_list = Value::Array(errors.into_iter().map(Value::String).collect());
    let mirror_path = format!("{}.{}", scope.prefix(), field_path);

    match scope {
        FieldScope::Data => {
            next.metadata_.errors = path::set(&next.metadata_.errors, &mirror_path, error_list)?;
            next.data_ = path::set(&next.data_, field_path, value)?;
        }
        FieldScope::Metadata => {
            // Round-trip through JSON so typed fields and free-form extras are
            // addressable by the same paths.
            let mut meta = serde_json::to_value(&next.metadata_)?;
            meta = path::set(&meta, &format!("errors.{}", mirror_path), error_list)?;
            meta = path::set(&meta, field_path, value)?;
            next.metadata_ = serde_json::from_value(meta)?;
        }
    }

    next.touch();
    Ok(next)
}

/// Walk the shadow error tree and report whether any field currently has
/// validation errors. True iff some node is a non-empty array whose elements
/// are all strings (a leaf error list), or a non-empty array containing a
/// container that itself has errors (repeated sub-records). Objects are
/// recursed unconditionally.
///
/// A non-array, non-object, non-string leaf inside the tree is outside the
/// maintained shape; it reads as "no errors" here rather than panicking.
pub fn has_errors(doc: &Document) -> bool {
    node_has_errors(&doc.metadata_.errors)
}

fn node_has_errors(node: &Value) -> bool {
    match node {
        Value::Object(map) => map.values().any(node_has_errors),
        Value::Array(items) => {
            if items.is_empty() {
                return false;
            }
            if items.iter().all(Value::is_string) {
                return true;
            }
            items
                .iter()
                .filter(|item| item.is_object() || item.is_array())
                .any(node_has_errors)
        }
        _ => false,
    }
}
