use serde_json::{Map, Value};
use thiserror::Error;

/// Errors from the deep-path primitives. Both indicate the caller handed in an
/// inconsistent path/document pair and should propagate, not be swallowed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("invalid path '{0}'")]
    InvalidPath(String),
    #[error("type mismatch at segment '{segment}' of '{path}': cannot index into {found}")]
    TypeMismatch {
        path: String,
        segment: String,
        found: &'static str,
    },
}

/// One parsed path segment. Paths are parsed exactly once, here; the rest of
/// the engine works on the tagged form instead of re-splitting strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl Segment {
    fn describe(&self) -> String {
        match self {
            Segment::Key(k) => k.clone(),
            Segment::Index(i) => i.to_string(),
        }
    }
}

/// Split a dot-delimited path into segments. A segment that parses as a
/// non-negative integer addresses an array index, anything else an object key.
pub fn parse_path(path: &str) -> Result<Vec<Segment>, PathError> {
    if path.is_empty() {
        return Err(PathError::InvalidPath("(empty)".to_string()));
    }
    path.split('.')
        .map(|segment| {
            if segment.is_empty() {
                Err(PathError::InvalidPath(path.to_string()))
            } else if let Ok(index) = segment.parse::<usize>() {
                Ok(Segment::Index(index))
            } else {
                Ok(Segment::Key(segment.to_string()))
            }
        })
        .collect()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Read the value at `path`, if present. Missing intermediate nodes and
/// container/segment mismatches both read as absent; only a malformed path is
/// an error.
pub fn get<'a>(root: &'a Value, path: &str) -> Result<Option<&'a Value>, PathError> {
    let segments = parse_path(path)?;
    let mut node = root;
    for segment in &segments {
        node = match (segment, node) {
            (Segment::Key(key), Value::Object(map)) => match map.get(key) {
                Some(child) => child,
                None => return Ok(None),
            },
            (Segment::Index(index), Value::Array(items)) => match items.get(*index) {
                Some(child) => child,
                None => return Ok(None),
            },
            // Pre-migration documents key repeated groups by strings, which
            // may be digit strings; mirror the write side and read the
            // decimal key.
            (Segment::Index(index), Value::Object(map)) => match map.get(&index.to_string()) {
                Some(child) => child,
                None => return Ok(None),
            },
            _ => return Ok(None),
        };
    }
    Ok(Some(node))
}

/// Place `value` at `path`, returning a new root. The input root is never
/// mutated: the returned value shares nothing with it (full clone), so a
/// caller mutating the result can never affect the original snapshot.
///
/// Missing containers are created on demand — an array when the next segment
/// is numeric, an object otherwise. Writing past the end of an array extends
/// it with explicit `null` gap markers without renumbering existing indices.
pub fn set(root: &Value, path: &str, value: Value) -> Result<Value, PathError> {
    let segments = parse_path(path)?;
    let mut next = root.clone();
    set_at(&mut next, &segments, value, path)?;
    Ok(next)
}

fn set_at(node: &mut Value, segments: &[Segment], value: Value, full: &str) -> Result<(), PathError> {
    let (segment, rest) = match segments.split_first() {
        Some(split) => split,
        None => {
            *node = value;
            return Ok(());
        }
    };

    // Null counts as missing: materialize the container this segment needs.
    if node.is_null() {
        *node = match segment {
            Segment::Key(_) => Value::Object(Map::new()),
            Segment::Index(_) => Value::Array(Vec::new()),
        };
    }

    match (segment, &mut *node) {
        (Segment::Key(key), Value::Object(map)) => {
            let child = map.entry(key.clone()).or_insert(Value::Null);
            set_at(child, rest, value, full)
        }
        (Segment::Index(index), Value::Array(items)) => {
            if *index >= items.len() {
                items.resize(*index + 1, Value::Null);
            }
            set_at(&mut items[*index], rest, value, full)
        }
        // A numeric segment meeting an existing object addresses the decimal
        // string key rather than forcing an array.
        (Segment::Index(index), Value::Object(map)) => {
            let child = map.entry(index.to_string()).or_insert(Value::Null);
            set_at(child, rest, value, full)
        }
        (_, found) => Err(PathError::TypeMismatch {
            path: full.to_string(),
            segment: segment.describe(),
            found: kind_of(found),
        }),
    }
}
