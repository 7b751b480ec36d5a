use bytes::Bytes;
use indexmap::IndexMap;
use switchyard_core::{DispatchError, Value};

use super::{body_text, ContentTypeEncoder};

/// `application/x-www-form-urlencoded` bodies with bracketed nesting
/// (`user[name]=Ann&tags[]=a&tags[]=b`).
#[derive(Debug, Clone, Copy, Default)]
pub struct FormUrlEncoder;

impl ContentTypeEncoder for FormUrlEncoder {
    fn content_type(&self) -> &str {
        "application/x-www-form-urlencoded"
    }

    fn decode(&self, body: Value) -> Result<Value, DispatchError> {
        match body_text(body) {
            Ok(text) if text.trim().is_empty() => Ok(Value::Null),
            Ok(text) => Ok(Value::Map(decode_query(text.as_bytes()))),
            Err(structured) => Ok(structured),
        }
    }

    fn encode(&self, value: &Value) -> Result<Bytes, DispatchError> {
        Ok(Bytes::from(encode_body(value)))
    }
}

pub(super) fn encode_body(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Map(_) | Value::Array(_) => encode_query(value),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Parses a query string into nested fields.
///
/// `a[b]=1` nests a mapping, `a[]=1` appends to a list, and later keys
/// overwrite earlier ones. Values are always strings.
#[must_use]
pub fn decode_query(input: &[u8]) -> IndexMap<String, Value> {
    let mut root = Value::Map(IndexMap::new());
    for (key, value) in form_urlencoded::parse(input) {
        let segments = key_segments(&key);
        if matches!(segments.first(), None | Some(&"")) {
            continue;
        }
        insert_nested(&mut root, &segments, Value::String(value.into_owned()));
    }
    match root {
        Value::Map(fields) => fields,
        _ => IndexMap::new(),
    }
}

/// Splits `a[b][]` into `["a", "b", ""]`. Keys with unbalanced brackets are
/// taken literally.
fn key_segments(key: &str) -> Vec<&str> {
    let Some(open) = key.find('[') else {
        return vec![key];
    };
    let mut segments = vec![&key[..open]];
    let mut rest = &key[open..];
    while let Some(stripped) = rest.strip_prefix('[') {
        let Some(close) = stripped.find(']') else {
            return vec![key];
        };
        segments.push(&stripped[..close]);
        rest = &stripped[close + 1..];
    }
    if rest.is_empty() {
        segments
    } else {
        vec![key]
    }
}

fn insert_nested(container: &mut Value, segments: &[&str], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *container = value;
        return;
    };
    if first.is_empty() {
        if !matches!(container, Value::Array(_)) {
            *container = Value::Array(Vec::new());
        }
        if let Value::Array(items) = container {
            items.push(Value::Null);
            if let Some(slot) = items.last_mut() {
                insert_nested(slot, rest, value);
            }
        }
    } else {
        if !matches!(container, Value::Map(_)) {
            *container = Value::Map(IndexMap::new());
        }
        if let Value::Map(fields) = container {
            let slot = fields.entry((*first).to_string()).or_insert(Value::Null);
            insert_nested(slot, rest, value);
        }
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Serializes nested fields as a query string, skipping nulls.
///
/// Lists use numeric indexes (`tags[0]=a`) and booleans render as `1`/`0`.
#[must_use]
pub fn encode_query(value: &Value) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    match value {
        Value::Map(fields) => {
            for (name, field) in fields {
                append_pairs(&mut serializer, name, field);
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                append_pairs(&mut serializer, &index.to_string(), item);
            }
        }
        _ => {}
    }
    serializer.finish()
}

fn append_pairs(serializer: &mut form_urlencoded::Serializer<'_, String>, key: &str, value: &Value) {
    match value {
        Value::Null => {}
        Value::Bool(flag) => {
            serializer.append_pair(key, if *flag { "1" } else { "0" });
        }
        Value::Map(fields) => {
            for (name, field) in fields {
                append_pairs(serializer, &format!("{key}[{name}]"), field);
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                append_pairs(serializer, &format!("{key}[{index}]"), item);
            }
        }
        Value::Object(object) => {
            for (name, field) in object.fields() {
                append_pairs(serializer, &format!("{key}[{name}]"), field);
            }
        }
        other => {
            serializer.append_pair(key, &other.to_string());
        }
    }
}
