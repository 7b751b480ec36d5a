use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, SecondsFormat};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Generic runtime value flowing through the dispatch pipeline.
///
/// The same type carries raw request data (path captures, query strings,
/// decoded bodies), converted call arguments, service results, and the
/// wire-safe structures handed to encoders. Request-side data only ever uses
/// the JSON-compatible variants plus `Bytes` and `File`; `Date` and `Object`
/// appear once values have been coerced against their declared types.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Explicit null.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// 64-bit IEEE 754 floating point.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Raw bytes, typically an undecoded request or encoded response body.
    Bytes(Vec<u8>),
    /// Date/time with a fixed UTC offset.
    Date(DateTime<FixedOffset>),
    /// List-like value: ordered sequence of values.
    Array(Vec<Value>),
    /// Composite structure: ordered map of string keys to values.
    Map(IndexMap<String, Value>),
    /// Instance of a declared composite type.
    Object(Object),
    /// Uploaded file handed over by the host.
    File(UploadedFile),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns `true` for list-like values.
    #[must_use]
    pub fn is_list(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    /// Returns the string slice for [`Value::String`].
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the map for [`Value::Map`].
    #[must_use]
    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the composite instance for [`Value::Object`].
    #[must_use]
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Short name of the variant, used in diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Date(_) => "date",
            Self::Array(_) => "array",
            Self::Map(_) => "map",
            Self::Object(_) => "object",
            Self::File(_) => "file",
        }
    }

    /// Builds a value from a parsed JSON document.
    ///
    /// Integers that fit in `i64` become [`Value::Int`]; every other number
    /// becomes [`Value::Float`].
    #[must_use]
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => Self::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Renders the value as a JSON document.
    ///
    /// Dates use RFC 3339, raw bytes are rendered as lossy UTF-8, composite
    /// instances become objects of their set fields, and files become an
    /// object describing the upload. Non-finite floats render as null.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Bytes(bytes) => {
                serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned())
            }
            Self::Date(date) => {
                serde_json::Value::String(date.to_rfc3339_opts(SecondsFormat::AutoSi, false))
            }
            Self::Array(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Self::Object(object) => serde_json::Value::Object(
                object
                    .fields()
                    .map(|(k, v)| (k.to_string(), v.to_json()))
                    .collect(),
            ),
            Self::File(file) => serde_json::json!({
                "name": file.name,
                "type": file.content_type,
                "size": file.size,
                "error": file.error,
            }),
        }
    }

    /// Loose equality used for enum membership: numbers compare by value
    /// across `Int`, `Float` and numeric strings; everything else compares
    /// structurally.
    #[must_use]
    pub fn loosely_equals(&self, other: &Value) -> bool {
        match (self.as_number(), other.as_number()) {
            (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
            _ => self == other,
        }
    }

    /// Numeric view of the value: ints, floats, and strings that parse as numbers.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::String(s) if is_numeric(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Returns `true` when `s` looks like a decimal number: optional surrounding
/// whitespace, optional sign, digits with an optional fraction and exponent.
#[must_use]
pub fn is_numeric(s: &str) -> bool {
    let trimmed = s.trim();
    !trimmed.is_empty()
        && trimmed.chars().any(|c| c.is_ascii_digit())
        && trimmed
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
        && trimmed.parse::<f64>().is_ok()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Self::from_json)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(date: DateTime<FixedOffset>) -> Self {
        Self::Date(date)
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Self::Object(object)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Array(items)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(map: IndexMap<String, Value>) -> Self {
        Self::Map(map)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

// ---------------------------------------------------------------------------
// Object
// ---------------------------------------------------------------------------

/// Instance of a declared composite type.
///
/// Only fields that have been set are stored. A field that was never set is
/// absent, which is distinct from a field explicitly set to [`Value::Null`].
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    type_name: String,
    fields: IndexMap<String, Value>,
}

impl Object {
    /// Creates an instance of `type_name` with no fields set.
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: IndexMap::new(),
        }
    }

    /// Builder-style [`Object::set`].
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Identity of the composite type this instance belongs to.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns the field value if it has been set (possibly to null).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Sets a field, keeping its original position when overwritten.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Removes a field, returning it to the unset state.
    pub fn unset(&mut self, name: &str) -> Option<Value> {
        self.fields.shift_remove(name)
    }

    /// Whether the field has been set (to any value, including null).
    #[must_use]
    pub fn is_set(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Iterates set fields in assignment order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

// ---------------------------------------------------------------------------
// UploadedFile
// ---------------------------------------------------------------------------

/// A file uploaded with the request and stored by the host in a temporary location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    /// Original client-side file name.
    pub name: String,
    /// MIME type declared by the client.
    pub content_type: String,
    /// Where the host stored the upload.
    pub temp_path: PathBuf,
    /// Host-specific upload error code; 0 means success.
    pub error: u32,
    /// Size in bytes.
    pub size: u64,
}

impl UploadedFile {
    /// Moves the upload into `directory`, keeping the original name unless
    /// `new_name` is given. Returns the final path.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when neither renaming nor copying the temporary
    /// file succeeds.
    pub fn move_to(&self, directory: &Path, new_name: Option<&str>) -> std::io::Result<PathBuf> {
        let target = directory.join(new_name.unwrap_or(&self.name));
        if std::fs::rename(&self.temp_path, &target).is_err() {
            // Cross-device moves cannot rename.
            std::fs::copy(&self.temp_path, &target)?;
            std::fs::remove_file(&self.temp_path)?;
        }
        Ok(target)
    }
}
