use std::fmt::Write as _;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};

use crate::descriptor::ScalarKind;
use crate::types::{is_numeric, Value};

/// Textual boolean representations accepted by the `bool` coercion.
const BOOLEAN_TABLE: [(&str, bool); 8] = [
    ("1", true),
    ("0", false),
    ("true", true),
    ("false", false),
    ("on", true),
    ("off", false),
    ("yes", true),
    ("no", false),
];

/// Coerces raw request values into scalar kinds.
///
/// Every coercion returns `None` when the value cannot be represented in the
/// target kind; callers decide whether that is an error.
#[derive(Debug, Clone)]
pub struct ScalarConverter<'a> {
    date_format: &'a str,
}

impl<'a> ScalarConverter<'a> {
    #[must_use]
    pub fn new(date_format: &'a str) -> Self {
        Self { date_format }
    }

    #[must_use]
    pub fn convert(&self, value: &Value, kind: ScalarKind) -> Option<Value> {
        match kind {
            ScalarKind::String => self.to_string(value).map(Value::String),
            ScalarKind::Bool => self.to_bool(value).map(Value::Bool),
            ScalarKind::Int | ScalarKind::Long => to_int(value).map(Value::Int),
            ScalarKind::Float | ScalarKind::Real | ScalarKind::Double | ScalarKind::Numeric => {
                to_real(value).map(Value::Float)
            }
            ScalarKind::DateTime => self.to_date(value).map(Value::Date),
        }
    }

    /// Booleans render as `"true"`/`"false"`; collections have no string form.
    #[must_use]
    pub fn to_string(&self, value: &Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Date(date) => Some(self.date_to_string(date)),
            Value::Bytes(bytes) => String::from_utf8(bytes.clone()).ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_bool(&self, value: &Value) -> Option<bool> {
        if let Value::Bool(b) = value {
            return Some(*b);
        }
        let key = self.to_string(value)?.to_lowercase();
        BOOLEAN_TABLE
            .iter()
            .find(|(text, _)| *text == key)
            .map(|(_, b)| *b)
    }

    /// Dates pass through, integers are epoch seconds, strings are parsed
    /// with the configured format.
    #[must_use]
    pub fn to_date(&self, value: &Value) -> Option<DateTime<FixedOffset>> {
        match value {
            Value::Date(date) => Some(*date),
            Value::Int(seconds) => Utc
                .timestamp_opt(*seconds, 0)
                .single()
                .map(|date| date.fixed_offset()),
            Value::String(s) => self.parse_date(s.trim()),
            _ => None,
        }
    }

    fn parse_date(&self, s: &str) -> Option<DateTime<FixedOffset>> {
        if let Ok(date) = DateTime::parse_from_str(s, self.date_format) {
            return Some(date);
        }
        // Formats without an offset are read as UTC.
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, self.date_format) {
            return Some(naive.and_utc().fixed_offset());
        }
        NaiveDate::parse_from_str(s, self.date_format)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc().fixed_offset())
    }

    /// Renders a date with the configured format, falling back to RFC 3339
    /// when the format string is invalid.
    #[must_use]
    pub fn date_to_string(&self, date: &DateTime<FixedOffset>) -> String {
        let mut out = String::new();
        if write!(out, "{}", date.format(self.date_format)).is_err() {
            return date.to_rfc3339_opts(SecondsFormat::Secs, false);
        }
        out
    }
}

/// Numeric input only; fractional values truncate toward zero.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn to_int(value: &Value) -> Option<i64> {
    match value {
        Value::Int(i) => Some(*i),
        Value::Float(f) if f.is_finite() => Some(f.trunc() as i64),
        Value::String(s) if is_numeric(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.trunc() as i64)
            })
        }
        _ => None,
    }
}

/// Numeric input only.
#[must_use]
pub fn to_real(value: &Value) -> Option<f64> {
    match value {
        Value::Int(_) | Value::Float(_) | Value::String(_) => value.as_number(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_DATE_FORMAT;

    fn converter() -> ScalarConverter<'static> {
        ScalarConverter::new(DEFAULT_DATE_FORMAT)
    }

    #[test]
    fn boolean_table_is_case_insensitive() {
        let c = converter();
        assert_eq!(c.to_bool(&Value::from("yes")), Some(true));
        assert_eq!(c.to_bool(&Value::from("Off")), Some(false));
        assert_eq!(c.to_bool(&Value::from("TRUE")), Some(true));
        assert_eq!(c.to_bool(&Value::Int(1)), Some(true));
        assert_eq!(c.to_bool(&Value::Bool(false)), Some(false));
        assert_eq!(c.to_bool(&Value::from("maybe")), None);
    }

    #[test]
    #[allow(clippy::approx_constant)]
    fn numeric_coercions() {
        let c = converter();
        assert_eq!(c.convert(&Value::from("3.14"), ScalarKind::Float), Some(Value::Float(3.14)));
        assert_eq!(c.convert(&Value::from("abc"), ScalarKind::Int), None);
        assert_eq!(c.convert(&Value::from("42"), ScalarKind::Int), Some(Value::Int(42)));
        assert_eq!(c.convert(&Value::from("3.9"), ScalarKind::Long), Some(Value::Int(3)));
        assert_eq!(c.convert(&Value::Int(2), ScalarKind::Double), Some(Value::Float(2.0)));
        assert_eq!(c.convert(&Value::Bool(true), ScalarKind::Int), None);
    }

    #[test]
    fn string_coercion_renders_booleans() {
        let c = converter();
        assert_eq!(c.convert(&Value::Bool(true), ScalarKind::String), Some(Value::from("true")));
        assert_eq!(c.convert(&Value::Int(7), ScalarKind::String), Some(Value::from("7")));
        assert_eq!(c.convert(&Value::Array(vec![]), ScalarKind::String), None);
    }

    #[test]
    fn date_coercions() {
        let c = converter();
        let parsed = c.to_date(&Value::from("2024-03-01T10:30:00+0200")).unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-03-01T10:30:00+02:00");
        assert_eq!(c.date_to_string(&parsed), "2024-03-01T10:30:00+0200");

        let epoch = c.to_date(&Value::Int(0)).unwrap();
        assert_eq!(epoch.to_rfc3339(), "1970-01-01T00:00:00+00:00");

        assert_eq!(c.to_date(&Value::from("not a date")), None);
        assert_eq!(c.to_date(&Value::Date(parsed)), Some(parsed));
    }

    #[test]
    fn date_without_offset_is_utc() {
        let c = ScalarConverter::new("%Y-%m-%d");
        let date = c.to_date(&Value::from("2024-03-01")).unwrap();
        assert_eq!(date.to_rfc3339(), "2024-03-01T00:00:00+00:00");
    }
}
