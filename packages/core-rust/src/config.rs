use serde::{Deserialize, Serialize};

/// Default date format: ISO-8601 with a numeric UTC offset.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// Process-wide options for value conversion in both directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionOptions {
    /// `chrono` format string used to parse request dates and render response dates.
    pub date_format: String,
    /// Omit null-valued properties when composite objects go out on the wire.
    pub filter_null_properties: bool,
    /// Maximum nesting of arrays and composites accepted before conversion
    /// and validation give up.
    pub max_depth: usize,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            filter_null_properties: true,
            max_depth: 64,
        }
    }
}
