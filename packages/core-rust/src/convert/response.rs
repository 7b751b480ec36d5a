use indexmap::IndexMap;

use crate::config::ConversionOptions;
use crate::error::DispatchError;
use crate::types::Value;

use super::ScalarConverter;

/// Reduces service results to wire-safe structures.
#[derive(Debug, Clone)]
pub struct ResponseConverter<'a> {
    options: &'a ConversionOptions,
}

impl<'a> ResponseConverter<'a> {
    #[must_use]
    pub fn new(options: &'a ConversionOptions) -> Self {
        Self { options }
    }

    /// Converts a service result into nulls, scalars, strings, lists, and
    /// mappings.
    ///
    /// Composite objects expand to a mapping of their set properties
    /// (omitting null ones when configured); dates render with the
    /// configured format.
    ///
    /// # Errors
    ///
    /// Raw bytes and uploaded files are not legal results and produce an
    /// internal error.
    pub fn to_wire(&self, value: &Value) -> Result<Value, DispatchError> {
        match value {
            Value::Null | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::String(_) => {
                Ok(value.clone())
            }
            Value::Date(date) => Ok(Value::String(
                ScalarConverter::new(&self.options.date_format).date_to_string(date),
            )),
            Value::Array(items) => items
                .iter()
                .map(|item| self.to_wire(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Map(map) => map
                .iter()
                .map(|(k, v)| Ok((k.clone(), self.to_wire(v)?)))
                .collect::<Result<IndexMap<_, _>, DispatchError>>()
                .map(Value::Map),
            Value::Object(object) => {
                let mut fields = IndexMap::new();
                for (name, field) in object.fields() {
                    if field.is_null() && self.options.filter_null_properties {
                        continue;
                    }
                    fields.insert(name.to_string(), self.to_wire(field)?);
                }
                Ok(Value::Map(fields))
            }
            Value::Bytes(_) | Value::File(_) => Err(DispatchError::internal(format!(
                "Unexpected value returned by the service: {}",
                value.type_name()
            ))),
        }
    }
}
