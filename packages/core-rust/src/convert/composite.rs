use crate::descriptor::CompositeDescriptor;
use crate::error::DispatchError;
use crate::types::{Object, Value};

use super::ValueConverter;

/// Builds composite instances from request mappings.
#[derive(Debug, Clone)]
pub struct CompositeConverter<'a> {
    values: ValueConverter<'a>,
}

impl<'a> CompositeConverter<'a> {
    pub(super) fn new(values: ValueConverter<'a>) -> Self {
        Self { values }
    }

    /// Builds an instance of `composite` from a mapping, field by field.
    ///
    /// An absent field takes its declared default or stays unset; an
    /// explicit null is kept as null. Returns `Ok(None)` when `value` is not
    /// a mapping.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ErrorKind::InvalidField`] naming the dotted field
    /// path when a present field matches none of its declared types.
    pub fn to_object(
        &self,
        value: &Value,
        composite: &CompositeDescriptor,
        field: &str,
        depth: usize,
    ) -> Result<Option<Value>, DispatchError> {
        let Value::Map(map) = value else {
            return Ok(None);
        };
        let mut object = Object::new(&composite.name);
        for property in &composite.properties {
            match map.get(&property.name) {
                None => {
                    if let Some(default) = property.default_value() {
                        object.set(&property.name, default.clone());
                    }
                }
                Some(Value::Null) => object.set(&property.name, Value::Null),
                Some(raw) => {
                    let path = if field.is_empty() {
                        property.name.clone()
                    } else {
                        format!("{field}.{}", property.name)
                    };
                    let converted = self
                        .values
                        .convert_union(raw, &property.types, &path, depth)?
                        .ok_or_else(|| {
                            DispatchError::invalid_field_because(
                                &path,
                                format!("It was not possible to convert field {path} into expected type"),
                            )
                        })?;
                    object.set(&property.name, converted);
                }
            }
        }
        Ok(Some(Value::Object(object)))
    }

    /// Converts an instance into another composite type through its wire form.
    ///
    /// # Errors
    ///
    /// Returns an internal error for an unknown target type, and the usual
    /// conversion errors when a property does not fit the target.
    pub fn cast(&self, object: &Object, target: &str) -> Result<Object, DispatchError> {
        let composite = self.values.catalog().composite(target).ok_or_else(|| {
            DispatchError::internal(format!("Cannot cast to unknown composite type {target}"))
        })?;
        let wire = self.values.responses().to_wire(&Value::Object(object.clone()))?;
        match self.to_object(&wire, composite, "", 0)? {
            Some(Value::Object(cast)) => Ok(cast),
            _ => Err(DispatchError::internal(format!(
                "Cannot cast {} to {target}",
                object.type_name()
            ))),
        }
    }
}
