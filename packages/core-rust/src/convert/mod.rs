//! Type-directed value conversion.
//!
//! Request values are coerced against declared types on the way in
//! ([`ValueConverter::from_request`]); service results are reduced to
//! wire-safe structures on the way out ([`ResponseConverter::to_wire`]).

mod composite;
mod response;
mod scalar;

pub use composite::CompositeConverter;
pub use response::ResponseConverter;
pub use scalar::{to_int, to_real, ScalarConverter};

use crate::catalog::MetadataCatalog;
use crate::config::ConversionOptions;
use crate::descriptor::{TypeDescriptor, TypeKind};
use crate::error::{DispatchError, ErrorKind};
use crate::types::Value;

/// Converts raw request values into typed domain values.
///
/// `Ok(None)` means no candidate type could represent the value. Structural
/// problems (a list where a scalar was expected, a failed composite field)
/// are reported as [`ErrorKind::InvalidField`] errors naming the field.
#[derive(Debug, Clone, Copy)]
pub struct ValueConverter<'a> {
    catalog: &'a MetadataCatalog,
    options: &'a ConversionOptions,
}

impl<'a> ValueConverter<'a> {
    #[must_use]
    pub fn new(catalog: &'a MetadataCatalog, options: &'a ConversionOptions) -> Self {
        Self { catalog, options }
    }

    #[must_use]
    pub fn scalars(&self) -> ScalarConverter<'a> {
        ScalarConverter::new(&self.options.date_format)
    }

    #[must_use]
    pub fn composites(&self) -> CompositeConverter<'a> {
        CompositeConverter::new(*self)
    }

    #[must_use]
    pub fn responses(&self) -> ResponseConverter<'a> {
        ResponseConverter::new(self.options)
    }

    #[must_use]
    pub fn catalog(&self) -> &'a MetadataCatalog {
        self.catalog
    }

    /// Converts `value` against an ordered union of declared types, returning
    /// the first successful coercion.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidField`] when every candidate rejected the
    /// value structurally, and an internal error when a type references an
    /// unknown composite.
    pub fn from_request(
        &self,
        value: &Value,
        types: &[TypeDescriptor],
        field: &str,
    ) -> Result<Option<Value>, DispatchError> {
        self.convert_union(value, types, field, 0)
    }

    pub(crate) fn convert_union(
        &self,
        value: &Value,
        types: &[TypeDescriptor],
        field: &str,
        depth: usize,
    ) -> Result<Option<Value>, DispatchError> {
        let mut rejection = None;
        for ty in types {
            match self.convert_typed(value, ty, field, depth) {
                Ok(Some(converted)) => return Ok(Some(converted)),
                Ok(None) => {}
                Err(err) if err.kind() == Some(ErrorKind::InvalidField) => rejection = Some(err),
                Err(err) => return Err(err),
            }
        }
        rejection.map_or(Ok(None), Err)
    }

    fn convert_typed(
        &self,
        value: &Value,
        ty: &TypeDescriptor,
        field: &str,
        depth: usize,
    ) -> Result<Option<Value>, DispatchError> {
        if depth > self.options.max_depth {
            return Err(DispatchError::invalid_field_because(
                field,
                format!("The field {field} is nested too deeply."),
            ));
        }
        if ty.is_array {
            let Value::Array(items) = value else {
                return Err(DispatchError::invalid_field_because(
                    field,
                    format!("The field {field} has invalid structure: array expected."),
                ));
            };
            return self.convert_array(items, &ty.element(), field, depth);
        }
        if value.is_list() && ty.kind != TypeKind::Mixed {
            return Err(DispatchError::invalid_field_because(
                field,
                format!("The field {field} has invalid structure: scalar expected."),
            ));
        }
        self.convert_single(value, ty, field, depth)
    }

    /// Elements that cannot be converted are dropped; a list that loses every
    /// element fails as a whole.
    fn convert_array(
        &self,
        items: &[Value],
        element: &TypeDescriptor,
        field: &str,
        depth: usize,
    ) -> Result<Option<Value>, DispatchError> {
        if items.is_empty() {
            return Ok(Some(Value::Array(Vec::new())));
        }
        let mut converted = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let path = format!("{field}[{i}]");
            if let Some(value) = self.convert_single(item, element, &path, depth + 1)? {
                converted.push(value);
            }
        }
        Ok((!converted.is_empty()).then_some(Value::Array(converted)))
    }

    fn convert_single(
        &self,
        value: &Value,
        ty: &TypeDescriptor,
        field: &str,
        depth: usize,
    ) -> Result<Option<Value>, DispatchError> {
        if value.is_null() {
            return Ok(None);
        }
        match &ty.kind {
            TypeKind::Mixed => Ok(Some(value.clone())),
            TypeKind::Scalar(kind) => Ok(self.scalars().convert(value, *kind)),
            TypeKind::File => Ok(matches!(value, Value::File(_)).then(|| value.clone())),
            TypeKind::Composite(name) => {
                let composite = self.catalog.composite(name).ok_or_else(|| {
                    DispatchError::internal(format!(
                        "Cannot convert {name} because it is not a known composite type"
                    ))
                })?;
                self.composites().to_object(value, composite, field, depth + 1)
            }
        }
    }
}
