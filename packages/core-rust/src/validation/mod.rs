//! Recursive validation of call arguments and composite objects.

mod context;
mod rules;

pub use context::{ValidationContext, ValidationFailure, Violation};
pub use rules::{Comparison, Length, Matches, NotEmpty, NotNull, RuleRegistry, ValidationRule};

use crate::catalog::MetadataCatalog;
use crate::descriptor::{MethodDescriptor, RuleBinding, TypeKind, ValueDescriptor};
use crate::error::DispatchError;
use crate::types::{Object, Value};

const DEFAULT_MAX_DEPTH: usize = 64;

/// Checks values against declared rules, enum constraints, and the
/// structure of their declared types.
///
/// Violations are collected, never short-circuited. Errors are reserved for
/// descriptor problems: unknown rules, enums, or composite types.
#[derive(Debug, Clone, Copy)]
pub struct Validator<'a> {
    catalog: &'a MetadataCatalog,
    rules: &'a RuleRegistry,
    max_depth: usize,
}

impl<'a> Validator<'a> {
    #[must_use]
    pub fn new(catalog: &'a MetadataCatalog, rules: &'a RuleRegistry) -> Self {
        Self {
            catalog,
            rules,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Validates a call and raises every violation found as one failure.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Validation`] when any argument is invalid; an
    /// internal error when the descriptors reference unknown rules or types.
    pub fn validate_call(
        &self,
        service: &str,
        method: &MethodDescriptor,
        args: &[Value],
    ) -> Result<(), DispatchError> {
        let violations = self.validate_arguments(service, method, args)?;
        if violations.is_empty() {
            return Ok(());
        }
        Err(ValidationFailure::new(violations, Some(format!("{service}:{}", method.name))).into())
    }

    /// Validates positional arguments against the method's parameters.
    /// Missing or null arguments are checked as the parameter's default.
    ///
    /// # Errors
    ///
    /// Internal error when the descriptors reference unknown rules or types.
    pub fn validate_arguments(
        &self,
        service: &str,
        method: &MethodDescriptor,
        args: &[Value],
    ) -> Result<Vec<Violation>, DispatchError> {
        let mut violations = Vec::new();
        for (i, parameter) in method.parameters.iter().enumerate() {
            let value = match args.get(i) {
                Some(value) if !value.is_null() => value,
                _ => &parameter.default,
            };
            let rules: Vec<&RuleBinding> = method.rules_for(&parameter.name).collect();
            let context = ValidationContext::parameter(service, &method.name, &parameter.name);
            violations.extend(self.validate_entry(value, &rules, parameter, &context, 0)?);
        }
        Ok(violations)
    }

    /// Validates every declared property of a composite instance.
    ///
    /// # Errors
    ///
    /// Internal error when the object's type or its rules are unknown.
    pub fn validate_object(
        &self,
        object: &Object,
        parent: Option<&ValidationContext>,
    ) -> Result<Vec<Violation>, DispatchError> {
        self.validate_object_at(object, parent, 0)
    }

    fn validate_object_at(
        &self,
        object: &Object,
        parent: Option<&ValidationContext>,
        depth: usize,
    ) -> Result<Vec<Violation>, DispatchError> {
        let composite = self.catalog.composite(object.type_name()).ok_or_else(|| {
            DispatchError::internal(format!(
                "No metadata found for composite type {}",
                object.type_name()
            ))
        })?;
        let mut violations = Vec::new();
        for property in &composite.properties {
            let value = object
                .get(&property.name)
                .filter(|v| !v.is_null())
                .or(property.default_value())
                .unwrap_or(&Value::Null);
            let rules: Vec<&RuleBinding> = property.rules.iter().collect();
            let context = ValidationContext::property(&composite.name, &property.name, parent);
            violations.extend(self.validate_entry(value, &rules, property, &context, depth + 1)?);
        }
        Ok(violations)
    }

    /// Tries each candidate type in order. The entry is valid as soon as one
    /// candidate yields no violations; otherwise the violations of every
    /// candidate are returned.
    fn validate_entry(
        &self,
        value: &Value,
        rules: &[&RuleBinding],
        descriptor: &ValueDescriptor,
        context: &ValidationContext,
        depth: usize,
    ) -> Result<Vec<Violation>, DispatchError> {
        if depth > self.max_depth {
            return Err(DispatchError::internal(format!(
                "Validation of field {} exceeds the maximum nesting depth",
                context.field_name()
            )));
        }
        let enumeration = descriptor.enumeration.as_deref();
        let mut collected = Vec::new();
        for ty in &descriptor.types {
            let mut found = Vec::new();
            if ty.is_array {
                match value {
                    Value::Array(items) => {
                        for (i, item) in items.iter().enumerate() {
                            found.extend(self.validate_field(
                                item,
                                rules,
                                enumeration,
                                &context.at(i),
                                depth,
                            )?);
                        }
                    }
                    Value::Null => return Ok(Vec::new()),
                    _ => found.push(Violation::new(
                        "Invalid structure. Array expected",
                        value,
                        context,
                    )),
                }
            } else if value.is_list() && ty.kind != TypeKind::Mixed {
                found.push(Violation::new("Invalid structure. Scalar expected", value, context));
            } else {
                found = self.validate_field(value, rules, enumeration, context, depth)?;
            }
            if found.is_empty() {
                return Ok(Vec::new());
            }
            collected.extend(found);
        }
        Ok(collected)
    }

    fn validate_field(
        &self,
        value: &Value,
        rules: &[&RuleBinding],
        enumeration: Option<&str>,
        context: &ValidationContext,
        depth: usize,
    ) -> Result<Vec<Violation>, DispatchError> {
        let mut violations = Vec::new();
        if let Value::Object(object) = value {
            violations.extend(self.validate_object_at(object, Some(context), depth + 1)?);
        }
        for binding in rules {
            let rule = self.rules.get(&binding.rule).ok_or_else(|| {
                DispatchError::internal(format!("Unknown validation rule {}", binding.rule))
            })?;
            if !rule.validate(value, &binding.args) {
                violations.push(Violation::new(rule.message(value, &binding.args), value, context));
            }
        }
        if let Some(name) = enumeration {
            let constants = self
                .catalog
                .enumeration(name)
                .ok_or_else(|| DispatchError::internal(format!("Unknown enum {name}")))?;
            if !value.is_null() && !constants.contains(value) {
                violations.push(Violation::new("Value does not belong to enum", value, context));
            }
        }
        Ok(violations)
    }
}
