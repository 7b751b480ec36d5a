
use crate::types::Value;

/// Where a violation was found.
///
/// Property contexts link to the context of the value that contains them,
/// so nested composites produce dotted paths such as `user.address.city`.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationContext {
    /// A method argument.
    Parameter {
        service: String,
        method: String,
        parameter: String,
        index: Option<usize>,
    },
    /// A property of a composite object.
    Property {
        composite: String,
        property: String,
        index: Option<usize>,
        parent: Option<Box<ValidationContext>>,
    },
}

impl ValidationContext {
    #[must_use]
    pub fn parameter(service: &str, method: &str, parameter: &str) -> Self {
        Self::Parameter {
            service: service.to_string(),
            method: method.to_string(),
            parameter: parameter.to_string(),
            index: None,
        }
    }

    #[must_use]
    pub fn property(composite: &str, property: &str, parent: Option<&ValidationContext>) -> Self {
        Self::Property {
            composite: composite.to_string(),
            property: property.to_string(),
            index: None,
            parent: parent.map(|p| Box::new(p.clone())),
        }
    }

    /// The same context pointing at one element of a list value.
    #[must_use]
    pub fn at(&self, i: usize) -> Self {
        let mut context = self.clone();
        match &mut context {
            Self::Parameter { index, .. } | Self::Property { index, .. } => *index = Some(i),
        }
        context
    }

    /// Client-facing path of the field, e.g. `items[2].name`.
    #[must_use]
    pub fn field_name(&self) -> String {
        match self {
            Self::Parameter {
                parameter, index, ..
            } => with_index(parameter, *index),
            Self::Property {
                property,
                index,
                parent,
                ..
            } => {
                let field = with_index(property, *index);
                match parent {
                    Some(parent) => format!("{}.{field}", parent.field_name()),
                    None => field,
                }
            }
        }
    }
}

fn with_index(name: &str, index: Option<usize>) -> String {
    match index {
        Some(i) => format!("{name}[{i}]"),
        None => name.to_string(),
    }
}

/// A single failed check.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub message: String,
    pub value: Value,
    pub context: ValidationContext,
}

impl Violation {
    #[must_use]
    pub fn new(message: impl Into<String>, value: &Value, context: &ValidationContext) -> Self {
        Self {
            message: message.into(),
            value: value.clone(),
            context: context.clone(),
        }
    }

    #[must_use]
    pub fn field(&self) -> String {
        self.context.field_name()
    }
}

/// Every violation found while validating one call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Validation failed{}:{}", describe_target(.target.as_deref()), describe_violations(.violations))]
pub struct ValidationFailure {
    pub violations: Vec<Violation>,
    /// `Service:method` being called, when known.
    pub target: Option<String>,
    /// Only failures raised at the outermost dispatch boundary are shown to
    /// the API caller.
    pub api_visible: bool,
}

impl ValidationFailure {
    #[must_use]
    pub fn new(violations: Vec<Violation>, target: Option<String>) -> Self {
        Self {
            violations,
            target,
            api_visible: true,
        }
    }

    /// Marks the failure as raised by a nested call.
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.api_visible = false;
        self
    }
}

fn describe_target(target: Option<&str>) -> String {
    target.map_or_else(String::new, |target| format!(" calling method {target}"))
}

fn describe_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .enumerate()
        .map(|(i, violation)| format!("\n{i}. {} on field {}", violation.message, violation.field()))
        .collect()
}
