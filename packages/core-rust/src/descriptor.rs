//! Read-only metadata describing service interfaces, methods, parameters,
//! composite types, and enum constant sets.
//!
//! Descriptors are produced once by an external build-time generator and are
//! never mutated after the catalog is assembled. Every descriptor derives
//! serde so the generator can hand the graph over as JSON.

use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::types::Value;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Scalar kinds understood by the scalar converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    String,
    Bool,
    Int,
    Long,
    Float,
    Real,
    Double,
    Numeric,
    DateTime,
}

impl ScalarKind {
    /// Looks up a scalar kind by its declared type name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "string" => Self::String,
            "bool" | "boolean" => Self::Bool,
            "int" | "integer" => Self::Int,
            "long" => Self::Long,
            "float" => Self::Float,
            "real" => Self::Real,
            "double" => Self::Double,
            "numeric" => Self::Numeric,
            "DateTime" | "datetime" | "date" => Self::DateTime,
            _ => return None,
        })
    }

    /// Canonical declared name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Real => "real",
            Self::Double => "double",
            Self::Numeric => "numeric",
            Self::DateTime => "DateTime",
        }
    }
}

/// Base kind of a declared type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// Any value; passed through untouched.
    Mixed,
    /// One of the scalar kinds.
    Scalar(ScalarKind),
    /// The file-upload type.
    File,
    /// A composite type, identified by name.
    Composite(String),
}

/// A declared type: a base kind, optionally as a list of that kind.
///
/// Serializes as its declared name, e.g. `"int"`, `"User[]"`, `"mixed"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TypeDescriptor {
    pub kind: TypeKind,
    pub is_array: bool,
}

impl TypeDescriptor {
    /// Parses a declared type name. A trailing `[]` marks a list; unknown
    /// names are composite identities.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        let name = name.trim();
        let (base, is_array) = match name.strip_suffix("[]") {
            Some(base) => (base, true),
            None => (name, false),
        };
        let kind = match base {
            "mixed" => TypeKind::Mixed,
            "file" | "UploadedFile" => TypeKind::File,
            other => ScalarKind::from_name(other)
                .map_or_else(|| TypeKind::Composite(other.to_string()), TypeKind::Scalar),
        };
        Self { kind, is_array }
    }

    #[must_use]
    pub fn scalar(kind: ScalarKind) -> Self {
        Self {
            kind: TypeKind::Scalar(kind),
            is_array: false,
        }
    }

    #[must_use]
    pub fn composite(name: impl Into<String>) -> Self {
        Self {
            kind: TypeKind::Composite(name.into()),
            is_array: false,
        }
    }

    #[must_use]
    pub fn mixed() -> Self {
        Self {
            kind: TypeKind::Mixed,
            is_array: false,
        }
    }

    /// The same base kind as a list.
    #[must_use]
    pub fn array(mut self) -> Self {
        self.is_array = true;
        self
    }

    /// The element type of a list type (or the type itself).
    #[must_use]
    pub fn element(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            is_array: false,
        }
    }

    #[must_use]
    pub fn is_file(&self) -> bool {
        self.kind == TypeKind::File
    }

    /// Name of the composite type, if this is one.
    #[must_use]
    pub fn composite_name(&self) -> Option<&str> {
        match &self.kind {
            TypeKind::Composite(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TypeKind::Mixed => f.write_str("mixed")?,
            TypeKind::Scalar(kind) => f.write_str(kind.name())?,
            TypeKind::File => f.write_str("file")?,
            TypeKind::Composite(name) => f.write_str(name)?,
        }
        if self.is_array {
            f.write_str("[]")?;
        }
        Ok(())
    }
}

impl TryFrom<String> for TypeDescriptor {
    type Error = String;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        if name.trim().trim_end_matches("[]").is_empty() {
            return Err("type name must not be empty".to_string());
        }
        Ok(Self::parse(&name))
    }
}

impl From<TypeDescriptor> for String {
    fn from(ty: TypeDescriptor) -> Self {
        ty.to_string()
    }
}

// ---------------------------------------------------------------------------
// Values: parameters and properties
// ---------------------------------------------------------------------------

/// A named, typed slot: a method parameter or a composite property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueDescriptor {
    pub name: String,
    /// Declared type, or an ordered union of candidate types.
    pub types: Vec<TypeDescriptor>,
    #[serde(default)]
    pub has_default: bool,
    #[serde(default)]
    pub default: Value,
    /// Name of the enum constant set the value must belong to.
    #[serde(default)]
    pub enumeration: Option<String>,
}

/// Method parameters are plain value descriptors.
pub type ParameterDescriptor = ValueDescriptor;

impl ValueDescriptor {
    /// A required slot of a single declared type.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: &str) -> Self {
        Self {
            name: name.into(),
            types: vec![TypeDescriptor::parse(ty)],
            has_default: false,
            default: Value::Null,
            enumeration: None,
        }
    }

    /// Adds another candidate type to the union.
    #[must_use]
    pub fn or(mut self, ty: &str) -> Self {
        self.types.push(TypeDescriptor::parse(ty));
        self
    }

    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.has_default = true;
        self.default = default.into();
        self
    }

    #[must_use]
    pub fn with_enum(mut self, enumeration: impl Into<String>) -> Self {
        self.enumeration = Some(enumeration.into());
        self
    }

    /// The declared default, if any.
    #[must_use]
    pub fn default_value(&self) -> Option<&Value> {
        self.has_default.then_some(&self.default)
    }

    /// The first declared type; descriptors always carry at least one.
    #[must_use]
    pub fn primary_type(&self) -> Option<&TypeDescriptor> {
        self.types.first()
    }
}

/// A property of a composite type, with its own validation rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    #[serde(flatten)]
    pub value: ValueDescriptor,
    #[serde(default)]
    pub rules: Vec<RuleBinding>,
}

impl PropertyDescriptor {
    #[must_use]
    pub fn new(value: ValueDescriptor) -> Self {
        Self {
            value,
            rules: Vec::new(),
        }
    }

    #[must_use]
    pub fn validate(mut self, rule: RuleBinding) -> Self {
        self.rules.push(rule);
        self
    }
}

impl std::ops::Deref for PropertyDescriptor {
    type Target = ValueDescriptor;

    fn deref(&self) -> &ValueDescriptor {
        &self.value
    }
}

/// A declared validation rule: registry name plus arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleBinding {
    pub rule: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl RuleBinding {
    #[must_use]
    pub fn new<I, V>(rule: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            rule: rule.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// A rule without arguments, e.g. `notNull`.
    #[must_use]
    pub fn named(rule: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            args: Vec::new(),
        }
    }
}

/// A rule attached to one parameter of a method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRule {
    pub parameter: String,
    #[serde(flatten)]
    pub rule: RuleBinding,
}

// ---------------------------------------------------------------------------
// Methods
// ---------------------------------------------------------------------------

/// Where the decoded request body goes.
///
/// Serializes as the parameter name, or `"*"` for the whole-body binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BodyBinding {
    /// The body becomes the value of one parameter.
    Parameter(String),
    /// Every top-level body field becomes a request field.
    Whole,
}

impl TryFrom<String> for BodyBinding {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.trim().trim_start_matches('$') {
            "" => Err("body binding must name a parameter or '*'".to_string()),
            "*" => Ok(Self::Whole),
            name => Ok(Self::Parameter(name.to_string())),
        }
    }
}

impl From<BodyBinding> for String {
    fn from(binding: BodyBinding) -> Self {
        match binding {
            BodyBinding::Parameter(name) => name,
            BodyBinding::Whole => "*".to_string(),
        }
    }
}

/// A request header feeding a parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderBinding {
    pub header: String,
    pub parameter: String,
}

/// Metadata for one method of a service interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<ParameterDescriptor>,
    /// Declared return type or union; empty when the method returns nothing.
    #[serde(default)]
    pub returns: Vec<TypeDescriptor>,
    #[serde(default)]
    pub body: Option<BodyBinding>,
    #[serde(default)]
    pub headers: Vec<HeaderBinding>,
    /// Capability names asserted before every call.
    #[serde(default)]
    pub assertions: Vec<String>,
    #[serde(default)]
    pub validations: Vec<ParameterRule>,
}

impl MethodDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            returns: Vec::new(),
            body: None,
            headers: Vec::new(),
            assertions: Vec::new(),
            validations: Vec::new(),
        }
    }

    #[must_use]
    pub fn param(mut self, parameter: ParameterDescriptor) -> Self {
        self.parameters.push(parameter);
        self
    }

    #[must_use]
    pub fn returns(mut self, ty: &str) -> Self {
        self.returns.push(TypeDescriptor::parse(ty));
        self
    }

    #[must_use]
    pub fn body(mut self, binding: BodyBinding) -> Self {
        self.body = Some(binding);
        self
    }

    #[must_use]
    pub fn header(mut self, header: impl Into<String>, parameter: impl Into<String>) -> Self {
        self.headers.push(HeaderBinding {
            header: header.into(),
            parameter: parameter.into(),
        });
        self
    }

    #[must_use]
    pub fn assert(mut self, capability: impl Into<String>) -> Self {
        self.assertions.push(capability.into());
        self
    }

    #[must_use]
    pub fn validate(mut self, parameter: impl Into<String>, rule: RuleBinding) -> Self {
        self.validations.push(ParameterRule {
            parameter: parameter.into(),
            rule,
        });
        self
    }

    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Rules declared for one parameter, in declaration order.
    pub fn rules_for<'a>(&'a self, parameter: &'a str) -> impl Iterator<Item = &'a RuleBinding> + 'a {
        self.validations
            .iter()
            .filter(move |v| v.parameter == parameter)
            .map(|v| &v.rule)
    }
}

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// Explicit version requested by a route or a dependency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VersionSelector {
    Number(u32),
    Name(String),
}

impl fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "version #{n}"),
            Self::Name(name) => write!(f, "version '{name}'"),
        }
    }
}

/// A service dependency injected into an implementation before initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyDescriptor {
    /// Property of the implementation receiving the dependency.
    pub property: String,
    /// Interface of the injected service.
    pub service: String,
    #[serde(default)]
    pub version: Option<VersionSelector>,
}

/// One concrete implementation of a service interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplementationDescriptor {
    /// Identity of the implementation; keys the per-request instance cache.
    pub id: String,
    /// Capability gating this version, if any.
    #[serde(default)]
    pub capability: Option<String>,
    /// Optional display name, selectable as a named version.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<DependencyDescriptor>,
}

impl ImplementationDescriptor {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            capability: None,
            name: None,
            dependencies: Vec::new(),
        }
    }

    #[must_use]
    pub fn requires(mut self, capability: impl Into<String>) -> Self {
        self.capability = Some(capability.into());
        self
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn inject(
        mut self,
        property: impl Into<String>,
        service: impl Into<String>,
        version: Option<VersionSelector>,
    ) -> Self {
        self.dependencies.push(DependencyDescriptor {
            property: property.into(),
            service: service.into(),
            version,
        });
        self
    }
}

/// A service interface with its methods and versioned implementations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub name: String,
    #[serde(default)]
    pub methods: Vec<MethodDescriptor>,
    /// Sparse, version-keyed implementation table.
    #[serde(default)]
    pub versions: BTreeMap<u32, ImplementationDescriptor>,
}

impl ServiceDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
            versions: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn method(mut self, method: MethodDescriptor) -> Self {
        self.methods.push(method);
        self
    }

    #[must_use]
    pub fn version(mut self, number: u32, implementation: ImplementationDescriptor) -> Self {
        self.versions.insert(number, implementation);
        self
    }

    #[must_use]
    pub fn find_method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// The implementation whose display name is `name`.
    #[must_use]
    pub fn version_named(&self, name: &str) -> Option<&ImplementationDescriptor> {
        self.versions
            .values()
            .find(|v| v.name.as_deref() == Some(name))
    }
}

// ---------------------------------------------------------------------------
// Composites and enums
// ---------------------------------------------------------------------------

/// A structured value type with named properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeDescriptor {
    pub name: String,
    #[serde(default)]
    pub properties: Vec<PropertyDescriptor>,
}

impl CompositeDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
        }
    }

    #[must_use]
    pub fn property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(property);
        self
    }

    #[must_use]
    pub fn find_property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.value.name == name)
    }
}

/// A named set of constants referenced by enum constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumDescriptor {
    pub name: String,
    pub constants: IndexMap<String, Value>,
}

impl EnumDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constants: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn constant(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.constants.insert(name.into(), value.into());
        self
    }

    /// Whether `value` equals (loosely) one of the constants.
    #[must_use]
    pub fn contains(&self, value: &Value) -> bool {
        self.constants.values().any(|c| c.loosely_equals(value))
    }
}
