//! Validation rules and the registry they are looked up in.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use regex::{Regex, RegexBuilder};
use tracing::debug;

use crate::types::Value;

/// A declarative constraint applied to a single value.
pub trait ValidationRule: Send + Sync {
    /// Whether `value` satisfies the rule given its declared arguments.
    fn validate(&self, value: &Value, args: &[Value]) -> bool;

    /// Message reported when [`ValidationRule::validate`] fails.
    fn message(&self, value: &Value, args: &[Value]) -> String;
}

/// Rules by case-insensitive name. Populated at startup, read-only afterwards.
#[derive(Clone, Default)]
pub struct RuleRegistry {
    rules: HashMap<String, Arc<dyn ValidationRule>>,
}

impl RuleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in rules.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("<", Comparison::Less);
        registry.register("<=", Comparison::LessOrEqual);
        registry.register(">", Comparison::Greater);
        registry.register(">=", Comparison::GreaterOrEqual);
        registry.register("length", Length);
        registry.register("matches", Matches::default());
        registry.register("notNull", NotNull);
        registry.register("notEmpty", NotEmpty);
        registry.register("required", NotEmpty);
        registry
    }

    /// Registers `rule` under `name`, replacing any rule already registered
    /// under the same name.
    pub fn register(&mut self, name: &str, rule: impl ValidationRule + 'static) {
        debug!(rule = name, "registered validation rule");
        self.rules.insert(name.to_lowercase(), Arc::new(rule));
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ValidationRule>> {
        self.rules.get(&name.to_lowercase())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(&name.to_lowercase())
    }
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.rules.keys().collect();
        names.sort();
        f.debug_struct("RuleRegistry").field("rules", &names).finish()
    }
}

// ---------------------------------------------------------------------------
// Comparisons
// ---------------------------------------------------------------------------

/// Orders two values: numerically when both are numeric, lexically when both
/// are strings. Anything else is incomparable.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Date(x), Value::Date(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Applies a textual comparison operator such as `>=` or `<>`.
fn apply_operator(ordering: Option<Ordering>, operator: &str) -> bool {
    let Some(ordering) = ordering else {
        return false;
    };
    match operator {
        ">" => ordering == Ordering::Greater,
        ">=" => ordering != Ordering::Less,
        "<" => ordering == Ordering::Less,
        "<=" => ordering != Ordering::Greater,
        "=" | "==" => ordering == Ordering::Equal,
        "!=" | "<>" => ordering != Ordering::Equal,
        _ => false,
    }
}

fn arg(args: &[Value], i: usize) -> &Value {
    args.get(i).unwrap_or(&Value::Null)
}

#[derive(Debug, Clone, Copy)]
pub enum Comparison {
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl Comparison {
    fn operator(self) -> &'static str {
        match self {
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
        }
    }
}

impl ValidationRule for Comparison {
    fn validate(&self, value: &Value, args: &[Value]) -> bool {
        apply_operator(compare(value, arg(args, 0)), self.operator())
    }

    fn message(&self, _value: &Value, args: &[Value]) -> String {
        let bound = arg(args, 0);
        match self {
            Self::Less => format!("Given value is not smaller than {bound}"),
            Self::LessOrEqual => format!("Given value is not smaller than or equals to {bound}"),
            Self::Greater => format!("Given value is not greater than {bound}"),
            Self::GreaterOrEqual => format!("Given value is not greater than or equals to {bound}"),
        }
    }
}

/// `length <op> <n>`: compares the character length of the value.
#[derive(Debug, Clone, Copy)]
pub struct Length;

impl ValidationRule for Length {
    fn validate(&self, value: &Value, args: &[Value]) -> bool {
        let length = match value {
            Value::Null => 0,
            Value::String(s) => s.chars().count(),
            Value::Array(items) => items.len(),
            Value::Map(map) => map.len(),
            other => other.to_string().chars().count(),
        };
        let Some(operator) = arg(args, 0).as_str() else {
            return false;
        };
        let length = i64::try_from(length).unwrap_or(i64::MAX);
        apply_operator(compare(&Value::Int(length), arg(args, 1)), operator)
    }

    fn message(&self, _value: &Value, args: &[Value]) -> String {
        format!("String length is not {} {}", arg(args, 0), arg(args, 1))
    }
}

/// `matches <pattern>`: the value must match a regular expression. The
/// pattern may be written with delimiters and trailing flags, e.g. `/^a+$/i`.
///
/// Each distinct pattern is compiled once; invalid patterns are remembered as
/// never matching.
#[derive(Debug, Default)]
pub struct Matches {
    compiled: RwLock<HashMap<String, Option<Regex>>>,
}

impl Matches {
    fn pattern(args: &[Value]) -> String {
        args.iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn compile(pattern: &str) -> Option<Regex> {
        let (body, flags) = split_delimited(pattern);
        let regex = RegexBuilder::new(body)
            .case_insensitive(flags.contains('i'))
            .multi_line(flags.contains('m'))
            .dot_matches_new_line(flags.contains('s'))
            .ignore_whitespace(flags.contains('x'))
            .build();
        match regex {
            Ok(regex) => Some(regex),
            Err(err) => {
                debug!(pattern = %pattern, error = %err, "invalid pattern in matches rule");
                None
            }
        }
    }

    fn is_match(&self, pattern: String, subject: &str) -> bool {
        if let Some(compiled) = self.compiled.read().get(&pattern) {
            return compiled.as_ref().is_some_and(|regex| regex.is_match(subject));
        }
        let compiled = Self::compile(&pattern);
        let matched = compiled.as_ref().is_some_and(|regex| regex.is_match(subject));
        self.compiled.write().insert(pattern, compiled);
        matched
    }
}

/// Splits a delimited pattern into its body and flags. Undelimited patterns
/// are returned as-is.
fn split_delimited(pattern: &str) -> (&str, &str) {
    let mut chars = pattern.chars();
    let Some(delimiter) = chars.next() else {
        return (pattern, "");
    };
    if !matches!(delimiter, '/' | '#' | '~' | '@' | '!' | '%' | '|') {
        return (pattern, "");
    }
    let inner = &pattern[delimiter.len_utf8()..];
    match inner.rfind(delimiter) {
        Some(end) => (&inner[..end], &inner[end + delimiter.len_utf8()..]),
        None => (pattern, ""),
    }
}

impl ValidationRule for Matches {
    fn validate(&self, value: &Value, args: &[Value]) -> bool {
        let subject = match value {
            Value::String(s) => s.clone(),
            Value::Int(_) | Value::Float(_) | Value::Bool(_) => value.to_string(),
            _ => return false,
        };
        self.is_match(Self::pattern(args), &subject)
    }

    fn message(&self, _value: &Value, args: &[Value]) -> String {
        format!("Given value does not match pattern {}", Self::pattern(args))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NotNull;

impl ValidationRule for NotNull {
    fn validate(&self, value: &Value, _args: &[Value]) -> bool {
        !value.is_null()
    }

    fn message(&self, _value: &Value, _args: &[Value]) -> String {
        "Given value is null".to_string()
    }
}

/// Rejects null, `false`, zero, `""`, `"0"`, and empty collections.
#[derive(Debug, Clone, Copy)]
pub struct NotEmpty;

impl ValidationRule for NotEmpty {
    fn validate(&self, value: &Value, _args: &[Value]) -> bool {
        match value {
            Value::Null | Value::Bool(false) | Value::Int(0) => false,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !(s.is_empty() || s == "0"),
            Value::Bytes(b) => !b.is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            _ => true,
        }
    }

    fn message(&self, _value: &Value, _args: &[Value]) -> String {
        "Given value is empty".to_string()
    }
}
