use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use switchyard_core::{DispatchError, Object, Value};

use super::{RequestScope, ServiceProxy};

// ---------------------------------------------------------------------------
// ServiceInstance trait
// ---------------------------------------------------------------------------

/// A service implementation living for the duration of one request.
///
/// Instances are created by the implementation registry, receive their
/// declared dependencies through [`ServiceInstance::inject`], and are then
/// initialized once before the first call.
pub trait ServiceInstance: Any + Send + Sync {
    /// Receives the proxy for the dependency declared on `property`.
    ///
    /// # Errors
    ///
    /// Implementations without the property should fail; the default does.
    fn inject(&mut self, property: &str, _service: ServiceProxy) -> anyhow::Result<()> {
        anyhow::bail!(
            "{} has no injectable property {property}",
            std::any::type_name::<Self>()
        )
    }

    /// Hook run after all dependencies are injected.
    ///
    /// # Errors
    ///
    /// A failure aborts resolution of the service.
    fn after_initialize(&mut self, _scope: &RequestScope) -> anyhow::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Call
// ---------------------------------------------------------------------------

static NULL: Value = Value::Null;

/// Arguments and context handed to a method handler.
///
/// Arguments arrive converted and validated against the method's
/// parameters, positionally.
#[derive(Debug, Clone, Copy)]
pub struct Call<'a> {
    scope: &'a RequestScope,
    service: &'a str,
    method: &'a str,
    args: &'a [Value],
}

impl<'a> Call<'a> {
    pub(crate) fn new(
        scope: &'a RequestScope,
        service: &'a str,
        method: &'a str,
        args: &'a [Value],
    ) -> Self {
        Self {
            scope,
            service,
            method,
            args,
        }
    }

    /// The request scope, for resolving further services or checking capabilities.
    #[must_use]
    pub fn scope(&self) -> &'a RequestScope {
        self.scope
    }

    #[must_use]
    pub fn service(&self) -> &'a str {
        self.service
    }

    #[must_use]
    pub fn method(&self) -> &'a str {
        self.method
    }

    #[must_use]
    pub fn args(&self) -> &'a [Value] {
        self.args
    }

    /// Argument at `index`; missing trailing arguments read as null.
    #[must_use]
    pub fn arg(&self, index: usize) -> &'a Value {
        self.args.get(index).unwrap_or(&NULL)
    }

    /// Non-null argument at `index`.
    #[must_use]
    pub fn opt(&self, index: usize) -> Option<&'a Value> {
        self.args.get(index).filter(|value| !value.is_null())
    }

    /// # Errors
    ///
    /// Internal error when the argument is not an integer.
    pub fn int(&self, index: usize) -> Result<i64, DispatchError> {
        match self.arg(index) {
            Value::Int(n) => Ok(*n),
            _ => Err(self.mismatch(index, "an integer")),
        }
    }

    /// # Errors
    ///
    /// Internal error when the argument is not a number.
    pub fn float(&self, index: usize) -> Result<f64, DispatchError> {
        match self.arg(index) {
            Value::Float(n) => Ok(*n),
            #[allow(clippy::cast_precision_loss)]
            Value::Int(n) => Ok(*n as f64),
            _ => Err(self.mismatch(index, "a number")),
        }
    }

    /// # Errors
    ///
    /// Internal error when the argument is not a string.
    pub fn string(&self, index: usize) -> Result<&'a str, DispatchError> {
        self.arg(index)
            .as_str()
            .ok_or_else(|| self.mismatch(index, "a string"))
    }

    /// # Errors
    ///
    /// Internal error when the argument is not a boolean.
    pub fn bool(&self, index: usize) -> Result<bool, DispatchError> {
        match self.arg(index) {
            Value::Bool(flag) => Ok(*flag),
            _ => Err(self.mismatch(index, "a boolean")),
        }
    }

    /// # Errors
    ///
    /// Internal error when the argument is not a composite instance.
    pub fn object(&self, index: usize) -> Result<&'a Object, DispatchError> {
        self.arg(index)
            .as_object()
            .ok_or_else(|| self.mismatch(index, "an object"))
    }

    fn mismatch(&self, index: usize, expected: &str) -> DispatchError {
        DispatchError::internal(format!(
            "Argument #{index} of {}:{} is not {expected}, got {}",
            self.service,
            self.method,
            self.arg(index).type_name()
        ))
    }
}

// ---------------------------------------------------------------------------
// MethodTable / DispatchTable
// ---------------------------------------------------------------------------

type TypedMethod<S> = Box<dyn Fn(&S, &Call<'_>) -> Result<Value, DispatchError> + Send + Sync>;

pub(crate) type ErasedMethod = Arc<
    dyn Fn(&(dyn Any + Send + Sync), &Call<'_>) -> Result<Value, DispatchError> + Send + Sync,
>;

/// Method handlers of one implementation type, keyed by method name.
pub struct MethodTable<S> {
    methods: Vec<(String, TypedMethod<S>)>,
}

impl<S: ServiceInstance> MethodTable<S> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            methods: Vec::new(),
        }
    }

    /// Adds the handler for `name`.
    #[must_use]
    pub fn method<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&S, &Call<'_>) -> Result<Value, DispatchError> + Send + Sync + 'static,
    {
        self.methods.push((name.into(), Box::new(handler)));
        self
    }
}

impl<S: ServiceInstance> Default for MethodTable<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Type-erased handlers, invoked on instances stored as `dyn Any`.
#[derive(Clone, Default)]
pub struct DispatchTable {
    methods: HashMap<String, ErasedMethod>,
}

impl DispatchTable {
    #[must_use]
    pub fn contains(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    pub(crate) fn get(&self, method: &str) -> Option<&ErasedMethod> {
        self.methods.get(method)
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }
}

impl<S: ServiceInstance> From<MethodTable<S>> for DispatchTable {
    fn from(table: MethodTable<S>) -> Self {
        let methods = table
            .methods
            .into_iter()
            .map(|(name, handler)| {
                let erased: ErasedMethod = Arc::new(
                    move |instance: &(dyn Any + Send + Sync),
                          call: &Call<'_>|
                          -> Result<Value, DispatchError> {
                        let typed = instance.downcast_ref::<S>().ok_or_else(|| {
                            DispatchError::internal(format!(
                                "{}:{} dispatched to an instance of the wrong type",
                                call.service(),
                                call.method()
                            ))
                        })?;
                        handler(typed, call)
                    },
                );
                (name, erased)
            })
            .collect();
        Self { methods }
    }
}

impl std::fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.method_names().collect();
        names.sort_unstable();
        f.debug_struct("DispatchTable").field("methods", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        start: i64,
    }

    impl ServiceInstance for Counter {}

    #[test]
    fn table_erases_handlers_by_name() {
        let table: DispatchTable = MethodTable::<Counter>::new()
            .method("start", |counter, _call| Ok(Value::Int(counter.start)))
            .method("noop", |_, _| Ok(Value::Null))
            .into();
        assert!(table.contains("start"));
        assert!(table.contains("noop"));
        assert!(!table.contains("stop"));
        let mut names: Vec<_> = table.method_names().collect();
        names.sort_unstable();
        assert_eq!(names, ["noop", "start"]);
    }
}
