use std::any::Any;
use std::sync::{Arc, Weak};

use switchyard_core::{DispatchError, ServiceDescriptor, Validator, Value};

use super::{Call, DispatchTable, RequestScope};

/// Handle to a resolved service instance.
///
/// Every call goes through the method's capability assertions and argument
/// validation before reaching the implementation, whether it comes from the
/// router or from another service.
#[derive(Clone)]
pub struct ServiceProxy {
    scope: Weak<RequestScope>,
    descriptor: Arc<ServiceDescriptor>,
    implementation: String,
    instance: Arc<dyn Any + Send + Sync>,
    table: Arc<DispatchTable>,
}

impl ServiceProxy {
    pub(crate) fn new(
        scope: Weak<RequestScope>,
        descriptor: Arc<ServiceDescriptor>,
        implementation: String,
        instance: Arc<dyn Any + Send + Sync>,
        table: Arc<DispatchTable>,
    ) -> Self {
        Self {
            scope,
            descriptor,
            implementation,
            instance,
            table,
        }
    }

    #[must_use]
    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    /// Id of the implementation behind this proxy.
    #[must_use]
    pub fn implementation(&self) -> &str {
        &self.implementation
    }

    /// The concrete instance, when it is a `T`.
    #[must_use]
    pub fn instance<T: Any>(&self) -> Option<&T> {
        (*self.instance).downcast_ref::<T>()
    }

    /// Calls `method` with positional, already converted arguments.
    ///
    /// # Errors
    ///
    /// - The API error of a failing capability assertion.
    /// - [`DispatchError::Validation`] for invalid arguments.
    /// - Whatever the implementation returns; validation failures raised
    ///   inside the implementation are marked as not visible to the client.
    /// - Internal errors for missing metadata, missing handlers, or a request
    ///   scope that has already ended.
    pub fn call(&self, method: &str, args: &[Value]) -> Result<Value, DispatchError> {
        let scope = self
            .scope
            .upgrade()
            .ok_or_else(|| DispatchError::internal("Request scope has already ended"))?;
        let service = &self.descriptor.name;
        let metadata = self.descriptor.find_method(method).ok_or_else(|| {
            DispatchError::internal(format!(
                "Service {} does not have metadata for method {method}",
                self.implementation
            ))
        })?;

        for capability in &metadata.assertions {
            scope.assert_capability(capability)?;
        }

        let context = scope.context();
        Validator::new(context.catalog(), context.rules())
            .with_max_depth(context.config().conversion.max_depth)
            .validate_call(service, metadata, args)?;

        let handler = self.table.get(method).ok_or_else(|| {
            DispatchError::internal(format!(
                "{} does not implement {service}:{method}",
                self.implementation
            ))
        })?;
        tracing::trace!(request = %scope.id(), %service, %method, "calling service method");
        match handler(&*self.instance, &Call::new(&scope, service, method, args)) {
            Err(DispatchError::Validation(failure)) => {
                Err(DispatchError::Validation(failure.hidden()))
            }
            other => other,
        }
    }
}

impl std::fmt::Debug for ServiceProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceProxy")
            .field("service", &self.descriptor.name)
            .field("implementation", &self.implementation)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
