use std::any::Any;
use std::collections::HashSet;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use http::{HeaderMap, Method};
use indexmap::IndexMap;
use parking_lot::Mutex;
use switchyard_core::{
    DispatchError, ImplementationDescriptor, ServiceDescriptor, Value, VersionSelector,
};
use uuid::Uuid;

use super::{DispatchContext, ServiceProxy};
use crate::capability::{self, Capability};
use crate::network::Request;

// ---------------------------------------------------------------------------
// RequestInfo
// ---------------------------------------------------------------------------

/// Snapshot of the request taken once its arguments are assembled; what
/// capabilities and service hooks get to see.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub method: Method,
    pub uri: String,
    pub headers: HeaderMap,
    pub fields: IndexMap<String, Value>,
}

impl RequestInfo {
    #[must_use]
    pub fn from_request(request: &dyn Request) -> Self {
        Self {
            method: request.method().clone(),
            uri: request.uri().to_string(),
            headers: request.headers().clone(),
            fields: request.fields().clone(),
        }
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

// ---------------------------------------------------------------------------
// RequestScope
// ---------------------------------------------------------------------------

/// Per-request service container.
///
/// Caches one instance per implementation and one instance per capability,
/// so every resolution within a request shares them. Dropped with the request.
pub struct RequestScope {
    id: Uuid,
    this: Weak<RequestScope>,
    context: Arc<DispatchContext>,
    request: RequestInfo,
    instances: DashMap<String, Arc<dyn Any + Send + Sync>>,
    capabilities: DashMap<String, Arc<dyn Capability>>,
    /// Implementations currently being built, for cycle detection.
    resolving: Mutex<HashSet<String>>,
}

impl RequestScope {
    #[must_use]
    pub fn new(context: Arc<DispatchContext>, request: RequestInfo) -> Arc<Self> {
        Self::with_id(Uuid::new_v4(), context, request)
    }

    /// A scope for a request whose id was already assigned, so its logs join
    /// the router's `dispatch` span.
    #[must_use]
    pub fn with_id(id: Uuid, context: Arc<DispatchContext>, request: RequestInfo) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            id,
            this: this.clone(),
            context,
            request,
            instances: DashMap::new(),
            capabilities: DashMap::new(),
            resolving: Mutex::new(HashSet::new()),
        })
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn context(&self) -> &Arc<DispatchContext> {
        &self.context
    }

    #[must_use]
    pub fn request(&self) -> &RequestInfo {
        &self.request
    }

    /// Resolves a proxy for `service`.
    ///
    /// Without a version selector the highest version the request may use is
    /// chosen; versions whose capability fails are skipped. With a selector,
    /// exactly that version must exist and pass its capability.
    ///
    /// # Errors
    ///
    /// Internal error when the service is unknown, no version qualifies,
    /// dependencies form a cycle, or building the instance fails.
    pub fn service(
        &self,
        service: &str,
        version: Option<&VersionSelector>,
    ) -> Result<ServiceProxy, DispatchError> {
        let descriptor = self
            .context
            .catalog()
            .service(service)
            .ok_or_else(|| DispatchError::internal(format!("No service {service} found")))?;
        let implementation = self.select_version(descriptor, version)?;
        let instance = self.instance(implementation)?;
        let table = self
            .context
            .implementations()
            .get(&implementation.id)
            .map(|registered| Arc::clone(registered.table()))
            .ok_or_else(|| no_implementation(&implementation.id))?;
        Ok(ServiceProxy::new(
            self.this.clone(),
            Arc::clone(descriptor),
            implementation.id.clone(),
            instance,
            table,
        ))
    }

    fn select_version<'d>(
        &self,
        descriptor: &'d ServiceDescriptor,
        version: Option<&VersionSelector>,
    ) -> Result<&'d ImplementationDescriptor, DispatchError> {
        let selected = match version {
            None => {
                let mut found = None;
                for implementation in descriptor.versions.values().rev() {
                    if self.permits(implementation)? {
                        found = Some(implementation);
                        break;
                    }
                }
                found
            }
            Some(VersionSelector::Number(number)) => match descriptor.versions.get(number) {
                Some(implementation) if self.permits(implementation)? => Some(implementation),
                _ => None,
            },
            Some(VersionSelector::Name(name)) => match descriptor.version_named(name) {
                Some(implementation) if self.permits(implementation)? => Some(implementation),
                _ => None,
            },
        };
        selected.ok_or_else(|| {
            let wanted = version.map_or_else(|| "any version".to_string(), ToString::to_string);
            DispatchError::internal(format!(
                "Version not found or request does not have rights to use {wanted} of service {}",
                descriptor.name
            ))
        })
    }

    fn permits(&self, implementation: &ImplementationDescriptor) -> Result<bool, DispatchError> {
        let Some(name) = &implementation.capability else {
            return Ok(true);
        };
        let passed = self.check_capability(name)?;
        if !passed {
            tracing::debug!(
                request = %self.id,
                implementation = %implementation.id,
                capability = %name,
                "skipping version, capability not granted"
            );
        }
        Ok(passed)
    }

    fn instance(
        &self,
        implementation: &ImplementationDescriptor,
    ) -> Result<Arc<dyn Any + Send + Sync>, DispatchError> {
        let id = &implementation.id;
        if let Some(cached) = self.instances.get(id) {
            return Ok(Arc::clone(cached.value()));
        }
        let registered = self
            .context
            .implementations()
            .get(id)
            .ok_or_else(|| no_implementation(id))?;
        if !self.resolving.lock().insert(id.clone()) {
            return Err(DispatchError::internal(format!(
                "Circular dependency detected while resolving {id}"
            )));
        }
        // No map guard may be held here: building resolves dependencies
        // through this same scope.
        let built = registered.build(self, implementation);
        self.resolving.lock().remove(id);
        let instance = built?;
        tracing::debug!(request = %self.id, implementation = %id, "service instance created");
        self.instances.insert(id.clone(), Arc::clone(&instance));
        Ok(instance)
    }

    /// The named capability for this request, created on first use.
    ///
    /// # Errors
    ///
    /// Internal error for an unregistered capability.
    pub fn capability(&self, name: &str) -> Result<Arc<dyn Capability>, DispatchError> {
        if let Some(cached) = self.capabilities.get(name) {
            return Ok(Arc::clone(cached.value()));
        }
        let created = self.context.capabilities().create(name, self)?;
        self.capabilities
            .insert(name.to_string(), Arc::clone(&created));
        Ok(created)
    }

    /// # Errors
    ///
    /// Internal error for an unregistered capability.
    pub fn check_capability(&self, name: &str) -> Result<bool, DispatchError> {
        Ok(self.capability(name)?.check())
    }

    /// Fails with the capability's own category and message when it does not pass.
    ///
    /// # Errors
    ///
    /// The capability's API error, or an internal error when it is unregistered.
    pub fn assert_capability(&self, name: &str) -> Result<(), DispatchError> {
        let capability = self.capability(name)?;
        if capability.check() {
            Ok(())
        } else {
            Err(capability::denied(capability.as_ref()))
        }
    }
}

fn no_implementation(id: &str) -> DispatchError {
    DispatchError::internal(format!("No implementation registered for {id}"))
}

impl std::fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestScope")
            .field("id", &self.id)
            .field("method", &self.request.method)
            .field("uri", &self.request.uri)
            .field("instances", &self.instances.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use switchyard_core::{ImplementationDescriptor, MetadataCatalog, MethodDescriptor};

    use super::*;
    use crate::service::{MethodTable, ServiceInstance};

    struct Named(&'static str);

    impl ServiceInstance for Named {}

    fn named_table() -> MethodTable<Named> {
        MethodTable::new().method("name", |named: &Named, _| Ok(Value::from(named.0)))
    }

    fn request() -> RequestInfo {
        RequestInfo {
            method: Method::GET,
            uri: "/".to_string(),
            headers: HeaderMap::new(),
            fields: IndexMap::new(),
        }
    }

    fn versioned_context(admin: bool) -> Arc<DispatchContext> {
        let service = ServiceDescriptor::new("Greeter")
            .method(MethodDescriptor::new("name").returns("string"))
            .version(1, ImplementationDescriptor::new("greeter.v1").named("classic"))
            .version(2, ImplementationDescriptor::new("greeter.v2"))
            .version(3, ImplementationDescriptor::new("greeter.v3").requires("admin"));
        DispatchContext::builder(MetadataCatalog::new().with_service(service))
            .implementation("greeter.v1", || Named("v1"), named_table())
            .implementation("greeter.v2", || Named("v2"), named_table())
            .implementation("greeter.v3", || Named("v3"), named_table())
            .capability_fn("admin", move |_| admin)
            .build()
            .unwrap()
    }

    fn resolved_name(scope: &RequestScope, version: Option<&VersionSelector>) -> Value {
        scope
            .service("Greeter", version)
            .unwrap()
            .call("name", &[])
            .unwrap()
    }

    // -----------------------------------------------------------------------
    // Version selection
    // -----------------------------------------------------------------------

    #[test]
    fn highest_permitted_version_wins() {
        let scope = RequestScope::new(versioned_context(true), request());
        assert_eq!(resolved_name(&scope, None), Value::from("v3"));

        let scope = RequestScope::new(versioned_context(false), request());
        assert_eq!(resolved_name(&scope, None), Value::from("v2"));
    }

    #[test]
    fn explicit_versions_by_number_and_name() {
        let scope = RequestScope::new(versioned_context(false), request());
        assert_eq!(
            resolved_name(&scope, Some(&VersionSelector::Number(1))),
            Value::from("v1")
        );
        assert_eq!(
            resolved_name(&scope, Some(&VersionSelector::Name("classic".to_string()))),
            Value::from("v1")
        );
    }

    #[test]
    fn explicit_version_without_rights_fails() {
        let scope = RequestScope::new(versioned_context(false), request());
        let err = scope
            .service("Greeter", Some(&VersionSelector::Number(3)))
            .unwrap_err();
        assert!(matches!(err, DispatchError::Internal(_)));
        assert!(err
            .to_string()
            .contains("Version not found or request does not have rights to use version #3 of service Greeter"));

        let err = scope
            .service("Greeter", Some(&VersionSelector::Number(9)))
            .unwrap_err();
        assert!(err.to_string().contains("version #9"));
    }

    #[test]
    fn unknown_service_is_internal() {
        let scope = RequestScope::new(versioned_context(true), request());
        let err = scope.service("Nope", None).unwrap_err();
        assert!(err.to_string().contains("No service Nope found"));
    }

    // -----------------------------------------------------------------------
    // Caching and injection
    // -----------------------------------------------------------------------

    struct Counted;

    impl ServiceInstance for Counted {}

    #[test]
    fn instances_are_cached_per_request() {
        static BUILT: AtomicUsize = AtomicUsize::new(0);
        let service = ServiceDescriptor::new("Counted")
            .method(MethodDescriptor::new("ping"))
            .version(1, ImplementationDescriptor::new("counted"));
        let context = DispatchContext::builder(MetadataCatalog::new().with_service(service))
            .implementation(
                "counted",
                || {
                    BUILT.fetch_add(1, Ordering::SeqCst);
                    Counted
                },
                MethodTable::new().method("ping", |_: &Counted, _| Ok(Value::Null)),
            )
            .build()
            .unwrap();

        let scope = RequestScope::new(Arc::clone(&context), request());
        scope.service("Counted", None).unwrap();
        scope.service("Counted", None).unwrap();
        assert_eq!(BUILT.load(Ordering::SeqCst), 1);

        let other = RequestScope::new(context, request());
        other.service("Counted", None).unwrap();
        assert_eq!(BUILT.load(Ordering::SeqCst), 2);
    }

    struct Front {
        back: Option<ServiceProxy>,
        initialized: bool,
    }

    impl ServiceInstance for Front {
        fn inject(&mut self, property: &str, service: ServiceProxy) -> anyhow::Result<()> {
            match property {
                "back" => {
                    self.back = Some(service);
                    Ok(())
                }
                other => anyhow::bail!("unknown property {other}"),
            }
        }

        fn after_initialize(&mut self, _scope: &RequestScope) -> anyhow::Result<()> {
            self.initialized = self.back.is_some();
            Ok(())
        }
    }

    #[test]
    fn dependencies_are_injected_before_initialization() {
        let back = ServiceDescriptor::new("Back")
            .method(MethodDescriptor::new("name").returns("string"))
            .version(1, ImplementationDescriptor::new("back"));
        let front = ServiceDescriptor::new("Front")
            .method(MethodDescriptor::new("relay").returns("string"))
            .version(
                1,
                ImplementationDescriptor::new("front").inject("back", "Back", None),
            );
        let context = DispatchContext::builder(
            MetadataCatalog::new().with_service(back).with_service(front),
        )
        .implementation("back", || Named("back"), named_table())
        .implementation(
            "front",
            || Front {
                back: None,
                initialized: false,
            },
            MethodTable::new().method("relay", |front: &Front, _| {
                if !front.initialized {
                    return Err(DispatchError::internal("not initialized"));
                }
                match &front.back {
                    Some(back) => back.call("name", &[]),
                    None => Ok(Value::Null),
                }
            }),
        )
        .build()
        .unwrap();

        let scope = RequestScope::new(context, request());
        let relayed = scope.service("Front", None).unwrap().call("relay", &[]).unwrap();
        assert_eq!(relayed, Value::from("back"));
    }

    struct Loop;

    impl ServiceInstance for Loop {
        fn inject(&mut self, _property: &str, _service: ServiceProxy) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn dependency_cycles_are_internal_errors() {
        let a = ServiceDescriptor::new("A")
            .version(1, ImplementationDescriptor::new("a").inject("b", "B", None));
        let b = ServiceDescriptor::new("B")
            .version(1, ImplementationDescriptor::new("b").inject("a", "A", None));
        let context = DispatchContext::builder(MetadataCatalog::new().with_service(a).with_service(b))
            .implementation("a", || Loop, MethodTable::new())
            .implementation("b", || Loop, MethodTable::new())
            .build()
            .unwrap();
        let scope = RequestScope::new(context, request());
        let err = scope.service("A", None).unwrap_err();
        assert!(err.to_string().contains("Circular dependency detected while resolving a"));
    }

    #[test]
    fn undeclared_injection_target_fails_resolution() {
        let back = ServiceDescriptor::new("Back")
            .method(MethodDescriptor::new("name").returns("string"))
            .version(1, ImplementationDescriptor::new("back"));
        let plain = ServiceDescriptor::new("Plain")
            .method(MethodDescriptor::new("name").returns("string"))
            .version(1, ImplementationDescriptor::new("plain").inject("back", "Back", None));
        let context = DispatchContext::builder(
            MetadataCatalog::new().with_service(back).with_service(plain),
        )
        .implementation("back", || Named("back"), named_table())
        .implementation("plain", || Named("plain"), named_table())
        .build()
        .unwrap();
        let scope = RequestScope::new(context, request());
        let err = scope.service("Plain", None).unwrap_err();
        assert!(matches!(err, DispatchError::Internal(_)));
        assert!(err.to_string().contains("has no injectable property back"));
    }

    #[test]
    fn assigned_request_id_is_kept() {
        let id = Uuid::new_v4();
        let scope = RequestScope::with_id(id, versioned_context(false), request());
        assert_eq!(scope.id(), id);
        assert_ne!(RequestScope::new(versioned_context(false), request()).id(), id);
    }

    // -----------------------------------------------------------------------
    // Capabilities
    // -----------------------------------------------------------------------

    #[test]
    fn capabilities_are_created_once_per_request() {
        static CREATED: AtomicUsize = AtomicUsize::new(0);
        let context = DispatchContext::builder(MetadataCatalog::new())
            .capability_fn("staff", |scope| {
                CREATED.fetch_add(1, Ordering::SeqCst);
                scope.request().header("x-staff").is_some()
            })
            .build()
            .unwrap();
        let scope = RequestScope::new(context, request());
        assert!(!scope.check_capability("staff").unwrap());
        assert!(!scope.check_capability("staff").unwrap());
        assert_eq!(CREATED.load(Ordering::SeqCst), 1);

        let err = scope.assert_capability("staff").unwrap_err();
        assert_eq!(err.kind(), Some(switchyard_core::ErrorKind::Forbidden));
        assert!(scope.check_capability("ghost").is_err());
    }
}
