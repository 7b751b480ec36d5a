use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use switchyard_core::{DispatchError, ImplementationDescriptor};

use super::{DispatchTable, MethodTable, RequestScope, ServiceInstance};

type BuildFn = Arc<
    dyn Fn(&RequestScope, &ImplementationDescriptor) -> Result<Arc<dyn Any + Send + Sync>, DispatchError>
        + Send
        + Sync,
>;

/// A registered implementation: how to build an instance and how to call it.
#[derive(Clone)]
pub(crate) struct Implementation {
    build: BuildFn,
    table: Arc<DispatchTable>,
    type_name: &'static str,
}

impl Implementation {
    /// Creates an instance, injects its dependencies, and initializes it.
    pub(crate) fn build(
        &self,
        scope: &RequestScope,
        descriptor: &ImplementationDescriptor,
    ) -> Result<Arc<dyn Any + Send + Sync>, DispatchError> {
        (self.build)(scope, descriptor)
    }

    pub(crate) fn table(&self) -> &Arc<DispatchTable> {
        &self.table
    }
}

// ---------------------------------------------------------------------------
// ImplementationRegistry
// ---------------------------------------------------------------------------

/// Service implementations by implementation id.
///
/// The catalog says which implementation id backs each service version;
/// this registry supplies the code behind each id.
#[derive(Clone, Default)]
pub struct ImplementationRegistry {
    by_id: HashMap<String, Implementation>,
}

impl ImplementationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the implementation `id`, built by `factory` and dispatched
    /// through `methods`. Re-registering an id replaces it.
    pub fn register<S, F>(
        &mut self,
        id: impl Into<String>,
        factory: F,
        methods: MethodTable<S>,
    ) -> &mut Self
    where
        S: ServiceInstance,
        F: Fn() -> S + Send + Sync + 'static,
    {
        let build: BuildFn = Arc::new(
            move |scope: &RequestScope,
                  descriptor: &ImplementationDescriptor|
                  -> Result<Arc<dyn Any + Send + Sync>, DispatchError> {
                let mut instance = factory();
                for dependency in &descriptor.dependencies {
                    let proxy = scope.service(&dependency.service, dependency.version.as_ref())?;
                    instance
                        .inject(&dependency.property, proxy)
                        .map_err(DispatchError::Internal)?;
                }
                instance
                    .after_initialize(scope)
                    .map_err(DispatchError::Internal)?;
                Ok(Arc::new(instance))
            },
        );
        let id = id.into();
        tracing::debug!(implementation = %id, ty = std::any::type_name::<S>(), "registered implementation");
        self.by_id.insert(
            id,
            Implementation {
                build,
                table: Arc::new(methods.into()),
                type_name: std::any::type_name::<S>(),
            },
        );
        self
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Whether implementation `id` has a handler for `method`.
    #[must_use]
    pub fn handles(&self, id: &str, method: &str) -> bool {
        self.by_id
            .get(id)
            .is_some_and(|implementation| implementation.table.contains(method))
    }

    pub(crate) fn get(&self, id: &str) -> Option<&Implementation> {
        self.by_id.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.by_id.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for ImplementationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut entries: Vec<_> = self
            .by_id
            .iter()
            .map(|(id, implementation)| (id.as_str(), implementation.type_name))
            .collect();
        entries.sort_unstable();
        f.debug_struct("ImplementationRegistry")
            .field("implementations", &entries)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
