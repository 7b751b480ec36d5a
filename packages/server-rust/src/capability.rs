//! Named access predicates consulted by version selection and method
//! assertions.

use std::collections::HashMap;
use std::sync::Arc;

use switchyard_core::{DispatchError, ErrorKind};

use crate::service::RequestScope;

// ---------------------------------------------------------------------------
// Capability trait
// ---------------------------------------------------------------------------

/// How a failed capability is reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapabilityCategory {
    Unauthorized,
    PaymentRequired,
    #[default]
    Forbidden,
}

impl CapabilityCategory {
    #[must_use]
    pub fn kind(self) -> ErrorKind {
        match self {
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::PaymentRequired => ErrorKind::PaymentRequired,
            Self::Forbidden => ErrorKind::Forbidden,
        }
    }
}

/// A per-request access predicate. Instances are created once per request
/// scope and reused for every check in that request.
pub trait Capability: Send + Sync {
    fn check(&self) -> bool;

    fn error_message(&self) -> String {
        "Forbidden".to_string()
    }

    fn category(&self) -> CapabilityCategory {
        CapabilityCategory::Forbidden
    }
}

/// The API error reported when `capability` does not pass.
#[must_use]
pub fn denied(capability: &dyn Capability) -> DispatchError {
    DispatchError::api(capability.category().kind(), capability.error_message())
}

/// Capability evaluated once from a request predicate.
#[derive(Debug, Clone)]
pub struct FnCapability {
    name: String,
    passed: bool,
    category: CapabilityCategory,
}

impl Capability for FnCapability {
    fn check(&self) -> bool {
        self.passed
    }

    fn error_message(&self) -> String {
        format!("Forbidden. User has no capability {}", self.name)
    }

    fn category(&self) -> CapabilityCategory {
        self.category
    }
}

// ---------------------------------------------------------------------------
// CapabilityRegistry
// ---------------------------------------------------------------------------

type CapabilityFactory =
    Arc<dyn Fn(&RequestScope) -> anyhow::Result<Arc<dyn Capability>> + Send + Sync>;

/// Capability factories by name.
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    factories: HashMap<String, CapabilityFactory>,
}

impl CapabilityRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory building the capability for a request.
    pub fn register<F, C>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&RequestScope) -> anyhow::Result<C> + Send + Sync + 'static,
        C: Capability + 'static,
    {
        self.factories.insert(
            name.into(),
            Arc::new(
                move |scope: &RequestScope| -> anyhow::Result<Arc<dyn Capability>> {
                    Ok(Arc::new(factory(scope)?))
                },
            ),
        );
        self
    }

    /// Registers a capability decided by `predicate`, failing as
    /// [`CapabilityCategory::Forbidden`].
    pub fn register_fn<F>(&mut self, name: impl Into<String>, predicate: F) -> &mut Self
    where
        F: Fn(&RequestScope) -> bool + Send + Sync + 'static,
    {
        self.register_fn_as(name, CapabilityCategory::Forbidden, predicate)
    }

    /// Registers a capability decided by `predicate` that fails as `category`.
    pub fn register_fn_as<F>(
        &mut self,
        name: impl Into<String>,
        category: CapabilityCategory,
        predicate: F,
    ) -> &mut Self
    where
        F: Fn(&RequestScope) -> bool + Send + Sync + 'static,
    {
        let name = name.into();
        let label = name.clone();
        self.register(name, move |scope| {
            Ok(FnCapability {
                name: label.clone(),
                passed: predicate(scope),
                category,
            })
        })
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Builds the named capability for `scope`.
    ///
    /// # Errors
    ///
    /// Returns an internal error for an unregistered name or a failing factory.
    pub fn create(&self, name: &str, scope: &RequestScope) -> Result<Arc<dyn Capability>, DispatchError> {
        let factory = self.factories.get(name).ok_or_else(|| {
            DispatchError::internal(format!("No capability {name} found in index"))
        })?;
        factory(scope).map_err(DispatchError::Internal)
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
