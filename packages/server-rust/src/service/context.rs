use std::sync::Arc;

use switchyard_core::{
    ConversionOptions, MetadataCatalog, RuleRegistry, ValidationRule, ValueConverter,
};

use super::{ImplementationRegistry, MethodTable, RequestScope, ServiceInstance};
use crate::capability::{Capability, CapabilityCategory, CapabilityRegistry};
use crate::config::DispatchConfig;
use crate::content::{ContentTypeEncoder, ContentTypeRegistry};
use crate::error::SetupError;

// ---------------------------------------------------------------------------
// DispatchContext
// ---------------------------------------------------------------------------

/// Everything shared by all requests: descriptors, implementations,
/// capabilities, validation rules, encoders, and configuration.
///
/// Built once at startup and verified for consistency; immutable afterwards.
#[derive(Debug)]
pub struct DispatchContext {
    catalog: MetadataCatalog,
    implementations: ImplementationRegistry,
    capabilities: CapabilityRegistry,
    rules: RuleRegistry,
    content_types: ContentTypeRegistry,
    config: DispatchConfig,
}

impl DispatchContext {
    #[must_use]
    pub fn builder(catalog: MetadataCatalog) -> DispatchContextBuilder {
        DispatchContextBuilder {
            context: Self {
                catalog,
                implementations: ImplementationRegistry::new(),
                capabilities: CapabilityRegistry::new(),
                rules: RuleRegistry::with_defaults(),
                content_types: ContentTypeRegistry::with_defaults(),
                config: DispatchConfig::default(),
            },
        }
    }

    #[must_use]
    pub fn catalog(&self) -> &MetadataCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn implementations(&self) -> &ImplementationRegistry {
        &self.implementations
    }

    #[must_use]
    pub fn capabilities(&self) -> &CapabilityRegistry {
        &self.capabilities
    }

    #[must_use]
    pub fn rules(&self) -> &RuleRegistry {
        &self.rules
    }

    #[must_use]
    pub fn content_types(&self) -> &ContentTypeRegistry {
        &self.content_types
    }

    #[must_use]
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    #[must_use]
    pub fn conversion(&self) -> &ConversionOptions {
        &self.config.conversion
    }

    /// Converter for request values and service results.
    #[must_use]
    pub fn converter(&self) -> ValueConverter<'_> {
        ValueConverter::new(&self.catalog, &self.config.conversion)
    }

    /// Checks that every version's implementation is registered and handles
    /// every method of its service, and that every capability referenced by
    /// versions or assertions is registered.
    fn verify(&self) -> Result<(), SetupError> {
        self.catalog.verify(&self.rules)?;

        let mut services: Vec<_> = self.catalog.services().collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        for service in services {
            for (version, implementation) in &service.versions {
                if !self.implementations.contains(&implementation.id) {
                    return Err(SetupError::MissingImplementation {
                        service: service.name.clone(),
                        version: *version,
                        implementation: implementation.id.clone(),
                    });
                }
                if let Some(method) = service
                    .methods
                    .iter()
                    .find(|method| !self.implementations.handles(&implementation.id, &method.name))
                {
                    return Err(SetupError::MissingHandler {
                        service: service.name.clone(),
                        implementation: implementation.id.clone(),
                        method: method.name.clone(),
                    });
                }
                if let Some(capability) = &implementation.capability {
                    self.require_capability(capability, || {
                        format!("{} version {version}", service.name)
                    })?;
                }
            }
            for method in &service.methods {
                for capability in &method.assertions {
                    self.require_capability(capability, || {
                        format!("{}:{}", service.name, method.name)
                    })?;
                }
            }
        }
        Ok(())
    }

    fn require_capability(
        &self,
        capability: &str,
        owner: impl FnOnce() -> String,
    ) -> Result<(), SetupError> {
        if self.capabilities.contains(capability) {
            Ok(())
        } else {
            Err(SetupError::UnknownCapability {
                owner: owner(),
                capability: capability.to_string(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// DispatchContextBuilder
// ---------------------------------------------------------------------------

/// Collects registrations for a [`DispatchContext`].
///
/// Starts with the built-in validation rules and the JSON, form, and
/// multipart encoders.
#[derive(Debug)]
pub struct DispatchContextBuilder {
    context: DispatchContext,
}

impl DispatchContextBuilder {
    /// Registers the code behind implementation id `id`.
    #[must_use]
    pub fn implementation<S, F>(mut self, id: impl Into<String>, factory: F, methods: MethodTable<S>) -> Self
    where
        S: ServiceInstance,
        F: Fn() -> S + Send + Sync + 'static,
    {
        self.context.implementations.register(id, factory, methods);
        self
    }

    #[must_use]
    pub fn capability<F, C>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&RequestScope) -> anyhow::Result<C> + Send + Sync + 'static,
        C: Capability + 'static,
    {
        self.context.capabilities.register(name, factory);
        self
    }

    #[must_use]
    pub fn capability_fn<F>(mut self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&RequestScope) -> bool + Send + Sync + 'static,
    {
        self.context.capabilities.register_fn(name, predicate);
        self
    }

    #[must_use]
    pub fn capability_fn_as<F>(
        mut self,
        name: impl Into<String>,
        category: CapabilityCategory,
        predicate: F,
    ) -> Self
    where
        F: Fn(&RequestScope) -> bool + Send + Sync + 'static,
    {
        self.context
            .capabilities
            .register_fn_as(name, category, predicate);
        self
    }

    /// Adds or replaces a validation rule.
    #[must_use]
    pub fn rule(mut self, name: &str, rule: impl ValidationRule + 'static) -> Self {
        self.context.rules.register(name, rule);
        self
    }

    #[must_use]
    pub fn content_type(mut self, encoder: impl ContentTypeEncoder + 'static) -> Self {
        self.context.content_types.register(encoder);
        self
    }

    /// Registers `encoder` and uses it for requests without a `Content-Type`.
    #[must_use]
    pub fn default_content_type(mut self, encoder: impl ContentTypeEncoder + 'static) -> Self {
        self.context.content_types.set_default(encoder);
        self
    }

    #[must_use]
    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.context.config = config;
        self
    }

    /// Verifies the registrations against the catalog and freezes them.
    ///
    /// # Errors
    ///
    /// Returns the first inconsistency: catalog errors, versions without a
    /// registered implementation, implementations missing a method handler,
    /// or references to unregistered capabilities.
    pub fn build(self) -> Result<Arc<DispatchContext>, SetupError> {
        let context = self.context;
        context.verify()?;
        tracing::info!(
            services = context.catalog.services().count(),
            implementations = context.implementations.ids().count(),
            environment = ?context.config.environment,
            "dispatch context ready"
        );
        Ok(Arc::new(context))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
