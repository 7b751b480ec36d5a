//! Process-wide store of service, composite, and enum descriptors.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::descriptor::{
    BodyBinding, CompositeDescriptor, EnumDescriptor, MethodDescriptor, RuleBinding,
    ServiceDescriptor, TypeDescriptor, ValueDescriptor,
};
use crate::validation::RuleRegistry;

/// Inconsistencies found by [`MetadataCatalog::verify`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("unknown composite type {name} referenced by {owner}")]
    UnknownComposite { name: String, owner: String },
    #[error("unknown enum {name} referenced by {owner}")]
    UnknownEnum { name: String, owner: String },
    #[error("unknown service {name} referenced by {owner}")]
    UnknownService { name: String, owner: String },
    #[error("unknown validation rule {rule} referenced by {owner}")]
    UnknownRule { rule: String, owner: String },
    #[error("{service}:{method} binds unknown parameter {parameter}")]
    UnknownParameter {
        service: String,
        method: String,
        parameter: String,
    },
    #[error("{owner} declares no type")]
    MissingType { owner: String },
    #[error("service {service} uses version name {name} more than once")]
    DuplicateVersionName { service: String, name: String },
}

/// Serialized form of a catalog, as emitted by the metadata generator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogDocument {
    pub services: Vec<ServiceDescriptor>,
    pub composites: Vec<CompositeDescriptor>,
    pub enums: Vec<EnumDescriptor>,
}

/// Read-only descriptor lookup, built once before traffic starts.
#[derive(Debug, Clone, Default)]
pub struct MetadataCatalog {
    services: HashMap<String, Arc<ServiceDescriptor>>,
    composites: HashMap<String, CompositeDescriptor>,
    enums: HashMap<String, EnumDescriptor>,
}

impl MetadataCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog from a generator document.
    #[must_use]
    pub fn from_document(document: CatalogDocument) -> Self {
        let mut catalog = Self::new();
        for service in document.services {
            catalog.add_service(service);
        }
        for composite in document.composites {
            catalog.add_composite(composite);
        }
        for enumeration in document.enums {
            catalog.add_enum(enumeration);
        }
        catalog
    }

    /// Parses a generator document from JSON.
    ///
    /// # Errors
    ///
    /// Returns the JSON error when the document is malformed.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json).map(Self::from_document)
    }

    pub fn add_service(&mut self, service: ServiceDescriptor) -> &mut Self {
        info!(service = %service.name, versions = service.versions.len(), "registered service");
        self.services.insert(service.name.clone(), Arc::new(service));
        self
    }

    pub fn add_composite(&mut self, composite: CompositeDescriptor) -> &mut Self {
        self.composites.insert(composite.name.clone(), composite);
        self
    }

    pub fn add_enum(&mut self, enumeration: EnumDescriptor) -> &mut Self {
        self.enums.insert(enumeration.name.clone(), enumeration);
        self
    }

    #[must_use]
    pub fn with_service(mut self, service: ServiceDescriptor) -> Self {
        self.add_service(service);
        self
    }

    #[must_use]
    pub fn with_composite(mut self, composite: CompositeDescriptor) -> Self {
        self.add_composite(composite);
        self
    }

    #[must_use]
    pub fn with_enum(mut self, enumeration: EnumDescriptor) -> Self {
        self.add_enum(enumeration);
        self
    }

    #[must_use]
    pub fn service(&self, name: &str) -> Option<&Arc<ServiceDescriptor>> {
        self.services.get(name)
    }

    #[must_use]
    pub fn composite(&self, name: &str) -> Option<&CompositeDescriptor> {
        self.composites.get(name)
    }

    #[must_use]
    pub fn enumeration(&self, name: &str) -> Option<&EnumDescriptor> {
        self.enums.get(name)
    }

    pub fn services(&self) -> impl Iterator<Item = &Arc<ServiceDescriptor>> {
        self.services.values()
    }

    /// Checks that every reference in the catalog resolves.
    ///
    /// Walks all types reachable from method parameters, return types, and
    /// composite properties. Each composite is visited once, so
    /// self-referential types terminate.
    ///
    /// # Errors
    ///
    /// Returns the first inconsistency found.
    pub fn verify(&self, rules: &RuleRegistry) -> Result<(), CatalogError> {
        let mut visited = HashSet::new();
        let mut services: Vec<_> = self.services.values().collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));

        for service in services {
            let mut names = HashSet::new();
            for implementation in service.versions.values() {
                if let Some(name) = &implementation.name {
                    if !names.insert(name.as_str()) {
                        return Err(CatalogError::DuplicateVersionName {
                            service: service.name.clone(),
                            name: name.clone(),
                        });
                    }
                }
                for dependency in &implementation.dependencies {
                    if !self.services.contains_key(&dependency.service) {
                        return Err(CatalogError::UnknownService {
                            name: dependency.service.clone(),
                            owner: implementation.id.clone(),
                        });
                    }
                }
            }
            for method in &service.methods {
                self.verify_method(service, method, rules, &mut visited)?;
            }
        }
        Ok(())
    }

    fn verify_method<'a>(
        &'a self,
        service: &ServiceDescriptor,
        method: &'a MethodDescriptor,
        rules: &RuleRegistry,
        visited: &mut HashSet<&'a str>,
    ) -> Result<(), CatalogError> {
        let owner = format!("{}:{}", service.name, method.name);
        let unknown = |parameter: &str| CatalogError::UnknownParameter {
            service: service.name.clone(),
            method: method.name.clone(),
            parameter: parameter.to_string(),
        };

        for parameter in &method.parameters {
            self.verify_value(parameter, &owner, visited, rules)?;
        }
        for ty in &method.returns {
            self.verify_type(ty, &owner, visited, rules)?;
        }
        if let Some(BodyBinding::Parameter(parameter)) = &method.body {
            if method.parameter(parameter).is_none() {
                return Err(unknown(parameter));
            }
        }
        for binding in &method.headers {
            if method.parameter(&binding.parameter).is_none() {
                return Err(unknown(&binding.parameter));
            }
        }
        for validation in &method.validations {
            if method.parameter(&validation.parameter).is_none() {
                return Err(unknown(&validation.parameter));
            }
            verify_rule(&validation.rule, &owner, rules)?;
        }
        Ok(())
    }

    fn verify_value<'a>(
        &'a self,
        value: &'a ValueDescriptor,
        owner: &str,
        visited: &mut HashSet<&'a str>,
        rules: &RuleRegistry,
    ) -> Result<(), CatalogError> {
        let owner = format!("{owner}.{}", value.name);
        if value.types.is_empty() {
            return Err(CatalogError::MissingType { owner });
        }
        if let Some(enumeration) = &value.enumeration {
            if !self.enums.contains_key(enumeration) {
                return Err(CatalogError::UnknownEnum {
                    name: enumeration.clone(),
                    owner,
                });
            }
        }
        for ty in &value.types {
            self.verify_type(ty, &owner, visited, rules)?;
        }
        Ok(())
    }

    fn verify_type<'a>(
        &'a self,
        ty: &'a TypeDescriptor,
        owner: &str,
        visited: &mut HashSet<&'a str>,
        rules: &RuleRegistry,
    ) -> Result<(), CatalogError> {
        let Some(name) = ty.composite_name() else {
            return Ok(());
        };
        if !visited.insert(name) {
            return Ok(());
        }
        let composite = self
            .composites
            .get(name)
            .ok_or_else(|| CatalogError::UnknownComposite {
                name: name.to_string(),
                owner: owner.to_string(),
            })?;
        for property in &composite.properties {
            self.verify_value(&property.value, &composite.name, visited, rules)?;
            for rule in &property.rules {
                verify_rule(rule, &format!("{}.{}", composite.name, property.name), rules)?;
            }
        }
        Ok(())
    }
}

fn verify_rule(rule: &RuleBinding, owner: &str, rules: &RuleRegistry) -> Result<(), CatalogError> {
    if rules.contains(&rule.rule) {
        Ok(())
    } else {
        Err(CatalogError::UnknownRule {
            rule: rule.rule.clone(),
            owner: owner.to_string(),
        })
    }
}
