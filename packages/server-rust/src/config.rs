use serde::Deserialize;
use switchyard_core::ConversionOptions;

/// Deployment environment. Internal error details are only rendered to
/// clients outside [`Environment::Live`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Live,
}

/// Dispatcher-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Controls how much internal detail error responses carry.
    pub environment: Environment,
    /// Date format, null filtering, and nesting limits for value conversion.
    pub conversion: ConversionOptions,
    /// Install the built-in content-type, status-code, and exception handlers
    /// when the router is created.
    pub register_default_handlers: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            conversion: ConversionOptions::default(),
            register_default_handlers: true,
        }
    }
}
