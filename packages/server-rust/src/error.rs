use switchyard_core::CatalogError;

/// Configuration mistakes detected while wiring a dispatcher together.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("service {service} version {version} uses implementation {implementation}, which is not registered")]
    MissingImplementation {
        service: String,
        version: u32,
        implementation: String,
    },

    #[error("implementation {implementation} of {service} has no handler for method {method}")]
    MissingHandler {
        service: String,
        implementation: String,
        method: String,
    },

    #[error("{owner} requires capability {capability}, which is not registered")]
    UnknownCapability { owner: String, capability: String },

    #[error("cannot bind {http_method} {route}: {service} is not a known service")]
    UnknownService {
        route: String,
        http_method: http::Method,
        service: String,
    },

    #[error("unknown method {service}:{method} for {http_method} {route}")]
    UnknownMethod {
        route: String,
        http_method: http::Method,
        service: String,
        method: String,
    },

    #[error("invalid routing entry for {route}: {message}")]
    InvalidRouteEntry { route: String, message: String },

    #[error("invalid route template {template}: {source}")]
    InvalidRoute {
        template: String,
        #[source]
        source: regex::Error,
    },
}
