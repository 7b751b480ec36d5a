use indexmap::IndexMap;
use serde::Deserialize;
use switchyard_core::VersionSelector;

use super::MethodBinding;

/// Declarative routing table, typically loaded from a JSON file next to the
/// metadata catalog.
///
/// ```json
/// {
///   "add_default_handlers": true,
///   "routes": {
///     "/users/$id": {
///       "GET": "Users:get",
///       "PUT": { "service": "Users", "method": "update", "version": 2 }
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RoutingDocument {
    pub add_default_handlers: Option<bool>,
    /// Route templates in match order, each mapping HTTP methods to targets.
    pub routes: IndexMap<String, IndexMap<String, RouteTarget>>,
}

impl RoutingDocument {
    /// # Errors
    ///
    /// Returns the JSON error when the document is malformed.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Where one HTTP method of a route dispatches to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RouteTarget {
    /// `Service:method`, resolved to the highest permitted version.
    Short(String),
    Full {
        service: String,
        method: String,
        #[serde(default)]
        version: Option<VersionSelector>,
    },
}

impl RouteTarget {
    pub(crate) fn into_binding(self) -> Option<MethodBinding> {
        match self {
            Self::Short(target) => {
                let (service, method) = target.split_once(':')?;
                if service.is_empty() || method.is_empty() {
                    return None;
                }
                Some(MethodBinding {
                    service: service.to_string(),
                    method: method.to_string(),
                    version: None,
                })
            }
            Self::Full {
                service,
                method,
                version,
            } => Some(MethodBinding {
                service,
                method,
                version,
            }),
        }
    }
}
