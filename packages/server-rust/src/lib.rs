//! Switchyard Server — HTTP routing onto versioned, capability-gated services
//! with content negotiation and a pluggable request pipeline.

pub mod capability;
pub mod config;
pub mod content;
pub mod error;
pub mod handlers;
pub mod network;
pub mod routing;
pub mod service;

pub use capability::{Capability, CapabilityCategory, CapabilityRegistry, FnCapability};
pub use config::{DispatchConfig, Environment};
pub use content::{ContentTypeEncoder, ContentTypeRegistry};
pub use error::SetupError;
pub use handlers::RequestHandler;
pub use network::{DispatchService, HttpRequest, HttpResponse, Request, Response};
pub use routing::{Route, Router, RouterBuilder, RoutingDocument};
pub use service::{Call, DispatchContext, MethodTable, RequestScope, ServiceInstance, ServiceProxy};
