//! Service resolution: implementations, per-request scopes, and proxies.

pub mod context;
pub mod instance;
pub mod proxy;
pub mod registry;
pub mod scope;

pub use context::{DispatchContext, DispatchContextBuilder};
pub use instance::{Call, DispatchTable, MethodTable, ServiceInstance};
pub use proxy::ServiceProxy;
pub use registry::ImplementationRegistry;
pub use scope::{RequestInfo, RequestScope};
