//! Path routing and the per-request dispatch pipeline.
//!
//! A [`Router`] holds route templates in insertion order. The first template
//! matching the request path wins; its binding for the HTTP method selects the
//! service method a [`ServiceController`] then runs.

mod controller;
mod document;
mod route;
mod router;

pub use controller::ServiceController;
pub use document::{RouteTarget, RoutingDocument};
pub use route::{MethodBinding, Route};
pub use router::{Router, RouterBuilder};
