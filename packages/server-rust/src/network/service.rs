//! Tower entry point: a [`Router`] exposed as `Service<http::Request<Bytes>>`.

use std::future::{ready, Ready};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use switchyard_core::DispatchError;
use tower::Service;

use crate::routing::Router;

/// Cloneable tower service dispatching HTTP requests through a shared router.
///
/// Dispatch is synchronous, so the returned future is always ready. Errors no
/// handler claimed surface as the service error; host layers decide how to
/// render them.
#[derive(Debug, Clone)]
pub struct DispatchService {
    router: Arc<Router>,
}

impl DispatchService {
    #[must_use]
    pub fn new(router: Arc<Router>) -> Self {
        Self { router }
    }

    #[must_use]
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }
}

impl From<Router> for DispatchService {
    fn from(router: Router) -> Self {
        Self::new(Arc::new(router))
    }
}

impl Service<http::Request<Bytes>> for DispatchService {
    type Response = http::Response<Bytes>;
    type Error = DispatchError;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: http::Request<Bytes>) -> Self::Future {
        ready(self.router.handle(request))
    }
}
