//! Request pipeline hooks: content negotiation, status defaults, and error
//! rendering.
//!
//! Handlers run in registration order reversed: the most recently added
//! handler sees every stage first. Within a stage, a handler returning `true`
//! stops the remaining handlers from running that stage.

mod content_type;
mod exception;
mod status;

use switchyard_core::{DispatchError, Value};

use crate::network::{Request, Response};

pub use content_type::ContentTypeHandler;
pub use exception::{ApiExceptionHandler, FallbackExceptionHandler, ValidationExceptionHandler};
pub use status::HttpStatusCodeHandler;

/// Pipeline hook. Every stage defaults to doing nothing and letting the next
/// handler run.
#[allow(unused_variables)]
pub trait RequestHandler: Send + Sync {
    /// Before arguments are assembled.
    ///
    /// # Errors
    ///
    /// Any error aborts the request and goes to exception handling.
    fn pre_process(
        &self,
        request: &mut dyn Request,
        response: &mut dyn Response,
    ) -> Result<bool, DispatchError> {
        Ok(false)
    }

    /// After the service returned, on the raw result.
    ///
    /// # Errors
    ///
    /// Any error aborts the request and goes to exception handling.
    fn post_process(
        &self,
        result: &mut Value,
        request: &mut dyn Request,
        response: &mut dyn Response,
    ) -> Result<bool, DispatchError> {
        Ok(false)
    }

    /// On the wire-safe result, before it becomes the response body.
    ///
    /// # Errors
    ///
    /// Any error aborts the request and goes to exception handling.
    fn pre_response(
        &self,
        converted: &mut Value,
        request: &mut dyn Request,
        response: &mut dyn Response,
    ) -> Result<bool, DispatchError> {
        Ok(false)
    }

    /// After the body is set; also runs after a handled error.
    ///
    /// # Errors
    ///
    /// Errors here propagate to the host.
    fn post_response(
        &self,
        request: &mut dyn Request,
        response: &mut dyn Response,
    ) -> Result<bool, DispatchError> {
        Ok(false)
    }

    /// Offered every error raised while processing. Returning `true` claims
    /// it: no further handler sees it, and the response is finalized.
    fn handle_exception(
        &self,
        error: &DispatchError,
        request: &mut dyn Request,
        response: &mut dyn Response,
    ) -> bool {
        false
    }
}
