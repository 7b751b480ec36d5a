use http::StatusCode;
use switchyard_core::DispatchError;

use super::RequestHandler;
use crate::network::{Request, Response};

/// Picks a status when no stage chose one: 204 for an empty body, 200 otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpStatusCodeHandler;

impl RequestHandler for HttpStatusCodeHandler {
    fn post_response(
        &self,
        _request: &mut dyn Request,
        response: &mut dyn Response,
    ) -> Result<bool, DispatchError> {
        if response.status().is_none() {
            let status = if response.body().is_null() {
                StatusCode::NO_CONTENT
            } else {
                StatusCode::OK
            };
            response.set_status(status);
        }
        Ok(false)
    }
}
