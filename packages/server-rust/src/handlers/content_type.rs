use http::header::CONTENT_TYPE;
use http::HeaderValue;
use switchyard_core::{DispatchError, ErrorKind, Value};

use super::RequestHandler;
use crate::content::ContentTypeRegistry;
use crate::network::{Request, Response};

/// Decodes request bodies and encodes response bodies according to the
/// request's `Content-Type`.
#[derive(Debug, Clone)]
pub struct ContentTypeHandler {
    registry: ContentTypeRegistry,
}

impl ContentTypeHandler {
    #[must_use]
    pub fn new(registry: ContentTypeRegistry) -> Self {
        Self { registry }
    }
}

impl RequestHandler for ContentTypeHandler {
    fn pre_process(
        &self,
        request: &mut dyn Request,
        _response: &mut dyn Response,
    ) -> Result<bool, DispatchError> {
        let content_type = request.header(CONTENT_TYPE.as_str()).map(str::to_string);
        let Some(encoder) = self.registry.encoder_for(content_type.as_deref()) else {
            let content_type = content_type.unwrap_or_default();
            return Err(DispatchError::api_with(
                ErrorKind::InvalidContentType,
                format!("Content-Type '{content_type}' not allowed"),
                "content_type",
                content_type,
            ));
        };
        let decoded = encoder.decode(request.body().clone())?;
        request.set_body(decoded);
        Ok(true)
    }

    fn post_response(
        &self,
        request: &mut dyn Request,
        response: &mut dyn Response,
    ) -> Result<bool, DispatchError> {
        // Responses to requests with an unsupported type use the default.
        let encoder = self
            .registry
            .encoder_for(request.header(CONTENT_TYPE.as_str()))
            .or_else(|| self.registry.default_encoder());
        let Some(encoder) = encoder else {
            return Ok(false);
        };
        let header = HeaderValue::from_str(encoder.content_type())
            .map_err(|err| DispatchError::Internal(err.into()))?;
        response.set_header(CONTENT_TYPE, header);
        if !matches!(response.body(), Value::Null | Value::Bytes(_)) {
            let encoded = encoder.encode(response.body())?;
            response.set_body(Value::Bytes(encoded.to_vec()));
        }
        Ok(true)
    }
}
