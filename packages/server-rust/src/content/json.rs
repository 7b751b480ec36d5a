use bytes::Bytes;
use switchyard_core::{DispatchError, ErrorKind, Value};

use super::{body_text, ContentTypeEncoder};

/// `application/json` bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl ContentTypeEncoder for JsonEncoder {
    fn content_type(&self) -> &str {
        "application/json"
    }

    fn decode(&self, body: Value) -> Result<Value, DispatchError> {
        let text = match body_text(body) {
            Ok(text) => text,
            // Hosts may hand over an already structured body.
            Err(structured) => return Ok(structured),
        };
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(json) => Ok(Value::from_json(json)),
            Err(err) => {
                tracing::debug!(error = %err, "rejecting malformed JSON body");
                Err(DispatchError::api(ErrorKind::InvalidBody, "Invalid body content"))
            }
        }
    }

    fn encode(&self, value: &Value) -> Result<Bytes, DispatchError> {
        serde_json::to_vec(&value.to_json())
            .map(Bytes::from)
            .map_err(|err| DispatchError::Internal(err.into()))
    }
}
