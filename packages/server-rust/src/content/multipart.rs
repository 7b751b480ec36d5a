use bytes::Bytes;
use switchyard_core::{DispatchError, Value};

use super::form::encode_body;
use super::ContentTypeEncoder;

/// `multipart/form-data` bodies. The host parses multipart requests itself
/// and exposes parts as request fields and uploaded files, so the body passes
/// through as given.
#[derive(Debug, Clone, Copy, Default)]
pub struct MultipartFormDataEncoder;

impl ContentTypeEncoder for MultipartFormDataEncoder {
    fn content_type(&self) -> &str {
        "multipart/form-data"
    }

    fn decode(&self, body: Value) -> Result<Value, DispatchError> {
        Ok(body)
    }

    fn encode(&self, value: &Value) -> Result<Bytes, DispatchError> {
        Ok(Bytes::from(encode_body(value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_is_identity() {
        let body = Value::Bytes(b"--boundary".to_vec());
        assert_eq!(MultipartFormDataEncoder.decode(body.clone()).unwrap(), body);
    }

    #[test]
    fn encodes_mappings_as_query() {
        let mut map = indexmap::IndexMap::new();
        map.insert("a".to_string(), Value::Int(1));
        let bytes = MultipartFormDataEncoder.encode(&Value::Map(map)).unwrap();
        assert_eq!(&bytes[..], b"a=1");
    }
}
