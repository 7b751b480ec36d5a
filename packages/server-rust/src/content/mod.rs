//! Content negotiation: request body decoding and response body encoding
//! keyed by media type.

mod form;
mod json;
mod multipart;

use std::sync::Arc;

use bytes::Bytes;
use indexmap::IndexMap;
use switchyard_core::{DispatchError, Value};

pub use form::{decode_query, encode_query, FormUrlEncoder};
pub use json::JsonEncoder;
pub use multipart::MultipartFormDataEncoder;

// ---------------------------------------------------------------------------
// ContentTypeEncoder trait
// ---------------------------------------------------------------------------

/// Converts between raw HTTP bodies and structured values for one media type.
pub trait ContentTypeEncoder: Send + Sync {
    /// Media type written to the `Content-Type` response header.
    fn content_type(&self) -> &str;

    /// Turns a raw request body into a structured value.
    ///
    /// # Errors
    ///
    /// Returns [`switchyard_core::ErrorKind::InvalidBody`] when the body is
    /// not valid for this media type.
    fn decode(&self, body: Value) -> Result<Value, DispatchError>;

    /// Serializes a wire-safe value into response bytes.
    ///
    /// # Errors
    ///
    /// Returns an internal error when the value cannot be represented.
    fn encode(&self, value: &Value) -> Result<Bytes, DispatchError>;
}

// ---------------------------------------------------------------------------
// ContentTypeRegistry
// ---------------------------------------------------------------------------

/// Encoders by media type plus the default used when the request names none.
#[derive(Clone)]
pub struct ContentTypeRegistry {
    encoders: IndexMap<String, Arc<dyn ContentTypeEncoder>>,
    default: Option<Arc<dyn ContentTypeEncoder>>,
}

impl ContentTypeRegistry {
    /// Creates a registry with no encoders and no default.
    #[must_use]
    pub fn new() -> Self {
        Self {
            encoders: IndexMap::new(),
            default: None,
        }
    }

    /// JSON (also the default), URL-encoded forms, and multipart forms.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let json: Arc<dyn ContentTypeEncoder> = Arc::new(JsonEncoder);
        registry.register_arc(Arc::clone(&json));
        registry.default = Some(json);
        registry.register(FormUrlEncoder);
        registry.register(MultipartFormDataEncoder);
        registry
    }

    /// Registers `encoder` under its own media type, replacing any previous one.
    pub fn register(&mut self, encoder: impl ContentTypeEncoder + 'static) -> &mut Self {
        self.register_arc(Arc::new(encoder))
    }

    fn register_arc(&mut self, encoder: Arc<dyn ContentTypeEncoder>) -> &mut Self {
        self.encoders
            .insert(encoder.content_type().to_ascii_lowercase(), encoder);
        self
    }

    /// Registers `encoder` and makes it the default.
    pub fn set_default(&mut self, encoder: impl ContentTypeEncoder + 'static) -> &mut Self {
        let encoder: Arc<dyn ContentTypeEncoder> = Arc::new(encoder);
        self.register_arc(Arc::clone(&encoder));
        self.default = Some(encoder);
        self
    }

    #[must_use]
    pub fn default_encoder(&self) -> Option<&Arc<dyn ContentTypeEncoder>> {
        self.default.as_ref()
    }

    /// Finds the encoder for a `Content-Type` header value.
    ///
    /// A missing header selects the default. Otherwise the first registered
    /// media type contained in the header (case-insensitively) wins, so
    /// parameters like `; charset=utf-8` are ignored.
    #[must_use]
    pub fn encoder_for(&self, content_type: Option<&str>) -> Option<&Arc<dyn ContentTypeEncoder>> {
        let Some(header) = content_type else {
            return self.default.as_ref();
        };
        let header = header.to_ascii_lowercase();
        self.encoders
            .iter()
            .find(|(media_type, _)| header.contains(media_type.as_str()))
            .map(|(_, encoder)| encoder)
    }

    pub fn media_types(&self) -> impl Iterator<Item = &str> {
        self.encoders.keys().map(String::as_str)
    }
}

impl Default for ContentTypeRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for ContentTypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentTypeRegistry")
            .field("encoders", &self.encoders.keys().collect::<Vec<_>>())
            .field("default", &self.default.as_ref().map(|e| e.content_type().to_string()))
            .finish()
    }
}

/// Body bytes as text, for encoders working on textual media types. Hands
/// any other value back untouched.
pub(crate) fn body_text(body: Value) -> Result<String, Value> {
    match body {
        Value::String(text) => Ok(text),
        Value::Bytes(bytes) => Ok(String::from_utf8(bytes)
            .unwrap_or_else(|err| String::from_utf8_lossy(err.as_bytes()).into_owned())),
        other => Err(other),
    }
}
