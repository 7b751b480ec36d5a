use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use indexmap::IndexMap;
use switchyard_core::{UploadedFile, Value};

use crate::content::decode_query;

// ---------------------------------------------------------------------------
// Request trait
// ---------------------------------------------------------------------------

/// An incoming request as seen by the dispatch pipeline.
///
/// Fields start out as the query parameters; the pipeline adds route
/// placeholders, body fields, and bound headers as it assembles arguments.
pub trait Request {
    fn method(&self) -> &Method;

    /// Request target including any query string.
    fn uri(&self) -> &str;

    /// Path of the front script the host mounted the dispatcher under, if any.
    fn script_name(&self) -> &str;

    fn headers(&self) -> &HeaderMap;

    /// Header value as text; headers that are not valid visible ASCII read as absent.
    fn header(&self, name: &str) -> Option<&str> {
        self.headers().get(name).and_then(|value| value.to_str().ok())
    }

    fn fields(&self) -> &IndexMap<String, Value>;

    fn set_field(&mut self, name: &str, value: Value);

    fn field(&self, name: &str) -> Option<&Value> {
        self.fields().get(name)
    }

    fn has_field(&self, name: &str) -> bool {
        self.fields().contains_key(name)
    }

    /// Raw body until content negotiation decodes it, the decoded value after.
    fn body(&self) -> &Value;

    fn set_body(&mut self, body: Value);

    /// Files uploaded under the form field `name`.
    fn uploaded_files(&self, name: &str) -> Option<&UploadedFiles>;
}

/// Uploads for one form field: a single file, or a list when the field
/// used array syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadedFiles {
    Single(UploadedFile),
    Multiple(Vec<UploadedFile>),
}

impl UploadedFiles {
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::Single(file) => Value::File(file),
            Self::Multiple(files) => Value::Array(files.into_iter().map(Value::File).collect()),
        }
    }
}

/// Request extension carrying the host's front-script path, stripped from the
/// request path before route matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptName(pub String);

// ---------------------------------------------------------------------------
// HttpRequest
// ---------------------------------------------------------------------------

/// In-memory [`Request`] built from an [`http::Request`] or assembled by hand.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: Method,
    uri: String,
    script_name: String,
    headers: HeaderMap,
    fields: IndexMap<String, Value>,
    body: Value,
    files: IndexMap<String, UploadedFiles>,
}

impl HttpRequest {
    /// Creates a request for `uri`, seeding fields from its query string.
    #[must_use]
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        let uri = uri.into();
        let fields = uri
            .split_once('?')
            .map(|(_, query)| decode_query(query.as_bytes()))
            .unwrap_or_default();
        Self {
            method,
            uri,
            script_name: String::new(),
            headers: HeaderMap::new(),
            fields,
            body: Value::Null,
            files: IndexMap::new(),
        }
    }

    /// Adopts an [`http::Request`]; the body stays raw bytes until decoded.
    #[must_use]
    pub fn from_http(request: http::Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();
        let target = parts
            .uri
            .path_and_query()
            .map_or_else(|| parts.uri.path().to_string(), ToString::to_string);
        let mut converted = Self::new(parts.method, target);
        if let Some(ScriptName(script)) = parts.extensions.get::<ScriptName>() {
            converted.script_name.clone_from(script);
        }
        converted.headers = parts.headers;
        converted.body = Value::Bytes(body.to_vec());
        converted
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_script_name(mut self, script_name: impl Into<String>) -> Self {
        self.script_name = script_name.into();
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Value>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_files(mut self, name: impl Into<String>, files: UploadedFiles) -> Self {
        self.files.insert(name.into(), files);
        self
    }
}

impl Request for HttpRequest {
    fn method(&self) -> &Method {
        &self.method
    }

    fn uri(&self) -> &str {
        &self.uri
    }

    fn script_name(&self) -> &str {
        &self.script_name
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn fields(&self) -> &IndexMap<String, Value> {
        &self.fields
    }

    fn set_field(&mut self, name: &str, value: Value) {
        self.fields.insert(name.to_string(), value);
    }

    fn body(&self) -> &Value {
        &self.body
    }

    fn set_body(&mut self, body: Value) {
        self.body = body;
    }

    fn uploaded_files(&self, name: &str) -> Option<&UploadedFiles> {
        self.files.get(name)
    }
}
