use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use switchyard_core::Value;

/// The outgoing response as built up by the pipeline stages.
///
/// The body holds the wire value until content negotiation replaces it with
/// encoded bytes.
pub trait Response {
    /// Status explicitly chosen so far; `None` until a handler decides.
    fn status(&self) -> Option<StatusCode>;

    fn set_status(&mut self, status: StatusCode);

    fn headers(&self) -> &HeaderMap;

    fn header(&self, name: &str) -> Option<&str> {
        self.headers().get(name).and_then(|value| value.to_str().ok())
    }

    fn set_header(&mut self, name: HeaderName, value: HeaderValue);

    fn body(&self) -> &Value;

    fn set_body(&mut self, body: Value);
}

/// In-memory [`Response`] convertible into an [`http::Response`].
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Value,
}

impl HttpResponse {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Renders the response. Missing status means 200; byte and string bodies
    /// are sent as-is, a null body as empty, and any other value as JSON text.
    #[must_use]
    pub fn into_http(self) -> http::Response<Bytes> {
        let body = match self.body {
            Value::Null => Bytes::new(),
            Value::Bytes(bytes) => Bytes::from(bytes),
            Value::String(text) => Bytes::from(text),
            other => Bytes::from(other.to_json().to_string()),
        };
        let mut response = http::Response::new(body);
        *response.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = self.headers;
        response
    }
}

impl Response for HttpResponse {
    fn status(&self) -> Option<StatusCode> {
        self.status
    }

    fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    fn body(&self) -> &Value {
        &self.body
    }

    fn set_body(&mut self, body: Value) {
        self.body = body;
    }
}
