use std::fmt;

use http::StatusCode;

use crate::types::Value;
use crate::validation::ValidationFailure;

/// Category of a client-visible failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // Request errors.
    InvalidContentType,
    MissingHeader,
    InvalidBody,
    MissingField,
    InvalidField,
    // Router errors.
    RouteNotFound,
    MethodNotAllowed,
    // Capability errors.
    Unauthorized,
    PaymentRequired,
    Forbidden,
}

impl ErrorKind {
    /// HTTP status reported for this kind.
    #[must_use]
    pub fn status(self) -> StatusCode {
        match self {
            Self::InvalidContentType => StatusCode::NOT_ACCEPTABLE,
            Self::MissingHeader => StatusCode::PRECONDITION_FAILED,
            Self::InvalidBody | Self::MissingField | Self::InvalidField => StatusCode::BAD_REQUEST,
            Self::RouteNotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::PaymentRequired => StatusCode::PAYMENT_REQUIRED,
            Self::Forbidden => StatusCode::FORBIDDEN,
        }
    }

    /// Stable machine-readable code sent to clients.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::InvalidContentType => "INVALID_CONTENT_TYPE",
            Self::MissingHeader => "MISSING_HEADER",
            Self::InvalidBody => "INVALID_BODY",
            Self::MissingField => "MISSING_FIELD",
            Self::InvalidField => "INVALID_FIELD",
            Self::RouteNotFound => "ROUTE_NOT_FOUND",
            Self::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::PaymentRequired => "PAYMENT_REQUIRED",
            Self::Forbidden => "FORBIDDEN",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Error flowing through the dispatch pipeline.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Categorized failure shown to the API caller.
    #[error("{message}")]
    Api {
        kind: ErrorKind,
        message: String,
        data: Value,
    },
    /// Aggregated validation violations.
    #[error(transparent)]
    Validation(#[from] ValidationFailure),
    /// Framework failure: descriptor drift, illegal return shapes, unresolved
    /// versions. Never shown verbatim to clients.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl DispatchError {
    #[must_use]
    pub fn api(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Api {
            kind,
            message: message.into(),
            data: Value::Null,
        }
    }

    /// An API error carrying one `key: value` pair of structured data.
    #[must_use]
    pub fn api_with(
        kind: ErrorKind,
        message: impl Into<String>,
        key: &str,
        value: impl Into<Value>,
    ) -> Self {
        let mut data = indexmap::IndexMap::new();
        data.insert(key.to_string(), value.into());
        Self::Api {
            kind,
            message: message.into(),
            data: Value::Map(data),
        }
    }

    #[must_use]
    pub fn missing_field(field: &str) -> Self {
        Self::api_with(
            ErrorKind::MissingField,
            format!("Mandatory field {field} missing"),
            "field",
            field,
        )
    }

    #[must_use]
    pub fn invalid_field(field: &str) -> Self {
        Self::invalid_field_because(field, format!("Cannot convert field {field}. Invalid type given."))
    }

    #[must_use]
    pub fn invalid_field_because(field: &str, message: impl Into<String>) -> Self {
        Self::api_with(ErrorKind::InvalidField, message, "field", field)
    }

    #[must_use]
    pub fn internal(message: impl fmt::Display) -> Self {
        Self::Internal(anyhow::anyhow!("{message}"))
    }

    /// Kind of a client-visible API error.
    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Api { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// HTTP status this error maps to when no handler overrides it.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Api { kind, .. } => kind.status(),
            Self::Validation(failure) if failure.api_visible => StatusCode::BAD_REQUEST,
            Self::Validation(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
