use http::StatusCode;
use indexmap::IndexMap;
use switchyard_core::{DispatchError, Value};

use super::RequestHandler;
use crate::config::Environment;
use crate::network::{Request, Response};

fn map<const N: usize>(entries: [(&str, Value); N]) -> Value {
    Value::Map(
        entries
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect::<IndexMap<_, _>>(),
    )
}

// ---------------------------------------------------------------------------
// ApiExceptionHandler
// ---------------------------------------------------------------------------

/// Renders categorized API errors with their status, code, and data.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiExceptionHandler;

impl RequestHandler for ApiExceptionHandler {
    fn handle_exception(
        &self,
        error: &DispatchError,
        _request: &mut dyn Request,
        response: &mut dyn Response,
    ) -> bool {
        let DispatchError::Api {
            kind,
            message,
            data,
        } = error
        else {
            return false;
        };
        response.set_status(kind.status());
        response.set_body(map([
            (
                "error",
                map([
                    ("message", Value::from(message.as_str())),
                    ("code", Value::from(kind.code())),
                ]),
            ),
            ("data", data.clone()),
        ]));
        true
    }
}

// ---------------------------------------------------------------------------
// ValidationExceptionHandler
// ---------------------------------------------------------------------------

/// Renders client-visible validation failures as a 400 listing every violation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationExceptionHandler;

impl RequestHandler for ValidationExceptionHandler {
    fn handle_exception(
        &self,
        error: &DispatchError,
        _request: &mut dyn Request,
        response: &mut dyn Response,
    ) -> bool {
        let DispatchError::Validation(failure) = error else {
            return false;
        };
        if !failure.api_visible {
            return false;
        }
        let violations = failure
            .violations
            .iter()
            .map(|violation| {
                map([
                    ("message", Value::from(violation.message.as_str())),
                    ("field", Value::from(violation.field())),
                    ("value", Value::from_json(violation.value.to_json())),
                ])
            })
            .collect();
        response.set_status(StatusCode::BAD_REQUEST);
        response.set_body(map([
            ("error", map([("message", Value::from("Validation failed"))])),
            ("violations", Value::Array(violations)),
        ]));
        true
    }
}

// ---------------------------------------------------------------------------
// FallbackExceptionHandler
// ---------------------------------------------------------------------------

/// Last resort: a 500 for anything no other handler claimed. Outside the live
/// environment the body also describes the error.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackExceptionHandler {
    environment: Environment,
}

impl FallbackExceptionHandler {
    #[must_use]
    pub fn new(environment: Environment) -> Self {
        Self { environment }
    }
}

fn describe(error: &DispatchError) -> Value {
    let (kind, causes) = match error {
        DispatchError::Api { .. } => ("Api", Vec::new()),
        DispatchError::Validation(_) => ("Validation", Vec::new()),
        DispatchError::Internal(inner) => (
            "Internal",
            inner
                .chain()
                .skip(1)
                .map(|cause| Value::from(cause.to_string()))
                .collect(),
        ),
    };
    map([
        ("type", Value::from(kind)),
        ("message", Value::from(error.to_string())),
        ("causes", Value::Array(causes)),
    ])
}

impl RequestHandler for FallbackExceptionHandler {
    fn handle_exception(
        &self,
        error: &DispatchError,
        _request: &mut dyn Request,
        response: &mut dyn Response,
    ) -> bool {
        tracing::error!(error = %error, "unhandled error while dispatching request");
        let mut body = IndexMap::new();
        body.insert(
            "error".to_string(),
            map([("message", Value::from("Internal Server Error"))]),
        );
        if self.environment != Environment::Live {
            body.insert("exception".to_string(), describe(error));
        }
        response.set_status(StatusCode::INTERNAL_SERVER_ERROR);
        response.set_body(Value::Map(body));
        true
    }
}

#[cfg(test)]
mod tests {
    use http::Method;
    use switchyard_core::{ErrorKind, ValidationContext, ValidationFailure, Violation};

    use super::*;
    use crate::network::{HttpRequest, HttpResponse};

    fn run(handler: &dyn RequestHandler, error: &DispatchError) -> (bool, HttpResponse) {
        let mut request = HttpRequest::new(Method::GET, "/");
        let mut response = HttpResponse::new();
        let claimed = handler.handle_exception(error, &mut request, &mut response);
        (claimed, response)
    }

    fn failure() -> ValidationFailure {
        let context = ValidationContext::parameter("Users", "create", "password");
        ValidationFailure::new(
            vec![Violation::new(
                "String length is not >= 8",
                &Value::from("abc"),
                &context,
            )],
            Some("Users:create".to_string()),
        )
    }

    #[test]
    fn api_errors_render_code_and_data() {
        let error = DispatchError::missing_field("name");
        let (claimed, response) = run(&ApiExceptionHandler, &error);
        assert!(claimed);
        assert_eq!(response.status(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(
            response.body().to_json(),
            serde_json::json!({
                "error": {"message": "Mandatory field name missing", "code": "MISSING_FIELD"},
                "data": {"field": "name"}
            })
        );

        let (claimed, _) = run(&ApiExceptionHandler, &DispatchError::internal("boom"));
        assert!(!claimed);
    }

    #[test]
    fn visible_validation_failures_list_violations() {
        let error = DispatchError::Validation(failure());
        let (claimed, response) = run(&ValidationExceptionHandler, &error);
        assert!(claimed);
        assert_eq!(response.status(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(
            response.body().to_json(),
            serde_json::json!({
                "error": {"message": "Validation failed"},
                "violations": [
                    {"message": "String length is not >= 8", "field": "password", "value": "abc"}
                ]
            })
        );
    }

    #[test]
    fn hidden_validation_failures_are_not_claimed() {
        let error = DispatchError::Validation(failure().hidden());
        let (claimed, _) = run(&ValidationExceptionHandler, &error);
        assert!(!claimed);
    }

    #[test]
    fn fallback_hides_details_when_live() {
        let error = DispatchError::api(ErrorKind::Forbidden, "no");
        let (claimed, response) = run(&FallbackExceptionHandler::new(Environment::Live), &error);
        assert!(claimed);
        assert_eq!(response.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(
            response.body().to_json(),
            serde_json::json!({"error": {"message": "Internal Server Error"}})
        );
    }

    #[test]
    fn fallback_describes_error_in_development() {
        let error = DispatchError::Internal(anyhow::anyhow!("disk full").context("saving user"));
        let (_, response) = run(&FallbackExceptionHandler::default(), &error);
        let body = response.body().to_json();
        assert_eq!(body["exception"]["type"], "Internal");
        assert_eq!(body["exception"]["message"], "internal error: saving user");
        assert_eq!(body["exception"]["causes"], serde_json::json!(["disk full"]));
    }
}
