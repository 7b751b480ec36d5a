use std::sync::Arc;

use bytes::Bytes;
use http::Method;
use indexmap::map::Entry;
use indexmap::IndexMap;
use switchyard_core::{DispatchError, ErrorKind, Value, VersionSelector};
use uuid::Uuid;

use super::{MethodBinding, Route, RoutingDocument, ServiceController};
use crate::error::SetupError;
use crate::handlers::{
    ApiExceptionHandler, ContentTypeHandler, FallbackExceptionHandler, HttpStatusCodeHandler,
    RequestHandler, ValidationExceptionHandler,
};
use crate::network::{HttpRequest, HttpResponse, Request, Response};
use crate::service::DispatchContext;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Matches requests to routes and runs them through the handler pipeline.
///
/// Routes are tried in the order they were first added and the first match
/// wins, even when it has no binding for the request's HTTP method.
pub struct Router {
    context: Arc<DispatchContext>,
    routes: IndexMap<String, Route>,
    handlers: Vec<Arc<dyn RequestHandler>>,
}

impl Router {
    /// Creates a router, installing the built-in handlers unless the
    /// configuration opts out.
    #[must_use]
    pub fn new(context: Arc<DispatchContext>) -> Self {
        let register_defaults = context.config().register_default_handlers;
        Self::with_default_handlers(context, register_defaults)
    }

    #[must_use]
    pub fn with_default_handlers(context: Arc<DispatchContext>, register_defaults: bool) -> Self {
        let mut router = Self {
            context,
            routes: IndexMap::new(),
            handlers: Vec::new(),
        };
        if register_defaults {
            let content_types = router.context.content_types().clone();
            let environment = router.context.config().environment;
            router
                .add_handler(ContentTypeHandler::new(content_types))
                .add_handler(HttpStatusCodeHandler)
                .add_handler(FallbackExceptionHandler::new(environment))
                .add_handler(ValidationExceptionHandler)
                .add_handler(ApiExceptionHandler);
        }
        router
    }

    #[must_use]
    pub fn context(&self) -> &Arc<DispatchContext> {
        &self.context
    }

    /// The route for `template`, created on first use.
    ///
    /// # Errors
    ///
    /// [`SetupError::InvalidRoute`] when the template cannot be compiled.
    pub fn route(&mut self, template: &str) -> Result<&mut Route, SetupError> {
        match self.routes.entry(template.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let route = Route::new(template).map_err(|source| SetupError::InvalidRoute {
                    template: template.to_string(),
                    source,
                })?;
                Ok(entry.insert(route))
            }
        }
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.values()
    }

    /// Adds a handler ahead of all existing ones.
    pub fn add_handler(&mut self, handler: impl RequestHandler + 'static) -> &mut Self {
        self.handlers.insert(0, Arc::new(handler));
        self
    }

    /// Handlers in the order they run.
    #[must_use]
    pub fn handlers(&self) -> &[Arc<dyn RequestHandler>] {
        &self.handlers
    }

    /// Dispatches one request.
    ///
    /// Every log line of the request, from route matching to error handling,
    /// is emitted inside a `dispatch` span carrying its `request_id`. The same
    /// id identifies the request scope its services live in.
    ///
    /// Returns `Ok(true)` when the service call completed and `Ok(false)`
    /// when an error was raised and a handler turned it into a response.
    ///
    /// # Errors
    ///
    /// The original error when no handler claims it, or an error raised by a
    /// post-response handler while finalizing a handled error.
    pub fn process(
        &self,
        request: &mut dyn Request,
        response: &mut dyn Response,
    ) -> Result<bool, DispatchError> {
        let request_id = Uuid::new_v4();
        let span = tracing::debug_span!(
            "dispatch",
            %request_id,
            method = %request.method(),
            uri = %request.uri()
        );
        let _entered = span.enter();

        let Err(error) = self.dispatch(request_id, request, response) else {
            return Ok(true);
        };
        for handler in &self.handlers {
            if handler.handle_exception(&error, request, response) {
                tracing::debug!(error = %error, status = ?response.status(), "error handled");
                for finalizer in &self.handlers {
                    if finalizer.post_response(request, response)? {
                        break;
                    }
                }
                return Ok(false);
            }
        }
        tracing::warn!(error = %error, "no handler claimed dispatch error");
        Err(error)
    }

    /// Dispatches an [`http::Request`] and renders the response.
    ///
    /// # Errors
    ///
    /// Errors no handler claimed, as in [`Router::process`].
    pub fn handle(&self, request: http::Request<Bytes>) -> Result<http::Response<Bytes>, DispatchError> {
        let mut request = HttpRequest::from_http(request);
        let mut response = HttpResponse::new();
        self.process(&mut request, &mut response)?;
        Ok(response.into_http())
    }

    fn dispatch(
        &self,
        request_id: Uuid,
        request: &mut dyn Request,
        response: &mut dyn Response,
    ) -> Result<(), DispatchError> {
        let path = route_path(request);
        let Some((route, captures)) = self
            .routes
            .values()
            .find_map(|route| route.match_path(&path).map(|captures| (route, captures)))
        else {
            return Err(DispatchError::api_with(
                ErrorKind::RouteNotFound,
                "Route not found",
                "route",
                path,
            ));
        };
        for (name, value) in captures {
            request.set_field(&name, Value::String(value));
        }
        let Some(binding) = route.binding(request.method()) else {
            let mut data = IndexMap::new();
            data.insert("route".to_string(), Value::String(path));
            data.insert("method".to_string(), Value::from(request.method().as_str()));
            return Err(DispatchError::Api {
                kind: ErrorKind::MethodNotAllowed,
                message: "Method not allowed".to_string(),
                data: Value::Map(data),
            });
        };
        ServiceController::new(self, binding)?.call(request_id, request, response)
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes.keys().collect::<Vec<_>>())
            .field("handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}

/// The request path relative to the directory of the host's front script,
/// without query string.
fn route_path(request: &dyn Request) -> String {
    let uri = request.uri();
    let path = uri.split_once('?').map_or(uri, |(path, _)| path);
    let script = request.script_name();
    if !script.is_empty() {
        if let Some(rest) = path.strip_prefix(script) {
            return rest.to_string();
        }
    }
    let root = script.rfind('/').map_or("", |slash| &script[..slash]);
    if root.is_empty() {
        return path.to_string();
    }
    path.strip_prefix(root).unwrap_or(path).to_string()
}

// ---------------------------------------------------------------------------
// RouterBuilder
// ---------------------------------------------------------------------------

/// Builds a [`Router`] whose bindings are checked against the catalog.
pub struct RouterBuilder {
    context: Arc<DispatchContext>,
    register_defaults: bool,
    handlers: Vec<Arc<dyn RequestHandler>>,
    bindings: Vec<(String, Method, MethodBinding)>,
}

impl std::fmt::Debug for RouterBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterBuilder")
            .field("register_defaults", &self.register_defaults)
            .field("handlers", &self.handlers.len())
            .field("bindings", &self.bindings)
            .finish_non_exhaustive()
    }
}

impl RouterBuilder {
    #[must_use]
    pub fn new(context: Arc<DispatchContext>) -> Self {
        let register_defaults = context.config().register_default_handlers;
        Self {
            context,
            register_defaults,
            handlers: Vec::new(),
            bindings: Vec::new(),
        }
    }

    #[must_use]
    pub fn default_handlers(mut self, register: bool) -> Self {
        self.register_defaults = register;
        self
    }

    /// Adds a custom handler; later handlers run before earlier ones, and all
    /// run before the built-in ones.
    #[must_use]
    pub fn handler(mut self, handler: impl RequestHandler + 'static) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    #[must_use]
    pub fn route(
        self,
        template: &str,
        http_method: Method,
        service: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        self.bind(template, http_method, service.into(), method.into(), None)
    }

    #[must_use]
    pub fn route_version(
        self,
        template: &str,
        http_method: Method,
        service: impl Into<String>,
        method: impl Into<String>,
        version: VersionSelector,
    ) -> Self {
        self.bind(template, http_method, service.into(), method.into(), Some(version))
    }

    fn bind(
        mut self,
        template: &str,
        http_method: Method,
        service: String,
        method: String,
        version: Option<VersionSelector>,
    ) -> Self {
        self.bindings.push((
            template.to_string(),
            http_method,
            MethodBinding {
                service,
                method,
                version,
            },
        ));
        self
    }

    /// Adds the handler switch and routes of a routing document.
    ///
    /// # Errors
    ///
    /// [`SetupError::InvalidRouteEntry`] for an unparsable HTTP method or
    /// `Service:method` target.
    pub fn document(mut self, document: RoutingDocument) -> Result<Self, SetupError> {
        if let Some(register) = document.add_default_handlers {
            self.register_defaults = register;
        }
        for (template, methods) in document.routes {
            for (http_method, entry) in methods {
                let parsed = Method::from_bytes(http_method.to_ascii_uppercase().as_bytes())
                    .map_err(|_| SetupError::InvalidRouteEntry {
                        route: template.clone(),
                        message: format!("invalid HTTP method {http_method}"),
                    })?;
                let binding = entry.into_binding().ok_or_else(|| SetupError::InvalidRouteEntry {
                    route: template.clone(),
                    message: format!("{http_method} target must be written as Service:method"),
                })?;
                self.bindings.push((template.clone(), parsed, binding));
            }
        }
        Ok(self)
    }

    /// Verifies every binding and assembles the router.
    ///
    /// # Errors
    ///
    /// Unknown services or methods, and route templates that fail to compile.
    pub fn build(self) -> Result<Router, SetupError> {
        let mut router = Router::with_default_handlers(self.context, self.register_defaults);
        for handler in self.handlers {
            router.handlers.insert(0, handler);
        }
        for (template, http_method, binding) in self.bindings {
            let catalog = router.context.catalog();
            let Some(service) = catalog.service(&binding.service) else {
                return Err(SetupError::UnknownService {
                    route: template,
                    http_method,
                    service: binding.service,
                });
            };
            if service.find_method(&binding.method).is_none() {
                return Err(SetupError::UnknownMethod {
                    route: template,
                    http_method,
                    service: binding.service,
                    method: binding.method,
                });
            }
            router.route(&template)?.bind_binding(http_method, binding);
        }
        tracing::info!(routes = router.routes.len(), handlers = router.handlers.len(), "router ready");
        Ok(router)
    }
}

#[cfg(test)]
mod tests {
    use http::header::CONTENT_TYPE;
    use http::{HeaderValue, StatusCode};
    use switchyard_core::{
        ImplementationDescriptor, MetadataCatalog, MethodDescriptor, ServiceDescriptor,
        ValueDescriptor,
    };

    use super::*;
    use crate::network::HttpRequest;
    use crate::service::{MethodTable, ServiceInstance};

    struct Users;

    impl ServiceInstance for Users {}

    fn context() -> Arc<DispatchContext> {
        let service = ServiceDescriptor::new("Users")
            .method(
                MethodDescriptor::new("get")
                    .param(ValueDescriptor::new("id", "int"))
                    .returns("string"),
            )
            .method(MethodDescriptor::new("me").returns("string"))
            .method(MethodDescriptor::new("whoami").returns("string"))
            .version(1, ImplementationDescriptor::new("users"));
        DispatchContext::builder(MetadataCatalog::new().with_service(service))
            .implementation(
                "users",
                || Users,
                MethodTable::new()
                    .method("get", |_: &Users, call| {
                        Ok(Value::from(format!("user {}", call.int(0)?)))
                    })
                    .method("me", |_, _| Ok(Value::from("me")))
                    .method("whoami", |_, call| Ok(Value::from(call.scope().id().to_string()))),
            )
            .build()
            .unwrap()
    }

    fn router() -> Router {
        RouterBuilder::new(context())
            .route("/users/$id", Method::GET, "Users", "get")
            .route("/users/me", Method::GET, "Users", "me")
            .route("/whoami", Method::GET, "Users", "whoami")
            .build()
            .unwrap()
    }

    fn dispatch(router: &Router, mut request: HttpRequest) -> (Result<bool, DispatchError>, HttpResponse) {
        let mut response = HttpResponse::new();
        let outcome = router.process(&mut request, &mut response);
        (outcome, response)
    }

    fn json(response: &HttpResponse) -> serde_json::Value {
        let Value::Bytes(bytes) = response.body() else {
            panic!("response body was not encoded: {:?}", response.body());
        };
        serde_json::from_slice(bytes).unwrap()
    }

    #[test]
    fn placeholder_becomes_converted_argument() {
        let router = router();
        let (outcome, response) = dispatch(&router, HttpRequest::new(Method::GET, "/users/42"));
        assert!(outcome.unwrap());
        assert_eq!(response.status(), Some(StatusCode::OK));
        assert_eq!(json(&response), serde_json::json!("user 42"));
        assert_eq!(
            response.header(CONTENT_TYPE.as_str()),
            Some("application/json")
        );
    }

    #[test]
    fn first_matching_template_wins() {
        let router = router();
        let (outcome, response) = dispatch(&router, HttpRequest::new(Method::GET, "/users/me"));
        assert!(!outcome.unwrap());
        assert_eq!(response.status(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(json(&response)["error"]["code"], "INVALID_FIELD");
    }

    #[test]
    fn unknown_path_is_not_found() {
        let router = router();
        let (outcome, response) = dispatch(&router, HttpRequest::new(Method::GET, "/posts/1"));
        assert!(!outcome.unwrap());
        assert_eq!(response.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(
            json(&response),
            serde_json::json!({
                "error": {"message": "Route not found", "code": "ROUTE_NOT_FOUND"},
                "data": {"route": "/posts/1"}
            })
        );
    }

    #[test]
    fn unbound_http_method_is_not_allowed() {
        let router = router();
        let (_, response) = dispatch(&router, HttpRequest::new(Method::DELETE, "/users/1"));
        assert_eq!(response.status(), Some(StatusCode::METHOD_NOT_ALLOWED));
        assert_eq!(
            json(&response)["data"],
            serde_json::json!({"route": "/users/1", "method": "DELETE"})
        );
    }

    #[test]
    fn unclaimed_errors_propagate_without_default_handlers() {
        let router = RouterBuilder::new(context())
            .default_handlers(false)
            .route("/users/$id", Method::GET, "Users", "get")
            .build()
            .unwrap();
        assert!(router.handlers().is_empty());
        let (outcome, _) = dispatch(&router, HttpRequest::new(Method::GET, "/nowhere"));
        assert_eq!(outcome.unwrap_err().kind(), Some(ErrorKind::RouteNotFound));
    }

    #[test]
    fn script_prefix_is_stripped() {
        let request = HttpRequest::new(Method::GET, "/app/index.php/users/7?x=1")
            .with_script_name("/app/index.php");
        assert_eq!(route_path(&request), "/users/7");

        let request = HttpRequest::new(Method::GET, "/app/users/7").with_script_name("/app/index.php");
        assert_eq!(route_path(&request), "/users/7");

        let request = HttpRequest::new(Method::GET, "/users/7").with_script_name("/index.php");
        assert_eq!(route_path(&request), "/users/7");
    }

    #[test]
    fn unsupported_content_type_is_rejected() {
        let router = router();
        let request = HttpRequest::new(Method::GET, "/users/3")
            .with_header(CONTENT_TYPE, HeaderValue::from_static("text/csv"));
        let (_, response) = dispatch(&router, request);
        assert_eq!(response.status(), Some(StatusCode::NOT_ACCEPTABLE));
        assert_eq!(json(&response)["error"]["code"], "INVALID_CONTENT_TYPE");
    }

    #[test]
    fn builder_rejects_unknown_targets() {
        let err = RouterBuilder::new(context())
            .route("/posts", Method::GET, "Posts", "list")
            .build()
            .unwrap_err();
        assert!(matches!(err, SetupError::UnknownService { ref service, .. } if service == "Posts"));

        let err = RouterBuilder::new(context())
            .route("/users", Method::GET, "Users", "list")
            .build()
            .unwrap_err();
        assert!(matches!(err, SetupError::UnknownMethod { ref method, .. } if method == "list"));
    }

    #[test]
    fn routing_document_binds_routes() {
        let document = RoutingDocument::from_json(
            r#"{"add_default_handlers": false, "routes": {"/users/$id": {"get": "Users:get"}}}"#,
        )
        .unwrap();
        let router = RouterBuilder::new(context())
            .document(document)
            .unwrap()
            .build()
            .unwrap();
        assert!(router.handlers().is_empty());
        let route = router.routes().next().unwrap();
        assert_eq!(route.binding(&Method::GET).unwrap().method, "get");

        let document =
            RoutingDocument::from_json(r#"{"routes": {"/users": {"GET": "Users"}}}"#).unwrap();
        let err = RouterBuilder::new(context()).document(document).unwrap_err();
        assert!(matches!(err, SetupError::InvalidRouteEntry { .. }));
    }

    // -----------------------------------------------------------------------
    // Request id
    // -----------------------------------------------------------------------

    /// Collects the `request_id` of every `dispatch` span opened.
    #[derive(Clone, Default)]
    struct DispatchSpans(Arc<parking_lot::Mutex<Vec<String>>>);

    struct RequestIdVisitor<'a>(&'a mut Option<String>);

    impl tracing::field::Visit for RequestIdVisitor<'_> {
        fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
            if field.name() == "request_id" {
                *self.0 = Some(format!("{value:?}"));
            }
        }
    }

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for DispatchSpans {
        fn on_new_span(
            &self,
            attrs: &tracing::span::Attributes<'_>,
            _id: &tracing::span::Id,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            if attrs.metadata().name() != "dispatch" {
                return;
            }
            let mut request_id = None;
            attrs.record(&mut RequestIdVisitor(&mut request_id));
            self.0.lock().push(request_id.unwrap_or_default());
        }
    }

    fn traced<T>(spans: &DispatchSpans, f: impl FnOnce() -> T) -> T {
        use tracing_subscriber::layer::SubscriberExt;
        let subscriber = tracing_subscriber::registry().with(spans.clone());
        tracing::subscriber::with_default(subscriber, f)
    }

    #[test]
    fn dispatch_span_carries_the_request_scope_id() {
        let router = router();
        let spans = DispatchSpans::default();
        let (outcome, response) =
            traced(&spans, || dispatch(&router, HttpRequest::new(Method::GET, "/whoami")));
        assert!(outcome.unwrap());

        let recorded = spans.0.lock().clone();
        assert_eq!(recorded.len(), 1);
        assert_eq!(json(&response), serde_json::json!(recorded[0]));
        assert!(Uuid::parse_str(&recorded[0]).is_ok());
    }

    #[test]
    fn unrouted_requests_still_get_a_request_id() {
        let router = router();
        let spans = DispatchSpans::default();
        let (_, response) =
            traced(&spans, || dispatch(&router, HttpRequest::new(Method::GET, "/nowhere")));
        assert_eq!(response.status(), Some(StatusCode::NOT_FOUND));

        let recorded = spans.0.lock().clone();
        assert_eq!(recorded.len(), 1);
        assert!(Uuid::parse_str(&recorded[0]).is_ok());
    }
}
