//! End-to-end dispatch through the router, default handlers, and tower adapter.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderName, HeaderValue, Method, StatusCode};
use serde_json::json;
use switchyard_core::{
    BodyBinding, DispatchError, ImplementationDescriptor, MetadataCatalog, MethodDescriptor,
    RuleBinding, ServiceDescriptor, UploadedFile, Value, ValueDescriptor, VersionSelector,
};
use switchyard_server::network::{ScriptName, UploadedFiles};
use switchyard_server::{
    DispatchContext, DispatchService, HttpRequest, HttpResponse, MethodTable, Response, Router,
    RouterBuilder, ServiceInstance,
};
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Fixture services
// ---------------------------------------------------------------------------

struct Users;

impl ServiceInstance for Users {}

struct Documents(&'static str);

impl ServiceInstance for Documents {}

struct Signup;

impl ServiceInstance for Signup {}

fn catalog() -> MetadataCatalog {
    let users = ServiceDescriptor::new("Users")
        .method(
            MethodDescriptor::new("update")
                .param(ValueDescriptor::new("id", "int"))
                .param(ValueDescriptor::new("name", "string"))
                .returns("mixed"),
        )
        .method(
            MethodDescriptor::new("create")
                .param(ValueDescriptor::new("password", "string"))
                .validate("password", RuleBinding::new("length", [">=", "8"]))
                .returns("bool"),
        )
        .method(
            MethodDescriptor::new("secret")
                .param(ValueDescriptor::new("token", "string"))
                .header("X-Token", "token")
                .returns("string"),
        )
        .method(
            MethodDescriptor::new("avatar")
                .param(ValueDescriptor::new("avatar", "file"))
                .returns("string"),
        )
        .method(
            MethodDescriptor::new("attach")
                .param(ValueDescriptor::new("attachment", "string").or("file"))
                .returns("string"),
        )
        .method(
            MethodDescriptor::new("replace")
                .param(ValueDescriptor::new("id", "int"))
                .param(ValueDescriptor::new("name", "string"))
                .body(BodyBinding::Whole)
                .returns("mixed"),
        )
        .method(
            MethodDescriptor::new("rename")
                .param(ValueDescriptor::new("name", "string"))
                .body(BodyBinding::Parameter("name".to_string()))
                .returns("string"),
        )
        .method(
            MethodDescriptor::new("label")
                .param(ValueDescriptor::new("label", "string").with_default("none"))
                .body(BodyBinding::Parameter("label".to_string()))
                .returns("string"),
        )
        .version(1, ImplementationDescriptor::new("users"));
    let documents = ServiceDescriptor::new("Documents")
        .method(MethodDescriptor::new("edit").returns("string"))
        .version(1, ImplementationDescriptor::new("documents-v1").named("stable"))
        .version(2, ImplementationDescriptor::new("documents-v2").requires("CanEdit"));
    let signup = ServiceDescriptor::new("Signup")
        .method(
            MethodDescriptor::new("register")
                .param(ValueDescriptor::new("password", "string"))
                .returns("bool"),
        )
        .version(1, ImplementationDescriptor::new("signup"));
    MetadataCatalog::new()
        .with_service(users)
        .with_service(documents)
        .with_service(signup)
}

fn documents_table() -> MethodTable<Documents> {
    MethodTable::new().method("edit", |documents: &Documents, _| Ok(Value::from(documents.0)))
}

fn context() -> Arc<DispatchContext> {
    DispatchContext::builder(catalog())
        .implementation(
            "users",
            || Users,
            MethodTable::new()
                .method("update", |_: &Users, call| Ok(Value::Array(call.args().to_vec())))
                .method("create", |_, _| Ok(Value::Bool(true)))
                .method("secret", |_, call| Ok(Value::from(call.string(0)?)))
                .method("avatar", |_, call| match call.arg(0) {
                    Value::File(file) => Ok(Value::from(file.name.as_str())),
                    other => Err(DispatchError::internal(format!("not a file: {other}"))),
                })
                .method("attach", |_, call| match call.arg(0) {
                    Value::File(file) => Ok(Value::from(format!("file {}", file.name))),
                    other => Ok(Value::from(format!("link {}", other.as_str().unwrap_or("?")))),
                })
                .method("replace", |_, call| Ok(Value::Array(call.args().to_vec())))
                .method("rename", |_, call| Ok(Value::from(call.string(0)?)))
                .method("label", |_, call| Ok(Value::from(call.string(0)?))),
        )
        .implementation("documents-v1", || Documents("v1"), documents_table())
        .implementation("documents-v2", || Documents("v2"), documents_table())
        .implementation(
            "signup",
            || Signup,
            MethodTable::new().method("register", |_: &Signup, call| {
                call.scope().service("Users", None)?.call("create", call.args())
            }),
        )
        .capability_fn("CanEdit", |scope| {
            scope.request().header("X-Role") == Some("editor")
        })
        .build()
        .unwrap()
}

fn router() -> Router {
    RouterBuilder::new(context())
        .route("/users/$id", Method::POST, "Users", "update")
        .route("/users", Method::POST, "Users", "create")
        .route("/secret", Method::GET, "Users", "secret")
        .route("/avatar", Method::POST, "Users", "avatar")
        .route("/attach", Method::POST, "Users", "attach")
        .route("/users/$id", Method::PUT, "Users", "replace")
        .route("/rename", Method::PATCH, "Users", "rename")
        .route("/label", Method::POST, "Users", "label")
        .route("/documents", Method::PUT, "Documents", "edit")
        .route_version(
            "/documents/first",
            Method::PUT,
            "Documents",
            "edit",
            VersionSelector::Number(1),
        )
        .route_version(
            "/documents/second",
            Method::PUT,
            "Documents",
            "edit",
            VersionSelector::Number(2),
        )
        .route_version(
            "/documents/stable",
            Method::PUT,
            "Documents",
            "edit",
            VersionSelector::Name("stable".to_string()),
        )
        .route_version(
            "/documents/future",
            Method::PUT,
            "Documents",
            "edit",
            VersionSelector::Number(9),
        )
        .route("/signup", Method::POST, "Signup", "register")
        .build()
        .unwrap()
}

fn file(name: &str) -> UploadedFile {
    UploadedFile {
        name: name.to_string(),
        content_type: "image/png".to_string(),
        temp_path: PathBuf::from("/tmp/upload"),
        error: 0,
        size: 128,
    }
}

fn dispatch(mut request: HttpRequest) -> HttpResponse {
    let mut response = HttpResponse::new();
    router().process(&mut request, &mut response).unwrap();
    response
}

fn json_body(response: &HttpResponse) -> serde_json::Value {
    let Value::Bytes(bytes) = response.body() else {
        panic!("response body was not encoded: {:?}", response.body());
    };
    serde_json::from_slice(bytes).unwrap()
}

fn json_request(method: Method, uri: &str, body: &str) -> HttpRequest {
    HttpRequest::new(method, uri)
        .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .with_body(Value::Bytes(body.as_bytes().to_vec()))
}

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

#[test]
fn path_and_json_body_become_arguments() {
    let response = dispatch(json_request(Method::POST, "/users/42", r#"{"name":"Ann"}"#));
    assert_eq!(response.status(), Some(StatusCode::OK));
    assert_eq!(json_body(&response), json!([42, "Ann"]));
}

#[test]
fn form_body_becomes_arguments() {
    let request = HttpRequest::new(Method::POST, "/users/5")
        .with_header(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        )
        .with_body(Value::Bytes(b"name=Bob".to_vec()));
    let response = dispatch(request);
    assert_eq!(json_body(&response), json!([5, "Bob"]));
}

#[test]
fn missing_field_is_reported() {
    let response = dispatch(json_request(Method::POST, "/users/42", "{}"));
    assert_eq!(response.status(), Some(StatusCode::BAD_REQUEST));
    assert_eq!(
        json_body(&response),
        json!({
            "error": {"message": "Mandatory field name missing", "code": "MISSING_FIELD"},
            "data": {"field": "name"}
        })
    );
}

#[test]
fn malformed_json_is_invalid_body() {
    let response = dispatch(json_request(Method::POST, "/users/42", "{name"));
    assert_eq!(response.status(), Some(StatusCode::BAD_REQUEST));
    assert_eq!(json_body(&response)["error"]["code"], "INVALID_BODY");
}

#[test]
fn unregistered_content_type_is_not_acceptable() {
    let request = HttpRequest::new(Method::POST, "/users/42")
        .with_header(CONTENT_TYPE, HeaderValue::from_static("text/plain"))
        .with_body(Value::Bytes(b"name=Ann".to_vec()));
    let response = dispatch(request);
    assert_eq!(response.status(), Some(StatusCode::NOT_ACCEPTABLE));
    assert_eq!(json_body(&response)["error"]["code"], "INVALID_CONTENT_TYPE");
    assert_eq!(response.header("content-type"), Some("application/json"));
}

// ---------------------------------------------------------------------------
// Body binding
// ---------------------------------------------------------------------------

#[test]
fn whole_body_spreads_into_fields() {
    let response = dispatch(json_request(Method::PUT, "/users/3", r#"{"name":"Cy"}"#));
    assert_eq!(response.status(), Some(StatusCode::OK));
    assert_eq!(json_body(&response), json!([3, "Cy"]));
}

#[test]
fn whole_body_must_be_a_map() {
    for body in ["[1, 2]", "\"Cy\"", ""] {
        let response = dispatch(json_request(Method::PUT, "/users/3", body));
        assert_eq!(response.status(), Some(StatusCode::BAD_REQUEST), "body {body:?}");
        assert_eq!(
            json_body(&response),
            json!({"error": {"message": "Invalid body content", "code": "INVALID_BODY"}})
        );
    }
}

#[test]
fn body_fills_the_bound_parameter() {
    let response = dispatch(json_request(Method::PATCH, "/rename", r#""Kim""#));
    assert_eq!(response.status(), Some(StatusCode::OK));
    assert_eq!(json_body(&response), json!("Kim"));
}

#[test]
fn empty_body_for_mandatory_parameter_is_invalid() {
    let response = dispatch(json_request(Method::PATCH, "/rename", ""));
    assert_eq!(response.status(), Some(StatusCode::BAD_REQUEST));
    assert_eq!(json_body(&response)["error"]["code"], "INVALID_BODY");
}

#[test]
fn empty_body_leaves_parameter_default() {
    let response = dispatch(json_request(Method::POST, "/label", ""));
    assert_eq!(response.status(), Some(StatusCode::OK));
    assert_eq!(json_body(&response), json!("none"));

    let response = dispatch(json_request(Method::POST, "/label", r#""urgent""#));
    assert_eq!(json_body(&response), json!("urgent"));
}

// ---------------------------------------------------------------------------
// Headers and files
// ---------------------------------------------------------------------------

#[test]
fn mandatory_header_must_be_present() {
    let response = dispatch(HttpRequest::new(Method::GET, "/secret"));
    assert_eq!(response.status(), Some(StatusCode::PRECONDITION_FAILED));
    assert_eq!(
        json_body(&response),
        json!({
            "error": {"message": "Mandatory header X-Token missing", "code": "MISSING_HEADER"},
            "data": {"header": "X-Token"}
        })
    );

    let request = HttpRequest::new(Method::GET, "/secret")
        .with_header(HeaderName::from_static("x-token"), HeaderValue::from_static("abc"));
    let response = dispatch(request);
    assert_eq!(json_body(&response), json!("abc"));
}

#[test]
fn uploaded_file_is_passed_to_service() {
    let request = HttpRequest::new(Method::POST, "/avatar")
        .with_header(CONTENT_TYPE, HeaderValue::from_static("multipart/form-data; boundary=x"))
        .with_files("avatar", UploadedFiles::Single(file("me.png")));
    let response = dispatch(request);
    assert_eq!(response.status(), Some(StatusCode::OK));
    assert_eq!(json_body(&response), json!("me.png"));
}

#[test]
fn several_files_for_single_file_parameter_are_rejected() {
    let request = HttpRequest::new(Method::POST, "/avatar").with_files(
        "avatar",
        UploadedFiles::Multiple(vec![file("a.png"), file("b.png")]),
    );
    let response = dispatch(request);
    assert_eq!(response.status(), Some(StatusCode::BAD_REQUEST));
    assert_eq!(
        json_body(&response)["error"]["message"],
        "A single file was expected for field avatar"
    );
}

#[test]
fn union_parameter_accepts_a_file_or_a_field() {
    let request = HttpRequest::new(Method::POST, "/attach")
        .with_files("attachment", UploadedFiles::Single(file("cv.pdf")));
    let response = dispatch(request);
    assert_eq!(response.status(), Some(StatusCode::OK));
    assert_eq!(json_body(&response), json!("file cv.pdf"));

    let response = dispatch(json_request(
        Method::POST,
        "/attach",
        r#"{"attachment":"https://cv.example"}"#,
    ));
    assert_eq!(json_body(&response), json!("link https://cv.example"));
}

// ---------------------------------------------------------------------------
// Versions and capabilities
// ---------------------------------------------------------------------------

#[test]
fn highest_permitted_version_is_selected() {
    let response = dispatch(HttpRequest::new(Method::PUT, "/documents"));
    assert_eq!(json_body(&response), json!("v1"));

    let request = HttpRequest::new(Method::PUT, "/documents")
        .with_header(HeaderName::from_static("x-role"), HeaderValue::from_static("editor"));
    let response = dispatch(request);
    assert_eq!(json_body(&response), json!("v2"));
}

fn editor(uri: &str) -> HttpRequest {
    HttpRequest::new(Method::PUT, uri)
        .with_header(HeaderName::from_static("x-role"), HeaderValue::from_static("editor"))
}

#[test]
fn version_bound_routes_pin_the_implementation() {
    let response = dispatch(editor("/documents/first"));
    assert_eq!(response.status(), Some(StatusCode::OK));
    assert_eq!(json_body(&response), json!("v1"));

    let response = dispatch(editor("/documents/stable"));
    assert_eq!(json_body(&response), json!("v1"));

    let response = dispatch(editor("/documents/second"));
    assert_eq!(json_body(&response), json!("v2"));
}

#[test]
fn unusable_bound_version_is_an_internal_error() {
    let response = dispatch(editor("/documents/future"));
    assert_eq!(response.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    let body = json_body(&response);
    assert_eq!(body["error"]["message"], "Internal Server Error");
    assert_eq!(body["exception"]["type"], "Internal");
    assert!(body["exception"]["message"]
        .as_str()
        .unwrap()
        .contains("version #9 of service Documents"));

    let response = dispatch(HttpRequest::new(Method::PUT, "/documents/second"));
    assert_eq!(response.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    assert!(json_body(&response)["exception"]["message"]
        .as_str()
        .unwrap()
        .contains("version #2 of service Documents"));
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[test]
fn short_password_is_a_visible_violation() {
    let response = dispatch(json_request(Method::POST, "/users", r#"{"password":"short"}"#));
    assert_eq!(response.status(), Some(StatusCode::BAD_REQUEST));
    assert_eq!(
        json_body(&response),
        json!({
            "error": {"message": "Validation failed"},
            "violations": [
                {"message": "String length is not >= 8", "field": "password", "value": "short"}
            ]
        })
    );
}

#[test]
fn nested_validation_failures_stay_internal() {
    let response = dispatch(json_request(Method::POST, "/signup", r#"{"password":"short"}"#));
    assert_eq!(response.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    let body = json_body(&response);
    assert_eq!(body["error"]["message"], "Internal Server Error");
    assert_eq!(body["exception"]["type"], "Validation");

    let response = dispatch(json_request(Method::POST, "/signup", r#"{"password":"long enough"}"#));
    assert_eq!(json_body(&response), json!(true));
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

#[test]
fn router_errors_map_to_http_statuses() {
    let response = dispatch(HttpRequest::new(Method::GET, "/nowhere"));
    assert_eq!(response.status(), Some(StatusCode::NOT_FOUND));

    let response = dispatch(HttpRequest::new(Method::DELETE, "/users/1"));
    assert_eq!(response.status(), Some(StatusCode::METHOD_NOT_ALLOWED));
    assert_eq!(json_body(&response)["error"]["code"], "METHOD_NOT_ALLOWED");
}

#[tokio::test]
async fn tower_service_strips_script_prefix() {
    let mut request = http::Request::builder()
        .method(Method::POST)
        .uri("/app/index.php/users/7?name=Eve")
        .body(Bytes::new())
        .unwrap();
    request
        .extensions_mut()
        .insert(ScriptName("/app/index.php".to_string()));
    let response = DispatchService::from(router()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(CONTENT_TYPE).unwrap(),
        "application/json"
    );
    let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body, json!([7, "Eve"]));
}
