//! Host-facing request/response abstractions and the tower entry point.

pub mod request;
pub mod response;
pub mod service;

pub use request::{HttpRequest, Request, ScriptName, UploadedFiles};
pub use response::{HttpResponse, Response};
pub use service::DispatchService;
