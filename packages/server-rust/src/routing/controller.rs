use std::sync::Arc;

use switchyard_core::{
    BodyBinding, DispatchError, ErrorKind, MethodDescriptor, TypeDescriptor, Value,
    ValueDescriptor,
};

use uuid::Uuid;

use super::{MethodBinding, Router};
use crate::network::{Request, Response, UploadedFiles};
use crate::service::{RequestInfo, RequestScope};

/// Runs one bound service method for a matched request: the handler stages,
/// argument assembly, service resolution, the call, and result conversion.
pub struct ServiceController<'r> {
    router: &'r Router,
    binding: &'r MethodBinding,
    metadata: &'r MethodDescriptor,
}

impl<'r> ServiceController<'r> {
    /// # Errors
    ///
    /// Internal error when the bound service or method has no descriptor.
    pub fn new(router: &'r Router, binding: &'r MethodBinding) -> Result<Self, DispatchError> {
        let metadata = router
            .context()
            .catalog()
            .service(&binding.service)
            .and_then(|service| service.find_method(&binding.method))
            .ok_or_else(|| {
                DispatchError::internal(format!(
                    "No metadata found for method {}:{}",
                    binding.service, binding.method
                ))
            })?;
        Ok(Self {
            router,
            binding,
            metadata,
        })
    }

    /// Processes the request through every stage, leaving the result in the
    /// response body. Service instances are scoped to `request_id`.
    ///
    /// # Errors
    ///
    /// Any handler, argument, resolution, service, or conversion error.
    pub fn call(
        &self,
        request_id: Uuid,
        request: &mut dyn Request,
        response: &mut dyn Response,
    ) -> Result<(), DispatchError> {
        let handlers = self.router.handlers();
        let context = self.router.context();

        for handler in handlers {
            if handler.pre_process(request, response)? {
                break;
            }
        }

        let args = self.arguments(request)?;
        let scope = RequestScope::with_id(
            request_id,
            Arc::clone(context),
            RequestInfo::from_request(request),
        );
        tracing::debug!(
            service = %self.binding.service,
            method = %self.binding.method,
            "dispatching to service"
        );
        let proxy = scope.service(&self.binding.service, self.binding.version.as_ref())?;
        let mut result = proxy.call(&self.binding.method, &args)?;

        for handler in handlers {
            if handler.post_process(&mut result, request, response)? {
                break;
            }
        }

        let mut converted = context.converter().responses().to_wire(&result)?;

        for handler in handlers {
            if handler.pre_response(&mut converted, request, response)? {
                break;
            }
        }

        response.set_body(converted);

        for handler in handlers {
            if handler.post_response(request, response)? {
                break;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Argument assembly
    // -----------------------------------------------------------------------

    /// Builds positional arguments from request fields, converted to the
    /// declared parameter types.
    fn arguments(&self, request: &mut dyn Request) -> Result<Vec<Value>, DispatchError> {
        self.bind_additional_fields(request)?;
        let converter = self.router.context().converter();
        let mut args = Vec::with_capacity(self.metadata.parameters.len());
        for parameter in &self.metadata.parameters {
            if let Some(ty) = parameter.types.iter().find(|ty| ty.is_file()) {
                let only_files = parameter.types.iter().all(TypeDescriptor::is_file);
                if only_files || request.uploaded_files(&parameter.name).is_some() {
                    args.push(file_argument(request, parameter, ty)?);
                    continue;
                }
            }
            let value = match request.field(&parameter.name) {
                Some(raw) => converter
                    .from_request(raw, &parameter.types, &parameter.name)?
                    .ok_or_else(|| DispatchError::invalid_field(&parameter.name))?,
                None => parameter
                    .default_value()
                    .cloned()
                    .ok_or_else(|| DispatchError::missing_field(&parameter.name))?,
            };
            args.push(value);
        }
        Ok(args)
    }

    /// Copies the body and bound headers into request fields.
    fn bind_additional_fields(&self, request: &mut dyn Request) -> Result<(), DispatchError> {
        match &self.metadata.body {
            Some(BodyBinding::Whole) => {
                let Value::Map(fields) = request.body().clone() else {
                    return Err(invalid_body());
                };
                for (name, value) in fields {
                    request.set_field(&name, value);
                }
            }
            Some(BodyBinding::Parameter(parameter)) => {
                let body = request.body().clone();
                if !body.is_null() {
                    request.set_field(parameter, body);
                } else if self.is_mandatory(parameter) {
                    return Err(invalid_body());
                }
            }
            None => {
                if let Value::Map(fields) = request.body().clone() {
                    for (name, value) in fields {
                        request.set_field(&name, value);
                    }
                }
            }
        }

        for binding in &self.metadata.headers {
            match request.header(&binding.header).map(str::to_string) {
                Some(value) => request.set_field(&binding.parameter, Value::String(value)),
                None if self.is_mandatory(&binding.parameter) => {
                    return Err(DispatchError::api_with(
                        ErrorKind::MissingHeader,
                        format!("Mandatory header {} missing", binding.header),
                        "header",
                        binding.header.as_str(),
                    ));
                }
                None => {}
            }
        }
        Ok(())
    }

    fn is_mandatory(&self, parameter: &str) -> bool {
        !matches!(self.metadata.parameter(parameter), Some(descriptor) if descriptor.has_default)
    }
}

fn invalid_body() -> DispatchError {
    DispatchError::api(ErrorKind::InvalidBody, "Invalid body content")
}

fn file_argument(
    request: &dyn Request,
    parameter: &ValueDescriptor,
    ty: &TypeDescriptor,
) -> Result<Value, DispatchError> {
    let Some(files) = request.uploaded_files(&parameter.name) else {
        return parameter
            .default_value()
            .cloned()
            .ok_or_else(|| DispatchError::missing_field(&parameter.name));
    };
    match (files, ty.is_array) {
        (UploadedFiles::Multiple(_), false) => Err(DispatchError::invalid_field_because(
            &parameter.name,
            format!("A single file was expected for field {}", parameter.name),
        )),
        (UploadedFiles::Single(_), true) => Err(DispatchError::invalid_field_because(
            &parameter.name,
            format!("An array of files was expected for field {}", parameter.name),
        )),
        (files, _) => Ok(files.clone().into_value()),
    }
}
