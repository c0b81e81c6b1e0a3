//! Handler and script capabilities, plus the built-in fallback handlers

use crate::error::HandlerError;
use crate::models::{ResolutionRequest, Response};
use crate::resource::NON_EXISTING_RESOURCE_TYPE;
use http::StatusCode;
use std::fmt;
use std::sync::Arc;

/// Shared reference to a handler
pub type HandlerRef = Arc<dyn Handler>;

/// Shared reference to a script
pub type ScriptRef = Arc<dyn Script>;

/// Configuration handed to a handler when it is bound
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerConfig {
    /// Resolved registration name
    pub name: String,
}

/// Something that can serve a request once resolved.
///
/// Plain handlers accept every request they are matched for. Opting
/// handlers return `true` from [`Handler::is_opting`] and are asked
/// [`Handler::accepts`] before being committed to.
pub trait Handler: Send + Sync {
    /// Display name used in logs and error attributes
    fn name(&self) -> &str;

    /// Serve the request
    fn service(&self, request: &ResolutionRequest, response: &mut Response)
        -> Result<(), HandlerError>;

    fn is_opting(&self) -> bool {
        false
    }

    /// Only consulted for opting handlers
    fn accepts(&self, _request: &ResolutionRequest) -> bool {
        true
    }

    fn init(&self, _config: &HandlerConfig) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Teardown hook invoked on unbind
    fn destroy(&self) -> Result<(), HandlerError> {
        Ok(())
    }
}

impl fmt::Debug for dyn Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name())
            .field("opting", &self.is_opting())
            .finish()
    }
}

/// A script stored in the resource tree
pub trait Script: Send + Sync {
    /// Path of the script resource
    fn path(&self) -> &str;

    /// Evaluate the script for a request
    fn eval(&self, request: &ResolutionRequest, response: &mut Response)
        -> Result<(), HandlerError>;
}

/// Handler backed by a script resource.
///
/// Evaluation renders a short marker naming the script, which is what the
/// in-memory content provider hands out for script resources.
#[derive(Debug, Clone)]
pub struct ScriptHandler {
    path: String,
}

impl ScriptHandler {
    pub fn new(path: impl Into<String>) -> Self {
        ScriptHandler { path: path.into() }
    }
}

impl Handler for ScriptHandler {
    fn name(&self) -> &str {
        &self.path
    }

    fn service(
        &self,
        request: &ResolutionRequest,
        response: &mut Response,
    ) -> Result<(), HandlerError> {
        self.eval(request, response)
    }
}

impl Script for ScriptHandler {
    fn path(&self) -> &str {
        &self.path
    }

    fn eval(
        &self,
        request: &ResolutionRequest,
        response: &mut Response,
    ) -> Result<(), HandlerError> {
        response.set_content_type("text/plain");
        response.write_str(&format!(
            "Rendered {} by {}\n",
            request.path_info.resource_path, self.path
        ));
        Ok(())
    }
}

/// Last-resort handler used when nothing else applies to a request
#[derive(Debug, Default, Clone)]
pub struct DefaultHandler;

impl DefaultHandler {
    pub const NAME: &'static str = "Default Handler";
}

impl Handler for DefaultHandler {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn service(
        &self,
        request: &ResolutionRequest,
        response: &mut Response,
    ) -> Result<(), HandlerError> {
        match &request.resource {
            Some(resource) if resource.resource_type() != NON_EXISTING_RESOURCE_TYPE => {
                response.set_status(StatusCode::OK);
                response.set_content_type("text/plain");
                response.write_str(&format!(
                    "Resource path: {}\nResource type: {}\n",
                    resource.path(),
                    resource.resource_type()
                ));
            }
            _ => {
                response.set_status(StatusCode::NOT_FOUND);
                response.set_content_type("text/plain");
                response.write_str(&format!(
                    "No resource found at {}\n",
                    request.path_info.resource_path
                ));
            }
        }
        Ok(())
    }
}

/// Ad hoc error handler used when no error handler is registered
#[derive(Debug, Default, Clone)]
pub struct DefaultErrorHandler;

impl DefaultErrorHandler {
    pub const NAME: &'static str = "Default Error Handler";
}

impl Handler for DefaultErrorHandler {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn service(
        &self,
        request: &ResolutionRequest,
        response: &mut Response,
    ) -> Result<(), HandlerError> {
        let attrs = &request.attributes;
        let status = attrs
            .error_status
            .and_then(|s| StatusCode::from_u16(s).ok())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        response.reset_buffer();
        response.set_status(status);
        response.set_content_type("text/plain");

        let mut body = format!(
            "{} {}\n",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Error")
        );
        if let Some(message) = &attrs.error_message {
            body.push_str(&format!("Message: {}\n", message));
        }
        if let Some(uri) = &attrs.error_request_uri {
            body.push_str(&format!("Request URI: {}\n", uri));
        }
        if let Some(servlet) = &attrs.error_servlet_name {
            body.push_str(&format!("Servlet: {}\n", servlet));
        }
        if let Some(exception) = &attrs.error_exception_type {
            body.push_str(&format!("Exception: {}\n", exception));
        }
        response.write_str(&body);
        Ok(())
    }
}
