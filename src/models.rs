//! Request, response and exception models used during resolution

use crate::request_path::RequestPathInfo;
use crate::resource::Resource;
use bytes::BytesMut;
use http::{Method, StatusCode};
use std::sync::Arc;

/// Typed request attributes set during error handling
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestAttributes {
    /// Status code being handled
    pub error_status: Option<u16>,
    pub error_message: Option<String>,
    /// Simple name of the exception type being handled
    pub error_exception_type: Option<String>,
    /// Name of the handler that caused (or handles) the error
    pub error_servlet_name: Option<String>,
    /// Name of the handler currently servicing the request
    pub current_servlet_name: Option<String>,
    /// Set once error handling started; marks recursive invocations
    pub error_request_uri: Option<String>,
}

impl RequestAttributes {
    /// Whether error handling is already in progress for this request
    pub fn is_handling_error(&self) -> bool {
        self.error_request_uri.is_some()
    }
}

/// Everything the resolver needs to know about an incoming request
#[derive(Debug, Clone)]
pub struct ResolutionRequest {
    pub method: Method,
    pub path_info: RequestPathInfo,
    /// The resolved resource; absent when the error happened before resolution
    pub resource: Option<Resource>,
    pub request_uri: String,
    pub attributes: RequestAttributes,
}

impl ResolutionRequest {
    /// Create a request by decomposing the given URL
    pub fn new(method: Method, url: &str) -> Self {
        ResolutionRequest {
            method,
            path_info: RequestPathInfo::from_url(url),
            resource: None,
            request_uri: url.split(['?', '#']).next().unwrap_or_default().to_string(),
            attributes: RequestAttributes::default(),
        }
    }

    /// Shorthand for a GET request
    pub fn get(url: &str) -> Self {
        Self::new(Method::GET, url)
    }

    /// Create a request from already decomposed path info
    pub fn from_path_info(method: Method, path_info: RequestPathInfo) -> Self {
        let request_uri = path_info.resource_path.clone();
        ResolutionRequest {
            method,
            path_info,
            resource: None,
            request_uri,
            attributes: RequestAttributes::default(),
        }
    }

    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Resource type of the request's resource, if any
    pub fn resource_type(&self) -> Option<&str> {
        self.resource.as_ref().map(|r| r.resource_type())
    }

    /// Workspace encoded in the resource path as `wsp:/path`
    pub fn workspace_name(&self) -> Option<String> {
        let path = self.resource.as_ref()?.path();
        path.find(":/").map(|pos| path[..pos].to_string())
    }
}

/// Response being produced by a handler
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    content_type: Option<String>,
    body: BytesMut,
    committed: bool,
}

impl Default for Response {
    fn default() -> Self {
        Response {
            status: StatusCode::OK,
            content_type: None,
            body: BytesMut::new(),
            committed: false,
        }
    }
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Ignored once the response is committed
    pub fn set_status(&mut self, status: StatusCode) {
        if !self.committed {
            self.status = status;
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn set_content_type(&mut self, content_type: &str) {
        if !self.committed {
            self.content_type = Some(content_type.to_string());
        }
    }

    pub fn write_str(&mut self, text: &str) {
        self.body.extend_from_slice(text.as_bytes());
    }

    /// Discard buffered body content; no-op after commit
    pub fn reset_buffer(&mut self) {
        if !self.committed {
            self.body.clear();
        }
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Flush and close the response
    pub fn commit(&mut self) {
        self.committed = true;
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }
}

/// A node in an exception type hierarchy.
///
/// A type without a parent is the root of its hierarchy. Root types are
/// never used as error handler names; the handler search for an exception
/// stops right below the root.
#[derive(Debug, PartialEq, Eq)]
pub struct ExceptionType {
    name: String,
    parent: Option<Arc<ExceptionType>>,
}

impl ExceptionType {
    /// Create a root type
    pub fn root(name: impl Into<String>) -> Arc<Self> {
        Arc::new(ExceptionType {
            name: name.into(),
            parent: None,
        })
    }

    /// Create a type extending `parent`
    pub fn extends(name: impl Into<String>, parent: &Arc<ExceptionType>) -> Arc<Self> {
        Arc::new(ExceptionType {
            name: name.into(),
            parent: Some(Arc::clone(parent)),
        })
    }

    /// Simple type name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<ExceptionType>> {
        self.parent.as_ref()
    }

    /// Names to probe for handlers, most specific first, root excluded
    pub fn handler_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut current = Some(self);
        while let Some(ty) = current {
            if ty.parent.is_none() {
                break;
            }
            names.push(ty.name.clone());
            current = ty.parent.as_deref();
        }
        names
    }
}

/// A raised exception handed to the error handler
#[derive(Debug, Clone)]
pub struct Throwable {
    pub exception_type: Arc<ExceptionType>,
    pub message: Option<String>,
}

impl Throwable {
    pub fn new(exception_type: Arc<ExceptionType>, message: impl Into<String>) -> Self {
        Throwable {
            exception_type,
            message: Some(message.into()),
        }
    }

    pub fn type_name(&self) -> &str {
        self.exception_type.name()
    }
}
