//! Decomposition of request URLs into resource path, selectors, extension and suffix

use serde::{Deserialize, Serialize};
use tracing::debug;

/// The parts of a request path relevant to handler resolution
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestPathInfo {
    /// Path of the addressed resource
    pub resource_path: String,
    /// Dot-separated tokens between the resource path and the extension
    pub selectors: Vec<String>,
    /// Last dot-separated token, if any
    pub extension: Option<String>,
    /// Trailing path after the extension, starting with '/'
    pub suffix: Option<String>,
}

impl RequestPathInfo {
    /// Create path info for a bare resource path
    pub fn new(resource_path: impl Into<String>) -> Self {
        RequestPathInfo {
            resource_path: resource_path.into(),
            ..Default::default()
        }
    }

    /// Builder-style selectors
    pub fn with_selectors<I, S>(mut self, selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selectors = selectors.into_iter().map(Into::into).collect();
        self
    }

    /// Builder-style extension
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    /// Decompose a request URL.
    ///
    /// Query string and fragment are dropped. The first dot of the path
    /// splits the resource path from selectors and extension; a '/' after
    /// that dot starts the suffix. A real request may split differently
    /// depending on which resources exist.
    ///
    /// # Examples
    /// ```
    /// use servlet_resolver::RequestPathInfo;
    ///
    /// let info = RequestPathInfo::from_url("/content/page.print.a4.html/extra?x=1");
    /// assert_eq!(info.resource_path, "/content/page");
    /// assert_eq!(info.selectors, vec!["print", "a4"]);
    /// assert_eq!(info.extension.as_deref(), Some("html"));
    /// assert_eq!(info.suffix.as_deref(), Some("/extra"));
    /// ```
    pub fn from_url(url: &str) -> Self {
        let path = url
            .split(['?', '#'])
            .next()
            .unwrap_or_default();

        let Some(dot) = path.find('.') else {
            return RequestPathInfo::new(path);
        };

        let resource_path = &path[..dot];
        let mut rest = &path[dot + 1..];
        let mut suffix = None;
        if let Some(slash) = rest.find('/') {
            suffix = Some(rest[slash..].to_string());
            rest = &rest[..slash];
        }

        let mut tokens: Vec<String> = rest
            .split('.')
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        let extension = tokens.pop();

        let info = RequestPathInfo {
            resource_path: resource_path.to_string(),
            selectors: tokens,
            extension,
            suffix,
        };
        debug!(
            "Decomposed url={} into path={} selectors={:?} extension={:?} suffix={:?}",
            url, info.resource_path, info.selectors, info.extension, info.suffix
        );
        info
    }

    /// Selector string as it appears in the URL, e.g. "print.a4"
    pub fn selector_string(&self) -> Option<String> {
        if self.selectors.is_empty() {
            None
        } else {
            Some(self.selectors.join("."))
        }
    }
}
