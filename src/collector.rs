//! Candidate collection
//!
//! Turns a [`ResolutionKey`] into the ordered list of resource paths at
//! which a handler may live. The order is the priority order: the first
//! path yielding an accepted handler wins.
//!
//! For a request the walk is: search paths outermost, then the type chain
//! (resource type, its super types, finally the default type), then the
//! selector depth from most to least specific, then extension/method
//! variants.

use crate::models::ResolutionRequest;
use crate::resource::{normalize, Resource, ResourceProvider};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Type every request falls back to
pub const DEFAULT_RESOURCE_TYPE: &str = "sling/servlet/default";

/// Base type for error handler lookups
pub const ERROR_HANDLER_RESOURCE_TYPE: &str = "sling/servlet/errorhandler";

/// Handler name tried when no status or exception specific handler exists
pub const DEFAULT_ERROR_HANDLER_NAME: &str = "default";

/// Upper bound on super type hops; protects against cycles the
/// seen-set misses (e.g. types differing only by ':' vs '/').
const MAX_TYPE_DEPTH: usize = 64;

/// What is being resolved
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CollectorKind {
    /// A request; `method` is upper case with HEAD mapped to GET
    Request {
        method: String,
        selectors: Vec<String>,
        extension: Option<String>,
    },
    /// A script or handler by name
    Named { name: String },
    /// An error handler by status code or exception name
    Error { name: String },
}

/// Canonical description of a resolution.
///
/// Everything that influences the outcome of a resolution, apart from
/// content and registrations (which flush the cache when they change), is
/// part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolutionKey {
    pub kind: CollectorKind,
    pub resource_type: String,
    /// Explicit super type carried by the resource itself
    pub resource_super_type: Option<String>,
    pub workspace: Option<String>,
    /// Allow-list in effect; `None` allows every path
    pub execution_paths: Option<Arc<[String]>>,
}

impl ResolutionKey {
    /// Key for resolving a request against its resource
    pub fn for_request(
        request: &ResolutionRequest,
        workspace: Option<String>,
        execution_paths: Option<Arc<[String]>>,
    ) -> Self {
        let method = match request.method.as_str().to_ascii_uppercase().as_str() {
            "HEAD" => "GET".to_string(),
            other => other.to_string(),
        };
        let (resource_type, resource_super_type) = type_of(request.resource.as_ref());
        ResolutionKey {
            kind: CollectorKind::Request {
                method,
                selectors: request.path_info.selectors.clone(),
                extension: request.path_info.extension.clone(),
            },
            resource_type,
            resource_super_type,
            workspace,
            execution_paths,
        }
    }

    /// Key for resolving a script name, optionally relative to a resource's type
    pub fn for_name(
        resource: Option<&Resource>,
        name: &str,
        workspace: Option<String>,
        execution_paths: Option<Arc<[String]>>,
    ) -> Self {
        let (resource_type, resource_super_type) = type_of(resource);
        ResolutionKey {
            kind: CollectorKind::Named {
                name: name.to_string(),
            },
            resource_type,
            resource_super_type,
            workspace,
            execution_paths,
        }
    }

    /// Key for resolving an error handler below a resource's type
    pub fn for_error(
        resource: &Resource,
        handler_name: &str,
        workspace: Option<String>,
        execution_paths: Option<Arc<[String]>>,
    ) -> Self {
        let (resource_type, resource_super_type) = type_of(Some(resource));
        ResolutionKey {
            kind: CollectorKind::Error {
                name: handler_name.to_string(),
            },
            resource_type,
            resource_super_type,
            workspace,
            execution_paths,
        }
    }

    /// Path probed directly, bypassing collection and caching: an absolute
    /// resource type for requests, an absolute name for named lookups.
    pub fn absolute_target(&self) -> Option<&str> {
        let target = match &self.kind {
            CollectorKind::Request { .. } => self.resource_type.as_str(),
            CollectorKind::Named { name } => name.as_str(),
            CollectorKind::Error { .. } => return None,
        };
        target.starts_with('/').then_some(target)
    }
}

fn type_of(resource: Option<&Resource>) -> (String, Option<String>) {
    match resource {
        Some(r) => (
            r.resource_type().to_string(),
            r.resource_super_type().map(str::to_string),
        ),
        None => (String::new(), None),
    }
}

/// Whether `path` is inside the allow-list.
///
/// A prefix ending in '/' matches by plain prefix; any other prefix matches
/// the path itself or anything below it, so "/apps" does not admit
/// "/appsfoo".
pub fn is_path_allowed(path: &str, execution_paths: Option<&[String]>) -> bool {
    let Some(prefixes) = execution_paths else {
        return true;
    };
    prefixes.iter().any(|prefix| {
        if prefix.ends_with('/') {
            path.starts_with(prefix.as_str())
        } else {
            path == prefix
                || (path.starts_with(prefix.as_str()) && path[prefix.len()..].starts_with('/'))
        }
    })
}

/// Prefix a path with a workspace name, `wsp:/path`
pub fn with_workspace(path: &str, workspace: Option<&str>) -> String {
    match workspace {
        Some(wsp) => format!("{}:{}", wsp, path),
        None => path.to_string(),
    }
}

/// Enumerates candidate paths for one key
pub struct ResourceCollector<'a> {
    key: &'a ResolutionKey,
    default_extensions: &'a [String],
}

impl<'a> ResourceCollector<'a> {
    pub fn new(key: &'a ResolutionKey, default_extensions: &'a [String]) -> Self {
        ResourceCollector {
            key,
            default_extensions,
        }
    }

    pub fn key(&self) -> &ResolutionKey {
        self.key
    }

    /// Resource type, its super types and the kind's base type, in order.
    ///
    /// The first super type is the resource's own explicit one when set,
    /// the provider's declaration otherwise; later ones always come from the
    /// provider. A cycle ends the chain.
    pub fn type_chain(&self, provider: &dyn ResourceProvider) -> Vec<String> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let resource_type = self.key.resource_type.as_str();

        if !resource_type.is_empty() {
            seen.insert(resource_type.to_string());
            chain.push(resource_type.to_string());

            let mut next = self
                .key
                .resource_super_type
                .clone()
                .or_else(|| provider.resource_super_type(resource_type));
            while let Some(super_type) = next {
                if super_type.is_empty() || !seen.insert(super_type.clone()) {
                    debug!("Super type chain of {} stops at {}", resource_type, super_type);
                    break;
                }
                if chain.len() > MAX_TYPE_DEPTH {
                    warn!(
                        "Super type chain of {} exceeds {} types, truncated",
                        resource_type, MAX_TYPE_DEPTH
                    );
                    break;
                }
                next = provider.resource_super_type(&super_type);
                chain.push(super_type);
            }
        }

        let base = match &self.key.kind {
            CollectorKind::Request { .. } => Some(DEFAULT_RESOURCE_TYPE),
            CollectorKind::Error { .. } => Some(ERROR_HANDLER_RESOURCE_TYPE),
            CollectorKind::Named { .. } => None,
        };
        if let Some(base) = base {
            if seen.insert(base.to_string()) {
                chain.push(base.to_string());
            }
        }
        chain
    }

    /// Ordered candidate paths for a type chain.
    ///
    /// Paths are normalized, filtered by the allow-list, prefixed with the
    /// workspace and de-duplicated keeping the first occurrence.
    pub fn collect(&self, chain: &[String], search_paths: &[String]) -> Vec<String> {
        let mut raw = Vec::new();
        for root in search_paths {
            match &self.key.kind {
                CollectorKind::Request {
                    method,
                    selectors,
                    extension,
                } => {
                    for resource_type in chain {
                        self.request_paths(
                            &location(root, resource_type),
                            resource_type,
                            method,
                            selectors,
                            extension.as_deref(),
                            &mut raw,
                        );
                    }
                }
                CollectorKind::Named { name } => {
                    for resource_type in chain {
                        raw.push(format!("{}/{}", location(root, resource_type), name));
                    }
                    raw.push(format!("{}{}", root, name));
                }
                CollectorKind::Error { name } => {
                    for resource_type in chain {
                        raw.push(format!("{}/{}", location(root, resource_type), name));
                    }
                }
            }
        }

        let allow = self.key.execution_paths.as_deref();
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for path in raw {
            let Some(path) = normalize(&path) else {
                continue;
            };
            if !is_path_allowed(&path, allow) {
                continue;
            }
            let path = with_workspace(&path, self.key.workspace.as_deref());
            if seen.insert(path.clone()) {
                candidates.push(path);
            }
        }
        candidates
    }

    /// Type chain plus collection in one go
    pub fn candidates(&self, provider: &dyn ResourceProvider) -> Vec<String> {
        let chain = self.type_chain(provider);
        let candidates = self.collect(&chain, &provider.search_paths());
        debug!(
            "Collected {} candidates for {:?} over chain {:?}",
            candidates.len(),
            self.key.kind,
            chain
        );
        candidates
    }

    fn request_paths(
        &self,
        location: &str,
        resource_type: &str,
        method: &str,
        selectors: &[String],
        extension: Option<&str>,
        out: &mut Vec<String>,
    ) {
        let get_like = method == "GET";
        let ext_optional = match extension {
            None => true,
            Some(ext) => self.default_extensions.iter().any(|d| d == ext),
        };
        let type_name = resource_type
            .replace(':', "/")
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();

        for depth in (1..=selectors.len()).rev() {
            let base = format!("{}/{}", location, selectors[..depth].join("/"));
            if let Some(ext) = extension {
                out.push(format!("{}.{}.{}", base, ext, method));
                if get_like {
                    out.push(format!("{}.{}", base, ext));
                }
            }
            if ext_optional {
                out.push(format!("{}.{}", base, method));
                if get_like {
                    out.push(base);
                }
            }
        }

        if let Some(ext) = extension {
            out.push(format!("{}/{}.{}.{}", location, type_name, ext, method));
            if get_like {
                out.push(format!("{}/{}.{}", location, type_name, ext));
            }
            out.push(format!("{}/{}.{}", location, ext, method));
            if get_like {
                out.push(format!("{}/{}", location, ext));
            }
        }
        out.push(format!("{}/{}", location, method));
        if ext_optional && get_like {
            out.push(format!("{}/{}", location, type_name));
        }
    }
}

/// Location of a type below a search root; absolute types stand alone
fn location(root: &str, resource_type: &str) -> String {
    let relative = resource_type.replace(':', "/");
    let relative = relative.trim_end_matches('/');
    if relative.starts_with('/') {
        relative.to_string()
    } else {
        format!("{}{}", root, relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::InMemoryResourceProvider;
    use http::Method;

    fn roots() -> Vec<String> {
        vec!["/apps/".to_string(), "/libs/".to_string()]
    }

    fn html() -> Vec<String> {
        vec!["html".to_string()]
    }

    fn request_key(method: Method, url: &str, resource_type: &str) -> ResolutionKey {
        let request = ResolutionRequest::new(method, url)
            .with_resource(Resource::new("/content/page", resource_type));
        ResolutionKey::for_request(&request, None, None)
    }

    #[test]
    fn test_request_order_with_selector_and_extension() {
        let key = request_key(Method::GET, "/content/page.print.json", "my/page");
        let ext = html();
        let collector = ResourceCollector::new(&key, &ext);

        let paths = collector.collect(&["my/page".to_string()], &["/apps/".to_string()]);
        assert_eq!(
            paths,
            vec![
                "/apps/my/page/print.json.GET",
                "/apps/my/page/print.json",
                "/apps/my/page/page.json.GET",
                "/apps/my/page/page.json",
                "/apps/my/page/json.GET",
                "/apps/my/page/json",
                "/apps/my/page/GET",
            ]
        );
    }

    #[test]
    fn test_request_order_with_default_extension() {
        let key = request_key(Method::GET, "/content/page.a.b.html", "my/page");
        let ext = html();
        let collector = ResourceCollector::new(&key, &ext);

        let paths = collector.collect(&["my/page".to_string()], &["/apps/".to_string()]);
        assert_eq!(
            paths,
            vec![
                "/apps/my/page/a/b.html.GET",
                "/apps/my/page/a/b.html",
                "/apps/my/page/a/b.GET",
                "/apps/my/page/a/b",
                "/apps/my/page/a.html.GET",
                "/apps/my/page/a.html",
                "/apps/my/page/a.GET",
                "/apps/my/page/a",
                "/apps/my/page/page.html.GET",
                "/apps/my/page/page.html",
                "/apps/my/page/html.GET",
                "/apps/my/page/html",
                "/apps/my/page/GET",
                "/apps/my/page/page",
            ]
        );
    }

    #[test]
    fn test_post_skips_get_only_names() {
        let key = request_key(Method::POST, "/content/page", "my/page");
        let ext = html();
        let collector = ResourceCollector::new(&key, &ext);

        let paths = collector.collect(&["my/page".to_string()], &["/apps/".to_string()]);
        assert_eq!(paths, vec!["/apps/my/page/POST"]);
    }

    #[test]
    fn test_head_resolves_like_get() {
        let head = request_key(Method::HEAD, "/content/page.html", "my/page");
        let get = request_key(Method::GET, "/content/page.html", "my/page");
        assert_eq!(head, get);
    }

    #[test]
    fn test_type_chain_with_cycle_and_default() {
        let provider = InMemoryResourceProvider::new(["/apps/", "/libs/"]);
        provider.declare_super_type("a", "b");
        provider.declare_super_type("b", "a");

        let key = request_key(Method::GET, "/content/page.html", "a");
        let ext = html();
        let chain = ResourceCollector::new(&key, &ext).type_chain(&provider);
        assert_eq!(chain, vec!["a", "b", DEFAULT_RESOURCE_TYPE]);
    }

    #[test]
    fn test_explicit_super_type_wins() {
        let provider = InMemoryResourceProvider::new(["/apps/"]);
        provider.declare_super_type("my/page", "declared");
        provider.declare_super_type("explicit", "base");

        let request = ResolutionRequest::get("/content/page.html").with_resource(
            Resource::new("/content/page", "my/page").with_super_type("explicit"),
        );
        let key = ResolutionKey::for_request(&request, None, None);
        let ext = html();
        let chain = ResourceCollector::new(&key, &ext).type_chain(&provider);
        assert_eq!(chain, vec!["my/page", "explicit", "base", DEFAULT_RESOURCE_TYPE]);
    }

    #[test]
    fn test_search_paths_outermost() {
        let key = request_key(Method::POST, "/content/page", "my/page");
        let ext = html();
        let collector = ResourceCollector::new(&key, &ext);
        let chain = vec!["my/page".to_string(), DEFAULT_RESOURCE_TYPE.to_string()];

        let paths = collector.collect(&chain, &roots());
        assert_eq!(
            paths,
            vec![
                "/apps/my/page/POST",
                "/apps/sling/servlet/default/POST",
                "/libs/my/page/POST",
                "/libs/sling/servlet/default/POST",
            ]
        );
    }

    #[test]
    fn test_absolute_super_type_emitted_once() {
        let key = request_key(Method::POST, "/content/page", "my/page");
        let ext = html();
        let collector = ResourceCollector::new(&key, &ext);
        let chain = vec!["my/page".to_string(), "/base/type".to_string()];

        let paths = collector.collect(&chain, &roots());
        assert_eq!(
            paths,
            vec!["/apps/my/page/POST", "/base/type/POST", "/libs/my/page/POST"]
        );
    }

    #[test]
    fn test_allow_list_and_workspace() {
        let request = ResolutionRequest::new(Method::POST, "/content/page")
            .with_resource(Resource::new("/content/page", "my/page"));
        let allow: Arc<[String]> = vec!["/libs".to_string()].into();
        let key = ResolutionKey::for_request(&request, Some("live".to_string()), Some(allow));
        let ext = html();
        let collector = ResourceCollector::new(&key, &ext);

        let paths = collector.collect(&["my/page".to_string()], &roots());
        assert_eq!(paths, vec!["live:/libs/my/page/POST"]);
    }

    #[test]
    fn test_is_path_allowed_boundaries() {
        let allow = vec!["/apps".to_string(), "/libs/".to_string()];
        assert!(is_path_allowed("/apps", Some(&allow)));
        assert!(is_path_allowed("/apps/x/html", Some(&allow)));
        assert!(!is_path_allowed("/appsfoo/x", Some(&allow)));
        assert!(is_path_allowed("/libs/x", Some(&allow)));
        assert!(!is_path_allowed("/etc/foo", Some(&allow)));
        assert!(is_path_allowed("/etc/foo", None));
    }

    #[test]
    fn test_named_and_error_collection() {
        let resource = Resource::new("/content/page", "my/page");
        let key = ResolutionKey::for_name(Some(&resource), "helper.js", None, None);
        let ext = html();
        let paths = ResourceCollector::new(&key, &ext).collect(&["my/page".to_string()], &roots());
        assert_eq!(
            paths,
            vec![
                "/apps/my/page/helper.js",
                "/apps/helper.js",
                "/libs/my/page/helper.js",
                "/libs/helper.js",
            ]
        );

        let key = ResolutionKey::for_error(&resource, "404", None, None);
        let provider = InMemoryResourceProvider::new(["/apps/"]);
        let paths = ResourceCollector::new(&key, &ext).candidates(&provider);
        assert_eq!(
            paths,
            vec!["/apps/my/page/404", "/apps/sling/servlet/errorhandler/404"]
        );
    }

    #[test]
    fn test_absolute_target() {
        let key = request_key(Method::GET, "/x.html", "/apps/direct/handler");
        assert_eq!(key.absolute_target(), Some("/apps/direct/handler"));

        let key = ResolutionKey::for_name(None, "/libs/x.js", None, None);
        assert_eq!(key.absolute_target(), Some("/libs/x.js"));

        let key = request_key(Method::GET, "/x.html", "my/page");
        assert_eq!(key.absolute_target(), None);
    }
}
