//! Resource tree abstraction and the in-memory content provider
//!
//! The resolver never talks to a content repository directly. It reads the
//! tree through [`ResourceProvider`], which resolves paths, lists children,
//! reports the search paths and adapts resources to handlers or scripts.

use crate::error::{ResolverError, Result};
use crate::handler::{HandlerRef, ScriptHandler, ScriptRef};
use crate::registry::Registration;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Resource type of resources that do not exist
pub const NON_EXISTING_RESOURCE_TYPE: &str = "sling:nonexisting";

/// Resource type given to script resources without an explicit type
pub const SCRIPT_RESOURCE_TYPE: &str = "sling:script";

/// Resource type of nodes that only declare a super type
pub const TYPE_RESOURCE_TYPE: &str = "sling:type";

/// Where a resource comes from
#[derive(Clone)]
pub enum ResourceOrigin {
    /// Stored in the external content tree
    Content,
    /// Made up on the fly (e.g. for error handling before resolution)
    Synthetic,
    /// Exposed by a handler registration
    Registered(Arc<Registration>),
}

impl fmt::Debug for ResourceOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceOrigin::Content => write!(f, "Content"),
            ResourceOrigin::Synthetic => write!(f, "Synthetic"),
            ResourceOrigin::Registered(reg) => write!(f, "Registered({})", reg.name()),
        }
    }
}

/// A node of the resource tree
#[derive(Debug, Clone)]
pub struct Resource {
    path: String,
    resource_type: String,
    resource_super_type: Option<String>,
    origin: ResourceOrigin,
}

impl Resource {
    /// Create a content resource
    pub fn new(path: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Resource {
            path: path.into(),
            resource_type: resource_type.into(),
            resource_super_type: None,
            origin: ResourceOrigin::Content,
        }
    }

    /// Create a synthetic resource
    pub fn synthetic(path: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Resource {
            origin: ResourceOrigin::Synthetic,
            ..Resource::new(path, resource_type)
        }
    }

    pub(crate) fn registered(path: impl Into<String>, registration: Arc<Registration>) -> Self {
        Resource {
            path: path.into(),
            resource_type: registration.name().to_string(),
            resource_super_type: None,
            origin: ResourceOrigin::Registered(registration),
        }
    }

    pub fn with_super_type(mut self, super_type: impl Into<String>) -> Self {
        self.resource_super_type = Some(super_type.into());
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn resource_super_type(&self) -> Option<&str> {
        self.resource_super_type.as_deref()
    }

    pub fn origin(&self) -> &ResourceOrigin {
        &self.origin
    }

    /// Last path segment
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }

    /// Ordering weight among resources at the same path; higher wins
    pub fn priority(&self) -> i32 {
        match &self.origin {
            ResourceOrigin::Registered(reg) => reg.priority(),
            _ => 0,
        }
    }
}

/// Access to the content tree.
///
/// Implementations must be cheap to call concurrently; the resolver calls
/// them on every cache miss.
pub trait ResourceProvider: Send + Sync {
    /// Resolve a path to a resource
    fn get_resource(&self, path: &str) -> Option<Resource>;

    /// Direct children of the resource at `path`
    fn list_children(&self, path: &str) -> Vec<Resource>;

    /// Ordered search path prefixes, each ending in '/'
    fn search_paths(&self) -> Vec<String>;

    fn adapt_to_handler(&self, resource: &Resource) -> Option<HandlerRef>;

    fn adapt_to_script(&self, _resource: &Resource) -> Option<ScriptRef> {
        None
    }

    /// Super type declared by the type resource of `resource_type`.
    ///
    /// The type resource is looked up below each search path in order; the
    /// first one found decides.
    fn resource_super_type(&self, resource_type: &str) -> Option<String> {
        let relative = resource_type.replace(':', "/");
        if relative.starts_with('/') {
            return self
                .get_resource(&relative)
                .and_then(|r| r.resource_super_type().map(str::to_string));
        }
        for search_path in self.search_paths() {
            if let Some(type_resource) = self.get_resource(&format!("{}{}", search_path, relative)) {
                return type_resource.resource_super_type().map(str::to_string);
            }
        }
        None
    }
}

/// Normalize a path: collapse duplicate slashes and resolve "." and "..".
///
/// Returns `None` when ".." climbs above the root. A `wsp:` prefix is kept
/// untouched.
pub fn normalize(path: &str) -> Option<String> {
    let (workspace, path) = match path.find(":/") {
        Some(pos) => (Some(&path[..pos]), &path[pos + 1..]),
        None => (None, path),
    };
    let absolute = path.starts_with('/');

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }

    let mut normalized = segments.join("/");
    if absolute {
        normalized.insert(0, '/');
    }
    if normalized.is_empty() {
        return None;
    }
    Some(match workspace {
        Some(wsp) => format!("{}:{}", wsp, normalized),
        None => normalized,
    })
}

/// Ensure a search path ends with a slash
pub(crate) fn with_trailing_slash(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    }
}

/// A resource entry in a content fixture
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceFixture {
    pub path: String,
    #[serde(default)]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub resource_super_type: Option<String>,
    /// Whether the resource is an executable script
    #[serde(default)]
    pub script: bool,
}

/// Content tree description loadable from YAML
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentFixture {
    #[serde(default = "default_search_paths")]
    pub search_paths: Vec<String>,
    #[serde(default)]
    pub resources: Vec<ResourceFixture>,
}

fn default_search_paths() -> Vec<String> {
    vec!["/apps/".to_string(), "/libs/".to_string()]
}

struct ContentNode {
    resource: Resource,
    handler: Option<HandlerRef>,
    script: Option<ScriptRef>,
}

/// Thread-safe in-memory content tree
pub struct InMemoryResourceProvider {
    search_paths: Vec<String>,
    nodes: RwLock<BTreeMap<String, ContentNode>>,
}

impl InMemoryResourceProvider {
    /// Create an empty tree with the given search paths
    pub fn new<I, S>(search_paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        InMemoryResourceProvider {
            search_paths: search_paths
                .into_iter()
                .map(|p| with_trailing_slash(p.as_ref()))
                .collect(),
            nodes: RwLock::new(BTreeMap::new()),
        }
    }

    /// Build a tree from a parsed fixture
    pub fn from_fixture(fixture: &ContentFixture) -> Result<Self> {
        let provider = Self::new(&fixture.search_paths);
        for entry in &fixture.resources {
            let path = normalize(&entry.path).ok_or_else(|| {
                ResolverError::FixtureError(format!("invalid resource path '{}'", entry.path))
            })?;
            if entry.script {
                provider.insert_script(&path);
                continue;
            }
            let resource_type = entry
                .resource_type
                .clone()
                .ok_or_else(|| {
                    ResolverError::FixtureError(format!(
                        "resource '{}' needs a resource_type",
                        entry.path
                    ))
                })?;
            let mut resource = Resource::new(path, resource_type);
            if let Some(super_type) = &entry.resource_super_type {
                resource = resource.with_super_type(super_type.clone());
            }
            provider.insert(resource);
        }
        Ok(provider)
    }

    /// Parse a YAML fixture
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let fixture: ContentFixture = serde_yaml::from_str(content).map_err(|e| {
            ResolverError::FixtureError(format!("Failed to parse content fixture: {}", e))
        })?;
        Self::from_fixture(&fixture)
    }

    /// Load a YAML fixture from disk
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            ResolverError::FixtureError(format!("Failed to read content fixture: {}", e))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Add or replace a plain resource
    pub fn insert(&self, resource: Resource) {
        let path = resource.path().to_string();
        self.nodes.write().insert(
            path,
            ContentNode {
                resource,
                handler: None,
                script: None,
            },
        );
    }

    /// Add a resource that adapts to the given handler
    pub fn insert_handler(&self, path: &str, handler: HandlerRef) {
        self.nodes.write().insert(
            path.to_string(),
            ContentNode {
                resource: Resource::new(path, SCRIPT_RESOURCE_TYPE),
                handler: Some(handler),
                script: None,
            },
        );
    }

    /// Add a script resource; it adapts to both a handler and a script
    pub fn insert_script(&self, path: &str) {
        let script = Arc::new(ScriptHandler::new(path));
        self.nodes.write().insert(
            path.to_string(),
            ContentNode {
                resource: Resource::new(path, SCRIPT_RESOURCE_TYPE),
                handler: Some(script.clone()),
                script: Some(script),
            },
        );
    }

    /// Declare the super type of a resource type below the first search path
    pub fn declare_super_type(&self, resource_type: &str, super_type: &str) {
        let root = self
            .search_paths
            .first()
            .cloned()
            .unwrap_or_else(|| "/".to_string());
        let path = format!("{}{}", root, resource_type.replace(':', "/"));
        self.insert(Resource::new(path, TYPE_RESOURCE_TYPE).with_super_type(super_type));
    }

    pub fn remove(&self, path: &str) -> bool {
        self.nodes.write().remove(path).is_some()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}

impl ResourceProvider for InMemoryResourceProvider {
    fn get_resource(&self, path: &str) -> Option<Resource> {
        self.nodes.read().get(path).map(|node| node.resource.clone())
    }

    fn list_children(&self, path: &str) -> Vec<Resource> {
        let prefix = with_trailing_slash(path);
        let nodes = self.nodes.read();
        let children: Vec<Resource> = nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter(|(key, _)| !key[prefix.len()..].contains('/'))
            .map(|(_, node)| node.resource.clone())
            .collect();
        debug!("Listed {} children below {}", children.len(), path);
        children
    }

    fn search_paths(&self) -> Vec<String> {
        self.search_paths.clone()
    }

    fn adapt_to_handler(&self, resource: &Resource) -> Option<HandlerRef> {
        self.nodes
            .read()
            .get(resource.path())
            .and_then(|node| node.handler.clone())
    }

    fn adapt_to_script(&self, resource: &Resource) -> Option<ScriptRef> {
        self.nodes
            .read()
            .get(resource.path())
            .and_then(|node| node.script.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/apps//foo/./bar").as_deref(), Some("/apps/foo/bar"));
        assert_eq!(normalize("/apps/foo/../bar/").as_deref(), Some("/apps/bar"));
        assert_eq!(normalize("/../etc"), None);
        assert_eq!(normalize("live:/apps/x/../y").as_deref(), Some("live:/apps/y"));
        assert_eq!(normalize("/").as_deref(), Some("/"));
        assert_eq!(normalize(""), None);
    }

    #[test]
    fn test_search_paths_get_trailing_slash() {
        let provider = InMemoryResourceProvider::new(["/apps", "/libs/"]);
        assert_eq!(provider.search_paths(), vec!["/apps/", "/libs/"]);
    }

    #[test]
    fn test_list_children_is_direct_only() {
        let provider = InMemoryResourceProvider::new(["/apps"]);
        provider.insert_script("/apps/a/html");
        provider.insert_script("/apps/a/b/html");
        provider.insert_script("/apps/ab/html");

        let children = provider.list_children("/apps/a");
        let names: Vec<&str> = children.iter().map(|r| r.path()).collect();
        assert_eq!(names, vec!["/apps/a/html"]);
    }

    #[test]
    fn test_super_type_from_type_resource() {
        let provider = InMemoryResourceProvider::new(["/apps", "/libs"]);
        provider.insert(Resource::new("/libs/my/page", TYPE_RESOURCE_TYPE).with_super_type("base/page"));
        assert_eq!(provider.resource_super_type("my/page").as_deref(), Some("base/page"));
        assert_eq!(provider.resource_super_type("my:page").as_deref(), Some("base/page"));

        // overlay without super type hides the base declaration
        provider.insert(Resource::new("/apps/my/page", TYPE_RESOURCE_TYPE));
        assert_eq!(provider.resource_super_type("my/page"), None);

        provider.declare_super_type("other/type", "my/page");
        assert_eq!(provider.resource_super_type("other/type").as_deref(), Some("my/page"));
    }

    #[test]
    fn test_script_adapts_to_handler_and_script() {
        let provider = InMemoryResourceProvider::new(["/apps"]);
        provider.insert_script("/apps/x/html");
        provider.insert(Resource::new("/content/x", "x"));

        let script = provider.get_resource("/apps/x/html").unwrap();
        assert!(provider.adapt_to_handler(&script).is_some());
        assert_eq!(provider.adapt_to_script(&script).unwrap().path(), "/apps/x/html");

        let content = provider.get_resource("/content/x").unwrap();
        assert!(provider.adapt_to_handler(&content).is_none());
        assert!(provider.adapt_to_script(&content).is_none());
    }

    #[test]
    fn test_fixture_loading() {
        let yaml = r#"
search_paths: ["/apps/", "/libs/"]
resources:
  - path: /content/page
    resource_type: my/page
  - path: /apps/my/page/html
    script: true
  - path: /apps/my/page
    resource_type: sling:type
    resource_super_type: base/page
"#;
        let provider = InMemoryResourceProvider::from_yaml_str(yaml).unwrap();
        assert_eq!(provider.len(), 3);
        assert_eq!(
            provider.get_resource("/content/page").unwrap().resource_type(),
            "my/page"
        );
        assert_eq!(provider.resource_super_type("my/page").as_deref(), Some("base/page"));
    }

    #[test]
    fn test_fixture_requires_type() {
        let yaml = r#"
resources:
  - path: /content/page
"#;
        assert!(matches!(
            InMemoryResourceProvider::from_yaml_str(yaml),
            Err(ResolverError::FixtureError(_))
        ));
    }
}
