//! Merged view over content resources and handler registrations

use crate::handler::{HandlerRef, ScriptRef};
use crate::registry::HandlerRegistry;
use crate::resource::{Resource, ResourceOrigin, ResourceProvider};
use std::collections::HashSet;
use std::sync::Arc;

/// The resource tree the collector and selector operate on.
///
/// Registered handlers shadow content at the same path when a single
/// resource is asked for; [`ResourceTree::resources_at`] returns all of
/// them.
pub struct ResourceTree {
    content: Arc<dyn ResourceProvider>,
    registry: Arc<HandlerRegistry>,
}

impl ResourceTree {
    pub fn new(content: Arc<dyn ResourceProvider>, registry: Arc<HandlerRegistry>) -> Self {
        ResourceTree { content, registry }
    }

    pub fn content(&self) -> &Arc<dyn ResourceProvider> {
        &self.content
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Every resource at `path`: registrations by priority (highest first,
    /// bind order breaking ties), then the content resource.
    pub fn resources_at(&self, path: &str) -> Vec<Resource> {
        let mut registrations = self.registry.handlers_at(path);
        registrations.sort_by(|a, b| b.priority().cmp(&a.priority()));

        let mut resources: Vec<Resource> = registrations
            .into_iter()
            .map(|reg| Resource::registered(path, reg))
            .collect();
        if let Some(resource) = self.content.get_resource(path) {
            resources.push(resource);
        }
        resources
    }
}

impl ResourceProvider for ResourceTree {
    fn get_resource(&self, path: &str) -> Option<Resource> {
        self.resources_at(path).into_iter().next()
    }

    fn list_children(&self, path: &str) -> Vec<Resource> {
        let mut seen = HashSet::new();
        let mut children = Vec::new();
        for child in self.registry.child_paths(path) {
            if let Some(resource) = self.get_resource(&child) {
                seen.insert(child);
                children.push(resource);
            }
        }
        for resource in self.content.list_children(path) {
            if seen.insert(resource.path().to_string()) {
                children.push(resource);
            }
        }
        children
    }

    fn search_paths(&self) -> Vec<String> {
        self.content.search_paths()
    }

    fn adapt_to_handler(&self, resource: &Resource) -> Option<HandlerRef> {
        match resource.origin() {
            ResourceOrigin::Registered(reg) => Some(Arc::clone(reg.handler())),
            _ => self.content.adapt_to_handler(resource),
        }
    }

    fn adapt_to_script(&self, resource: &Resource) -> Option<ScriptRef> {
        match resource.origin() {
            ResourceOrigin::Registered(_) => None,
            _ => self.content.adapt_to_script(resource),
        }
    }

    fn resource_super_type(&self, resource_type: &str) -> Option<String> {
        self.content.resource_super_type(resource_type)
    }
}
