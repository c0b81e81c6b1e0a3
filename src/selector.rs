//! Candidate selection
//!
//! Walks the collector's candidate paths in order, adapts every resource
//! found to a handler and applies the opting protocol. Plain handlers are
//! cached; opting handlers never are.

use crate::cache::{PutOutcome, ResolutionCache};
use crate::collector::{is_path_allowed, with_workspace, ResolutionKey, ResourceCollector};
use crate::handler::HandlerRef;
use crate::metrics::ResolverMetrics;
use crate::models::ResolutionRequest;
use crate::resource::{normalize, Resource, ResourceOrigin, ResourceProvider};
use crate::tree::ResourceTree;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// One resource found at a candidate path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateHandler {
    pub name: String,
    /// "registered" or "content"
    pub source: String,
    pub opting: bool,
    /// Opting decision for the request; `None` for plain handlers
    pub accepts: Option<bool>,
}

/// A candidate path and what lives there
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateReport {
    pub path: String,
    pub handlers: Vec<CandidateHandler>,
}

pub struct CandidateSelector {
    tree: Arc<ResourceTree>,
    cache: Arc<ResolutionCache>,
    metrics: Arc<ResolverMetrics>,
    default_extensions: Vec<String>,
}

impl CandidateSelector {
    pub fn new(
        tree: Arc<ResourceTree>,
        cache: Arc<ResolutionCache>,
        metrics: Arc<ResolverMetrics>,
        default_extensions: Vec<String>,
    ) -> Self {
        CandidateSelector {
            tree,
            cache,
            metrics,
            default_extensions,
        }
    }

    /// Select the best handler for a key.
    ///
    /// Without a request (named resolution) opting handlers are never
    /// accepted.
    pub fn select(
        &self,
        key: &ResolutionKey,
        request: Option<&ResolutionRequest>,
    ) -> Option<HandlerRef> {
        if let Some(target) = key.absolute_target() {
            return self.select_absolute(key, target, request);
        }

        if let Some(handler) = self.cache.get(key) {
            self.metrics.record_cache_hit();
            debug!("Cache hit for {:?}: {}", key.kind, handler.name());
            return Some(handler);
        }
        if self.cache.is_enabled() {
            self.metrics.record_cache_miss();
        }

        let generation = self.cache.generation();
        let candidates = self.candidates(key);
        let mut has_opting = false;
        for path in &candidates {
            for resource in self.tree.resources_at(path) {
                let Some(handler) = self.tree.adapt_to_handler(&resource) else {
                    continue;
                };
                if !handler.is_opting() {
                    if has_opting {
                        debug!(
                            "Not caching {} for {:?}: an opting handler declined earlier",
                            handler.name(),
                            key.kind
                        );
                    } else {
                        match self.cache.put_at(key.clone(), Arc::clone(&handler), generation) {
                            PutOutcome::Full => self.metrics.record_cache_rejected_put(),
                            PutOutcome::Stale => debug!(
                                "Not caching {} for {:?}: cache flushed during resolution",
                                handler.name(),
                                key.kind
                            ),
                            PutOutcome::Stored | PutOutcome::Disabled => {}
                        }
                    }
                    debug!("Selected {} at {}", handler.name(), path);
                    return Some(handler);
                }
                if accepts(&handler, request) {
                    debug!("Opting handler {} at {} accepted", handler.name(), path);
                    return Some(handler);
                }
                has_opting = true;
                self.metrics.record_opting_declined();
                debug!("Opting handler {} at {} declined", handler.name(), path);
            }
        }
        None
    }

    /// Ordered candidate paths for a key, counted as one collector run
    pub fn candidates(&self, key: &ResolutionKey) -> Vec<String> {
        let candidates = ResourceCollector::new(key, &self.default_extensions)
            .candidates(self.tree.as_ref());
        self.metrics.record_collector_run(candidates.len());
        candidates
    }

    /// Every candidate path with the handlers it offers, for diagnostics.
    ///
    /// Does not touch the cache.
    pub fn explain(
        &self,
        key: &ResolutionKey,
        request: Option<&ResolutionRequest>,
    ) -> Vec<CandidateReport> {
        let paths: Vec<String> = match key.absolute_target() {
            Some(target) => self.absolute_path(key, target).into_iter().collect(),
            None => ResourceCollector::new(key, &self.default_extensions)
                .candidates(self.tree.as_ref()),
        };
        paths
            .into_iter()
            .map(|path| {
                let handlers = self
                    .tree
                    .resources_at(&path)
                    .iter()
                    .filter_map(|resource| self.describe(resource, request))
                    .collect();
                CandidateReport { path, handlers }
            })
            .collect()
    }

    fn describe(
        &self,
        resource: &Resource,
        request: Option<&ResolutionRequest>,
    ) -> Option<CandidateHandler> {
        let handler = self.tree.adapt_to_handler(resource)?;
        let source = match resource.origin() {
            ResourceOrigin::Registered(_) => "registered",
            _ => "content",
        };
        let opting = handler.is_opting();
        Some(CandidateHandler {
            name: handler.name().to_string(),
            source: source.to_string(),
            opting,
            accepts: opting.then(|| accepts(&handler, request)),
        })
    }

    fn absolute_path(&self, key: &ResolutionKey, target: &str) -> Option<String> {
        let path = normalize(target)?;
        if !is_path_allowed(&path, key.execution_paths.as_deref()) {
            debug!("Absolute target {} is outside the execution paths", path);
            return None;
        }
        Some(with_workspace(&path, key.workspace.as_deref()))
    }

    /// Probe exactly one path; never cached
    fn select_absolute(
        &self,
        key: &ResolutionKey,
        target: &str,
        request: Option<&ResolutionRequest>,
    ) -> Option<HandlerRef> {
        let path = self.absolute_path(key, target)?;
        self.tree
            .resources_at(&path)
            .iter()
            .filter_map(|resource| self.tree.adapt_to_handler(resource))
            .find(|handler| !handler.is_opting() || accepts(handler, request))
    }
}

fn accepts(handler: &HandlerRef, request: Option<&ResolutionRequest>) -> bool {
    match request {
        Some(request) => handler.accepts(request),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServletRoot;
    use crate::error::HandlerError;
    use crate::handler::Handler;
    use crate::models::Response;
    use crate::registry::HandlerRegistry;
    use crate::resource::InMemoryResourceProvider;

    struct Opting {
        accept: bool,
    }

    impl Handler for Opting {
        fn name(&self) -> &str {
            if self.accept {
                "opting-yes"
            } else {
                "opting-no"
            }
        }

        fn service(&self, _: &ResolutionRequest, _: &mut Response) -> Result<(), HandlerError> {
            Ok(())
        }

        fn is_opting(&self) -> bool {
            true
        }

        fn accepts(&self, _request: &ResolutionRequest) -> bool {
            self.accept
        }
    }

    fn setup(cache_size: usize) -> (CandidateSelector, Arc<InMemoryResourceProvider>, Arc<ResolverMetrics>) {
        let content = Arc::new(InMemoryResourceProvider::new(["/apps/", "/libs/"]));
        let registry = Arc::new(HandlerRegistry::new());
        registry.activate(&ServletRoot::SearchPath(0), &content.search_paths());
        let tree = Arc::new(ResourceTree::new(content.clone(), registry));
        let metrics = Arc::new(ResolverMetrics::new());
        let selector = CandidateSelector::new(
            tree,
            Arc::new(ResolutionCache::new(cache_size)),
            metrics.clone(),
            vec!["html".to_string()],
        );
        (selector, content, metrics)
    }

    fn request(url: &str) -> ResolutionRequest {
        ResolutionRequest::get(url).with_resource(Resource::new("/content/page", "my/page"))
    }

    #[test]
    fn test_first_candidate_wins_and_is_cached() {
        let (selector, content, metrics) = setup(10);
        content.insert_script("/libs/my/page/html");
        content.insert_script("/apps/my/page/html");

        let req = request("/content/page.html");
        let key = ResolutionKey::for_request(&req, None, None);

        let handler = selector.select(&key, Some(&req)).unwrap();
        assert_eq!(handler.name(), "/apps/my/page/html");
        let again = selector.select(&key, Some(&req)).unwrap();
        assert!(Arc::ptr_eq(&handler, &again));

        let stats = metrics.get_stats();
        assert_eq!(stats.collector_runs, 1);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 1);
    }

    #[test]
    fn test_declining_opting_handler_is_skipped_and_suppresses_cache() {
        let (selector, content, metrics) = setup(10);
        content.insert_handler("/apps/my/page/html.GET", Arc::new(Opting { accept: false }));
        content.insert_script("/apps/my/page/html");

        let req = request("/content/page.html");
        let key = ResolutionKey::for_request(&req, None, None);

        let handler = selector.select(&key, Some(&req)).unwrap();
        assert_eq!(handler.name(), "/apps/my/page/html");
        selector.select(&key, Some(&req)).unwrap();

        let stats = metrics.get_stats();
        assert_eq!(stats.collector_runs, 2);
        assert_eq!(stats.opting_declined, 2);
    }

    #[test]
    fn test_accepting_opting_handler_not_cached() {
        let (selector, content, metrics) = setup(10);
        content.insert_handler("/apps/my/page/html", Arc::new(Opting { accept: true }));

        let req = request("/content/page.html");
        let key = ResolutionKey::for_request(&req, None, None);

        assert_eq!(selector.select(&key, Some(&req)).unwrap().name(), "opting-yes");
        assert_eq!(selector.select(&key, Some(&req)).unwrap().name(), "opting-yes");
        assert_eq!(metrics.get_stats().collector_runs, 2);
    }

    #[test]
    fn test_opting_never_accepted_without_request() {
        let (selector, content, _) = setup(10);
        content.insert_handler("/apps/my/page/helper", Arc::new(Opting { accept: true }));

        let resource = Resource::new("/content/page", "my/page");
        let key = ResolutionKey::for_name(Some(&resource), "helper", None, None);
        assert!(selector.select(&key, None).is_none());
    }

    #[test]
    fn test_disabled_cache_always_collects() {
        let (selector, content, metrics) = setup(0);
        content.insert_script("/apps/my/page/html");

        let req = request("/content/page.html");
        let key = ResolutionKey::for_request(&req, None, None);
        selector.select(&key, Some(&req)).unwrap();
        selector.select(&key, Some(&req)).unwrap();

        let stats = metrics.get_stats();
        assert_eq!(stats.collector_runs, 2);
        assert_eq!(stats.cache_misses, 0);
    }

    #[test]
    fn test_absolute_type_probes_one_path() {
        let (selector, content, metrics) = setup(10);
        content.insert_script("/apps/direct/handler");

        let req = ResolutionRequest::get("/content/x.html")
            .with_resource(Resource::new("/content/x", "/apps/direct/../direct/handler"));
        let key = ResolutionKey::for_request(&req, None, None);

        let handler = selector.select(&key, Some(&req)).unwrap();
        assert_eq!(handler.name(), "/apps/direct/handler");
        let stats = metrics.get_stats();
        assert_eq!(stats.collector_runs, 0);
        assert_eq!(stats.cache_misses, 0);

        let allow: Arc<[String]> = vec!["/libs".to_string()].into();
        let key = ResolutionKey::for_request(&req, None, Some(allow));
        assert!(selector.select(&key, Some(&req)).is_none());
    }

    #[test]
    fn test_explain_lists_every_candidate() {
        let (selector, content, _) = setup(10);
        content.insert_handler("/apps/my/page/html.GET", Arc::new(Opting { accept: false }));
        content.insert_script("/libs/my/page/html");

        let req = request("/content/page.html");
        let key = ResolutionKey::for_request(&req, None, None);
        let report = selector.explain(&key, Some(&req));

        assert_eq!(report[0].path, "/apps/my/page/page.html.GET");
        let with_handlers: Vec<&CandidateReport> =
            report.iter().filter(|c| !c.handlers.is_empty()).collect();
        assert_eq!(with_handlers.len(), 2);
        assert_eq!(with_handlers[0].handlers[0].accepts, Some(false));
        assert_eq!(with_handlers[1].handlers[0].name, "/libs/my/page/html");
        assert_eq!(with_handlers[1].handlers[0].source, "content");
    }
}
