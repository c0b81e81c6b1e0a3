//! Servlet resolver facade
//!
//! Wires the registry, the merged resource tree, the resolution cache and
//! the candidate selector together and exposes the inbound operations:
//! request and named resolution, script lookup, error handling, event
//! handling and the registry lifecycle.

use crate::cache::{CacheStats, ResolutionCache};
use crate::collector::{
    is_path_allowed, ResolutionKey, DEFAULT_ERROR_HANDLER_NAME, ERROR_HANDLER_RESOURCE_TYPE,
};
use crate::config::{ConfigChanges, ResolverConfig, ServletRoot};
use crate::error::{ResolverError, Result};
use crate::events::{requires_flush, ResolverEvent};
use crate::handler::{DefaultErrorHandler, DefaultHandler, HandlerRef, ScriptRef};
use crate::metrics::{MetricsSnapshot, ResolverMetrics};
use crate::models::{ResolutionRequest, Response, Throwable};
use crate::registry::{
    BindOutcome, HandlerProvider, HandlerRegistry, ProviderId, RegistryStats, UnbindOutcome,
};
use crate::request_path::RequestPathInfo;
use crate::resource::{normalize, Resource, ResourceProvider};
use crate::selector::{CandidateReport, CandidateSelector};
use crate::tree::ResourceTree;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Configuration-derived state, swapped as a whole on reconfiguration
struct Engine {
    config: ResolverConfig,
    servlet_root: ServletRoot,
    execution_paths: Option<Arc<[String]>>,
    cache: Arc<ResolutionCache>,
    selector: CandidateSelector,
}

impl Engine {
    fn build(
        config: ResolverConfig,
        tree: &Arc<ResourceTree>,
        metrics: &Arc<ResolverMetrics>,
    ) -> Result<Self> {
        config.validate()?;
        let servlet_root = config.parsed_servlet_root()?;
        let cache = Arc::new(ResolutionCache::new(config.effective_cache_size()));
        let selector = CandidateSelector::new(
            Arc::clone(tree),
            Arc::clone(&cache),
            Arc::clone(metrics),
            config.default_extensions.clone(),
        );
        Ok(Engine {
            execution_paths: config.effective_execution_paths(),
            servlet_root,
            cache,
            selector,
            config,
        })
    }
}

/// Result of [`ServletResolver::explain`]
#[derive(Debug, Clone, Serialize)]
pub struct Explanation {
    pub method: String,
    pub path_info: RequestPathInfo,
    pub resource_type: Option<String>,
    pub workspace: Option<String>,
    pub candidates: Vec<CandidateReport>,
    /// Name of the handler `resolve` returns
    pub selected: String,
}

/// The servlet resolver
pub struct ServletResolver {
    engine: RwLock<Arc<Engine>>,
    tree: Arc<ResourceTree>,
    registry: Arc<HandlerRegistry>,
    metrics: Arc<ResolverMetrics>,
    default_handler: HandlerRef,
    default_error_handler: HandlerRef,
}

impl ServletResolver {
    /// Create a resolver over a content tree.
    ///
    /// The registry starts inactive; binds are queued until [`activate`].
    ///
    /// [`activate`]: ServletResolver::activate
    pub fn new(config: ResolverConfig, content: Arc<dyn ResourceProvider>) -> Result<Self> {
        let registry = Arc::new(HandlerRegistry::new());
        let tree = Arc::new(ResourceTree::new(content, Arc::clone(&registry)));
        let metrics = Arc::new(ResolverMetrics::new());
        let engine = Engine::build(config, &tree, &metrics)?;

        info!(
            "Servlet resolver created: cache size {}, execution paths {:?}, default extensions {:?}",
            engine.cache.capacity(),
            engine.execution_paths,
            engine.config.default_extensions
        );

        Ok(ServletResolver {
            engine: RwLock::new(Arc::new(engine)),
            tree,
            registry,
            metrics,
            default_handler: Arc::new(DefaultHandler),
            default_error_handler: Arc::new(DefaultErrorHandler),
        })
    }

    fn engine(&self) -> Arc<Engine> {
        Arc::clone(&self.engine.read())
    }

    // ---------- lifecycle ----------

    /// Activate the registry, binding every queued provider
    pub fn activate(&self) -> Vec<BindOutcome> {
        let engine = self.engine();
        let outcomes = self
            .registry
            .activate(&engine.servlet_root, &self.tree.search_paths());
        for outcome in &outcomes {
            self.record_bind_outcome(outcome);
        }
        self.flush_cache();
        outcomes
    }

    fn record_bind_outcome(&self, outcome: &BindOutcome) {
        match outcome {
            BindOutcome::Bound { .. } => self.metrics.record_bind(true),
            BindOutcome::Rejected(_) => self.metrics.record_bind(false),
            // counted once activation binds it
            BindOutcome::Pending => {}
        }
    }

    /// Destroy every registration and clear the cache
    pub fn deactivate(&self) {
        let failures = self.registry.deactivate();
        for _ in 0..failures {
            self.metrics.record_teardown_failure();
        }
        self.flush_cache();
    }

    /// Apply a new configuration.
    ///
    /// The cache is rebuilt whenever anything changed. A new servlet root
    /// only affects registrations made after the next activation.
    pub fn reconfigure(&self, new_config: &ResolverConfig) -> Result<ConfigChanges> {
        let mut config = self.engine().config.clone();
        let changes = config.update_from(new_config)?;
        if !changes.has_changes() {
            return Ok(changes);
        }

        let engine = Engine::build(config, &self.tree, &self.metrics)?;
        *self.engine.write() = Arc::new(engine);
        self.metrics.record_cache_flush();

        info!("Servlet resolver reconfigured: {:?}", changes.summary());
        if changes.requires_reactivation() {
            info!("servlet_root change takes effect on the next activation");
        }
        Ok(changes)
    }

    pub fn config(&self) -> ResolverConfig {
        self.engine().config.clone()
    }

    // ---------- registry ----------

    /// Bind a handler provider; flushes the cache when it got bound
    pub fn bind_handler(&self, provider: HandlerProvider) -> BindOutcome {
        let outcome = self.registry.bind(provider);
        self.record_bind_outcome(&outcome);
        if outcome.is_bound() {
            self.flush_cache();
        }
        outcome
    }

    /// Unbind a handler provider; flushes the cache when it was known
    pub fn unbind_handler(&self, id: ProviderId) -> UnbindOutcome {
        let outcome = self.registry.unbind(id);
        if outcome.is_found() {
            self.metrics.record_unbind();
            self.flush_cache();
        }
        if outcome == UnbindOutcome::TeardownFailed {
            self.metrics.record_teardown_failure();
        }
        outcome
    }

    // ---------- events ----------

    /// Apply an external event. Returns whether the cache was flushed.
    pub fn handle_event(&self, event: ResolverEvent) -> bool {
        match event {
            ResolverEvent::HandlerBound(provider) => self.bind_handler(provider).is_bound(),
            ResolverEvent::HandlerUnbound(id) => self.unbind_handler(id).is_found(),
            other => {
                if requires_flush(&other, &self.tree.search_paths()) {
                    debug!("Flushing resolution cache on {:?}", other);
                    self.flush_cache();
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Drop every cached resolution
    pub fn flush_cache(&self) {
        self.engine().cache.invalidate_all();
        self.metrics.record_cache_flush();
    }

    // ---------- resolution ----------

    /// Resolve the handler for a request.
    ///
    /// Never fails: when nothing matches, the built-in default handler is
    /// returned.
    pub fn resolve(&self, request: &ResolutionRequest) -> HandlerRef {
        debug!(
            "resolve called for {} {}",
            request.method, request.path_info.resource_path
        );
        let engine = self.engine();
        match self.resolve_request(&engine, request) {
            Some(handler) => {
                self.metrics.record_resolution(false);
                debug!("Handler {} found for {}", handler.name(), request.request_uri);
                handler
            }
            None => {
                self.metrics.record_resolution(true);
                debug!("No specific handler found for {}, using default", request.request_uri);
                Arc::clone(&self.default_handler)
            }
        }
    }

    fn resolve_request(&self, engine: &Engine, request: &ResolutionRequest) -> Option<HandlerRef> {
        let resource_type = request.resource_type().unwrap_or_default();
        if resource_type.is_empty() {
            return None;
        }

        let config = &engine.config;
        if config.use_request_workspace {
            let workspace = request.workspace_name();
            let handler = self.resolve_in(engine, request, workspace.clone());
            if handler.is_none() && config.use_default_workspace && workspace.is_some() {
                return self.resolve_in(engine, request, config.default_workspace_name());
            }
            handler
        } else {
            self.resolve_in(engine, request, config.default_workspace_name())
        }
    }

    fn resolve_in(
        &self,
        engine: &Engine,
        request: &ResolutionRequest,
        workspace: Option<String>,
    ) -> Option<HandlerRef> {
        let key = ResolutionKey::for_request(request, workspace, engine.execution_paths.clone());
        engine.selector.select(&key, Some(request))
    }

    /// Resolve a handler by script name, relative to a resource's type when
    /// one is given.
    ///
    /// Opting handlers are never returned here since there is no request
    /// to ask them about.
    pub fn resolve_by_name(
        &self,
        resource: Option<&Resource>,
        name: &str,
    ) -> Result<Option<HandlerRef>> {
        if name.is_empty() {
            return Err(ResolverError::invalid_argument("script name must not be empty"));
        }
        let engine = self.engine();
        let key = ResolutionKey::for_name(resource, name, None, engine.execution_paths.clone());
        let handler = engine.selector.select(&key, None);
        match &handler {
            Some(h) => debug!("Handler {} found for script name {}", h.name(), name),
            None => debug!("No handler found for script name {}", name),
        }
        Ok(handler)
    }

    /// Find a script by absolute path or relative to the search paths
    pub fn find_script(&self, name: &str) -> Option<ScriptRef> {
        let engine = self.engine();
        let allow = engine.execution_paths.as_deref();

        let candidates: Vec<String> = if name.starts_with('/') {
            vec![name.to_string()]
        } else {
            self.tree
                .search_paths()
                .iter()
                .map(|sp| format!("{}{}", sp, name))
                .collect()
        };

        let script = candidates
            .iter()
            .filter_map(|path| normalize(path))
            .filter(|path| is_path_allowed(path, allow))
            .find_map(|path| {
                let resource = self.tree.get_resource(&path)?;
                self.tree.adapt_to_script(&resource)
            });

        match &script {
            Some(s) => debug!("findScript: Using script {} for {}", s.path(), name),
            None => info!("findScript: No script {} found in path", name),
        }
        script
    }

    /// Ordered candidates and the selected handler for a request.
    ///
    /// Leaves the cache and the resolution counters untouched.
    pub fn explain(&self, request: &ResolutionRequest) -> Explanation {
        let engine = self.engine();
        let config = &engine.config;
        let workspace = if config.use_request_workspace {
            request.workspace_name()
        } else {
            config.default_workspace_name()
        };
        let report = |workspace: Option<String>| {
            let key = ResolutionKey::for_request(request, workspace, engine.execution_paths.clone());
            engine.selector.explain(&key, Some(request))
        };

        let mut candidates = Vec::new();
        if request.resource_type().map_or(false, |t| !t.is_empty()) {
            candidates = report(workspace.clone());
            if first_accepted(&candidates).is_none()
                && config.use_request_workspace
                && config.use_default_workspace
                && workspace.is_some()
            {
                candidates.extend(report(config.default_workspace_name()));
            }
        }
        let selected = first_accepted(&candidates)
            .unwrap_or_else(|| self.default_handler.name())
            .to_string();

        Explanation {
            method: request.method.to_string(),
            path_info: request.path_info.clone(),
            resource_type: request.resource_type().map(str::to_string),
            workspace,
            candidates,
            selected,
        }
    }

    // ---------- error handling ----------

    /// Handle an error status for a request.
    ///
    /// Looks for a handler named after the status, then the `default` error
    /// handler, then falls back to the built-in one. Only I/O failures of
    /// the error handler are returned.
    pub fn handle_error_status(
        &self,
        status: u16,
        message: Option<&str>,
        request: &mut ResolutionRequest,
        response: &mut Response,
    ) -> Result<()> {
        if request.attributes.is_handling_error() {
            error!(
                "handleError: Recursive invocation. Not further handling status {} ({})",
                status,
                message.unwrap_or_default()
            );
            self.metrics.record_recursive_error();
            return Ok(());
        }

        let handler = self.find_error_handler(request, &[status.to_string()]);

        let attrs = &mut request.attributes;
        attrs.error_status = Some(status);
        attrs.error_message = message.map(str::to_string);
        if attrs.error_servlet_name.is_none() {
            attrs.error_servlet_name = attrs.current_servlet_name.clone();
        }

        self.invoke_error_handler(handler, request, response)
    }

    /// Handle an exception raised while processing a request.
    ///
    /// Walks the exception type from the thrown type up to, but excluding,
    /// the root type looking for a handler named after each type.
    pub fn handle_error_exception(
        &self,
        throwable: &Throwable,
        request: &mut ResolutionRequest,
        response: &mut Response,
    ) -> Result<()> {
        if request.attributes.is_handling_error() {
            error!(
                "handleError: Recursive invocation. Not further handling {}: {}",
                throwable.type_name(),
                throwable.message.as_deref().unwrap_or_default()
            );
            self.metrics.record_recursive_error();
            return Ok(());
        }

        let names = throwable.exception_type.handler_names();
        let handler = self.find_error_handler(request, &names);

        let attrs = &mut request.attributes;
        attrs.error_exception_type = Some(throwable.type_name().to_string());
        attrs.error_message = throwable.message.clone();

        self.invoke_error_handler(handler, request, response)
    }

    fn find_error_handler(&self, request: &ResolutionRequest, names: &[String]) -> HandlerRef {
        let engine = self.engine();
        let workspace = if engine.config.use_request_workspace {
            request.workspace_name()
        } else {
            None
        };
        let resource = error_resource(request);

        names
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(DEFAULT_ERROR_HANDLER_NAME))
            .find_map(|name| {
                let key = ResolutionKey::for_error(
                    &resource,
                    name,
                    workspace.clone(),
                    engine.execution_paths.clone(),
                );
                engine.selector.select(&key, Some(request))
            })
            .unwrap_or_else(|| Arc::clone(&self.default_error_handler))
    }

    fn invoke_error_handler(
        &self,
        handler: HandlerRef,
        request: &mut ResolutionRequest,
        response: &mut Response,
    ) -> Result<()> {
        request.attributes.error_request_uri = Some(request.request_uri.clone());
        if request.attributes.error_servlet_name.is_none() {
            request.attributes.error_servlet_name = Some(handler.name().to_string());
        }
        self.metrics.record_error_handling();
        debug!("Using error handler {} for {}", handler.name(), request.request_uri);

        match handler.service(request, response) {
            Ok(()) => {
                response.commit();
                Ok(())
            }
            Err(e) if e.is_io() => Err(ResolverError::ErrorHandlerIo {
                handler: handler.name().to_string(),
                message: e.to_string(),
            }),
            Err(e) => {
                error!("Calling the error handler {} resulted in an error: {}", handler.name(), e);
                error!(
                    "Original error: status={:?} exception={:?}",
                    request.attributes.error_status, request.attributes.error_exception_type
                );
                Ok(())
            }
        }
    }

    // ---------- introspection ----------

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.get_stats()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.engine().cache.stats()
    }

    pub fn registry_stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    pub fn search_paths(&self) -> Vec<String> {
        self.tree.search_paths()
    }
}

/// Name of the handler selection would pick from the reported candidates
fn first_accepted(candidates: &[CandidateReport]) -> Option<&str> {
    candidates
        .iter()
        .flat_map(|report| &report.handlers)
        .find(|handler| handler.accepts != Some(false))
        .map(|handler| handler.name.as_str())
}

/// Resource error handlers are looked up for; a synthetic error handler
/// resource when the error happened before resolution
fn error_resource(request: &ResolutionRequest) -> Resource {
    match &request.resource {
        Some(resource) => resource.clone(),
        None => Resource::synthetic(
            request.path_info.resource_path.clone(),
            ERROR_HANDLER_RESOURCE_TYPE,
        ),
    }
}
