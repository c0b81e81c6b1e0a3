//! Registry of dynamically bound handler providers
//!
//! Each bound provider is turned into one or more resource paths, derived
//! from its properties, under which the collector and selector find it just
//! like content-based scripts. Binds that arrive before the resolver is
//! activated are queued and flushed on activation.

use crate::config::ServletRoot;
use crate::handler::{HandlerConfig, HandlerRef};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Identity of a provider, stable across bind and unbind
pub type ProviderId = u64;

/// Service properties a handler provider is registered with
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderProperties {
    /// `sling.servlet.name`
    pub servlet_name: Option<String>,
    /// `component.name`
    pub component_name: Option<String>,
    /// `service.pid`
    pub service_pid: Option<String>,
    /// `service.id`
    pub service_id: Option<u64>,
    /// `service.ranking`; higher ranks are preferred at the same path
    pub ranking: i32,
    /// Absolute or servlet-root relative paths
    pub paths: Vec<String>,
    pub resource_types: Vec<String>,
    pub selectors: Vec<String>,
    pub extensions: Vec<String>,
    pub methods: Vec<String>,
}

impl ProviderProperties {
    /// Registration name: first non-empty of servlet name, component name,
    /// service pid and service id
    pub fn resolve_name(&self) -> Option<String> {
        [
            self.servlet_name.clone(),
            self.component_name.clone(),
            self.service_pid.clone(),
            self.service_id.map(|id| id.to_string()),
        ]
        .into_iter()
        .flatten()
        .find(|name| !name.is_empty())
    }

    /// Resource paths this provider is exposed under, given the servlet root
    /// (which ends in '/').
    pub fn registration_paths(&self, root: &str) -> Vec<String> {
        let mut paths: Vec<String> = Vec::new();
        let mut push = |path: String| {
            if !paths.contains(&path) {
                paths.push(path);
            }
        };

        for path in &self.paths {
            if path.is_empty() {
                continue;
            }
            if path.starts_with('/') {
                push(path.clone());
            } else {
                push(format!("{}{}", root, path));
            }
        }

        let mut methods: Vec<String> = Vec::new();
        for method in &self.methods {
            let method = match method.to_ascii_uppercase().as_str() {
                "HEAD" => "GET".to_string(),
                other => other.to_string(),
            };
            if !methods.contains(&method) {
                methods.push(method);
            }
        }

        for resource_type in &self.resource_types {
            if resource_type.is_empty() {
                continue;
            }
            let location = if resource_type.starts_with('/') {
                resource_type.trim_end_matches('/').to_string()
            } else {
                format!("{}{}", root, resource_type.replace(':', "/"))
            };

            if self.selectors.is_empty() {
                for name in suffixed_names(None, &self.extensions, &methods) {
                    push(format!("{}/{}", location, name));
                }
            } else {
                for selector in &self.selectors {
                    let base = selector.replace('.', "/");
                    for name in suffixed_names(Some(&base), &self.extensions, &methods) {
                        push(format!("{}/{}", location, name));
                    }
                }
            }
        }

        paths
    }
}

/// Names below a type location for an optional selector base.
///
/// Mirrors the names the collector emits: `B.e.M`, `B.e`, `B.M`, `B`, and
/// without selector `e.M`, `e`, `M`, falling back to `GET`.
fn suffixed_names(base: Option<&str>, extensions: &[String], methods: &[String]) -> Vec<String> {
    let join = |parts: &[&str]| parts.iter().filter(|p| !p.is_empty()).cloned().collect::<Vec<_>>().join(".");
    let base = base.unwrap_or("");
    let mut names = Vec::new();

    match (extensions.is_empty(), methods.is_empty()) {
        (false, false) => {
            for ext in extensions {
                for method in methods {
                    names.push(join(&[base, ext, method]));
                }
            }
        }
        (false, true) => {
            for ext in extensions {
                names.push(join(&[base, ext]));
            }
        }
        (true, false) => {
            for method in methods {
                names.push(join(&[base, method]));
            }
        }
        (true, true) => {
            if base.is_empty() {
                names.push("GET".to_string());
            } else {
                names.push(base.to_string());
            }
        }
    }
    names
}

/// A handler bound by a provider
pub struct HandlerProvider {
    pub id: ProviderId,
    pub properties: ProviderProperties,
    pub handler: HandlerRef,
}

impl HandlerProvider {
    pub fn new(id: ProviderId, properties: ProviderProperties, handler: HandlerRef) -> Self {
        HandlerProvider {
            id,
            properties,
            handler,
        }
    }
}

impl fmt::Debug for HandlerProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerProvider")
            .field("id", &self.id)
            .field("properties", &self.properties)
            .field("handler", &self.handler.name())
            .finish()
    }
}

/// A bound handler and the paths it is exposed under
pub struct Registration {
    provider_id: ProviderId,
    name: String,
    priority: i32,
    sequence: u64,
    paths: Vec<String>,
    handler: HandlerRef,
}

impl Registration {
    pub fn provider_id(&self) -> ProviderId {
        self.provider_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Monotonic bind order
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn handler(&self) -> &HandlerRef {
        &self.handler
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("provider_id", &self.provider_id)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("paths", &self.paths)
            .finish()
    }
}

/// Why a bind was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// None of the name properties is set
    MissingName,
    /// The properties do not map to any resource path
    NoPaths,
    /// `Handler::init` failed
    InitFailed(String),
    /// A provider with this id is already bound
    AlreadyBound,
    /// Unbound while activation was binding it
    Unbound,
}

/// Result of a bind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    Bound { name: String, paths: Vec<String> },
    /// Queued until the registry is activated
    Pending,
    Rejected(RejectReason),
}

impl BindOutcome {
    pub fn is_bound(&self) -> bool {
        matches!(self, BindOutcome::Bound { .. })
    }
}

/// Result of an unbind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnbindOutcome {
    /// Bound registration removed and destroyed
    Removed,
    /// Removed, but `Handler::destroy` failed (logged)
    TeardownFailed,
    /// Dropped from the pending queue
    Dequeued,
    NotFound,
}

impl UnbindOutcome {
    pub fn is_found(&self) -> bool {
        !matches!(self, UnbindOutcome::NotFound)
    }
}

#[derive(Default)]
struct RegistryState {
    /// Servlet root prefix; `Some` once activated
    root: Option<String>,
    pending: Vec<HandlerProvider>,
    /// Taken off the queue by `activate` but not yet bound
    activating: HashSet<ProviderId>,
    bound: HashMap<ProviderId, Arc<Registration>>,
    by_path: HashMap<String, Vec<Arc<Registration>>>,
    sequence: u64,
}

/// Registry statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    pub bound: usize,
    pub pending: usize,
    pub paths: usize,
    pub active: bool,
}

/// Thread-safe handler registry
#[derive(Default)]
pub struct HandlerRegistry {
    state: RwLock<RegistryState>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate the registry and flush queued binds.
    ///
    /// Returns the outcome for every queued provider, in queue order.
    pub fn activate(&self, servlet_root: &ServletRoot, search_paths: &[String]) -> Vec<BindOutcome> {
        let root = servlet_root.resolve(search_paths);
        let queued = {
            let mut state = self.state.write();
            state.root = Some(root.clone());
            let queued = std::mem::take(&mut state.pending);
            state.activating.extend(queued.iter().map(|p| p.id));
            queued
        };
        info!(
            "Handler registry activated with servlet root {} ({} queued)",
            root,
            queued.len()
        );
        queued
            .into_iter()
            .map(|provider| {
                let id = provider.id;
                let outcome = self.create(provider, &root, true);
                self.state.write().activating.remove(&id);
                outcome
            })
            .collect()
    }

    /// Deactivate the registry, destroying every registration.
    ///
    /// Returns the number of failed teardowns.
    pub fn deactivate(&self) -> usize {
        let registrations: Vec<Arc<Registration>> = {
            let mut state = self.state.write();
            state.root = None;
            state.activating.clear();
            state.by_path.clear();
            state.bound.drain().map(|(_, reg)| reg).collect()
        };
        let failures = registrations
            .iter()
            .filter(|registration| !destroy(registration))
            .count();
        info!(
            "Handler registry deactivated ({} teardown failures)",
            failures
        );
        failures
    }

    pub fn is_active(&self) -> bool {
        self.state.read().root.is_some()
    }

    /// Bind a provider
    pub fn bind(&self, provider: HandlerProvider) -> BindOutcome {
        let root = self.state.read().root.clone();
        let root = match root {
            Some(root) => root,
            None => {
                let mut state = self.state.write();
                match state.root.clone() {
                    Some(root) => root,
                    None => {
                        debug!("bind: queueing provider {} until activation", provider.id);
                        state.pending.push(provider);
                        return BindOutcome::Pending;
                    }
                }
            }
        };
        self.create(provider, &root, false)
    }

    fn create(&self, provider: HandlerProvider, root: &str, queued: bool) -> BindOutcome {
        let Some(name) = provider.properties.resolve_name() else {
            error!(
                "bind: Cannot register handler {} without a name",
                provider.id
            );
            return BindOutcome::Rejected(RejectReason::MissingName);
        };

        let paths = provider.properties.registration_paths(root);
        if paths.is_empty() {
            debug!("bind: handler {} has no resolver paths, ignored", name);
            return BindOutcome::Rejected(RejectReason::NoPaths);
        }

        if self.state.read().bound.contains_key(&provider.id) {
            warn!("bind: provider {} ({}) is already bound", provider.id, name);
            return BindOutcome::Rejected(RejectReason::AlreadyBound);
        }

        if let Err(e) = provider.handler.init(&HandlerConfig { name: name.clone() }) {
            error!("bind: Handler {} failed to initialize: {}", name, e);
            return BindOutcome::Rejected(RejectReason::InitFailed(e.to_string()));
        }

        let mut state = self.state.write();
        let reason = if queued && !state.activating.remove(&provider.id) {
            Some(RejectReason::Unbound)
        } else if state.bound.contains_key(&provider.id) {
            Some(RejectReason::AlreadyBound)
        } else {
            None
        };
        if let Some(reason) = reason {
            drop(state);
            match reason {
                RejectReason::Unbound => {
                    debug!("bind: provider {} ({}) was unbound during activation", provider.id, name)
                }
                _ => warn!("bind: provider {} ({}) is already bound", provider.id, name),
            }
            let registration = Registration {
                provider_id: provider.id,
                name,
                priority: provider.properties.ranking,
                sequence: 0,
                paths: Vec::new(),
                handler: provider.handler,
            };
            destroy(&registration);
            return BindOutcome::Rejected(reason);
        }
        state.sequence += 1;
        let registration = Arc::new(Registration {
            provider_id: provider.id,
            name: name.clone(),
            priority: provider.properties.ranking,
            sequence: state.sequence,
            paths: paths.clone(),
            handler: provider.handler,
        });
        for path in &paths {
            state
                .by_path
                .entry(path.clone())
                .or_default()
                .push(Arc::clone(&registration));
        }
        state.bound.insert(provider.id, registration);
        drop(state);

        info!("Registered handler {} at {:?}", name, paths);
        BindOutcome::Bound { name, paths }
    }

    /// Unbind a provider, removing it from the pending queue or the bound
    /// table. Teardown failures are logged and reported, never propagated.
    pub fn unbind(&self, id: ProviderId) -> UnbindOutcome {
        let (was_pending, registration) = {
            let mut state = self.state.write();
            let before = state.pending.len();
            state.pending.retain(|p| p.id != id);
            let was_pending =
                state.pending.len() != before || state.activating.remove(&id);

            let registration = state.bound.remove(&id);
            if let Some(reg) = &registration {
                for path in reg.paths() {
                    if let Some(entries) = state.by_path.get_mut(path) {
                        entries.retain(|r| r.provider_id != id);
                        if entries.is_empty() {
                            state.by_path.remove(path);
                        }
                    }
                }
            }
            (was_pending, registration)
        };

        match registration {
            Some(registration) => {
                debug!("unbind: Handler {} removed", registration.name());
                if destroy(&registration) {
                    UnbindOutcome::Removed
                } else {
                    UnbindOutcome::TeardownFailed
                }
            }
            None if was_pending => UnbindOutcome::Dequeued,
            None => UnbindOutcome::NotFound,
        }
    }

    /// Registrations exposed at exactly `path`, in bind order
    pub fn handlers_at(&self, path: &str) -> Vec<Arc<Registration>> {
        self.state
            .read()
            .by_path
            .get(path)
            .cloned()
            .unwrap_or_default()
    }

    /// Registered paths directly below `path`
    pub fn child_paths(&self, path: &str) -> Vec<String> {
        let prefix = crate::resource::with_trailing_slash(path);
        let mut children: Vec<String> = self
            .state
            .read()
            .by_path
            .keys()
            .filter(|p| p.starts_with(&prefix) && !p[prefix.len()..].contains('/'))
            .cloned()
            .collect();
        children.sort();
        children
    }

    /// All bound registrations ordered by bind sequence
    pub fn registrations(&self) -> Vec<Arc<Registration>> {
        let mut regs: Vec<Arc<Registration>> = self.state.read().bound.values().cloned().collect();
        regs.sort_by_key(|r| r.sequence());
        regs
    }

    pub fn stats(&self) -> RegistryStats {
        let state = self.state.read();
        RegistryStats {
            bound: state.bound.len(),
            pending: state.pending.len(),
            paths: state.by_path.len(),
            active: state.root.is_some(),
        }
    }
}

fn destroy(registration: &Registration) -> bool {
    match registration.handler.destroy() {
        Ok(()) => true,
        Err(e) => {
            error!(
                "unbind: Unexpected problem destroying handler {}: {}",
                registration.name, e
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use crate::handler::Handler;
    use crate::models::{ResolutionRequest, Response};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        inits: AtomicUsize,
        destroys: AtomicUsize,
        fail_init: bool,
        fail_destroy: bool,
    }

    impl CountingHandler {
        fn new() -> Arc<Self> {
            Self::with_failures(false, false)
        }

        fn with_failures(fail_init: bool, fail_destroy: bool) -> Arc<Self> {
            Arc::new(CountingHandler {
                inits: AtomicUsize::new(0),
                destroys: AtomicUsize::new(0),
                fail_init,
                fail_destroy,
            })
        }
    }

    impl Handler for CountingHandler {
        fn name(&self) -> &str {
            "counting"
        }

        fn service(&self, _: &ResolutionRequest, _: &mut Response) -> Result<(), HandlerError> {
            Ok(())
        }

        fn init(&self, _config: &HandlerConfig) -> Result<(), HandlerError> {
            self.inits.fetch_add(1, Ordering::SeqCst);
            if self.fail_init {
                Err(HandlerError::Init("refused".to_string()))
            } else {
                Ok(())
            }
        }

        fn destroy(&self) -> Result<(), HandlerError> {
            self.destroys.fetch_add(1, Ordering::SeqCst);
            if self.fail_destroy {
                Err(HandlerError::Failed("teardown".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn typed(name: &str, resource_type: &str) -> ProviderProperties {
        ProviderProperties {
            servlet_name: Some(name.to_string()),
            resource_types: vec![resource_type.to_string()],
            ..Default::default()
        }
    }

    fn active_registry() -> HandlerRegistry {
        let registry = HandlerRegistry::new();
        registry.activate(&ServletRoot::SearchPath(0), &["/apps/".to_string()]);
        registry
    }

    #[test]
    fn test_name_fallback_order() {
        let mut props = ProviderProperties {
            service_id: Some(42),
            ..Default::default()
        };
        assert_eq!(props.resolve_name().as_deref(), Some("42"));

        props.service_pid = Some("pid".to_string());
        assert_eq!(props.resolve_name().as_deref(), Some("pid"));

        props.servlet_name = Some(String::new());
        props.component_name = Some("component".to_string());
        assert_eq!(props.resolve_name().as_deref(), Some("component"));

        assert_eq!(ProviderProperties::default().resolve_name(), None);
    }

    #[test]
    fn test_registration_paths_for_type_only() {
        let props = typed("x", "my/page");
        assert_eq!(props.registration_paths("/apps/"), vec!["/apps/my/page/GET"]);
    }

    #[test]
    fn test_registration_paths_full_matrix() {
        let props = ProviderProperties {
            servlet_name: Some("x".to_string()),
            resource_types: vec!["my:page".to_string()],
            selectors: vec!["print.a4".to_string()],
            extensions: vec!["html".to_string(), "pdf".to_string()],
            methods: vec!["get".to_string(), "HEAD".to_string(), "POST".to_string()],
            ..Default::default()
        };
        assert_eq!(
            props.registration_paths("/apps/"),
            vec![
                "/apps/my/page/print/a4.html.GET",
                "/apps/my/page/print/a4.html.POST",
                "/apps/my/page/print/a4.pdf.GET",
                "/apps/my/page/print/a4.pdf.POST",
            ]
        );
    }

    #[test]
    fn test_registration_paths_partial() {
        let ext_only = ProviderProperties {
            resource_types: vec!["t".to_string()],
            extensions: vec!["json".to_string()],
            ..Default::default()
        };
        assert_eq!(ext_only.registration_paths("/libs/"), vec!["/libs/t/json"]);

        let method_only = ProviderProperties {
            resource_types: vec!["t".to_string()],
            methods: vec!["POST".to_string()],
            ..Default::default()
        };
        assert_eq!(method_only.registration_paths("/libs/"), vec!["/libs/t/POST"]);

        let selector_only = ProviderProperties {
            resource_types: vec!["t".to_string()],
            selectors: vec!["s".to_string()],
            ..Default::default()
        };
        assert_eq!(selector_only.registration_paths("/libs/"), vec!["/libs/t/s"]);
    }

    #[test]
    fn test_registration_paths_explicit_paths() {
        let props = ProviderProperties {
            paths: vec!["/bin/login".to_string(), "tools/run".to_string(), "/bin/login".to_string()],
            ..Default::default()
        };
        assert_eq!(
            props.registration_paths("/apps/"),
            vec!["/bin/login", "/apps/tools/run"]
        );
    }

    #[test]
    fn test_bind_before_activation_is_queued() {
        let registry = HandlerRegistry::new();
        let handler = CountingHandler::new();

        let outcome = registry.bind(HandlerProvider::new(1, typed("a", "my/page"), handler.clone()));
        assert_eq!(outcome, BindOutcome::Pending);
        assert_eq!(registry.stats().pending, 1);
        assert!(registry.handlers_at("/apps/my/page/GET").is_empty());
        assert_eq!(handler.inits.load(Ordering::SeqCst), 0);

        let outcomes = registry.activate(&ServletRoot::SearchPath(0), &["/apps/".to_string()]);
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_bound());
        assert_eq!(registry.handlers_at("/apps/my/page/GET").len(), 1);
        assert_eq!(handler.inits.load(Ordering::SeqCst), 1);
        assert_eq!(registry.stats().pending, 0);
    }

    #[test]
    fn test_unbind_removes_pending() {
        let registry = HandlerRegistry::new();
        registry.bind(HandlerProvider::new(1, typed("a", "my/page"), CountingHandler::new()));
        assert_eq!(registry.unbind(1), UnbindOutcome::Dequeued);

        let outcomes = registry.activate(&ServletRoot::SearchPath(0), &["/apps/".to_string()]);
        assert!(outcomes.is_empty());
        assert!(registry.handlers_at("/apps/my/page/GET").is_empty());
    }

    /// Unbinds its own provider from inside `init`, the way a concurrent
    /// unbind lands between dequeue and bind
    struct UnbindsDuringInit {
        registry: Arc<HandlerRegistry>,
        id: ProviderId,
        unbind: parking_lot::Mutex<Option<UnbindOutcome>>,
        destroys: AtomicUsize,
    }

    impl Handler for UnbindsDuringInit {
        fn name(&self) -> &str {
            "unbinds-during-init"
        }

        fn service(&self, _: &ResolutionRequest, _: &mut Response) -> Result<(), HandlerError> {
            Ok(())
        }

        fn init(&self, _config: &HandlerConfig) -> Result<(), HandlerError> {
            *self.unbind.lock() = Some(self.registry.unbind(self.id));
            Ok(())
        }

        fn destroy(&self) -> Result<(), HandlerError> {
            self.destroys.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_unbind_during_activation_cancels_bind() {
        let registry = Arc::new(HandlerRegistry::new());
        let handler = Arc::new(UnbindsDuringInit {
            registry: Arc::clone(&registry),
            id: 7,
            unbind: parking_lot::Mutex::new(None),
            destroys: AtomicUsize::new(0),
        });
        registry.bind(HandlerProvider::new(7, typed("a", "my/page"), handler.clone()));

        let outcomes = registry.activate(&ServletRoot::SearchPath(0), &["/apps/".to_string()]);
        assert_eq!(outcomes, vec![BindOutcome::Rejected(RejectReason::Unbound)]);
        assert_eq!(*handler.unbind.lock(), Some(UnbindOutcome::Dequeued));
        assert_eq!(handler.destroys.load(Ordering::SeqCst), 1);
        assert!(registry.handlers_at("/apps/my/page/GET").is_empty());
        assert_eq!(registry.stats().bound, 0);

        // a later unbind finds nothing left
        assert_eq!(registry.unbind(7), UnbindOutcome::NotFound);
    }

    #[test]
    fn test_bind_rejections() {
        let registry = active_registry();

        let nameless = ProviderProperties {
            resource_types: vec!["my/page".to_string()],
            ..Default::default()
        };
        assert_eq!(
            registry.bind(HandlerProvider::new(1, nameless, CountingHandler::new())),
            BindOutcome::Rejected(RejectReason::MissingName)
        );

        let pathless = ProviderProperties {
            servlet_name: Some("x".to_string()),
            ..Default::default()
        };
        assert_eq!(
            registry.bind(HandlerProvider::new(2, pathless, CountingHandler::new())),
            BindOutcome::Rejected(RejectReason::NoPaths)
        );

        let failing = CountingHandler::with_failures(true, false);
        assert!(matches!(
            registry.bind(HandlerProvider::new(3, typed("f", "my/page"), failing)),
            BindOutcome::Rejected(RejectReason::InitFailed(_))
        ));
        assert_eq!(registry.stats().bound, 0);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let registry = active_registry();
        assert!(registry
            .bind(HandlerProvider::new(1, typed("a", "my/page"), CountingHandler::new()))
            .is_bound());
        assert_eq!(
            registry.bind(HandlerProvider::new(1, typed("b", "other"), CountingHandler::new())),
            BindOutcome::Rejected(RejectReason::AlreadyBound)
        );
    }

    #[test]
    fn test_same_path_keeps_both() {
        let registry = active_registry();
        registry.bind(HandlerProvider::new(1, typed("first", "my/page"), CountingHandler::new()));
        registry.bind(HandlerProvider::new(2, typed("second", "my/page"), CountingHandler::new()));

        let regs = registry.handlers_at("/apps/my/page/GET");
        let names: Vec<&str> = regs.iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["first", "second"]);

        assert_eq!(registry.unbind(1), UnbindOutcome::Removed);
        let regs = registry.handlers_at("/apps/my/page/GET");
        assert_eq!(regs.len(), 1);
        assert_eq!(regs[0].name(), "second");
    }

    #[test]
    fn test_unbind_swallows_teardown_failure() {
        let registry = active_registry();
        let handler = CountingHandler::with_failures(false, true);
        registry.bind(HandlerProvider::new(7, typed("x", "my/page"), handler.clone()));

        assert_eq!(registry.unbind(7), UnbindOutcome::TeardownFailed);
        assert_eq!(handler.destroys.load(Ordering::SeqCst), 1);
        assert!(registry.handlers_at("/apps/my/page/GET").is_empty());
        assert_eq!(registry.stats().paths, 0);
        assert_eq!(registry.unbind(7), UnbindOutcome::NotFound);
    }

    #[test]
    fn test_deactivate_destroys_all() {
        let registry = active_registry();
        let a = CountingHandler::new();
        let b = CountingHandler::new();
        registry.bind(HandlerProvider::new(1, typed("a", "x"), a.clone()));
        registry.bind(HandlerProvider::new(2, typed("b", "y"), b.clone()));

        assert_eq!(registry.deactivate(), 0);
        assert_eq!(a.destroys.load(Ordering::SeqCst), 1);
        assert_eq!(b.destroys.load(Ordering::SeqCst), 1);
        assert!(!registry.is_active());
        assert_eq!(
            registry.bind(HandlerProvider::new(3, typed("c", "z"), CountingHandler::new())),
            BindOutcome::Pending
        );
    }

    #[test]
    fn test_child_paths() {
        let registry = active_registry();
        let props = ProviderProperties {
            servlet_name: Some("x".to_string()),
            resource_types: vec!["my/page".to_string()],
            extensions: vec!["json".to_string(), "xml".to_string()],
            ..Default::default()
        };
        registry.bind(HandlerProvider::new(1, props, CountingHandler::new()));
        assert_eq!(
            registry.child_paths("/apps/my/page"),
            vec!["/apps/my/page/json", "/apps/my/page/xml"]
        );
        assert!(registry.child_paths("/apps/my").is_empty());
    }
}
