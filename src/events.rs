//! Change notifications and the event pump
//!
//! Registry changes, content changes under a search path and capability
//! changes (script engines, adapter factories, bindings providers) all
//! invalidate the resolution cache. Events can be fed synchronously through
//! [`crate::ServletResolver::handle_event`] or pushed into a channel drained
//! by [`spawn_event_listener`].

use crate::registry::{HandlerProvider, ProviderId};
use crate::resolver::ServletResolver;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub const RESOURCE_TOPIC_PREFIX: &str = "org/apache/sling/api/resource/Resource/";
pub const RESOURCE_PROVIDER_TOPIC_PREFIX: &str = "org/apache/sling/api/resource/ResourceProvider/";
pub const SCRIPT_ENGINE_TOPIC_PREFIX: &str = "javax/script/ScriptEngineFactory/";
pub const ADAPTER_FACTORY_TOPIC_PREFIX: &str = "org/apache/sling/api/adapter/AdapterFactory/";
pub const BINDINGS_PROVIDER_TOPIC_PREFIX: &str =
    "org/apache/sling/scripting/core/BindingsValuesProvider/";

/// Something that happened outside the resolver
#[derive(Debug)]
pub enum ResolverEvent {
    HandlerBound(HandlerProvider),
    HandlerUnbound(ProviderId),
    /// A resource was added, changed or removed
    ResourceChanged { path: String },
    /// A resource provider was mounted or unmounted
    ResourceProviderChanged { path: String },
    ScriptEngineChanged,
    AdapterFactoryChanged,
    BindingsProviderChanged,
}

impl ResolverEvent {
    /// Map an event-admin style topic to an event.
    ///
    /// Resource events without a path are ignored.
    pub fn from_topic(topic: &str, path: Option<&str>) -> Option<Self> {
        if topic.starts_with(SCRIPT_ENGINE_TOPIC_PREFIX) {
            Some(ResolverEvent::ScriptEngineChanged)
        } else if topic.starts_with(ADAPTER_FACTORY_TOPIC_PREFIX) {
            Some(ResolverEvent::AdapterFactoryChanged)
        } else if topic.starts_with(BINDINGS_PROVIDER_TOPIC_PREFIX) {
            Some(ResolverEvent::BindingsProviderChanged)
        } else if topic.starts_with(RESOURCE_PROVIDER_TOPIC_PREFIX) {
            path.map(|p| ResolverEvent::ResourceProviderChanged {
                path: p.to_string(),
            })
        } else if topic.starts_with(RESOURCE_TOPIC_PREFIX) {
            path.map(|p| ResolverEvent::ResourceChanged {
                path: p.to_string(),
            })
        } else {
            debug!("Ignoring event topic {}", topic);
            None
        }
    }
}

/// Whether an event invalidates cached resolutions.
///
/// Resource events flush only when their path, with any `wsp:` prefix
/// removed, lies below a search path. Capability and registry events always
/// flush.
pub fn requires_flush(event: &ResolverEvent, search_paths: &[String]) -> bool {
    match event {
        ResolverEvent::ResourceChanged { path } | ResolverEvent::ResourceProviderChanged { path } => {
            let path = match path.find(':') {
                Some(pos) => &path[pos + 1..],
                None => path.as_str(),
            };
            search_paths.iter().any(|sp| path.starts_with(sp.as_str()))
        }
        ResolverEvent::HandlerBound(_)
        | ResolverEvent::HandlerUnbound(_)
        | ResolverEvent::ScriptEngineChanged
        | ResolverEvent::AdapterFactoryChanged
        | ResolverEvent::BindingsProviderChanged => true,
    }
}

/// Drain `events` into the resolver on a tokio task.
///
/// The task ends when every sender is dropped and yields the number of
/// events that flushed the cache.
pub fn spawn_event_listener(
    resolver: Arc<ServletResolver>,
    mut events: mpsc::Receiver<ResolverEvent>,
) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut flushes = 0;
        while let Some(event) = events.recv().await {
            if resolver.handle_event(event) {
                flushes += 1;
            }
        }
        info!("Event listener stopped after {} cache flushes", flushes);
        flushes
    })
}
