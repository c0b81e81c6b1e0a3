//! Servlet Resolver
//!
//! Picks the handler for a request in a content-tree driven web application
//! server. Handlers live in the resource tree, either as scripts stored in
//! content or as dynamically bound handler providers, and are found by
//! walking a resource type hierarchy across several search paths, selectors,
//! extensions and methods.
//!
//! # Overview
//!
//! Resolution runs in four steps:
//!
//! 1. A [`ResolutionKey`] is derived from the request (method, selectors,
//!    extension, resource type, workspace, execution paths).
//! 2. The [`ResolutionCache`] is probed with the key.
//! 3. On a miss the [`ResourceCollector`] enumerates candidate paths in
//!    priority order.
//! 4. The [`CandidateSelector`] adapts the resources at each path to
//!    handlers. The first plain handler, or the first opting handler that
//!    accepts the request, wins.
//!
//! Content changes below a search path, handler bind/unbind and capability
//! changes flush the cache (see [`events`]).
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use servlet_resolver::{
//!     InMemoryResourceProvider, Resource, ResolutionRequest, ResolverConfig, ServletResolver,
//! };
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let content = Arc::new(InMemoryResourceProvider::new(["/apps/", "/libs/"]));
//! content.insert_script("/apps/my/page/html");
//!
//! let resolver = ServletResolver::new(ResolverConfig::default(), content)?;
//! resolver.activate();
//!
//! let request = ResolutionRequest::get("/content/home.html")
//!     .with_resource(Resource::new("/content/home", "my/page"));
//! let handler = resolver.resolve(&request);
//! println!("Resolved to {}", handler.name());
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded from a YAML file:
//!
//! ```yaml
//! servlet_root: "0"              # first search path
//! cache_size: 200                # 5 or less disables the cache
//! execution_paths: ["/"]         # "/" allows every path
//! default_extensions: ["html"]
//! use_request_workspace: false
//! use_default_workspace: false
//! default_workspace: ""
//! ```
//!
//! See [`ResolverConfig`] for detailed configuration options.
//!
//! # Error Handling
//!
//! Resolution itself never fails; it falls back to [`DefaultHandler`].
//! Administrative surfaces return [`ResolverError`]:
//!
//! ```rust,no_run
//! use servlet_resolver::{ResolverConfig, ResolverError};
//!
//! # fn main() {
//! match ResolverConfig::from_file("resolver.yaml") {
//!     Ok(_) => println!("Config loaded successfully"),
//!     Err(ResolverError::ConfigError(msg)) => eprintln!("Config error: {}", msg),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! # }
//! ```

pub mod cache;
pub mod collector;
pub mod config;
pub mod error;
pub mod events;
pub mod handler;
pub mod metrics;
pub mod models;
pub mod prometheus_metrics;
pub mod registry;
pub mod request_path;
pub mod resolver;
pub mod resource;
pub mod selector;
pub mod tree;

// Re-export commonly used types
pub use cache::{CacheStats, PutOutcome, ResolutionCache};
pub use collector::{
    is_path_allowed, CollectorKind, ResolutionKey, ResourceCollector, DEFAULT_RESOURCE_TYPE,
    ERROR_HANDLER_RESOURCE_TYPE,
};
pub use config::{ConfigChanges, ResolverConfig, ServletRoot};
pub use error::{HandlerError, ResolverError, Result};
pub use events::{requires_flush, spawn_event_listener, ResolverEvent};
pub use handler::{
    DefaultErrorHandler, DefaultHandler, Handler, HandlerConfig, HandlerRef, Script, ScriptHandler,
    ScriptRef,
};
pub use metrics::{MetricsSnapshot, ResolverMetrics};
pub use models::{ExceptionType, RequestAttributes, ResolutionRequest, Response, Throwable};
pub use prometheus_metrics::PrometheusMetrics;
pub use registry::{
    BindOutcome, HandlerProvider, HandlerRegistry, ProviderId, ProviderProperties, RegistryStats,
    RejectReason, UnbindOutcome,
};
pub use request_path::RequestPathInfo;
pub use resolver::{Explanation, ServletResolver};
pub use resource::{
    ContentFixture, InMemoryResourceProvider, Resource, ResourceFixture, ResourceProvider,
};
pub use selector::{CandidateHandler, CandidateReport, CandidateSelector};
pub use tree::ResourceTree;
