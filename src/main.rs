//! Servlet Resolver command line
//!
//! Loads a resolver configuration and a content fixture, resolves one URL
//! and prints the decomposed request, the ordered candidates and the chosen
//! handler as JSON.

use anyhow::{bail, Context};
use http::Method;
use servlet_resolver::resource::NON_EXISTING_RESOURCE_TYPE;
use servlet_resolver::{
    InMemoryResourceProvider, PrometheusMetrics, Resource, ResolutionRequest, ResolverConfig,
    ResolverError, ResourceProvider, ServletResolver,
};
use std::env;
use std::sync::Arc;
use tracing::info;

/// Main entry point for the resolver CLI
///
/// # Usage
/// ```bash
/// servlet-resolver resolver.yaml content.yaml /content/home.print.html
/// servlet-resolver resolver.yaml content.yaml /content/home.json POST --metrics
/// ```
fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    let mut args: Vec<String> = env::args().skip(1).collect();
    let show_metrics = match args.iter().position(|a| a == "--metrics") {
        Some(pos) => {
            args.remove(pos);
            true
        }
        None => false,
    };
    if args.len() < 3 || args.len() > 4 {
        bail!("usage: servlet-resolver <config.yaml> <content.yaml> <url> [method] [--metrics]");
    }

    let config = ResolverConfig::from_file(&args[0])
        .with_context(|| format!("loading configuration from {}", args[0]))?;
    info!("Configuration loaded successfully");
    info!("  - Servlet root: {}", config.servlet_root);
    info!("  - Cache size: {}", config.cache_size);
    info!("  - Execution paths: {:?}", config.execution_paths);
    info!("  - Default extensions: {:?}", config.default_extensions);

    let content = Arc::new(
        InMemoryResourceProvider::from_file(&args[1])
            .with_context(|| format!("loading content from {}", args[1]))?,
    );
    info!(
        "Content loaded: {} resources, search paths {:?}",
        content.len(),
        content.search_paths()
    );

    let method = match args.get(3) {
        Some(m) => Method::from_bytes(m.to_ascii_uppercase().as_bytes())
            .with_context(|| format!("invalid method {}", m))?,
        None => Method::GET,
    };

    let resolver = ServletResolver::new(config, content.clone())?;
    resolver.activate();

    let mut request = ResolutionRequest::new(method, &args[2]);
    let resource_path = request.path_info.resource_path.clone();
    let resource = content
        .get_resource(&resource_path)
        .unwrap_or_else(|| Resource::synthetic(resource_path, NON_EXISTING_RESOURCE_TYPE));
    request = request.with_resource(resource);

    let explanation = resolver.explain(&request);
    println!("{}", serde_json::to_string_pretty(&explanation)?);

    if show_metrics {
        let prometheus = PrometheusMetrics::new().map_err(ResolverError::from)?;
        prometheus.observe(&resolver);
        print!("{}", prometheus.encode()?);
    }
    Ok(())
}
