//! Configuration management for the servlet resolver

use crate::error::{Result, ResolverError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Smallest cache size that actually enables the resolution cache.
/// Configured sizes at or below this value disable caching.
pub const MIN_CACHE_SIZE: usize = 5;

/// Configuration for the servlet resolver
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolverConfig {
    /// Root under which relative handler registrations are placed.
    /// Either an index into the search paths (default: "0", the first
    /// search path) or an absolute path prefix.
    #[serde(default = "default_servlet_root")]
    pub servlet_root: String,

    /// Maximum number of cached resolutions (default: 200).
    /// Values of 5 or less disable the cache.
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,

    /// Path prefixes handlers may be executed from (default: ["/"]).
    /// An empty list or one containing "" or "/" allows every path.
    #[serde(default = "default_execution_paths")]
    pub execution_paths: Vec<String>,

    /// Extensions for which extension-less scripts apply (default: ["html"])
    #[serde(default = "default_default_extensions")]
    pub default_extensions: Vec<String>,

    /// Resolve scripts in the workspace of the request's resource (default: false)
    #[serde(default)]
    pub use_request_workspace: bool,

    /// Fall back to the default workspace when the request workspace
    /// yields nothing. Only honoured with `use_request_workspace` (default: false)
    #[serde(default)]
    pub use_default_workspace: bool,

    /// Workspace scripts are read from; blank means the repository default
    #[serde(default)]
    pub default_workspace: Option<String>,
}

fn default_servlet_root() -> String {
    "0".to_string()
}

fn default_cache_size() -> usize {
    200
}

fn default_execution_paths() -> Vec<String> {
    vec!["/".to_string()]
}

fn default_default_extensions() -> Vec<String> {
    vec!["html".to_string()]
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            servlet_root: default_servlet_root(),
            cache_size: default_cache_size(),
            execution_paths: default_execution_paths(),
            default_extensions: default_default_extensions(),
            use_request_workspace: false,
            use_default_workspace: false,
            default_workspace: None,
        }
    }
}

/// Where relative handler registrations are rooted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServletRoot {
    /// Index into the resource provider's search paths
    SearchPath(usize),
    /// Explicit absolute prefix
    Absolute(String),
}

impl ServletRoot {
    /// Resolve the root prefix against the given search paths.
    ///
    /// An out-of-range index falls back to the first search path, and to
    /// "/" when there are no search paths at all.
    pub fn resolve(&self, search_paths: &[String]) -> String {
        let root = match self {
            ServletRoot::Absolute(path) => path.clone(),
            ServletRoot::SearchPath(index) => search_paths
                .get(*index)
                .or_else(|| search_paths.first())
                .cloned()
                .unwrap_or_else(|| "/".to_string()),
        };
        if root.ends_with('/') {
            root
        } else {
            format!("{}/", root)
        }
    }
}

impl ResolverConfig {
    /// Load configuration from a YAML file
    ///
    /// # Returns
    /// * `Ok(ResolverConfig)` if loading and validation succeed
    /// * `Err(ResolverError)` if file cannot be read or config is invalid
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            ResolverError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        Self::from_yaml_str(&content)
    }

    /// Parse and validate configuration from a YAML document
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: ResolverConfig = serde_yaml::from_str(content).map_err(|e| {
            ResolverError::ConfigError(format!("Failed to parse config file: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Validation Rules
    /// - servlet_root must be a search path index or an absolute path
    /// - execution_paths entries must be empty, "/" or absolute
    /// - default_extensions entries must be non-empty and dot-free
    pub fn validate(&self) -> Result<()> {
        self.parsed_servlet_root()?;

        for path in &self.execution_paths {
            if !path.is_empty() && !path.starts_with('/') {
                return Err(ResolverError::ConfigError(format!(
                    "execution path '{}' must be absolute",
                    path
                )));
            }
        }

        for ext in &self.default_extensions {
            if ext.is_empty() || ext.contains('.') {
                return Err(ResolverError::ConfigError(format!(
                    "default extension '{}' must be non-empty and must not contain '.'",
                    ext
                )));
            }
        }

        if self.use_default_workspace && !self.use_request_workspace {
            warn!("use_default_workspace has no effect without use_request_workspace");
        }

        Ok(())
    }

    /// Parse the servlet root marker
    pub fn parsed_servlet_root(&self) -> Result<ServletRoot> {
        let root = self.servlet_root.trim();
        if root.is_empty() {
            return Err(ResolverError::ConfigError(
                "servlet_root must not be empty".to_string(),
            ));
        }
        if let Ok(index) = root.parse::<usize>() {
            return Ok(ServletRoot::SearchPath(index));
        }
        if root.starts_with('/') {
            return Ok(ServletRoot::Absolute(root.to_string()));
        }
        Err(ResolverError::ConfigError(format!(
            "servlet_root '{}' must be a search path index or an absolute path",
            root
        )))
    }

    /// The execution-path allow-list, or `None` when every path is allowed
    pub fn effective_execution_paths(&self) -> Option<Arc<[String]>> {
        if self.execution_paths.is_empty() {
            return None;
        }
        let allows_all = self
            .execution_paths
            .iter()
            .any(|p| p.is_empty() || p == "/");
        if allows_all {
            None
        } else {
            Some(self.execution_paths.clone().into())
        }
    }

    /// Effective cache capacity; zero when caching is disabled
    pub fn effective_cache_size(&self) -> usize {
        if self.cache_size > MIN_CACHE_SIZE {
            self.cache_size
        } else {
            0
        }
    }

    /// Default workspace name with blank values normalized away
    pub fn default_workspace_name(&self) -> Option<String> {
        self.default_workspace
            .as_deref()
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .map(str::to_string)
    }

    /// Update configuration from another config
    ///
    /// # Returns
    /// * `Ok(ConfigChanges)` - Description of what changed
    /// * `Err(ResolverError)` - If the new configuration is invalid
    pub fn update_from(&mut self, new_config: &ResolverConfig) -> Result<ConfigChanges> {
        new_config.validate()?;

        let mut changes = ConfigChanges::default();

        if self.servlet_root != new_config.servlet_root {
            changes.servlet_root_changed = true;
            self.servlet_root = new_config.servlet_root.clone();
        }

        if self.cache_size != new_config.cache_size {
            changes.cache_size_changed = true;
            self.cache_size = new_config.cache_size;
        }

        if self.execution_paths != new_config.execution_paths {
            changes.execution_paths_changed = true;
            self.execution_paths = new_config.execution_paths.clone();
        }

        if self.default_extensions != new_config.default_extensions {
            changes.default_extensions_changed = true;
            self.default_extensions = new_config.default_extensions.clone();
        }

        if self.use_request_workspace != new_config.use_request_workspace
            || self.use_default_workspace != new_config.use_default_workspace
            || self.default_workspace != new_config.default_workspace
        {
            changes.workspace_changed = true;
            self.use_request_workspace = new_config.use_request_workspace;
            self.use_default_workspace = new_config.use_default_workspace;
            self.default_workspace = new_config.default_workspace.clone();
        }

        Ok(changes)
    }

    /// Reload configuration from file and apply changes
    pub fn reload_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<ConfigChanges> {
        let new_config = Self::from_file(path)?;
        self.update_from(&new_config)
    }
}

/// Description of configuration changes after reload
#[derive(Debug, Default, Clone)]
pub struct ConfigChanges {
    pub servlet_root_changed: bool,
    pub cache_size_changed: bool,
    pub execution_paths_changed: bool,
    pub default_extensions_changed: bool,
    pub workspace_changed: bool,
}

impl ConfigChanges {
    /// Check if any changes were made
    pub fn has_changes(&self) -> bool {
        self.servlet_root_changed
            || self.cache_size_changed
            || self.execution_paths_changed
            || self.default_extensions_changed
            || self.workspace_changed
    }

    /// Whether handler registrations must be re-rooted, which only happens
    /// on the next activation
    pub fn requires_reactivation(&self) -> bool {
        self.servlet_root_changed
    }

    /// Get a summary of changes
    pub fn summary(&self) -> Vec<String> {
        let mut changes = Vec::new();

        if self.servlet_root_changed {
            changes.push("servlet_root".to_string());
        }
        if self.cache_size_changed {
            changes.push("cache_size".to_string());
        }
        if self.execution_paths_changed {
            changes.push("execution_paths".to_string());
        }
        if self.default_extensions_changed {
            changes.push("default_extensions".to_string());
        }
        if self.workspace_changed {
            changes.push("workspace".to_string());
        }

        changes
    }
}
