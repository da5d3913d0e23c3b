//! Project configuration (`.retrace/config.toml`).
//!
//! Defines the typed configuration for shard discovery, the snapshot store
//! location, and navigation defaults. A missing file means all defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::RetraceError;

/// Directory under the project root holding config and the default store.
pub const RETRACE_DIR: &str = ".retrace";

/// Config file name inside [`RETRACE_DIR`].
pub const CONFIG_FILE: &str = "config.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level retrace configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetraceConfig {
    /// Shard discovery settings.
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Snapshot store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Navigation defaults.
    #[serde(default)]
    pub navigation: NavigationConfig,
}

// ---------------------------------------------------------------------------
// DiscoveryConfig
// ---------------------------------------------------------------------------

/// Where and how to look for log shards.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscoveryConfig {
    /// Directory scanned for `*.jsonl` shards. `None` means no log root is
    /// configured and the project has no shards unless one is given on the
    /// command line.
    #[serde(default)]
    pub log_root: Option<PathBuf>,

    /// Maximum directory depth below the log root.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Worker threads for per-shard decoding (0 = rayon default).
    #[serde(default)]
    pub parallelism: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            log_root: None,
            max_depth: default_max_depth(),
            parallelism: 0,
        }
    }
}

const fn default_max_depth() -> usize {
    4
}

// ---------------------------------------------------------------------------
// StoreConfig
// ---------------------------------------------------------------------------

/// Snapshot store location.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Store directory; relative paths resolve against the project root.
    /// Defaults to `.retrace/store`.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// NavigationConfig
// ---------------------------------------------------------------------------

/// Navigation defaults.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NavigationConfig {
    /// Shortest accepted abbreviated operation id.
    #[serde(default = "default_min_prefix_len")]
    pub min_prefix_len: usize,

    /// `log` entry limit when `--limit` is not given; 0 lists everything.
    #[serde(default = "default_log_limit")]
    pub default_log_limit: usize,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            min_prefix_len: default_min_prefix_len(),
            default_log_limit: default_log_limit(),
        }
    }
}

const fn default_min_prefix_len() -> usize {
    4
}

const fn default_log_limit() -> usize {
    0
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl RetraceConfig {
    /// Path of the config file for a project root.
    #[must_use]
    pub fn path_for(project_root: &Path) -> PathBuf {
        project_root.join(RETRACE_DIR).join(CONFIG_FILE)
    }

    /// Load `.retrace/config.toml` under `project_root`.
    ///
    /// # Errors
    /// Returns [`RetraceError::Config`] if the file exists but cannot be read
    /// or parsed. A missing file yields the defaults.
    pub fn load(project_root: &Path) -> Result<Self, RetraceError> {
        let path = Self::path_for(project_root);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(RetraceError::Config {
                    path,
                    detail: e.to_string(),
                });
            }
        };
        Self::parse(&content).map_err(|detail| RetraceError::Config { path, detail })
    }

    /// Parse config text.
    ///
    /// # Errors
    /// Returns the parser's message on invalid TOML or unknown fields.
    pub fn parse(content: &str) -> Result<Self, String> {
        let config: Self = toml::from_str(content).map_err(|e| e.to_string())?;
        if config.navigation.min_prefix_len == 0 {
            return Err("navigation.min_prefix_len must be at least 1".to_owned());
        }
        Ok(config)
    }

    /// Effective store directory for a project root.
    #[must_use]
    pub fn store_dir(&self, project_root: &Path) -> PathBuf {
        self.store.dir.as_ref().map_or_else(
            || project_root.join(RETRACE_DIR).join("store"),
            |dir| project_root.join(dir),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
