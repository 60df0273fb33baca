//! Workspace configuration.
//!
//! Loaded from `.nereus/config.yaml` under the workspace root. Every field has
//! a default, so a missing file or a partial file is fine:
//!
//! ```yaml
//! indexing:
//!   extensions: [c, h]
//!   exclude: ["build/**"]
//! modules:
//!   strip_prefixes: ["src/"]
//!   depth: 1
//! traversal:
//!   default_depth: 3
//!   max_depth: 10
//! extractors:
//!   c:
//!     command: ctags-json
//!     args: ["--output", "json", "{path}"]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Directory holding the config file and the database.
pub const CONFIG_DIR: &str = ".nereus";

/// Config file name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "config.yaml";

/// Largest traversal depth any configuration may allow.
pub const DEPTH_CEILING: u32 = 10;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Database location and connection settings
    pub database: DatabaseConfig,
    /// Which files get indexed and how
    pub indexing: IndexingConfig,
    /// How module names are derived from paths
    pub modules: ModuleRule,
    /// Which paths are flagged critical
    pub criticality: CriticalityConfig,
    /// Traversal depth limits
    pub traversal: TraversalConfig,
    /// External extractor command per file extension
    pub extractors: BTreeMap<String, ExtractorCommand>,
}

/// Database settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Database path, relative to the workspace root
    pub path: PathBuf,
    /// How long a connection waits on a locked database
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(CONFIG_DIR).join("graph.db"),
            busy_timeout_ms: crate::db::DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

/// Indexing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexingConfig {
    /// File extensions (without the dot) considered during a sync
    pub extensions: Vec<String>,
    /// Glob patterns, relative to the workspace root, never indexed
    pub exclude: Vec<String>,
    /// Worker threads for reading, hashing and extraction
    pub parallel_workers: usize,
    /// Files larger than this many bytes are rejected
    pub max_file_size: u64,
    /// Seconds an external extractor may run before it is killed
    pub extractor_timeout_secs: u64,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            extensions: ["c", "h", "cpp", "hpp", "cc", "hh", "py", "js", "ts"]
                .into_iter()
                .map(String::from)
                .collect(),
            exclude: [
                "build/**",
                "dist/**",
                "vendor/**",
                "node_modules/**",
                ".git/**",
                "__pycache__/**",
                "*.pyc",
                ".nereus/**",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            parallel_workers: 4,
            max_file_size: 1_048_576,
            extractor_timeout_secs: 30,
        }
    }
}

/// Derives a file's module from its path.
///
/// The first matching prefix in `strip_prefixes` is removed, then the first
/// `depth` directory components form the module. A file with no directory
/// left belongs to the root module `""`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModuleRule {
    /// Leading path prefixes ignored when deriving a module
    pub strip_prefixes: Vec<String>,
    /// Number of directory components that name a module
    pub depth: usize,
}

impl Default for ModuleRule {
    fn default() -> Self {
        Self {
            strip_prefixes: vec!["src/".to_string()],
            depth: 1,
        }
    }
}

impl ModuleRule {
    /// Module of a `/`-separated workspace-relative path.
    #[must_use]
    pub fn module_for(&self, path: &str) -> String {
        let stripped = self
            .strip_prefixes
            .iter()
            .find_map(|prefix| path.strip_prefix(prefix.as_str()))
            .unwrap_or(path);

        let mut dirs: Vec<&str> = stripped.split('/').filter(|s| !s.is_empty()).collect();
        // The last component is the file name.
        dirs.pop();
        dirs.truncate(self.depth);
        dirs.join("/")
    }
}

/// Criticality settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CriticalityConfig {
    /// Glob patterns marking files as critical
    pub critical_paths: Vec<String>,
}

impl Default for CriticalityConfig {
    fn default() -> Self {
        Self {
            critical_paths: [
                "**/security/**",
                "**/auth/**",
                "**/crypto/**",
                "**/*password*",
                "**/*secret*",
                "**/*token*",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

/// Traversal depth limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TraversalConfig {
    /// Depth used when a query does not ask for one
    pub default_depth: u32,
    /// Hard cap on any requested depth
    pub max_depth: u32,
    /// Depth of transitive file impact
    pub impact_depth: u32,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            default_depth: 3,
            max_depth: DEPTH_CEILING,
            impact_depth: 3,
        }
    }
}

/// An external extractor program.
///
/// `{path}` in `args` is replaced by the workspace-relative file path. The
/// file's bytes are written to the program's stdin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractorCommand {
    /// Program to run
    pub command: String,
    /// Arguments
    #[serde(default)]
    pub args: Vec<String>,
}

/// Compiled glob patterns.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    set: GlobSet,
}

impl PathMatcher {
    /// Compile a list of glob patterns.
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern)
                .map_err(|e| Error::Config(format!("invalid glob '{pattern}': {e}")))?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|e| Error::Config(format!("failed to build glob set: {e}")))?;
        Ok(Self { set })
    }

    /// Whether a `/`-separated relative path matches any pattern.
    #[must_use]
    pub fn is_match(&self, path: &str) -> bool {
        self.set.is_match(path)
    }
}

impl Config {
    /// Path of the config file for a workspace.
    #[must_use]
    pub fn file_path(workspace_root: &Path) -> PathBuf {
        workspace_root.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Load the workspace config, falling back to defaults if there is none.
    pub fn load(workspace_root: &Path) -> Result<Self> {
        let path = Self::file_path(workspace_root);
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                let config = Self::from_yaml(&text)?;
                tracing::debug!(path = %path.display(), "Loaded configuration");
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No configuration file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Parse and validate YAML configuration text.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)
            .map_err(|e| Error::Config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config file for a workspace, creating its directory.
    pub fn save(&self, workspace_root: &Path) -> Result<()> {
        let path = Self::file_path(workspace_root);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_yaml::to_string(self)
            .map_err(|e| Error::Config(format!("failed to serialize configuration: {e}")))?;
        std::fs::write(&path, text)?;
        Ok(())
    }

    /// Check value ranges and that every glob compiles.
    pub fn validate(&self) -> Result<()> {
        let t = &self.traversal;
        if t.max_depth == 0 || t.max_depth > DEPTH_CEILING {
            return Err(Error::Config(format!(
                "traversal.max_depth must be between 1 and {DEPTH_CEILING}, got {}",
                t.max_depth
            )));
        }
        if t.default_depth == 0 || t.default_depth > t.max_depth {
            return Err(Error::Config(format!(
                "traversal.default_depth must be between 1 and max_depth ({}), got {}",
                t.max_depth, t.default_depth
            )));
        }
        if t.impact_depth == 0 || t.impact_depth > t.max_depth {
            return Err(Error::Config(format!(
                "traversal.impact_depth must be between 1 and max_depth ({}), got {}",
                t.max_depth, t.impact_depth
            )));
        }
        if self.indexing.parallel_workers == 0 {
            return Err(Error::Config(
                "indexing.parallel_workers must be at least 1".to_string(),
            ));
        }
        if self.modules.depth == 0 {
            return Err(Error::Config("modules.depth must be at least 1".to_string()));
        }
        for (ext, extractor) in &self.extractors {
            if extractor.command.trim().is_empty() {
                return Err(Error::Config(format!(
                    "extractors.{ext}.command must not be empty"
                )));
            }
        }
        PathMatcher::new(&self.indexing.exclude)?;
        PathMatcher::new(&self.criticality.critical_paths)?;
        Ok(())
    }

    /// Absolute database path for a workspace.
    #[must_use]
    pub fn database_path(&self, workspace_root: &Path) -> PathBuf {
        workspace_root.join(&self.database.path)
    }
}
