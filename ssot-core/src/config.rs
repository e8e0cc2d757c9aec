//! YAML run configuration.
//!
//! # Layout
//!
//! ```yaml
//! netbox:
//!   url: https://netbox.example.com
//!   token: "0123abcd"       # falls back to $NETBOX_TOKEN when empty
//!   timeout_secs: 30
//!   max_retries: 3
//!   page_size: 250
//! managed_tag:
//!   name: ssot
//!   color: "00add8"
//! source_priority: [vcenter, inventory]
//! sweep:
//!   enabled: true
//!   scope: all              # all | managed
//! sources:
//!   - name: inventory
//!     type: file
//!     path: ./inventory.yaml
//! ```
//!
//! # API pattern
//!
//! `load_at(path)` takes an explicit path and is what tests use. `load()`
//! resolves `<config_dir>/ssot/config.yaml` and delegates to `load_at`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::priority::SourcePriority;

/// Environment variable consulted when `netbox.token` is empty.
pub const TOKEN_ENV: &str = "NETBOX_TOKEN";

// ---------------------------------------------------------------------------
// 1. Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub netbox: NetboxConfig,
    #[serde(default)]
    pub managed_tag: ManagedTagConfig,
    /// Source names, highest priority first. Empty means the order of `sources`.
    #[serde(default)]
    pub source_priority: Vec<String>,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetboxConfig {
    pub url: String,
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Set to `false` for self-signed installs; certificates are then not
    /// checked at all.
    #[serde(default = "default_true")]
    pub validate_cert: bool,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_page_size() -> u32 {
    250
}

/// The sentinel tag stamped on every managed object the engine writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedTagConfig {
    #[serde(default = "default_tag_name")]
    pub name: String,
    #[serde(default = "default_tag_color")]
    pub color: String,
    #[serde(default = "default_tag_description")]
    pub description: String,
}

fn default_tag_name() -> String {
    "ssot".to_string()
}

fn default_tag_color() -> String {
    "00add8".to_string()
}

fn default_tag_description() -> String {
    "Created and maintained by ssot".to_string()
}

impl Default for ManagedTagConfig {
    fn default() -> Self {
        Self {
            name: default_tag_name(),
            color: default_tag_color(),
            description: default_tag_description(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub scope: SweepScope,
}

fn default_true() -> bool {
    true
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scope: SweepScope::default(),
        }
    }
}

/// Which bootstrapped objects are deletion candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepScope {
    /// Every object of a managed kind.
    #[default]
    All,
    /// Only objects that already carry the sentinel tag.
    Managed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    #[serde(flatten)]
    pub kind: SourceKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceKind {
    /// Desired state read from a YAML inventory document.
    File { path: PathBuf },
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// `<config_dir>/ssot/config.yaml`. Pure, no I/O.
pub fn default_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("ssot").join("config.yaml"))
        .ok_or(ConfigError::ConfigDirNotFound)
}

/// Load, normalize and validate the config at `path`.
///
/// Relative source paths are resolved against the directory holding the
/// config file. An empty token is filled from `$NETBOX_TOKEN`.
pub fn load_at(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut config: Config = serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;

    if let Some(base) = path.parent() {
        config.resolve_paths(base);
    }
    config.fill_token(std::env::var(TOKEN_ENV).ok());
    config.validate()?;
    tracing::debug!(
        path = %path.display(),
        sources = config.sources.len(),
        "loaded config"
    );
    Ok(config)
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Config, ConfigError> {
    load_at(&default_path()?)
}

// ---------------------------------------------------------------------------
// 3. Normalization & validation
// ---------------------------------------------------------------------------

impl Config {
    pub fn resolve_paths(&mut self, base: &Path) {
        for source in &mut self.sources {
            match &mut source.kind {
                SourceKind::File { path } if path.is_relative() => {
                    *path = base.join(&*path);
                }
                SourceKind::File { .. } => {}
            }
        }
    }

    pub fn fill_token(&mut self, fallback: Option<String>) {
        if self.netbox.token.trim().is_empty() {
            if let Some(token) = fallback {
                self.netbox.token = token;
            }
        }
    }

    /// The effective priority table: `source_priority` if given, otherwise
    /// the order sources are declared in.
    pub fn priority(&self) -> Result<SourcePriority, ConfigError> {
        let table = if self.source_priority.is_empty() {
            SourcePriority::from_names(self.sources.iter().map(|s| s.name.clone()))?
        } else {
            SourcePriority::from_names(self.source_priority.iter().cloned())?
        };
        Ok(table)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.netbox.url.trim();
        if url.is_empty() {
            return Err(ConfigError::Invalid("netbox.url is empty".into()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "netbox.url must start with http:// or https:// (got {url:?})"
            )));
        }
        if self.netbox.page_size == 0 {
            return Err(ConfigError::Invalid("netbox.page_size must be positive".into()));
        }
        if self.managed_tag.name.trim().is_empty() {
            return Err(ConfigError::Invalid("managed_tag.name is empty".into()));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.name.trim().is_empty() {
                return Err(ConfigError::Invalid("a source has an empty name".into()));
            }
            if !seen.insert(source.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "source name {:?} is used more than once",
                    source.name
                )));
            }
        }

        let table = self.priority()?;
        for source in &self.sources {
            if !table.contains(&source.name.as_str().into()) {
                return Err(ConfigError::Invalid(format!(
                    "source {:?} is missing from source_priority",
                    source.name
                )));
            }
        }
        Ok(())
    }
}
