use crate::cache::SqliteTier;
use crate::crawl::{CrawlOptions, DEFAULT_CHILDREN_LIMIT, DEFAULT_MAX_DEPTH, MAX_NODES_TOTAL};
use crate::error::{AnalyzeError, Result};
use orgmap_scanner::client::DEFAULT_TIMEOUT_SECS;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_CONFIG_DIR: &str = "~/.config/orgmap/";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_TRACKED_OBJECTS: &[&str] = &["Account", "Contact", "Case"];

pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

pub fn default_config_path() -> PathBuf {
    expand_path(DEFAULT_CONFIG_DIR).join(CONFIG_FILE_NAME)
}

/// User settings, read from `config.toml`. Every key is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub max_depth: usize,
    /// 0 means the per-relationship safety cap
    pub children_limit: usize,
    pub node_cap: usize,
    pub tracked_objects: Vec<String>,
    pub timeout_secs: u64,
    /// JSON export of browser cookies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookies_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            children_limit: DEFAULT_CHILDREN_LIMIT,
            node_cap: MAX_NODES_TOTAL,
            tracked_objects: DEFAULT_TRACKED_OBJECTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            cookies_path: None,
            cache_path: None,
        }
    }
}

impl Settings {
    /// Missing file means defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
            .map_err(|e| AnalyzeError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| AnalyzeError::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| AnalyzeError::Config(e.to_string()))
    }

    /// Write to `path`, creating parent directories. Refuses to replace an
    /// existing file unless `force` is set.
    pub fn write(&self, path: &Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            return Err(AnalyzeError::Config(format!(
                "{} already exists (use --force to overwrite)",
                path.display()
            )));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn cookies_path(&self) -> Option<PathBuf> {
        self.cookies_path.as_deref().map(expand_path)
    }

    pub fn cache_path(&self) -> PathBuf {
        self.cache_path
            .as_deref()
            .map(expand_path)
            .unwrap_or_else(SqliteTier::default_path)
    }

    pub fn crawl_options(&self) -> CrawlOptions {
        CrawlOptions {
            max_depth: self.max_depth,
            children_limit: self.children_limit,
            node_cap: self.node_cap,
        }
    }
}
