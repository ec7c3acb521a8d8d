use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub content: ContentConfig,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address for the HTTP listener (e.g. `0.0.0.0:8080`).
    pub http_listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_listen: default_http_listen(),
        }
    }
}

fn default_http_listen() -> String {
    "0.0.0.0:8080".to_string()
}

// ---------------------------------------------------------------------------
// Content
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// Content root directory that is indexed and served.
    pub root: String,
    /// File extension (with leading dot) treated as a page template.
    pub template_ext: String,
    /// Map of asset file extensions (with leading dot) to their MIME type.
    /// Files with extensions outside this map are not served.
    pub assets: HashMap<String, String>,
    /// Directory names exposed over the Git smart HTTP bridge instead of
    /// being indexed.  A directory matches when its name equals or ends
    /// with an entry (so `.git` also covers bare `project.git` layouts).
    pub git_dirs: Vec<String>,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            template_ext: default_template_ext(),
            assets: HashMap::new(),
            git_dirs: default_git_dirs(),
        }
    }
}

fn default_root() -> String {
    ".".to_string()
}

fn default_template_ext() -> String {
    ".tmpl".to_string()
}

fn default_git_dirs() -> Vec<String> {
    vec![".git".to_string()]
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load and validate a [`Config`] from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&contents)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Basic sanity checks that cannot be expressed purely with serde.
fn validate_config(config: &Config) -> Result<()> {
    anyhow::ensure!(
        config.content.template_ext.starts_with('.'),
        "template_ext must start with a dot, got {:?}",
        config.content.template_ext
    );
    for ext in config.content.assets.keys() {
        anyhow::ensure!(
            ext.starts_with('.'),
            "asset extension must start with a dot, got {ext:?}"
        );
    }
    anyhow::ensure!(
        !config.content.assets.contains_key(&config.content.template_ext),
        "template_ext {:?} must not also be listed as an asset extension",
        config.content.template_ext
    );
    for dir in &config.content.git_dirs {
        anyhow::ensure!(!dir.is_empty(), "git_dirs entries must not be empty");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
