//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Config file (TOML), if given
//! 3. Environment variables: `NTREE_*` prefix

use std::path::Path;

use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

use crate::error::{TreeError, TreeResult};
use crate::id::{DEFAULT_ID_PREFIX, DEFAULT_SCOPE_LEN};
use crate::tree::DEFAULT_INDENT;

/// Settings applied to trees built with [`crate::Tree::with_settings`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Leading part of generated node ids
    pub id_prefix: String,
    /// Length of the random scope fragment in generated ids (0 disables it)
    pub id_scope_len: usize,
    /// Spaces per depth level in the plain-text rendering
    pub indent: usize,
    /// Start trees frozen
    pub readonly: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            id_prefix: DEFAULT_ID_PREFIX.to_string(),
            id_scope_len: DEFAULT_SCOPE_LEN,
            indent: DEFAULT_INDENT,
            readonly: false,
        }
    }
}

/// Raw settings for intermediate parsing (`None` means "not specified").
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub id_prefix: Option<String>,
    pub id_scope_len: Option<usize>,
    pub indent: Option<usize>,
    pub readonly: Option<bool>,
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> TreeResult<RawSettings> {
    let content = std::fs::read_to_string(path).map_err(|e| TreeError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| TreeError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

impl Settings {
    /// Overlay wins where it specifies a value.
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            id_prefix: overlay
                .id_prefix
                .clone()
                .unwrap_or_else(|| self.id_prefix.clone()),
            id_scope_len: overlay.id_scope_len.unwrap_or(self.id_scope_len),
            indent: overlay.indent.unwrap_or(self.indent),
            readonly: overlay.readonly.unwrap_or(self.readonly),
        }
    }

    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `config_file` - Optional TOML file; it must exist when given
    pub fn load(config_file: Option<&Path>) -> TreeResult<Self> {
        let mut current = Self::default();

        if let Some(path) = config_file {
            let raw = load_raw_settings(path)?;
            current = current.merge_with(&raw);
        }

        Self::apply_env_overrides(current)
    }

    /// Apply NTREE_* environment variables as explicit overrides.
    fn apply_env_overrides(mut settings: Self) -> TreeResult<Self> {
        let builder = Config::builder().add_source(
            Environment::with_prefix("NTREE")
                .prefix_separator("_")
                .try_parsing(true),
        );

        let config = builder.build().map_err(config_err)?;

        if let Ok(val) = config.get_string("id_prefix") {
            settings.id_prefix = val;
        }
        if let Ok(val) = config.get_int("id_scope_len") {
            settings.id_scope_len = usize::try_from(val).map_err(|e| TreeError::Config {
                message: format!("NTREE_ID_SCOPE_LEN: {e}"),
            })?;
        }
        if let Ok(val) = config.get_int("indent") {
            settings.indent = usize::try_from(val).map_err(|e| TreeError::Config {
                message: format!("NTREE_INDENT: {e}"),
            })?;
        }
        if let Ok(val) = config.get_bool("readonly") {
            settings.readonly = val;
        }

        Ok(settings)
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> TreeResult<String> {
        toml::to_string_pretty(self).map_err(|e| TreeError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# ntree configuration
#
# Precedence (lowest to highest):
#   compiled defaults, this file, NTREE_* environment variables

# Leading part of generated node ids
# id_prefix = "n"

# Random scope fragment length in generated ids (0 disables it)
# id_scope_len = 8

# Spaces per depth level in the plain-text rendering
# indent = 4

# Start new trees frozen
# readonly = false
"#
        .to_string()
    }
}

fn config_err(e: ConfigError) -> TreeError {
    TreeError::Config {
        message: e.to_string(),
    }
}
