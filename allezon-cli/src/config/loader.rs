use super::types::AllezonConfig;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use toml::{Table, Value};

/// Overrides the project config directory (useful for isolated tests)
pub const PROJECT_CONFIG_DIR_ENV: &str = "ALLEZON_PROJECT_CONFIG_DIR";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project)
    pub fn load() -> Result<AllezonConfig> {
        let layers = Self::user_config_path()
            .into_iter()
            .chain(std::iter::once(Self::project_config_path()));
        Self::load_layers(layers)
    }

    /// Merge every existing file in order; later files override earlier ones key by key
    pub fn load_layers(paths: impl IntoIterator<Item = PathBuf>) -> Result<AllezonConfig> {
        let mut merged = Table::new();
        for path in paths {
            if path.exists() {
                merge_tables(&mut merged, Self::read_table(&path)?);
            }
        }

        Value::Table(merged)
            .try_into()
            .context("Invalid allezon configuration")
    }

    /// Get user config path (platform-specific)
    pub fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "allezon").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get project config path
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var(PROJECT_CONFIG_DIR_ENV) {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".allezon/config.toml")
        }
    }

    fn read_table(path: &Path) -> Result<Table> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

/// Deep merge: nested tables merge recursively, any other overlay value replaces the base
fn merge_tables(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Table(existing)), Value::Table(incoming)) => {
                merge_tables(existing, incoming)
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
