use anyhow::{Context, Result};
use chrono::Duration;
use chrono_tz::Tz;
use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_BIND_ADDRESS: &str = "TAQVIM_BIND_ADDRESS";
pub const ENV_STATE_DIR: &str = "TAQVIM_STATE_DIR";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub interpreter: InterpreterConfig,
    #[serde(default)]
    pub drafts: DraftsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    /// CORS allows any origin when unset.
    pub allowed_origin: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3000".to_string(),
            allowed_origin: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    pub default_timezone: Tz,
    pub statistical_detection: bool,
    pub max_prompt_chars: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            default_timezone: chrono_tz::Asia::Tashkent,
            statistical_detection: true,
            max_prompt_chars: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DraftsConfig {
    pub ttl_hours: i64,
    pub sweep_interval_secs: u64,
}

impl Default for DraftsConfig {
    fn default() -> Self {
        Self {
            ttl_hours: 24,
            sweep_interval_secs: 3600,
        }
    }
}

impl DraftsConfig {
    pub fn ttl(&self) -> Duration {
        Duration::hours(self.ttl_hours)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub state_dir: Option<PathBuf>,
    pub persist: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: None,
            persist: true,
        }
    }
}

impl StorageConfig {
    /// Where `state.json` lives, or `None` when state is kept in memory only.
    pub fn resolved_state_dir(&self) -> Option<PathBuf> {
        if !self.persist {
            return None;
        }
        self.state_dir
            .clone()
            .or_else(|| dirs::home_dir().map(|home| home.join(".taqvim")))
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = get_config_path()?;
        Self::load_from(&config_path)
    }

    /// Read `path`, writing the defaults there first if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let default_config = Config::default();
            default_config.save_to(path)?;
            debug!("Wrote default configuration to {}", path.display());
            return Ok(default_config);
        }

        let content = fs::read_to_string(path).context("Failed to read config file")?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Apply `TAQVIM_*` variables on top of the file values. Call after
    /// `dotenvy::dotenv()` so `.env` entries are seen too.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(address) = env::var(ENV_BIND_ADDRESS) {
            if address.trim().is_empty() {
                warn!("{} is set but empty, keeping {}", ENV_BIND_ADDRESS, self.server.bind_address);
            } else {
                self.server.bind_address = address;
            }
        }
        if let Ok(dir) = env::var(ENV_STATE_DIR) {
            if !dir.trim().is_empty() {
                self.storage.state_dir = Some(PathBuf::from(dir));
            }
        }
    }
}

fn get_config_path() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("uz", "taqvim", "taqvim")
        .context("Failed to determine config directory")?;

    Ok(proj_dirs.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server.bind_address, "127.0.0.1:3000");
        assert_eq!(config.interpreter.default_timezone, chrono_tz::Asia::Tashkent);
        assert_eq!(config.drafts.ttl(), Duration::hours(24));
        assert!(config.storage.persist);
    }

    #[test]
    fn test_config_save_load() -> Result<()> {
        let temp_dir = tempdir()?;
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.interpreter.default_timezone = chrono_tz::Europe::Moscow;
        config.drafts.ttl_hours = 2;
        config.save_to(&config_path)?;

        let loaded = Config::load_from(&config_path)?;
        assert_eq!(loaded, config);
        Ok(())
    }

    #[test]
    fn test_missing_file_is_created_with_defaults() -> Result<()> {
        let temp_dir = tempdir()?;
        let config_path = temp_dir.path().join("config.toml");

        let loaded = Config::load_from(&config_path)?;
        assert_eq!(loaded, Config::default());
        assert!(config_path.exists());
        Ok(())
    }

    #[test]
    fn test_partial_file_fills_in_defaults() -> Result<()> {
        let temp_dir = tempdir()?;
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "[drafts]\nttl_hours = 6\n")?;

        let loaded = Config::load_from(&config_path)?;
        assert_eq!(loaded.drafts.ttl_hours, 6);
        assert_eq!(loaded.drafts.sweep_interval_secs, 3600);
        assert_eq!(loaded.server, ServerConfig::default());
        Ok(())
    }

    #[test]
    fn test_in_memory_storage_has_no_state_dir() {
        let storage = StorageConfig {
            state_dir: Some(PathBuf::from("/tmp/taqvim")),
            persist: false,
        };
        assert_eq!(storage.resolved_state_dir(), None);
    }
}
