//! CLI configuration.
//!
//! Optional JSON file at `~/.config/floe/config.json` (`%APPDATA%\floe\config.json`
//! on Windows). Every field may be omitted; command-line flags win over the
//! file.

use std::path::{Path, PathBuf};

use floe_transfer::DEFAULT_PART_SIZE;
use floe_vault::DEFAULT_ACCOUNT_ID;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    account_id: Option<String>,
    #[serde(default)]
    part_size: Option<u64>,
    #[serde(default)]
    jobs: Option<usize>,
    #[serde(default)]
    vault_root: Option<PathBuf>,
}

/// Effective settings for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloeConfig {
    pub account_id: String,
    pub part_size: u64,
    /// Parts transferred concurrently.
    pub jobs: usize,
    /// Directory served by the local vault.
    pub vault_root: PathBuf,
}

impl Default for FloeConfig {
    fn default() -> Self {
        Self {
            account_id: DEFAULT_ACCOUNT_ID.to_string(),
            part_size: DEFAULT_PART_SIZE,
            jobs: default_jobs(),
            vault_root: config_base_dir().join("floe").join("vault"),
        }
    }
}

fn default_jobs() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

impl FloeConfig {
    /// Loads the user's config file, falling back to defaults when it is
    /// missing or unreadable.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let mut config = FloeConfig::default();
        if !path.exists() {
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        match serde_json::from_str::<ConfigFile>(&content) {
            Ok(file) => {
                if let Some(account_id) = file.account_id.filter(|s| !s.is_empty()) {
                    config.account_id = account_id;
                }
                if let Some(part_size) = file.part_size {
                    config.part_size = part_size;
                }
                if let Some(jobs) = file.jobs {
                    config.jobs = jobs;
                }
                if let Some(vault_root) = file.vault_root {
                    config.vault_root = vault_root;
                }
                tracing::debug!(path = %path.display(), "configuration loaded");
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config, using defaults"
                );
            }
        }
        Ok(config)
    }
}

fn config_path() -> PathBuf {
    config_base_dir().join("floe").join("config.json")
}

fn config_base_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home).join(".config")
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata)
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        PathBuf::from("/tmp")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = FloeConfig::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, FloeConfig::default());
        assert_eq!(config.account_id, "-");
        assert_eq!(config.part_size, 1024 * 1024);
    }

    #[test]
    fn partial_file_overrides_given_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"part_size": 8388608, "vault_root": "/srv/vault"}"#).unwrap();

        let config = FloeConfig::load_from(&path).unwrap();
        assert_eq!(config.part_size, 8 * 1024 * 1024);
        assert_eq!(config.vault_root, PathBuf::from("/srv/vault"));
        assert_eq!(config.account_id, "-");
        assert_eq!(config.jobs, default_jobs());
    }

    #[test]
    fn unparseable_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let config = FloeConfig::load_from(&path).unwrap();
        assert_eq!(config, FloeConfig::default());
    }
}
