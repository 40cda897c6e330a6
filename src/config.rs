use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Policy for deleting the auto-provisioned system account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeletionPolicy {
    /// The system account is deletable like any other admin, as long as
    /// another admin remains.
    #[default]
    AnyAdminRemains,
    /// The system account is never deletable.
    ProtectSystemUser,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub deletion_policy: DeletionPolicy,
}

impl AppConfig {
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("register.db")
    }

    /// Loads `regbook.toml` from the data directory if present, otherwise
    /// returns defaults with `data_dir` applied.
    pub fn load(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir: PathBuf = data_dir.into();
        let config_path = data_dir.join("regbook.toml");

        if !config_path.exists() {
            return Ok(Self {
                data_dir,
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)?;
        let mut config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", config_path.display())))?;
        config.data_dir = data_dir;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("serialize config: {e}")))?;
        fs::write(path, content)?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            deletion_policy: DeletionPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_when_missing() {
        let temp = TempDir::new().unwrap();
        let config = AppConfig::load(temp.path()).unwrap();
        assert_eq!(config.data_dir, temp.path());
        assert_eq!(config.deletion_policy, DeletionPolicy::AnyAdminRemains);
    }

    #[test]
    fn test_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let config = AppConfig {
            data_dir: temp.path().to_path_buf(),
            deletion_policy: DeletionPolicy::ProtectSystemUser,
        };
        config.save(&temp.path().join("regbook.toml")).unwrap();

        let loaded = AppConfig::load(temp.path()).unwrap();
        assert_eq!(loaded.deletion_policy, DeletionPolicy::ProtectSystemUser);
    }

    #[test]
    fn test_db_path() {
        let config = AppConfig::default();
        assert!(config.db_path().ends_with("register.db"));
    }
}
