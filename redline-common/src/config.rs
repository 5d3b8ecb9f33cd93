//! Configuration loading and data directory resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming the data directory
pub const DATA_DIR_ENV: &str = "REDLINE_DATA_DIR";

/// TOML configuration file contents (`~/.config/redline/config.toml`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedlineConfig {
    /// Data directory holding the database
    pub data_dir: Option<PathBuf>,
    /// Extra schema definitions merged over the built-in sector schemas
    pub schema_file: Option<PathBuf>,
}

/// Load the TOML config file for the platform
pub fn load_config() -> Result<RedlineConfig> {
    let path = config_file_path()?;
    let text = std::fs::read_to_string(&path)?;
    toml::from_str(&text)
        .map_err(|e| Error::Config(format!("Invalid config file {}: {}", path.display(), e)))
}

fn config_file_path() -> Result<PathBuf> {
    let path = dirs::config_dir()
        .map(|d| d.join("redline").join("config.toml"))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;
    if path.exists() {
        Ok(path)
    } else {
        Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        )))
    }
}

/// Data directory resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. `REDLINE_DATA_DIR` environment variable
/// 3. TOML config file `data_dir` key
/// 4. OS-dependent default (fallback)
pub fn resolve_data_dir(cli_arg: Option<&Path>) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(DATA_DIR_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Ok(config) = load_config() {
        if let Some(path) = config.data_dir {
            return path;
        }
    }

    // Priority 4: OS-dependent default
    default_data_dir()
}

/// OS-dependent default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("redline"))
        .unwrap_or_else(|| PathBuf::from("./redline_data"))
}

/// Database file path inside the data directory
pub fn database_path(data_dir: &Path) -> PathBuf {
    data_dir.join("redline.db")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_cli_argument_wins_over_environment() {
        std::env::set_var(DATA_DIR_ENV, "/tmp/redline-env");
        let resolved = resolve_data_dir(Some(Path::new("/tmp/redline-cli")));
        std::env::remove_var(DATA_DIR_ENV);
        assert_eq!(resolved, PathBuf::from("/tmp/redline-cli"));
    }

    #[test]
    #[serial]
    fn test_environment_wins_when_no_cli_argument() {
        std::env::set_var(DATA_DIR_ENV, "/tmp/redline-env");
        let resolved = resolve_data_dir(None);
        std::env::remove_var(DATA_DIR_ENV);
        assert_eq!(resolved, PathBuf::from("/tmp/redline-env"));
    }

    #[test]
    #[serial]
    fn test_blank_environment_value_is_ignored() {
        std::env::set_var(DATA_DIR_ENV, "  ");
        let resolved = resolve_data_dir(None);
        std::env::remove_var(DATA_DIR_ENV);
        assert_ne!(resolved, PathBuf::from("  "));
    }

    #[test]
    fn test_default_data_dir_ends_with_redline() {
        let default = default_data_dir();
        assert!(default.ends_with("redline") || default.ends_with("redline_data"));
    }

    #[test]
    fn test_database_path_joins_data_dir() {
        let path = database_path(Path::new("/var/lib/redline"));
        assert_eq!(path, PathBuf::from("/var/lib/redline/redline.db"));
    }

    #[test]
    fn test_config_parses_optional_keys() {
        let config: RedlineConfig =
            toml::from_str("data_dir = \"/srv/redline\"\n").expect("valid toml");
        assert_eq!(config.data_dir, Some(PathBuf::from("/srv/redline")));
        assert!(config.schema_file.is_none());

        let empty: RedlineConfig = toml::from_str("").expect("valid toml");
        assert!(empty.data_dir.is_none());
    }
}
