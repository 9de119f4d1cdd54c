//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Wiki endpoint settings, from the `[wiki]` section of config.toml
#[derive(Debug, Clone, Deserialize, Default)]
pub struct WikiConfig {
    /// Base URL of the MediaWiki `api.php` endpoint
    pub api_url: String,
    /// Bot account name (user@botname form)
    #[serde(default)]
    pub username: String,
    /// Bot password
    #[serde(default)]
    pub password: String,
}

/// Top-level configuration file contents
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
    /// Root of the game export tree; CLI and env var take precedence
    #[serde(default)]
    pub root_folder: Option<PathBuf>,
    #[serde(default)]
    pub wiki: WikiConfig,
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&str>, env_var_name: &str) -> Result<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Ok(PathBuf::from(path));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        return Ok(PathBuf::from(path));
    }

    // Priority 3: TOML config file
    if let Ok(settings) = load_settings() {
        if let Some(root) = settings.root_folder {
            return Ok(root);
        }
    }

    // Priority 4: OS-dependent compiled default
    Ok(default_root_folder())
}

/// Load `config.toml` from the platform config directory
pub fn load_settings() -> Result<Settings> {
    let path = config_file_path()?;
    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("invalid config.toml: {}", e)))
}

fn config_file_path() -> Result<PathBuf> {
    let user_config = dirs::config_dir()
        .map(|d| d.join("wikivox").join("config.toml"))
        .ok_or_else(|| Error::Config("could not determine config directory".to_string()))?;
    if user_config.exists() {
        return Ok(user_config);
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/wikivox/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
    }

    Err(Error::Config(format!(
        "config file not found: {}",
        user_config.display()
    )))
}

/// OS-dependent default root folder
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("wikivox"))
        .unwrap_or_else(|| PathBuf::from("/var/lib/wikivox"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_arg_wins() {
        let root = resolve_root_folder(Some("/data/export"), "WIKIVOX_TEST_UNSET").unwrap();
        assert_eq!(root, PathBuf::from("/data/export"));
    }

    #[test]
    fn env_var_beats_default() {
        std::env::set_var("WIKIVOX_TEST_ROOT", "/env/export");
        let root = resolve_root_folder(None, "WIKIVOX_TEST_ROOT").unwrap();
        assert_eq!(root, PathBuf::from("/env/export"));
        std::env::remove_var("WIKIVOX_TEST_ROOT");
    }

    #[test]
    fn settings_parse_wiki_section() {
        let settings: Settings = toml::from_str(
            r#"
            root_folder = "/srv/export"
            [wiki]
            api_url = "https://wiki.example.org/api.php"
            username = "bot@sync"
            password = "secret"
            "#,
        )
        .unwrap();
        assert_eq!(settings.wiki.api_url, "https://wiki.example.org/api.php");
        assert_eq!(settings.root_folder.unwrap(), PathBuf::from("/srv/export"));
    }
}
