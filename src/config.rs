//! Transcription service configuration.
//!
//! Loaded once from `<vault>/.nota/transcribe.json` at startup and treated
//! as immutable afterwards. Paths with a leading `~` expand to the user's
//! home directory at load time.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::vault::{self, VAULT_MARKER_DIR};

/// Name of the transcription config file within `.nota`.
pub const CONFIG_FILE_NAME: &str = "transcribe.json";

/// Defaults for optional configuration fields.
pub const DEFAULT_ARCHIVE_DIR: &str = "~/.nota/archive/audio";
pub const DEFAULT_STABILIZATION_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_STABILIZATION_CHECKS: u32 = 3;
pub const DEFAULT_LANGUAGE: &str = "auto";
pub const DEFAULT_MODEL: &str = "base";
pub const DEFAULT_MAX_FILE_SIZE_MB: u64 = 100;
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// Default file patterns to watch.
pub fn default_watch_patterns() -> Vec<String> {
    vec!["*.m4a".to_string(), "*.mp3".to_string(), "*.wav".to_string()]
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("watch_dir is required")]
    WatchDirRequired,

    #[error("api_url is required")]
    ApiUrlRequired,

    #[error("output_dir is required")]
    OutputDirRequired,

    #[error("vault error: {0}")]
    Vault(#[from] vault::VaultError),

    #[error("read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Transcription service configuration as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub watch_dir: String,

    #[serde(default)]
    pub api_url: String,

    #[serde(default)]
    pub output_dir: String,

    #[serde(default)]
    pub template_path: Option<String>,

    #[serde(default)]
    pub archive_dir: String,

    #[serde(default)]
    pub watch_patterns: Vec<String>,

    #[serde(default)]
    pub stabilization_interval_ms: u64,

    #[serde(default)]
    pub stabilization_checks: u32,

    #[serde(default)]
    pub language: String,

    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub max_file_size_mb: u64,

    #[serde(default)]
    pub retry_count: u32,
}

impl Default for Config {
    fn default() -> Self {
        let mut cfg = Self {
            watch_dir: String::new(),
            api_url: String::new(),
            output_dir: String::new(),
            template_path: None,
            archive_dir: String::new(),
            watch_patterns: Vec::new(),
            stabilization_interval_ms: 0,
            stabilization_checks: 0,
            language: String::new(),
            model: String::new(),
            max_file_size_mb: 0,
            retry_count: 0,
        };
        cfg.apply_defaults();
        cfg
    }
}

impl Config {
    /// Load the config from the vault containing the current directory
    /// (or the one named by `NOTA_VAULT_ROOT`).
    pub fn load() -> Result<Self, ConfigError> {
        let vault_root = vault::find_vault_root()?;
        Self::load_from_vault(&vault_root)
    }

    /// Load the config from a specific vault root.
    pub fn load_from_vault(vault_root: &Path) -> Result<Self, ConfigError> {
        let config_path = vault_root.join(VAULT_MARKER_DIR).join(CONFIG_FILE_NAME);
        let data = std::fs::read(&config_path)?;
        let mut cfg: Config = serde_json::from_slice(&data)?;
        cfg.expand_paths();
        Ok(cfg)
    }

    /// Write the config to a specific vault root with 0644 permissions.
    pub fn save_to_vault(&self, vault_root: &Path) -> Result<(), ConfigError> {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;

        let config_path = vault_root.join(VAULT_MARKER_DIR).join(CONFIG_FILE_NAME);
        let data = serde_json::to_vec_pretty(self)?;

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o644)
            .open(&config_path)?;
        file.write_all(&data)?;
        Ok(())
    }

    /// Check that all required fields are present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watch_dir.is_empty() {
            return Err(ConfigError::WatchDirRequired);
        }
        if self.api_url.is_empty() {
            return Err(ConfigError::ApiUrlRequired);
        }
        if self.output_dir.is_empty() {
            return Err(ConfigError::OutputDirRequired);
        }
        Ok(())
    }

    /// Fill in defaults for optional fields that are empty or zero.
    pub fn apply_defaults(&mut self) {
        if self.archive_dir.is_empty() {
            self.archive_dir = DEFAULT_ARCHIVE_DIR.to_string();
        }
        if self.watch_patterns.is_empty() {
            self.watch_patterns = default_watch_patterns();
        }
        if self.stabilization_interval_ms == 0 {
            self.stabilization_interval_ms = DEFAULT_STABILIZATION_INTERVAL_MS;
        }
        if self.stabilization_checks == 0 {
            self.stabilization_checks = DEFAULT_STABILIZATION_CHECKS;
        }
        if self.language.is_empty() {
            self.language = DEFAULT_LANGUAGE.to_string();
        }
        if self.model.is_empty() {
            self.model = DEFAULT_MODEL.to_string();
        }
        if self.max_file_size_mb == 0 {
            self.max_file_size_mb = DEFAULT_MAX_FILE_SIZE_MB;
        }
        if self.retry_count == 0 {
            self.retry_count = DEFAULT_RETRY_COUNT;
        }
    }

    /// Maximum accepted file size in bytes.
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }

    fn expand_paths(&mut self) {
        self.watch_dir = expand_tilde(&self.watch_dir);
        self.output_dir = expand_tilde(&self.output_dir);
        self.archive_dir = expand_tilde(&self.archive_dir);
        if let Some(template) = &self.template_path {
            self.template_path = Some(expand_tilde(template));
        }
    }
}

/// Expand a leading `~` or `~/` to the user's home directory. A `~`
/// anywhere else in the path is left alone.
pub fn expand_tilde(path: &str) -> String {
    if path.is_empty() {
        return path.to_string();
    }

    let home = match dirs::home_dir() {
        Some(h) => h,
        None => return path.to_string(),
    };

    if path == "~" {
        return home.to_string_lossy().into_owned();
    }
    if let Some(rest) = path.strip_prefix("~/") {
        return home.join(rest).to_string_lossy().into_owned();
    }
    path.to_string()
}

/// Path to the config file for a given vault root.
pub fn config_path(vault_root: &Path) -> PathBuf {
    vault_root.join(VAULT_MARKER_DIR).join(CONFIG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_vault(root: &Path) {
        let marker = root.join(VAULT_MARKER_DIR);
        std::fs::create_dir_all(&marker).unwrap();
        std::fs::write(marker.join("vault.json"), b"{}").unwrap();
    }

    #[test]
    fn defaults_fill_optional_fields() {
        let mut cfg = Config {
            watch_dir: "/w".to_string(),
            api_url: "http://localhost:9000".to_string(),
            output_dir: "/o".to_string(),
            ..Config::default()
        };
        cfg.apply_defaults();

        assert_eq!(cfg.archive_dir, DEFAULT_ARCHIVE_DIR);
        assert_eq!(cfg.watch_patterns, default_watch_patterns());
        assert_eq!(cfg.stabilization_interval_ms, 2000);
        assert_eq!(cfg.stabilization_checks, 3);
        assert_eq!(cfg.language, "auto");
        assert_eq!(cfg.model, "base");
        assert_eq!(cfg.max_file_size_mb, 100);
        assert_eq!(cfg.retry_count, 3);
    }

    #[test]
    fn validate_requires_watch_api_output() {
        let cfg = Config {
            watch_dir: String::new(),
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::WatchDirRequired)));

        let cfg = Config {
            watch_dir: "/w".to_string(),
            api_url: String::new(),
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::ApiUrlRequired)));

        let cfg = Config {
            watch_dir: "/w".to_string(),
            api_url: "http://localhost".to_string(),
            output_dir: String::new(),
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::OutputDirRequired)));

        let cfg = Config {
            watch_dir: "/w".to_string(),
            api_url: "http://localhost".to_string(),
            output_dir: "/o".to_string(),
            ..Config::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn save_then_load_round_trips() {
        let temp = TempDir::new().unwrap();
        make_vault(temp.path());

        let cfg = Config {
            watch_dir: "/sync/voice".to_string(),
            api_url: "http://localhost:9000".to_string(),
            output_dir: "/vault/inbox".to_string(),
            template_path: Some("/vault/templates/voice.md".to_string()),
            ..Config::default()
        };
        cfg.save_to_vault(temp.path()).unwrap();

        let loaded = Config::load_from_vault(temp.path()).unwrap();
        assert_eq!(loaded.watch_dir, cfg.watch_dir);
        assert_eq!(loaded.api_url, cfg.api_url);
        assert_eq!(loaded.output_dir, cfg.output_dir);
        assert_eq!(loaded.template_path, cfg.template_path);
        assert_eq!(loaded.retry_count, cfg.retry_count);
    }

    #[test]
    fn load_expands_tilde_paths() {
        let temp = TempDir::new().unwrap();
        make_vault(temp.path());

        let cfg = Config {
            watch_dir: "~/sync/voice".to_string(),
            api_url: "http://localhost:9000".to_string(),
            output_dir: "/vault/inbox".to_string(),
            ..Config::default()
        };
        cfg.save_to_vault(temp.path()).unwrap();

        let loaded = Config::load_from_vault(temp.path()).unwrap();
        let home = dirs::home_dir().unwrap();
        assert_eq!(loaded.watch_dir, home.join("sync/voice").to_string_lossy());
        // Default archive dir expands too.
        assert!(!loaded.archive_dir.starts_with('~'));
    }

    #[test]
    fn mid_path_tilde_does_not_expand() {
        assert_eq!(expand_tilde("/data/~backup"), "/data/~backup");
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        make_vault(temp.path());
        assert!(matches!(
            Config::load_from_vault(temp.path()),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn invalid_json_is_an_error() {
        let temp = TempDir::new().unwrap();
        make_vault(temp.path());
        std::fs::write(config_path(temp.path()), b"{not json").unwrap();
        assert!(matches!(
            Config::load_from_vault(temp.path()),
            Err(ConfigError::Parse(_))
        ));
    }
}
