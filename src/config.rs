//! CLI configuration file (`spec.md` §6): a single YAML document resolved
//! from `--config <path>`, then `$PASS_CLI_CONFIG`, then
//! `<home>/.pass-cli/config.yml`. Recognized keys: `vault_path`,
//! `keychain_enabled` (informational only — the side-file is authoritative),
//! and `clipboard_timeout` (used only by the clipboard collaborator, not the
//! core).
//!
//! Grounded on the teacher's `config.rs`: env-var-then-default path
//! resolution, a schema-versioned file struct, and atomic persist with a
//! pre-migration backup. Swapped TOML for YAML and generator profiles for
//! the three vault-facing keys `spec.md` names.

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

const CONFIG_ENV: &str = "PASS_CLI_CONFIG";
const APP_DIR: &str = ".pass-cli";
const CONFIG_FILE_NAME: &str = "config.yml";
const CURRENT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug)]
pub enum ConfigError {
    ConfigDirUnavailable,
    Io(std::io::Error),
    Parse(serde_yaml::Error),
    Serialize(serde_yaml::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ConfigDirUnavailable => {
                write!(f, "unable to determine configuration directory")
            }
            ConfigError::Io(err) => write!(f, "filesystem error: {err}"),
            ConfigError::Parse(err) => write!(f, "failed to parse config: {err}"),
            ConfigError::Serialize(err) => write!(f, "failed to serialize config: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(err) => Some(err),
            ConfigError::Parse(err) => Some(err),
            ConfigError::Serialize(err) => Some(err),
            ConfigError::ConfigDirUnavailable => None,
        }
    }
}

/// The on-disk shape. Every key is optional: a key's absence means "use the
/// core's own default" (`vault::default_vault_path`, `keychain_enabled =
/// false`, no clipboard timeout).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileConfig {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keychain_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clipboard_timeout: Option<u64>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            schema_version: Some(CURRENT_SCHEMA_VERSION),
            vault_path: None,
            keychain_enabled: None,
            clipboard_timeout: None,
        }
    }
}

/// Resolve the config file path: explicit `--config` override, then
/// `$PASS_CLI_CONFIG`, then `<home>/.pass-cli/config.yml` (§6).
pub fn config_path(override_path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = override_path {
        return Ok(path.to_path_buf());
    }
    if let Ok(path) = env::var(CONFIG_ENV) {
        return Ok(PathBuf::from(path));
    }
    let mut dir = dirs::home_dir().ok_or(ConfigError::ConfigDirUnavailable)?;
    dir.push(APP_DIR);
    dir.push(CONFIG_FILE_NAME);
    Ok(dir)
}

pub fn load_config(path: &Path) -> Result<FileConfig, ConfigError> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let config: FileConfig = serde_yaml::from_str(&contents).map_err(ConfigError::Parse)?;
            Ok(maybe_upgrade(path, config)?)
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(FileConfig::default()),
        Err(err) => Err(ConfigError::Io(err)),
    }
}

fn persist_config(path: &Path, config: &FileConfig) -> Result<(), ConfigError> {
    let parent = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&parent).map_err(ConfigError::Io)?;

    let yaml = serde_yaml::to_string(config).map_err(ConfigError::Serialize)?;
    let tmp_path = parent.join(format!(
        "{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or(CONFIG_FILE_NAME)
    ));
    fs::write(&tmp_path, yaml.as_bytes()).map_err(ConfigError::Io)?;
    fs::rename(&tmp_path, path).map_err(ConfigError::Io)?;
    Ok(())
}

/// Schema is currently at its first version; this only back-fills a missing
/// `schema_version` (pre-dating the field) and rewrites a backup before
/// doing so, mirroring the teacher's migrate-then-backup discipline for
/// whenever a `CURRENT_SCHEMA_VERSION` bump is needed in the future.
fn maybe_upgrade(path: &Path, mut config: FileConfig) -> Result<FileConfig, ConfigError> {
    if config.schema_version == Some(CURRENT_SCHEMA_VERSION) {
        return Ok(config);
    }
    backup_config(path)?;
    config.schema_version = Some(CURRENT_SCHEMA_VERSION);
    persist_config(path, &config)?;
    Ok(config)
}

fn backup_config(path: &Path) -> Result<(), ConfigError> {
    if !path.exists() {
        return Ok(());
    }
    let parent = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("config");

    let mut backup_path = parent.join(format!("{stem}.backup-{timestamp}.yml"));
    let mut counter = 0u32;
    while backup_path.exists() {
        counter += 1;
        backup_path = parent.join(format!("{stem}.backup-{timestamp}-{counter}.yml"));
    }
    fs::copy(path, backup_path).map_err(ConfigError::Io)?;
    Ok(())
}

/// Effective, fully-resolved configuration for one CLI invocation: the file
/// values layered under the core's own defaults.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub vault_path: Option<PathBuf>,
    pub clipboard_timeout: Option<u64>,
}

pub fn resolve(override_path: Option<&Path>) -> Result<ResolvedConfig, ConfigError> {
    let path = config_path(override_path)?;
    let file = load_config(&path)?;
    Ok(ResolvedConfig {
        vault_path: file.vault_path.map(PathBuf::from),
        clipboard_timeout: file.clipboard_timeout,
    })
}
