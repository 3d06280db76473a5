//! Persistent CLI configuration with environment overrides.

use std::env;
use std::path::{Path, PathBuf};

use nestlog_core::util::normalize_text_option;
use nestlog_core::{EngineConfig, RemoteConfig};
use serde::{Deserialize, Serialize};

use crate::error::CliError;

const CONFIG_FILE_NAME: &str = "config.json";

pub const ENV_SUPABASE_URL: &str = "NESTLOG_SUPABASE_URL";
pub const ENV_SUPABASE_ANON_KEY: &str = "NESTLOG_SUPABASE_ANON_KEY";
pub const ENV_ACCESS_TOKEN: &str = "NESTLOG_ACCESS_TOKEN";
pub const ENV_USER_ID: &str = "NESTLOG_USER_ID";
pub const ENV_DB_PATH: &str = "NESTLOG_DB_PATH";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default)]
    pub engine: EngineConfig,
    /// Only ever read from the environment
    #[serde(skip)]
    pub access_token: Option<String>,
}

const fn default_config_version() -> u32 {
    1
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("nestlog").join(CONFIG_FILE_NAME))
}

impl CliConfig {
    /// Load the config file (if any) and overlay environment variables.
    pub fn load() -> Result<Self, CliError> {
        let mut config = match default_config_path() {
            Some(path) => Self::load_from_path(&path)?,
            None => Self::default(),
        };
        config.apply_env(|name| env::var(name).ok());
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, CliError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|error| {
            CliError::Config(format!(
                "Failed to read config at {}: {}",
                path.display(),
                error
            ))
        })?;
        let mut config = serde_json::from_str::<Self>(&raw).map_err(|error| {
            CliError::Config(format!(
                "Failed to parse config at {}: {}",
                path.display(),
                error
            ))
        })?;
        config.normalize();
        Ok(config)
    }

    /// Environment values win over the file; blank values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| normalize_text_option(lookup(name));

        if let Some(url) = read(ENV_SUPABASE_URL) {
            self.remote.supabase_url = Some(url);
        }
        if let Some(anon_key) = read(ENV_SUPABASE_ANON_KEY) {
            self.remote.supabase_anon_key = Some(anon_key);
        }
        if let Some(token) = read(ENV_ACCESS_TOKEN) {
            self.access_token = Some(token);
        }
        if let Some(user_id) = read(ENV_USER_ID) {
            self.user_id = Some(user_id);
        }
        if let Some(db_path) = read(ENV_DB_PATH) {
            self.db_path = Some(PathBuf::from(db_path));
        }
    }

    fn normalize(&mut self) {
        self.remote.supabase_url = normalize_text_option(self.remote.supabase_url.take());
        self.remote.supabase_anon_key =
            normalize_text_option(self.remote.supabase_anon_key.take());
        self.user_id = normalize_text_option(self.user_id.take());
    }
}
