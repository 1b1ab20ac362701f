use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

pub const CONFIG_FILE: &str = "tierlist.toml";
pub const DEFAULT_DOCUMENT_PATH: &str = "tierlist";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("databaseURL is not set")]
    MissingDatabaseUrl,
    #[error("databaseURL '{0}' must start with http:// or https://")]
    InvalidDatabaseUrl(String),
}

/// Connection options for the shared document store. Field names follow the
/// hosted realtime-database client options so existing config files load
/// unchanged; only `databaseURL` and `documentPath` affect behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteConfig {
    pub api_key: Option<String>,
    pub auth_domain: Option<String>,
    #[serde(rename = "databaseURL", alias = "databaseUrl")]
    pub database_url: Option<String>,
    pub project_id: Option<String>,
    pub storage_bucket: Option<String>,
    pub messaging_sender_id: Option<String>,
    pub app_id: Option<String>,
    pub document_path: Option<String>,
}

impl RemoteConfig {
    pub fn database_url(&self) -> Result<Url, ConfigError> {
        let raw = self
            .database_url
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .ok_or(ConfigError::MissingDatabaseUrl)?;
        let url = Url::parse(raw).map_err(|_| ConfigError::InvalidDatabaseUrl(raw.to_string()))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            _ => Err(ConfigError::InvalidDatabaseUrl(raw.to_string())),
        }
    }

    pub fn document_path(&self) -> &str {
        self.document_path
            .as_deref()
            .map(|path| path.trim_matches('/'))
            .filter(|path| !path.is_empty())
            .unwrap_or(DEFAULT_DOCUMENT_PATH)
    }

    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// `TIERLIST_*` variables override the file, `APP__*` override both.
    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        let fields: [(&str, &mut Option<String>); 8] = [
            ("API_KEY", &mut self.api_key),
            ("AUTH_DOMAIN", &mut self.auth_domain),
            ("DATABASE_URL", &mut self.database_url),
            ("PROJECT_ID", &mut self.project_id),
            ("STORAGE_BUCKET", &mut self.storage_bucket),
            ("MESSAGING_SENDER_ID", &mut self.messaging_sender_id),
            ("APP_ID", &mut self.app_id),
            ("DOCUMENT_PATH", &mut self.document_path),
        ];
        for (suffix, field) in fields {
            for prefix in ["TIERLIST_", "APP__"] {
                if let Some(value) = env(&format!("{prefix}{suffix}")) {
                    *field = Some(value);
                }
            }
        }
    }
}

/// Reads `path`, or [`CONFIG_FILE`] when none is given, then applies the
/// environment. Only an explicitly named file has to exist.
pub fn load_remote_config(path: Option<&Path>) -> Result<RemoteConfig, ConfigError> {
    let (file, required) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(CONFIG_FILE), false),
    };

    let mut config = match fs::read_to_string(&file) {
        Ok(raw) => RemoteConfig::from_toml(&raw).map_err(|source| ConfigError::Parse {
            path: file.clone(),
            source,
        })?,
        Err(source) if required || source.kind() != std::io::ErrorKind::NotFound => {
            return Err(ConfigError::Read { path: file, source });
        }
        Err(_) => {
            debug!(file = %file.display(), "no config file; using environment only");
            RemoteConfig::default()
        }
    };

    config.apply_env(|key| std::env::var(key).ok());
    Ok(config)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
