use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::Deserialize;

use crate::auth::HashParams;
use crate::error::{Error, Result};
use crate::oauth::OAuthEndpoints;

/// Bearer tokens default to outliving any realistic deployment.
pub const DEFAULT_KEY_LIFETIME_DAYS: i64 = 99 * 365;

/// Upper bound on a configured lifetime, keeping every expiry well inside
/// chrono's representable range.
pub const MAX_KEY_LIFETIME_DAYS: i64 = 1000 * 365;

/// Converts a configured lifetime in days, rejecting values outside
/// `1..=MAX_KEY_LIFETIME_DAYS`.
pub fn key_lifetime_from_days(days: i64) -> Result<Duration> {
    if !(1..=MAX_KEY_LIFETIME_DAYS).contains(&days) {
        return Err(Error::Config(format!(
            "key_lifetime_days must be between 1 and {MAX_KEY_LIFETIME_DAYS}, got {days}"
        )));
    }
    Ok(Duration::days(days))
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub oauth: OAuthEndpoints,
    pub hashing: HashParams,
    /// How long an issued bearer stays valid.
    pub key_lifetime: Duration,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("headb.db")
    }

    #[must_use]
    pub fn config_path(data_dir: &Path) -> PathBuf {
        data_dir.join("headb.toml")
    }

    /// Overlays every value present in `file` onto this config.
    pub fn apply(&mut self, file: FileConfig) -> Result<()> {
        if let Some(host) = file.host {
            self.host = host;
        }
        if let Some(port) = file.port {
            self.port = port;
        }
        if let Some(url) = file.device_code_url {
            self.oauth.device_code_url = url;
        }
        if let Some(url) = file.access_token_url {
            self.oauth.access_token_url = url;
        }
        if let Some(url) = file.identity_url {
            self.oauth.identity_url = url;
        }
        if let Some(hashing) = file.hashing {
            self.hashing = hashing;
        }
        if let Some(days) = file.key_lifetime_days {
            self.key_lifetime = key_lifetime_from_days(days)?;
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            oauth: OAuthEndpoints::github(),
            hashing: HashParams::default(),
            key_lifetime: Duration::days(DEFAULT_KEY_LIFETIME_DAYS),
        }
    }
}

/// Optional `headb.toml` overrides. Every field may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub device_code_url: Option<String>,
    pub access_token_url: Option<String>,
    pub identity_url: Option<String>,
    pub hashing: Option<HashParams>,
    pub key_lifetime_days: Option<i64>,
}

impl FileConfig {
    pub fn parse(contents: &str) -> Result<Self> {
        let config: FileConfig =
            toml::from_str(contents).map_err(|e| Error::Config(format!("invalid config file: {e}")))?;

        if let Some(days) = config.key_lifetime_days {
            key_lifetime_from_days(days)?;
        }

        Ok(config)
    }

    /// Reads the file if it exists; a missing file yields the empty config.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::parse(&std::fs::read_to_string(path)?)
    }
}
