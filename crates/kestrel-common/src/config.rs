//! Configuration types for Kestrel
//!
//! Both binaries read a TOML file into [`Config`]. Every field has a
//! default so a missing file, or a file that only sets a few keys, still
//! yields a usable configuration. Command line flags are merged on top by
//! the binaries.

use crate::error::{Error, Result};
use crate::types::MAX_ACCOUNT_NAME_LENGTH;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Proxy configuration
    #[serde(default)]
    pub proxy: ProxyConfig,
    /// Extended attribute metadata configuration
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::configuration(e.to_string()))
    }

    /// Load configuration from a file, falling back to defaults when the
    /// file does not exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

/// Account proxy configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Address the HTTP API listens on
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Base URL of the account server
    #[serde(default = "default_account_server")]
    pub account_server: String,
    /// Timeout for a single backend request (milliseconds)
    #[serde(default = "default_backend_timeout_ms")]
    pub backend_timeout_ms: u64,
    /// Allow PUT and DELETE on accounts; turning it off makes the
    /// account tier read-only through this proxy
    #[serde(default = "default_allow_account_management")]
    pub allow_account_management: bool,
    /// Answer GET/HEAD for missing accounts with an empty account
    #[serde(default)]
    pub account_autocreate: bool,
    /// Longest account name accepted
    #[serde(default = "default_max_account_name_length")]
    pub max_account_name_length: usize,
    /// Accounts the authorization hook refuses
    #[serde(default)]
    pub denied_accounts: Vec<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            account_server: default_account_server(),
            backend_timeout_ms: default_backend_timeout_ms(),
            allow_account_management: default_allow_account_management(),
            account_autocreate: false,
            max_account_name_length: default_max_account_name_length(),
            denied_accounts: Vec::new(),
        }
    }
}

/// Extended attribute metadata configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Attribute holding the serialized metadata (first chunk)
    #[serde(default = "default_metadata_key")]
    pub metadata_key: String,
    /// Largest value written to a single attribute chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Probe-then-read attempts before giving up on a growing value
    #[serde(default = "default_max_read_attempts")]
    pub max_read_attempts: u32,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            metadata_key: default_metadata_key(),
            chunk_size: default_chunk_size(),
            max_read_attempts: default_max_read_attempts(),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_account_server() -> String {
    "http://127.0.0.1:6012".to_string()
}

const fn default_backend_timeout_ms() -> u64 {
    10_000
}

const fn default_allow_account_management() -> bool {
    true
}

const fn default_max_account_name_length() -> usize {
    MAX_ACCOUNT_NAME_LENGTH
}

fn default_metadata_key() -> String {
    "user.kestrel.metadata".to_string()
}

const fn default_chunk_size() -> usize {
    254
}

const fn default_max_read_attempts() -> u32 {
    3
}

fn default_log_level() -> String {
    "info".to_string()
}
