//! Configuration for the sanpoll binary.
//!
//! TOML profiles (one `[arrays.<name>]` block per array console),
//! environment overrides, and credential resolution. The output is a
//! fully resolved `sanpoll_core::ArrayConfig` — core never reads files
//! or the environment itself.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use sanpoll_core::{ArrayConfig, Credentials, Vendor};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field} for array '{array}': {reason}")]
    Validation {
        array: String,
        field: String,
        reason: String,
    },

    #[error("no credentials configured for array '{array}'")]
    NoCredentials { array: String },

    #[error("no array named '{name}' in the configuration")]
    UnknownArray { name: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Where per-array session files live. Defaults to the platform
    /// data directory.
    pub session_dir: Option<PathBuf>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named array profiles.
    #[serde(default)]
    pub arrays: HashMap<String, ArrayProfile>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_timeout")]
    pub call_timeout_secs: u64,

    #[serde(default = "default_pre_login_delay")]
    pub pre_login_delay_ms: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            call_timeout_secs: default_timeout(),
            pre_login_delay_ms: default_pre_login_delay(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}
fn default_pre_login_delay() -> u64 {
    1000
}

/// One array console.
#[derive(Debug, Deserialize, Serialize)]
pub struct ArrayProfile {
    /// Vendor family: "huawei", "dell", or "ibm_v7000".
    pub vendor: String,

    /// Console base URL (e.g. "https://10.3.20.34:8088").
    pub url: String,

    /// WebSocket endpoint override for async consoles.
    pub ws_url: Option<String>,

    /// Username; `SANPOLL_<NAME>_USERNAME` overrides.
    pub username: Option<String>,

    /// Password (plaintext — prefer `SANPOLL_<NAME>_PASSWORD`).
    pub password: Option<String>,

    /// Vendor enum table (JSON file).
    pub enum_table: Option<PathBuf>,

    /// Session file override; default `{session_dir}/{name}.session`.
    pub session_file: Option<PathBuf>,

    pub timeout_secs: Option<u64>,
    pub call_timeout_secs: Option<u64>,
    pub pre_login_delay_ms: Option<u64>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "sanpoll", "sanpoll").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("sanpoll.toml");
            p
        },
        |dirs| dirs.config_dir().join("sanpoll.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("sanpoll");
    p
}

fn default_session_dir() -> PathBuf {
    ProjectDirs::from("io", "sanpoll", "sanpoll").map_or_else(
        || PathBuf::from("sessions"),
        |dirs| dirs.data_local_dir().join("sessions"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the configuration from the default path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the configuration from an explicit path + environment.
pub fn load_config_from(path: &std::path::Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("SANPOLL_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Credential resolution ───────────────────────────────────────────

fn env_key(array: &str, field: &str) -> String {
    let array = array.to_uppercase().replace('-', "_");
    format!("SANPOLL_{array}_{field}")
}

/// Resolve the username: env var first, then profile.
pub fn resolve_username(profile: &ArrayProfile, array: &str) -> Result<String, ConfigError> {
    if let Ok(name) = std::env::var(env_key(array, "USERNAME")) {
        return Ok(name);
    }
    profile
        .username
        .clone()
        .ok_or_else(|| ConfigError::NoCredentials {
            array: array.into(),
        })
}

/// Resolve the password: env var first, then profile plaintext.
pub fn resolve_password(profile: &ArrayProfile, array: &str) -> Result<SecretString, ConfigError> {
    if let Ok(pw) = std::env::var(env_key(array, "PASSWORD")) {
        return Ok(SecretString::from(pw));
    }
    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }
    Err(ConfigError::NoCredentials {
        array: array.into(),
    })
}

// ── ArrayConfig assembly ────────────────────────────────────────────

/// Build the fully resolved `ArrayConfig` for one named array.
pub fn array_config(config: &Config, name: &str) -> Result<ArrayConfig, ConfigError> {
    let profile = config
        .arrays
        .get(name)
        .ok_or_else(|| ConfigError::UnknownArray { name: name.into() })?;

    let vendor = Vendor::from_str(&profile.vendor).map_err(|_| ConfigError::Validation {
        array: name.into(),
        field: "vendor".into(),
        reason: format!("expected 'huawei', 'dell', or 'ibm_v7000', got '{}'", profile.vendor),
    })?;

    let url: url::Url = profile.url.parse().map_err(|_| ConfigError::Validation {
        array: name.into(),
        field: "url".into(),
        reason: format!("invalid URL: {}", profile.url),
    })?;

    let ws_url = match &profile.ws_url {
        Some(raw) => Some(raw.parse().map_err(|_| ConfigError::Validation {
            array: name.into(),
            field: "ws_url".into(),
            reason: format!("invalid URL: {raw}"),
        })?),
        None => None,
    };

    let credentials = Credentials {
        username: resolve_username(profile, name)?,
        password: resolve_password(profile, name)?,
    };

    let session_file = profile.session_file.clone().unwrap_or_else(|| {
        config
            .session_dir
            .clone()
            .unwrap_or_else(default_session_dir)
            .join(format!("{name}.session"))
    });

    let mut array = ArrayConfig::new(vendor, url, credentials, session_file);
    array.ws_url = ws_url;
    array.enum_table = profile.enum_table.clone();
    array.timeout = Duration::from_secs(
        profile.timeout_secs.unwrap_or(config.defaults.timeout_secs),
    );
    array.call_timeout = Duration::from_secs(
        profile
            .call_timeout_secs
            .unwrap_or(config.defaults.call_timeout_secs),
    );
    array.pre_login_delay = Duration::from_millis(
        profile
            .pre_login_delay_ms
            .unwrap_or(config.defaults.pre_login_delay_ms),
    );
    Ok(array)
}

// ── Tests ────────────────────────────────────────────────────────────
