//! Site configuration resolution.
//!
//! The configuration file is searched in a fixed order, first hit wins:
//!
//! 1. the path named by the `ARCHAPPL_CONFIG_FILE` environment variable
//!    (must exist and parse; an unreadable override is an error, never a
//!    fallback),
//! 2. `~/.archappl/config.toml`,
//! 3. `/etc/archappl/config.toml`,
//! 4. the default bundled into the binary.
//!
//! The file is sectioned: `[main]` carries a `use` key naming the active
//! server section, which in turn carries the base `url` and optional port
//! overrides for the retrieval and management endpoints.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Environment variable naming an override path for the configuration file.
pub const ENV_CONFIG_PATH: &str = "ARCHAPPL_CONFIG_FILE";

/// System-wide configuration file location.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/archappl/config.toml";

/// Configuration deployed with the package, used when no file is found.
pub const BUILTIN_CONFIG: &str = include_str!("default_config.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file '{}'", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration from {origin}")]
    Parse {
        origin: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("configuration from {origin}: {message}")]
    Invalid { origin: String, message: String },
}

/// Resolved site configuration, immutable for the process lifetime.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Base URL of the appliance, scheme and host, no trailing slash.
    pub url: String,
    /// Port of the management (BPL) endpoint, appended to `url` when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_port: Option<u16>,
    /// Port of the data-retrieval endpoint, appended to `url` when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_port: Option<u16>,
    /// Site operators can fence off the management API entirely.
    pub admin_disabled: bool,
    /// HTTP transport timeout applied at client construction.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Recent-window length used by `get_data` when no range is given.
    #[serde(with = "humantime_serde")]
    pub default_window: Duration,
    /// File the configuration came from; `None` means the bundled default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
}

impl Config {
    /// Base URL for the data-retrieval API, with `data_port` applied.
    pub fn data_url(&self) -> String {
        match self.data_port {
            Some(port) => format!("{}:{}", self.url, port),
            None => self.url.clone(),
        }
    }

    /// Base URL for the management API, with `admin_port` applied.
    pub fn admin_url(&self) -> String {
        match self.admin_port {
            Some(port) => format!("{}:{}", self.url, port),
            None => self.url.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    main: MainSection,
    #[serde(default)]
    cli: CliSection,
    #[serde(flatten)]
    sections: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Deserialize)]
struct MainSection {
    #[serde(rename = "use")]
    use_server: String,
}

#[derive(Debug, Default, Deserialize)]
struct CliSection {
    #[serde(default)]
    get: GetSection,
}

#[derive(Debug, Deserialize)]
struct GetSection {
    #[serde(default = "default_window", with = "humantime_serde")]
    default_window: Duration,
}

impl Default for GetSection {
    fn default() -> Self {
        Self {
            default_window: default_window(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ServerSection {
    url: String,
    admin_port: Option<u16>,
    data_port: Option<u16>,
    #[serde(default)]
    admin_disabled: bool,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    timeout: Duration,
}

fn default_window() -> Duration {
    Duration::from_secs(3600)
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Resolves the site configuration using the documented search order.
pub fn resolve() -> Result<Config, ConfigError> {
    if let Some(path) = env::var(ENV_CONFIG_PATH).ok().filter(|p| !p.is_empty()) {
        let path = PathBuf::from(path);
        debug!(path = %path.display(), "using configuration from {}", ENV_CONFIG_PATH);
        return load(&path);
    }
    if let Some(base) = BaseDirs::new() {
        let user = base.home_dir().join(".archappl").join("config.toml");
        if user.is_file() {
            debug!(path = %user.display(), "using per-user configuration");
            return load(&user);
        }
    }
    let system = Path::new(SYSTEM_CONFIG_PATH);
    if system.is_file() {
        debug!(path = %system.display(), "using system configuration");
        return load(system);
    }
    debug!("no configuration file found, using bundled default");
    parse(BUILTIN_CONFIG, None)
}

/// Loads and parses a configuration file at an explicit path.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&text, Some(path.to_path_buf()))
}

fn parse(text: &str, source: Option<PathBuf>) -> Result<Config, ConfigError> {
    let origin = match &source {
        Some(path) => format!("'{}'", path.display()),
        None => "the bundled default".to_string(),
    };
    let raw: RawConfig = toml::from_str(text).map_err(|e| ConfigError::Parse {
        origin: origin.clone(),
        source: e,
    })?;
    let section = raw
        .sections
        .get(&raw.main.use_server)
        .ok_or_else(|| ConfigError::Invalid {
            origin: origin.clone(),
            message: format!(
                "section '{}' named by main.use not found",
                raw.main.use_server
            ),
        })?;
    let server: ServerSection =
        section
            .clone()
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse {
                origin: origin.clone(),
                source: e,
            })?;
    if server.url.is_empty() {
        return Err(ConfigError::Invalid {
            origin,
            message: format!("'url' in section '{}' is empty", raw.main.use_server),
        });
    }
    Ok(Config {
        url: server.url.trim_end_matches('/').to_string(),
        admin_port: server.admin_port,
        data_port: server.data_port,
        admin_disabled: server.admin_disabled,
        timeout: server.timeout,
        default_window: raw.cli.get.default_window,
        source,
    })
}
