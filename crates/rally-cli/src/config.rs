//! Binary configuration
//!
//! Layered lowest to highest: built-in defaults, the TOML file, `RALLY_*`
//! environment variables, then command-line flags. [`RallyConfig::validate`]
//! runs once every layer is applied.

use rally_anti_entropy::AntiEntropyConfig;
use rally_core::ClientId;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file read when `--config` is not given, if it exists.
pub const DEFAULT_CONFIG_PATH: &str = "rally.toml";

/// Configuration failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// File path
        path: PathBuf,
        /// I/O failure
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// File path
        path: PathBuf,
        /// TOML failure
        source: toml::de::Error,
    },

    /// An environment variable holds an unusable value
    #[error("invalid value for {var}: {reason}")]
    Env {
        /// Variable name
        var: &'static str,
        /// What was wrong
        reason: String,
    },

    /// A setting failed validation
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Settings of one `rally peer` process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RallyConfig {
    /// Replica identifier; random when absent
    pub client_id: Option<String>,
    /// Address to accept peers on
    pub listen: Option<SocketAddr>,
    /// Peers to dial, as `host:port`
    pub peers: Vec<String>,
    /// Delay between attempts to reach a peer
    pub reconnect_interval_ms: u64,
    /// Log filter used when `RUST_LOG` is unset
    pub log_level: String,
    /// Session tuning
    pub anti_entropy: AntiEntropyConfig,
}

impl Default for RallyConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            listen: None,
            peers: Vec::new(),
            reconnect_interval_ms: 2_000,
            log_level: "info".to_string(),
            anti_entropy: AntiEntropyConfig::default(),
        }
    }
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// `--client-id`
    pub client_id: Option<String>,
    /// `--listen`
    pub listen: Option<SocketAddr>,
    /// `--peer`, appended to configured peers
    pub peers: Vec<String>,
    /// `--verbose`
    pub verbose: bool,
}

impl RallyConfig {
    /// Load every layer and validate the result.
    ///
    /// An explicitly given file must exist; the default file is optional.
    pub fn load(
        path: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
        overrides: Overrides,
    ) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::default(),
        };
        config.merge_env(env)?;
        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file; unset keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `RALLY_CLIENT_ID`, `RALLY_LISTEN`, `RALLY_PEERS` (comma
    /// separated) and `RALLY_LOG_LEVEL`.
    pub fn merge_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(client_id) = env("RALLY_CLIENT_ID") {
            self.client_id = Some(client_id);
        }
        if let Some(listen) = env("RALLY_LISTEN") {
            let address = listen.parse().map_err(|err| ConfigError::Env {
                var: "RALLY_LISTEN",
                reason: format!("{listen:?}: {err}"),
            })?;
            self.listen = Some(address);
        }
        if let Some(peers) = env("RALLY_PEERS") {
            self.peers = peers
                .split(',')
                .map(str::trim)
                .filter(|peer| !peer.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(level) = env("RALLY_LOG_LEVEL") {
            self.log_level = level;
        }
        Ok(())
    }

    /// Apply command-line flags.
    pub fn apply(&mut self, overrides: Overrides) {
        if overrides.client_id.is_some() {
            self.client_id = overrides.client_id;
        }
        if overrides.listen.is_some() {
            self.listen = overrides.listen;
        }
        self.peers.extend(overrides.peers);
        if overrides.verbose {
            self.log_level = "debug".to_string();
        }
    }

    /// Check every setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(client_id) = &self.client_id {
            ClientId::new(client_id.as_str())
                .map_err(|err| ConfigError::Invalid(format!("client_id: {err}")))?;
        }
        if self.reconnect_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "reconnect_interval_ms must be positive".to_string(),
            ));
        }
        if self.log_level.trim().is_empty() {
            return Err(ConfigError::Invalid("log_level must not be empty".to_string()));
        }
        self.anti_entropy
            .validate()
            .map_err(|err| ConfigError::Invalid(err.to_string()))
    }

    /// The configured identifier, or a fresh random one.
    pub fn client_id(&self) -> Result<ClientId, ConfigError> {
        match &self.client_id {
            Some(id) => ClientId::new(id.as_str())
                .map_err(|err| ConfigError::Invalid(format!("client_id: {err}"))),
            None => Ok(ClientId::random()),
        }
    }

    /// Reconnect delay as a [`Duration`].
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}
