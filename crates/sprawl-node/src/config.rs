//! Node configuration.
//!
//! Values come from a TOML file, then `SPRAWL_*` environment variables and
//! command-line flags override them. Every key has a default, so an empty
//! or missing file yields a runnable node.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};
use sprawl_p2p::HostConfig;

/// File read from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub p2p: P2pConfig,
    pub log: LogConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file.
    pub path: PathBuf,
    /// Keep everything in memory and ignore `path`.
    pub in_memory: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/sprawl/data"),
            in_memory: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct P2pConfig {
    pub port: u16,
    pub external_ip: Option<String>,
    pub bootstrap_peers: Vec<String>,
    pub use_ipfs_peers: bool,
    pub enable_relay: bool,
    pub enable_nat_port_map: bool,
    /// Run the debug pinger.
    pub debug: bool,
}

impl Default for P2pConfig {
    fn default() -> Self {
        Self {
            port: 4001,
            external_ip: None,
            bootstrap_peers: Vec::new(),
            use_ipfs_peers: true,
            enable_relay: false,
            enable_nat_port_map: false,
            debug: false,
        }
    }
}

impl P2pConfig {
    pub fn host_config(&self) -> HostConfig {
        HostConfig {
            port: self.port,
            external_ip: self
                .external_ip
                .as_ref()
                .filter(|ip| !ip.is_empty())
                .cloned(),
            bootstrap_peers: self.bootstrap_peers.clone(),
            use_ipfs_peers: self.use_ipfs_peers,
            enable_relay: self.enable_relay,
            enable_nat_port_map: self.enable_nat_port_map,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// An `EnvFilter` directive such as `info` or `sprawl_p2p=debug`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Console,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Console,
    Json,
}

/// Settings given on the command line or through the environment.
#[derive(Debug, Default, Args)]
pub struct Overrides {
    #[arg(long, env = "SPRAWL_DATABASE_PATH")]
    pub database_path: Option<PathBuf>,

    #[arg(long, env = "SPRAWL_DATABASE_INMEMORY")]
    pub in_memory: Option<bool>,

    #[arg(long, env = "SPRAWL_P2P_PORT")]
    pub port: Option<u16>,

    #[arg(long, env = "SPRAWL_P2P_EXTERNALIP")]
    pub external_ip: Option<String>,

    /// Multiaddr to dial at startup. Repeat or comma-separate for several.
    #[arg(long = "bootstrap-peer", env = "SPRAWL_P2P_BOOTSTRAPPEERS", value_delimiter = ',')]
    pub bootstrap_peers: Vec<String>,

    #[arg(long, env = "SPRAWL_P2P_USEIPFSPEERS")]
    pub use_ipfs_peers: Option<bool>,

    #[arg(long, env = "SPRAWL_P2P_ENABLERELAY")]
    pub enable_relay: Option<bool>,

    #[arg(long, env = "SPRAWL_P2P_ENABLENATPORTMAP")]
    pub enable_nat_port_map: Option<bool>,

    #[arg(long, env = "SPRAWL_P2P_DEBUG")]
    pub debug: Option<bool>,

    #[arg(long, env = "SPRAWL_LOG_LEVEL")]
    pub log_level: Option<String>,

    #[arg(long, value_enum, env = "SPRAWL_LOG_FORMAT")]
    pub log_format: Option<LogFormat>,
}

impl Config {
    /// Read `path`, or `config.toml` in the working directory if it exists.
    ///
    /// An explicit path must exist. A missing default file gives the
    /// default configuration.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&text)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(path) = overrides.database_path {
            self.database.path = path;
        }
        if let Some(in_memory) = overrides.in_memory {
            self.database.in_memory = in_memory;
        }
        if let Some(port) = overrides.port {
            self.p2p.port = port;
        }
        if let Some(ip) = overrides.external_ip {
            self.p2p.external_ip = Some(ip);
        }
        if !overrides.bootstrap_peers.is_empty() {
            self.p2p.bootstrap_peers = overrides.bootstrap_peers;
        }
        if let Some(use_ipfs_peers) = overrides.use_ipfs_peers {
            self.p2p.use_ipfs_peers = use_ipfs_peers;
        }
        if let Some(enable_relay) = overrides.enable_relay {
            self.p2p.enable_relay = enable_relay;
        }
        if let Some(enable_nat_port_map) = overrides.enable_nat_port_map {
            self.p2p.enable_nat_port_map = enable_nat_port_map;
        }
        if let Some(debug) = overrides.debug {
            self.p2p.debug = debug;
        }
        if let Some(level) = overrides.log_level {
            self.log.level = level;
        }
        if let Some(format) = overrides.log_format {
            self.log.format = format;
        }
    }
}
