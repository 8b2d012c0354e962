//! Configuration system.
//!
//! Loads client configuration from JSON strings/files.

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("server candidate list is empty")]
    NoServers,
    #[error("port must be non-zero")]
    InvalidPort,
    #[error("frame rate must be non-zero")]
    InvalidFrameRate,
    #[error("read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One host:port pair the client may connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCandidate {
    pub host: String,
    pub port: u16,
}

impl ServerCandidate {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parses `host`, `host:port`, `ipv6` or `[ipv6]:port`. Without a usable
    /// port the entry is taken whole with `default_port`.
    pub fn parse(entry: &str, default_port: u16) -> Self {
        if let Some((host, tail)) = entry
            .strip_prefix('[')
            .and_then(|rest| rest.split_once(']'))
        {
            let port = tail
                .strip_prefix(':')
                .and_then(|p| p.parse().ok())
                .unwrap_or(default_port);
            return Self::new(host, port);
        }
        match entry.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') => match port.parse() {
                Ok(port) => Self::new(host, port),
                Err(_) => Self::new(entry, default_port),
            },
            _ => Self::new(entry, default_port),
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self)
    }
}

impl std::fmt::Display for ServerCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Ordered, non-empty list of candidates. Indexing wraps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerList {
    candidates: Vec<ServerCandidate>,
}

impl ServerList {
    pub fn new(candidates: Vec<ServerCandidate>) -> Result<Self, ConfigError> {
        if candidates.is_empty() {
            return Err(ConfigError::NoServers);
        }
        Ok(Self { candidates })
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn get(&self, index: usize) -> &ServerCandidate {
        &self.candidates[index % self.candidates.len()]
    }

    /// Index tried after `index` fails; wraps to the first candidate.
    pub fn next_index(&self, index: usize) -> usize {
        (index + 1) % self.candidates.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServerCandidate> {
        self.candidates.iter()
    }
}

/// Root client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Candidate hosts, tried in order. `host:port` entries are allowed.
    #[serde(default = "default_servers")]
    pub servers: Vec<String>,
    /// Port shared by all candidates.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Watchdog delay for a pending connection attempt.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Fallback frame rate for the render loop.
    #[serde(default = "default_frame_hz")]
    pub frame_hz: u32,
    #[serde(default = "default_viewport_width")]
    pub viewport_width: f64,
    #[serde(default = "default_viewport_height")]
    pub viewport_height: f64,
}

fn default_servers() -> Vec<String> {
    vec!["50.4.106.119".to_string(), "127.0.0.1".to_string()]
}

fn default_port() -> u16 {
    3272
}

fn default_connect_timeout_ms() -> u64 {
    1500
}

fn default_frame_hz() -> u32 {
    60
}

fn default_viewport_width() -> f64 {
    1280.0
}

fn default_viewport_height() -> f64 {
    720.0
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            servers: default_servers(),
            port: default_port(),
            connect_timeout_ms: default_connect_timeout_ms(),
            frame_hz: default_frame_hz(),
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
        }
    }
}

impl ClientConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Reads and parses a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.servers.is_empty() {
            return Err(ConfigError::NoServers);
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.frame_hz == 0 {
            return Err(ConfigError::InvalidFrameRate);
        }
        Ok(())
    }

    /// Candidate list; entries with an explicit port override `port`.
    pub fn candidates(&self) -> Result<ServerList, ConfigError> {
        ServerList::new(
            self.servers
                .iter()
                .map(|entry| ServerCandidate::parse(entry, self.port))
                .collect(),
        )
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_hz.max(1) as f64)
    }
}
