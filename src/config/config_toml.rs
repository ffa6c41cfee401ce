use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::{fs, net::SocketAddr, path::Path, time::Duration};

use crate::relay::UpstreamSettings;

/// Largest DNS message a length prefix can describe.
const MAX_RECEIVE_WINDOW: usize = u16::MAX as usize;

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct ConfigToml {
    #[serde(default)]
    pub general: General,
    #[serde(default)]
    pub upstream: Upstream,
    #[serde(default)]
    pub relay: Relay,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct General {
    /// UDP socket to receive plain DNS queries on.
    #[serde(default = "default_socket")]
    pub socket: SocketAddr,

    #[serde(default = "default_false")]
    pub verbose: bool,
}

impl Default for General {
    fn default() -> Self {
        Self {
            socket: default_socket(),
            verbose: default_false(),
        }
    }
}

fn default_socket() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 53))
}

fn default_false() -> bool {
    false
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Upstream {
    /// DNS-over-TLS resolver. Hostname or IP.
    #[serde(default = "default_upstream_host")]
    pub host: String,

    #[serde(default = "default_upstream_port")]
    pub port: u16,

    /// Name to verify the resolver certificate against. Defaults to `host`.
    #[serde(default)]
    pub tls_name: Option<String>,

    /// Connect, handshake and read timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for Upstream {
    fn default() -> Self {
        Self {
            host: default_upstream_host(),
            port: default_upstream_port(),
            tls_name: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Upstream {
    pub fn settings(&self) -> UpstreamSettings {
        UpstreamSettings::new(
            self.host.clone(),
            self.port,
            self.tls_name.clone(),
            Duration::from_secs(self.timeout_secs),
        )
    }
}

fn default_upstream_host() -> String {
    "1.0.0.1".to_string()
}

fn default_upstream_port() -> u16 {
    853
}

fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Relay {
    /// Bytes read per incoming datagram.
    #[serde(default = "default_receive_window")]
    pub receive_window: usize,

    /// Queries handled at the same time. Extra queries are dropped. 0 is unbounded.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Queries per second per client IP. 0 is disabled.
    #[serde(default)]
    pub query_rate_limit: u32,

    #[serde(default)]
    pub query_rate_limit_burst: u32,
}

impl Default for Relay {
    fn default() -> Self {
        Self {
            receive_window: default_receive_window(),
            max_in_flight: default_max_in_flight(),
            query_rate_limit: 0,
            query_rate_limit_burst: 0,
        }
    }
}

fn default_receive_window() -> usize {
    1024
}

fn default_max_in_flight() -> usize {
    1024
}

impl ConfigToml {
    /// Reads and validates a config file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content).map_err(|e| anyhow!("Failed to read {}. {e}", path.display()))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: ConfigToml = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.upstream.timeout_secs == 0 {
            return Err(anyhow!("upstream.timeout_secs must be at least 1."));
        }
        if self.relay.receive_window == 0 || self.relay.receive_window > MAX_RECEIVE_WINDOW {
            return Err(anyhow!(
                "relay.receive_window must be between 1 and {MAX_RECEIVE_WINDOW}."
            ));
        }
        Ok(())
    }

    /// Default config with every value commented out.
    pub fn commented_out_sample() -> String {
        let full_config = toml::to_string(&ConfigToml::default()).unwrap_or_default();
        let commented_out: Vec<String> = full_config
            .split('\n')
            .map(|line| {
                if line.starts_with('[') || line.is_empty() {
                    // Keep sections and blank lines.
                    line.to_string()
                } else {
                    format!("# {line}")
                }
            })
            .collect();
        let commented_out = commented_out.join("\n");
        format!("# dotrelay configuration file\n# Uncomment a value to change it.\n\n{commented_out}")
    }

    #[cfg(test)]
    pub fn test() -> Self {
        let mut config = Self::default();
        config.general.socket = SocketAddr::from(([127, 0, 0, 1], 0));
        config.upstream.timeout_secs = 2;
        config
    }
}
