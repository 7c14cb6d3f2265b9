use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
}

/// Server construction parameters. All of them are fixed once the server is bound.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Textual IP to bind, IPv4 or IPv6 depending on `ipv6`
    pub address: String,
    pub port: u16,
    /// Selects the IPv6 family for the whole server instance
    pub ipv6: bool,
    /// Maximum concurrently registered clients
    pub clients_max: usize,
    /// Pending-connection backlog handed to listen(2)
    pub backlog: i32,
    /// Size of the single read performed per ready connection
    pub buffer_size: usize,
    /// Maximum length of the method, target and version tokens
    pub token_max: usize,
    /// Maximum length of a header key or value
    pub header_line_max: usize,
    /// Methods whose requests never carry a body
    pub bodyless_methods: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 5454,
            ipv6: false,
            clients_max: 30,
            backlog: 1,
            buffer_size: 4096,
            token_max: 2048,
            header_line_max: 4096,
            bodyless_methods: vec!["GET".to_string()],
        }
    }
}

impl Config {
    /// Loads the file named by `MINIHTTP_CONFIG` (or the defaults), then applies
    /// the `LISTEN` override.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var("MINIHTTP_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };

        if let Ok(listen) = std::env::var("LISTEN") {
            cfg.server.apply_listen(&listen)?;
        }

        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_yaml_str(raw: &str) -> anyhow::Result<Self> {
        let mut cfg: Config = serde_yaml::from_str(raw).context("Failed to parse YAML config")?;
        cfg.server.clients_max = cfg.server.clients_max.max(1);
        Ok(cfg)
    }
}

impl ServerConfig {
    /// Overrides address and port from an `ip:port` string. Bracketed IPv6
    /// (`[::1]:8080`) selects the IPv6 family.
    pub fn apply_listen(&mut self, listen: &str) -> anyhow::Result<()> {
        let (host, port) = listen
            .rsplit_once(':')
            .with_context(|| format!("LISTEN must be ip:port, got {listen:?}"))?;

        self.port = port
            .parse()
            .with_context(|| format!("Invalid port in LISTEN: {port:?}"))?;

        match host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
            Some(v6) => {
                self.address = v6.to_string();
                self.ipv6 = true;
            }
            None => self.address = host.to_string(),
        }

        Ok(())
    }
}
