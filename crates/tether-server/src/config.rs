use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};

use crate::codec::Framing;
use crate::server::DEFAULT_PORT;

/// Default directory for received files.
pub const DEFAULT_STORAGE_DIR: &str = "ReceivedFiles";

/// Default broadcast capacity of the event bus.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Runtime settings for a [`Server`](crate::Server).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Root for uploads that do not name an explicit destination path.
    pub storage_dir: PathBuf,
    pub framing: Framing,
    pub event_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            framing: Framing::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Build a config from `TETHER_*` environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(host) = lookup("TETHER_HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("TETHER_PORT") {
            config.port = port
                .parse()
                .with_context(|| format!("invalid TETHER_PORT {:?}", port))?;
        }
        if let Some(dir) = lookup("TETHER_STORAGE_DIR") {
            config.storage_dir = dir.into();
        }
        if let Some(framing) = lookup("TETHER_FRAMING") {
            config.framing = framing.parse()?;
        }
        if let Some(capacity) = lookup("TETHER_EVENT_CAPACITY") {
            config.event_capacity = capacity
                .parse()
                .with_context(|| format!("invalid TETHER_EVENT_CAPACITY {:?}", capacity))?;
            if config.event_capacity == 0 {
                anyhow::bail!("TETHER_EVENT_CAPACITY must be greater than zero");
            }
        }

        Ok(config)
    }
}

impl FromStr for Framing {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "length-prefixed" => Ok(Self::LengthPrefixed),
            "single-read" => Ok(Self::SingleRead),
            other => anyhow::bail!(
                "unknown framing {:?} (expected \"length-prefixed\" or \"single-read\")",
                other
            ),
        }
    }
}
