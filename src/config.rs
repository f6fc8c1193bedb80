//! Server configuration loaded from the environment

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_HEARTBEAT_SECS: u64 = 3;
const DEFAULT_BROADCAST_CAPACITY: usize = 100;
const DEFAULT_STATIC_DIR: &str = "static";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// How often each connection is pinged; a missed pong drops the player
    pub heartbeat_interval: Duration,
    /// Depth of the fan-out channel before slow clients start lagging
    pub broadcast_capacity: usize,
    /// Frontend bundle served for non-API paths
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
        }
    }
}

impl ServerConfig {
    /// Load config from environment variables
    pub fn from_env() -> Self {
        let ip = env_parse("BIND_ADDRESS").unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let port = env_parse("PORT").unwrap_or(DEFAULT_PORT);

        let heartbeat_secs = env_parse::<u64>("HEARTBEAT_INTERVAL_SECS")
            .filter(|&secs| secs > 0)
            .unwrap_or(DEFAULT_HEARTBEAT_SECS);

        let broadcast_capacity = env_parse::<usize>("BROADCAST_CAPACITY")
            .filter(|&cap| cap > 0)
            .unwrap_or(DEFAULT_BROADCAST_CAPACITY);

        let static_dir = std::env::var("STATIC_DIR")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR));

        Self {
            bind_addr: SocketAddr::new(ip, port),
            heartbeat_interval: Duration::from_secs(heartbeat_secs),
            broadcast_capacity,
            static_dir,
        }
    }
}

/// Read and parse a variable, warning (and returning None) on garbage
fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring invalid {}={:?}, using default", key, raw);
            None
        }
    }
}
