use std::{
    fmt::Display,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    str::FromStr,
};

use anyhow::{anyhow, ensure};

use crate::state::DEFAULT_CAPACITY;

pub const DEFAULT_ADDR: SocketAddr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 5000));
pub const DEFAULT_HISTORY_LIMIT: usize = 50;
pub const DEFAULT_LOG_FILTER: &str = "relaychat=info,tower_http=info";

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    /// Most messages kept in memory before the oldest is evicted.
    pub message_capacity: usize,
    /// Page size for `GET /messages` when the request gives none.
    pub history_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR,
            message_capacity: DEFAULT_CAPACITY,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl Config {
    /// Reads `RELAY_*` variables, honouring a `.env` file when present.
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            addr: var_or("RELAY_ADDR", DEFAULT_ADDR)?,
            message_capacity: var_or("RELAY_MESSAGE_CAPACITY", DEFAULT_CAPACITY)?,
            history_limit: var_or("RELAY_HISTORY_LIMIT", DEFAULT_HISTORY_LIMIT)?,
        };
        ensure!(config.message_capacity > 0, "RELAY_MESSAGE_CAPACITY must be at least 1");
        Ok(config)
    }
}

fn var_or<T>(key: &str, default: impl Into<T>) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match dotenv::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|err| anyhow!("{key}={raw:?}: {err}")),
        Err(_) => Ok(default.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_listen_on_port_5000() {
        let config = Config::default();
        assert_eq!(config.addr, DEFAULT_ADDR);
        assert_eq!(config.addr.to_string(), "0.0.0.0:5000");
        assert_eq!(config.message_capacity, DEFAULT_CAPACITY);
    }

    #[test]
    fn unset_variables_fall_back() {
        let addr: SocketAddr = var_or("RELAY_TEST_UNSET_ADDR", DEFAULT_ADDR).unwrap();
        assert_eq!(addr, DEFAULT_ADDR);
    }
}
