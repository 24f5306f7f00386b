use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub data_file: PathBuf,
    /// How often idle event streams get a keep-alive comment.
    pub keepalive: Duration,
    /// Datasets buffered per subscriber before a slow one starts skipping.
    pub broadcast_capacity: usize,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid value {value:?} for {var}: {reason}")]
pub struct ConfigError {
    var: &'static str,
    value: String,
    reason: String,
}

impl Config {
    /// Read configuration from the environment (after `.env`, if there is one).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let addr = parse(&lookup, "SYNC_ADDR", "0.0.0.0:8080")?;
        let data_file = lookup("SYNC_DATA_FILE")
            .unwrap_or_else(|| "data/dataset.json".to_string())
            .into();
        let keepalive_secs: u64 = parse(&lookup, "SYNC_KEEPALIVE_SECS", "15")?;
        let broadcast_capacity: usize = parse(&lookup, "SYNC_BROADCAST_CAPACITY", "16")?;
        if broadcast_capacity == 0 {
            return Err(ConfigError {
                var: "SYNC_BROADCAST_CAPACITY",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            addr,
            data_file,
            keepalive: Duration::from_secs(keepalive_secs.max(1)),
            broadcast_capacity,
        })
    }
}

fn parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: &str,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let value = lookup(var).unwrap_or_else(|| default.to_string());
    value.trim().parse().map_err(|e: T::Err| ConfigError {
        var,
        reason: e.to_string(),
        value,
    })
}
