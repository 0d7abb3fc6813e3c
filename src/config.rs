use clap::Parser;
use std::time::Duration;

/// Football match tracker with live score streaming
#[derive(Parser, Debug, Clone)]
#[command(name = "football-live", version, about)]
pub struct Config {
    /// HTTP listen address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:5000")]
    pub listen_addr: String,

    /// SQLite database path (":memory:" for a throwaway store)
    #[arg(long, env = "DATABASE_PATH", default_value = "matches.db")]
    pub database_path: String,

    /// Seconds between keep-alive pings on idle streams
    #[arg(long, env = "PING_INTERVAL_SECS", default_value = "30")]
    pub ping_interval_secs: u64,

    /// Frames buffered per subscriber before it is treated as disconnected
    #[arg(long, env = "CHANNEL_CAPACITY", default_value = "64")]
    pub channel_capacity: usize,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ping_interval_secs == 0 {
            anyhow::bail!("ping_interval_secs must be positive");
        }
        if self.channel_capacity == 0 {
            anyhow::bail!("channel_capacity must be positive");
        }
        if self.database_path.trim().is_empty() {
            anyhow::bail!("database_path must not be empty");
        }
        Ok(())
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::parse_from(["football-live"]);
        assert!(config.validate().is_ok());
        assert_eq!(config.ping_interval(), Duration::from_secs(30));
        assert_eq!(config.channel_capacity, 64);
    }

    #[test]
    fn test_zero_ping_rejected() {
        let config = Config::parse_from(["football-live", "--ping-interval-secs", "0"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = Config::parse_from(["football-live", "--channel-capacity", "0"]);
        assert!(config.validate().is_err());
    }
}
