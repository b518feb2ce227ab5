use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::live_scores::RetryPolicy;

/// Basketball scoreboard rotation engine
#[derive(Parser, Debug, Clone)]
#[command(name = "courtside", version, about)]
pub struct Config {
    /// League configuration file (TOML)
    #[arg(long, env = "COURTSIDE_CONFIG", default_value = "courtside.toml")]
    pub config: PathBuf,

    /// Score provider base URL
    #[arg(
        long,
        env = "PROVIDER_BASE_URL",
        default_value = "https://site.api.espn.com/apis/site/v2/sports"
    )]
    pub provider_base_url: String,

    /// Per-request timeout in seconds
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value = "30")]
    pub http_timeout_secs: u64,

    /// Retries after the first failed attempt
    #[arg(long, env = "MAX_RETRIES", default_value = "3")]
    pub max_retries: u32,

    /// First retry delay in milliseconds (doubles per retry)
    #[arg(long, env = "RETRY_BASE_DELAY_MS", default_value = "1000")]
    pub retry_base_delay_ms: u64,

    /// Cap on the retry delay in milliseconds
    #[arg(long, env = "RETRY_MAX_DELAY_MS", default_value = "30000")]
    pub retry_max_delay_ms: u64,

    /// Days of past games requested from date-range scoreboards
    #[arg(long, env = "SCOREBOARD_LOOKBACK_DAYS", default_value = "14")]
    pub scoreboard_lookback_days: u32,

    /// Days of future games requested from date-range scoreboards
    #[arg(long, env = "SCOREBOARD_LOOKAHEAD_DAYS", default_value = "7")]
    pub scoreboard_lookahead_days: u32,

    /// Rotation tick in milliseconds
    #[arg(long, env = "TICK_MILLIS", default_value = "1000")]
    pub tick_millis: u64,

    /// How often to check the league file for changes (0 disables reloading)
    #[arg(long, env = "CONFIG_RELOAD_SECS", default_value = "10")]
    pub config_reload_secs: u64,

    /// How long in-flight fetches get to finish on shutdown
    #[arg(long, env = "SHUTDOWN_GRACE_SECS", default_value = "5")]
    pub shutdown_grace_secs: u64,

    /// Dashboard listen address
    #[arg(long, env = "DASHBOARD_ADDR", default_value = "127.0.0.1:8080")]
    pub dashboard_addr: String,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.http_timeout_secs == 0 {
            anyhow::bail!("http_timeout_secs must be positive");
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            anyhow::bail!("retry_max_delay_ms must be >= retry_base_delay_ms");
        }
        if self.tick_millis < 50 {
            anyhow::bail!("tick_millis must be at least 50");
        }
        if self.scoreboard_lookback_days > 60 || self.scoreboard_lookahead_days > 60 {
            anyhow::bail!("scoreboard lookback/lookahead must be at most 60 days");
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_secs(self.http_timeout_secs),
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }

    /// `None` when hot reload is switched off.
    pub fn reload_every(&self) -> Option<Duration> {
        (self.config_reload_secs > 0).then(|| Duration::from_secs(self.config_reload_secs))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
