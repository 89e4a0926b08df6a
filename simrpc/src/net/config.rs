use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use std::{fmt, str::FromStr, time::Duration};

/// Network configurations.
///
/// Durations are written as integer milliseconds:
///
/// ```
/// # use simrpc::net::Config;
/// let config: Config = r#"
///     reliable = false
///     max_jitter = 10
///     seed = 42
/// "#
/// .parse()
/// .unwrap();
/// assert_eq!(config.max_jitter, std::time::Duration::from_millis(10));
/// assert_eq!(config.request_loss_rate, 0.1);
/// ```
#[serde_as]
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(default)]
pub struct Config {
    /// Initial reliability flag.
    pub reliable: bool,
    /// Initial long-delay flag.
    pub long_delays: bool,
    /// Initial long-reordering flag.
    pub long_reordering: bool,

    /// Possibility of dropping a request when unreliable.
    pub request_loss_rate: f64,
    /// Possibility of dropping a reply when unreliable.
    pub reply_loss_rate: f64,
    /// Upper bound of the delay added to every routed request when unreliable.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub max_jitter: Duration,

    /// Upper bound of the delay before a request with no route fails.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub max_no_route_delay: Duration,
    /// Same as `max_no_route_delay`, in long-delay mode.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub max_long_no_route_delay: Duration,

    /// Possibility of delaying a reply in long-reordering mode.
    pub reorder_rate: f64,
    /// Minimum delay of a reordered reply.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub reorder_min_delay: Duration,
    /// Upper bound of the extra delay of a reordered reply.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub reorder_max_extra: Duration,

    /// How often an in-flight call checks whether its destination is alive.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub liveness_interval: Duration,
    /// Period of the registration sweep. Disabled if `None`.
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub sweep_interval: Option<Duration>,

    /// Capacity of the intake queue.
    pub intake_capacity: usize,
    /// Seed of the fault-injection RNG. Random if `None`.
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            reliable: true,
            long_delays: false,
            long_reordering: false,
            request_loss_rate: 0.1,
            reply_loss_rate: 0.1,
            max_jitter: Duration::from_millis(27),
            max_no_route_delay: Duration::from_millis(100),
            max_long_no_route_delay: Duration::from_millis(7000),
            reorder_rate: 600.0 / 900.0,
            reorder_min_delay: Duration::from_millis(200),
            reorder_max_extra: Duration::from_millis(2000),
            liveness_interval: Duration::from_millis(100),
            sweep_interval: None,
            intake_capacity: 1024,
            seed: None,
        }
    }
}

impl Config {
    /// Read a config from a TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        std::fs::read_to_string(path)?.parse()
    }

    /// Print the config into TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Parse a config from TOML.
impl FromStr for Config {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_toml().map_err(|_| fmt::Error)?)
    }
}
