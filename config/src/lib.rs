#[macro_use]
extern crate tracing;

mod args;
mod dirs;

pub use args::Args;
use eyre::{
    bail,
    Result,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    net::SocketAddr,
    path::PathBuf,
    time::Duration,
};

const DEFAULT_CONFIG: &str = include_str!("default-config.yaml");

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub api_base_url: url::Url,
    pub interval_seconds: f64,
    #[serde(default)]
    pub output_json_path: Option<PathBuf>,
    pub snapshot_key: String,
    pub bitrate: BitrateConfig,
    pub rtt: RttConfig,
    pub http: HttpConfig,
    pub frontend: FrontendConfig,
}

/// Settings of the counter based bitrate estimation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BitrateConfig {
    pub min_dt: f64,
    #[serde(default)]
    pub smooth_alpha: Option<f64>,
    pub ttl: f64,
    pub ignore_loopback: bool,
}

/// Settings of the publisher RTT probing.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RttConfig {
    pub enabled: bool,
    pub ewma_alpha: f64,
    pub min_period: f64,
    pub ttl: f64,
    pub key_prefix: String,
    pub timeout: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HttpConfig {
    pub enabled: bool,
    pub listen_address: SocketAddr,
}

/// Refresh hints handed to the web UI together with the snapshot.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FrontendConfig {
    pub snapshot_refresh_ms: u64,
    pub streamlist_refresh_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        serde_yml::from_str(DEFAULT_CONFIG).expect("Failed to parse default config")
    }
}

impl Config {
    /// Layers the built-in defaults, the config file and the command-line arguments.
    ///
    /// An explicitly passed `--config` file must exist, the one in the config
    /// directory is optional.
    pub fn new(args: Args) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder().add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Yaml));

        builder = match &args.config {
            Some(path) => builder.add_source(config::File::from(path.as_path()).format(config::FileFormat::Yaml)),
            None => builder.add_source(
                config::File::from(dirs::default_config_file())
                    .format(config::FileFormat::Yaml)
                    .required(false),
            ),
        };

        builder = builder.add_source(args);

        let cfg: Self = builder.build()?.try_deserialize()?;

        Ok(cfg)
    }

    /// Rejects settings the estimators cannot work with. Called once at startup.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.api_base_url.scheme(), "http" | "https") {
            bail!("api_base_url must be an http(s) URL, got {}", self.api_base_url);
        }
        ensure_duration("interval_seconds", self.interval_seconds)?;
        if self.snapshot_key.trim().is_empty() {
            bail!("snapshot_key must not be empty");
        }

        if !(self.bitrate.min_dt >= 0.0 && self.bitrate.min_dt.is_finite()) {
            bail!("bitrate.min_dt must be a non-negative number, got {}", self.bitrate.min_dt);
        }
        if let Some(alpha) = self.bitrate.smooth_alpha {
            ensure_alpha("bitrate.smooth_alpha", alpha)?;
        }
        ensure_positive("bitrate.ttl", self.bitrate.ttl)?;

        ensure_alpha("rtt.ewma_alpha", self.rtt.ewma_alpha)?;
        ensure_positive("rtt.min_period", self.rtt.min_period)?;
        ensure_positive("rtt.ttl", self.rtt.ttl)?;
        ensure_duration("rtt.timeout", self.rtt.timeout)?;

        debug!(config = ?self, "Configuration validated");
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        seconds(self.interval_seconds)
    }
}

impl BitrateConfig {
    pub fn min_interval(&self) -> Duration {
        seconds(self.min_dt)
    }

    pub fn ttl(&self) -> Duration {
        seconds(self.ttl)
    }
}

impl RttConfig {
    pub fn min_period(&self) -> Duration {
        seconds(self.min_period)
    }

    pub fn ttl(&self) -> Duration {
        seconds(self.ttl)
    }

    pub fn timeout(&self) -> Duration {
        seconds(self.timeout)
    }
}

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

fn ensure_positive(name: &str, value: f64) -> Result<()> {
    if !(value > 0.0 && value.is_finite()) {
        bail!("{name} must be a positive number, got {value}");
    }
    Ok(())
}

/// Timers cannot run on a zero period, so the value must survive the
/// conversion to `Duration` as non-zero.
fn ensure_duration(name: &str, value: f64) -> Result<()> {
    ensure_positive(name, value)?;
    if seconds(value).is_zero() {
        bail!("{name} is too small to be used as a period, got {value}");
    }
    Ok(())
}

fn ensure_alpha(name: &str, value: f64) -> Result<()> {
    if !(value > 0.0 && value <= 1.0) {
        bail!("{name} must be in (0, 1], got {value}");
    }
    Ok(())
}
