use clap::Parser;
use std::{
    net::SocketAddr,
    path::PathBuf,
};

/// MediaMTX stream monitor
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version = version(), about, long_about = None)]
pub struct Args {
    /// Path to a YAML config file. Defaults to `config.yaml` in the config directory.
    #[clap(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Base URL of the MediaMTX control API.
    #[clap(long, value_name = "URL", env = "MEDIAMTX_API_BASE_URL")]
    pub api_base_url: Option<String>,

    /// Seconds between two collection cycles.
    #[clap(long = "interval", value_name = "SECONDS")]
    pub interval_seconds: Option<f64>,

    /// Mirror every snapshot to this JSON file.
    #[clap(long = "output-json", value_name = "FILE")]
    pub output_json_path: Option<PathBuf>,

    /// Address the read API listens on.
    #[clap(long = "listen", value_name = "ADDR", env = "MEDIAMTX_MONITOR_LISTEN")]
    pub listen_address: Option<SocketAddr>,

    /// Do not start the read API.
    #[clap(long = "no-http", action)]
    pub no_http: bool,

    /// Run a single collection cycle, print the snapshot and exit.
    #[clap(long, action)]
    pub once: bool,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[clap(short, long, action)]
    pub verbose: bool,
}

mod config_ext {
    use super::*;
    use config::{
        Map,
        Source,
        Value,
    };
    use std::collections::HashMap;

    impl Source for Args {
        fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
            Box::new((*self).clone())
        }

        fn collect(&self) -> Result<Map<String, Value>, config::ConfigError> {
            let mut cache = HashMap::<String, Value>::new();
            if let Some(url) = &self.api_base_url {
                cache.insert("api_base_url".to_string(), url.clone().into());
            }
            if let Some(interval) = self.interval_seconds {
                cache.insert("interval_seconds".to_string(), interval.into());
            }
            if let Some(path) = &self.output_json_path {
                cache.insert("output_json_path".to_string(), path.display().to_string().into());
            }
            if let Some(address) = &self.listen_address {
                cache.insert("http.listen_address".to_string(), address.to_string().into());
            }
            if self.no_http {
                cache.insert("http.enabled".to_string(), false.into());
            }
            Ok(cache)
        }
    }
}

pub fn version() -> String {
    let author = clap::crate_authors!();
    let config_file = crate::dirs::default_config_file();

    format!(
        "\
Authors: {author}

Config file: {}",
        config_file.display()
    )
}
