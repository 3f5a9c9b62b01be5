use crate::Args;
use chrono::Utc;
use color_eyre::Result;
use eyre::Context as _;
use mediamtx_monitor_collector::{
    Cache,
    Collector,
    MemoryCache,
    PingProbe,
    Probe,
    StreamCollector,
};
use mediamtx_monitor_config::Config;
use mediamtx_monitor_http::AppState;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Wires the collector and the read API together over one shared cache.
pub struct App {
    config: Config,
    once: bool,
}

impl App {
    pub fn new(args: Args) -> Result<Self> {
        let once = args.once;
        let config = Config::new(args).wrap_err("Failed to load the configuration")?;
        config.validate()?;
        Ok(Self { config, once })
    }

    pub async fn run(self) -> Result<()> {
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
        let probe: Arc<dyn Probe> = Arc::new(PingProbe::new());
        let mut collector = StreamCollector::new(&self.config, cache.clone(), probe)?;

        if self.once {
            collector.collect(Utc::now()).await?;
            println!("{}", collector.format());
            return Ok(());
        }

        let cancel = CancellationToken::new();
        let collector_task = tokio::spawn(collector.run(cancel.clone()));
        let http_task = self.config.http.enabled.then(|| {
            let state = AppState::new(&self.config, cache.clone());
            tokio::spawn(mediamtx_monitor_http::serve(
                self.config.http.listen_address,
                state,
                cancel.clone(),
            ))
        });

        let served = match http_task {
            Some(mut http_task) => tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    cancel.cancel();
                    signal.wrap_err("Failed to listen for ctrl-c")?;
                    info!("Shutting down");
                    http_task.await.wrap_err("The read API task panicked")?
                }
                joined = &mut http_task => {
                    cancel.cancel();
                    joined.wrap_err("The read API task panicked")?
                }
            },
            None => {
                let signal = tokio::signal::ctrl_c().await;
                cancel.cancel();
                signal.wrap_err("Failed to listen for ctrl-c")?;
                info!("Shutting down");
                Ok(())
            }
        };

        collector_task.await.wrap_err("The collector task panicked")?;
        served
    }
}
