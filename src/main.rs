use anyhow::Context;
use clap::Parser;
use memchart::{
    buffer::SharedBuffer,
    collector::{Collector, SysinfoProbe},
    config::Config,
    persist, server,
};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(config.log_level())?;

    let buffer = persist::load(&config.data)
        .with_context(|| format!("failed to seed samples from {}", config.data.display()))?;
    info!(samples = buffer.len(), path = %config.data.display(), "seeded");
    let buffer = SharedBuffer::new(buffer);

    let (stop_collector, stopped) = watch::channel(());
    let collector = Collector::new(buffer.clone(), SysinfoProbe::new(), config.data.clone())
        .interval(config.interval)
        .retention(config.retention);
    let collector = tokio::spawn(collector.run(stopped));

    let addr = config.addr();
    info!(addr = %addr, "listening");
    let served = server::serve(&addr, buffer, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    })
    .await;

    let _ = stop_collector.send(());
    collector.await.context("collector task")?;
    served.with_context(|| format!("failed to serve on {addr}"))?;
    Ok(())
}

fn init_tracing(default_level: &str) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
}
