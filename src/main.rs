use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use daytime::DaytimeConfig;

#[derive(Parser, Debug)]
#[command(version, about = "Daytime server", long_about = None)]
struct Opt {
    #[command(flatten)]
    config: DaytimeConfig,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, value_name = "FILTER", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = Opt::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&opt.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let handle = daytime::activate(opt.config).await?;
    info!("Serving daytime on {}", handle.local_addr());

    let stopped = tokio::signal::ctrl_c().await;
    handle.deactivate().await;
    stopped?;
    Ok(())
}
