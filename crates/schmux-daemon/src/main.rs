use tracing_subscriber::EnvFilter;

use schmux_daemon::Daemon;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("schmux=info")))
        .init();

    let config_path = std::env::var("SCHMUX_CONFIG_FILE").unwrap_or_else(|_| "./schmux.toml".to_string());
    let config = schmux_core::Config::load(std::path::Path::new(&config_path))?;

    tracing::info!(data_dir = %config.data_dir.display(), repos = config.repos.len(), "starting schmux daemon");

    let daemon = Daemon::bootstrap(config).await?;
    daemon.spawn_background_tasks();

    tracing::info!("schmux daemon ready");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    Ok(())
}
