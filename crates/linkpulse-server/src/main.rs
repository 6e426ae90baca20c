use anyhow::{Context, Result};
use linkpulse_server::{config, resources, supervisor};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::from_env().context("failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},sqlx=warn", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting linkpulse");

    let resources = resources::ResourceHandles::connect(&config)
        .await
        .context("failed to acquire resource handles")?;

    supervisor::run(config, resources).await
}
