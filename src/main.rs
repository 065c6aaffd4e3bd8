use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pgcradle::config::Config;
use pgcradle::scenario;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pgcradle=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    tracing::info!(
        "bringing up {} against an ephemeral cluster",
        config.service_bin
    );

    scenario::run(config).await?;
    tracing::info!("scenario completed");
    Ok(())
}
