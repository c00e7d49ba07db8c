use anyhow::Result;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "admin.yaml".to_string());

    let config = admin_channel::config::load_config(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log.level)),
        )
        .init();

    info!(path = config_path.as_str(), "config loaded");

    let app = admin_channel::app::App::new(config)?;
    app.run().await?;

    Ok(())
}
