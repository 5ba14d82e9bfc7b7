use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voicemesh::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RelayConfig::from_env()?;
    tracing::info!(
        bind_addr = %config.bind_addr,
        broker_prefix = %config.broker_prefix,
        "starting voicemesh relay"
    );

    let server = RelayServer::builder().config(config).build().await?;
    server.run().await?;
    Ok(())
}
