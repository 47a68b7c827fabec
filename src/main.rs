//! hyperfaasd
//!
//! Accepts HTTP invocations for named functions and routes each one to a
//! pre-booted, isolated sandbox running that function's code. Keeps a pool
//! of warm instances per function to amortize sandbox boot latency.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hyperfaasd::config::Config;
use hyperfaasd::lifecycle;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting hyperfaasd");
    info!(
        backend = ?config.backend,
        listen_addr = %config.listen_addr,
        catalog_dir = %config.catalog_dir.display(),
        "Configuration loaded"
    );

    lifecycle::run(config).await
}
