/// TeleDrive API
///
/// HTTP API whose requests authenticate with a signed session token that
/// wraps a Telegram session; the session is resolved to a Telegram identity
/// and a local user, cached per credential.

mod api;
mod auth;
mod cache;
mod config;
mod context;
mod db;
mod error;
mod identity;
mod metrics;
mod rate_limit;
mod reporting;
mod server;
mod telegram;

#[cfg(test)]
mod testing;

use anyhow::Context;
use config::ServerConfig;
use context::AppContext;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = ServerConfig::from_env().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config);

    // Print banner
    print_banner(&config);

    // Create application context
    let ctx = AppContext::new(config)
        .await
        .context("Failed to initialize application")?;

    // Start server
    server::serve(ctx).await?;

    Ok(())
}

fn init_tracing(config: &ServerConfig) {
    let filter = EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn print_banner(config: &ServerConfig) {
    println!(
        r#"
  _______   _      _____       _
 |__   __| | |    |  __ \     (_)
    | | ___| | ___| |  | |_ __ ___   _____
    | |/ _ \ |/ _ \ |  | | '__| \ \ / / _ \
    | |  __/ |  __/ |__| | |  | |\ V /  __/
    |_|\___|_|\___|_____/|_|  |_| \_/ \___|

    API v{}  ({})
"#,
        env!("CARGO_PKG_VERSION"),
        if config.service.production {
            "production"
        } else {
            "development"
        }
    );
}
