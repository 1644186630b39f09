use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;

use tracing::{info, warn};

use proxy::{AppConfig, ApplicationServer, Logger, RedisDatabase};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let config = Arc::new(AppConfig::parse());

    // init logger and sentry, guards are kept alive to flush logs and maintain sentry connection
    let _guards = Logger::init(config.cargo_env, config.debug, config.sentry_dsn.clone());

    info!("logger and env prepped...");

    // the cache backend is optional, the proxy runs fine with every lookup missing
    let redis_db = match config.redis_url.as_deref() {
        Some(redis_url) => {
            info!("connecting to redis...");
            match RedisDatabase::connect(redis_url).await {
                Ok(db) => {
                    info!("redis connection ok");
                    Some(db)
                }
                Err(e) => {
                    warn!("redis unavailable, continuing without cache: {}", e);
                    None
                }
            }
        }
        None => {
            info!("no REDIS_URL configured, caching disabled");
            None
        }
    };

    // serve the routes
    ApplicationServer::serve(config, redis_db)
        .await
        .context("proxy server failed to start")?;

    Ok(())
}
