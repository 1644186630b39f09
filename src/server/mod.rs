pub mod api;
pub mod dtos;
pub mod error;
pub mod services;
pub mod utils;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use axum::{Extension, Router, http::Method, routing::get};
use once_cell::sync::Lazy;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::{config::AppConfig, database::RedisDatabase};

use self::api::{health_controller, proxy_controller::ProxyController};
use self::services::proxy_services::ProxyServices;

static SERVER_START: Lazy<Instant> = Lazy::new(Instant::now);

pub fn get_uptime_seconds() -> u64 {
    SERVER_START.elapsed().as_secs()
}

pub fn get_app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub struct ApplicationServer;

impl ApplicationServer {
    pub async fn serve(
        config: Arc<AppConfig>,
        redis_db: Option<RedisDatabase>,
    ) -> anyhow::Result<()> {
        // pin the uptime clock to actual startup, not the first /health call
        Lazy::force(&SERVER_START);

        let port = config.port;
        let services = ProxyServices::new(redis_db, config);
        let router = Self::router(services);

        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        info!("proxy listening on {}", addr);

        let listener = TcpListener::bind(addr)
            .await
            .context("failed to bind listener")?;

        axum::serve(listener, router)
            .await
            .context("server stopped unexpectedly")?;

        Ok(())
    }

    /// router construction lives apart from serve() so tests can drive the
    /// whole stack with tower's oneshot
    pub fn router(services: ProxyServices) -> Router {
        // every response gets the permissive cors treatment, the whole point of
        // this proxy is to be reachable from any browser player
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::HEAD, Method::POST, Method::OPTIONS])
            .allow_headers(Any)
            .max_age(Duration::from_secs(86400));

        Router::new()
            .merge(ProxyController::app())
            .route("/health", get(health_controller::health_endpoint))
            .layer(Extension(services))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }
}
