use axum::Extension;
use axum::Json;
use axum::http::StatusCode;
use chrono::Utc;
use tracing::error;

use crate::server::dtos::health_dto::{
    CacheHealth, HealthResponse, HealthStatus, ServiceHealthDetails,
};
use crate::server::services::proxy_services::ProxyServices;
use crate::server::{get_app_version, get_uptime_seconds};

/// health endpoint - the only dependency worth checking is the cache backend,
/// and even that one is optional
pub async fn health_endpoint(
    Extension(services): Extension<ProxyServices>,
) -> (StatusCode, Json<HealthResponse>) {
    let cache_health = check_cache_health(&services).await;

    // a dead cache degrades the proxy, it doesn't take it down
    let overall_status = if cache_health.status == HealthStatus::Unhealthy {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    let response = HealthResponse {
        status: overall_status,
        timestamp: Utc::now(),
        uptime_seconds: get_uptime_seconds(),
        version: get_app_version().to_string(),
        environment: format!("{:?}", services.config.cargo_env).to_lowercase(),
        services: ServiceHealthDetails {
            cache: cache_health,
        },
    };

    let http_status = match overall_status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (http_status, Json(response))
}

async fn check_cache_health(services: &ProxyServices) -> CacheHealth {
    let Some(redis) = services.redis.as_ref() else {
        return CacheHealth {
            enabled: false,
            status: HealthStatus::Healthy,
            response_time_ms: 0.0,
        };
    };

    match redis.health_check().await {
        Ok(response_time) => CacheHealth {
            enabled: true,
            status: HealthStatus::Healthy,
            response_time_ms: response_time,
        },
        Err(e) => {
            error!("Redis health check failed: {}", e);
            CacheHealth {
                enabled: true,
                status: HealthStatus::Unhealthy,
                response_time_ms: 0.0,
            }
        }
    }
}
