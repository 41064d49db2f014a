/// Liveness and health endpoints
///
/// `/ping` only proves the process answers. `/api/health` reports which
/// backing services are configured; `/api/health/detailed` checks that they
/// are reachable and adds timings.
use crate::{context::AppContext, db};
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Summary health response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub status: String,
    pub timestamp: String,
    pub database: bool,
    pub redis: bool,
    pub telegram: bool,
}

/// Detailed health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// "healthy", "degraded" or "unhealthy"
    pub status: String,

    pub version: String,

    pub checks: Vec<ComponentHealth>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Health of one backing service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,

    /// "healthy", "degraded" or "unhealthy"
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Build health check routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/ping", get(ping))
        .route("/api/health", get(health))
        .route("/api/health/detailed", get(health_detailed))
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub async fn ping() -> Json<serde_json::Value> {
    tracing::debug!("Health check: /ping");
    Json(serde_json::json!({
        "pong": true,
        "timestamp": now_iso(),
    }))
}

pub async fn health(State(ctx): State<AppContext>) -> Json<HealthSummary> {
    let summary = HealthSummary {
        status: "ok".to_string(),
        timestamp: now_iso(),
        database: ctx.database_configured(),
        redis: ctx.redis_configured(),
        telegram: ctx.telegram_configured(),
    };
    tracing::debug!(?summary, "Health check: /api/health");
    Json(summary)
}

/// Detailed health check with per-component status
pub async fn health_detailed(State(ctx): State<AppContext>) -> (StatusCode, Json<HealthStatus>) {
    let start = Instant::now();
    let checks = vec![check_database(&ctx).await, check_cache(&ctx).await];

    let overall_status = determine_overall_status(&checks);
    let health = HealthStatus {
        status: overall_status.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks,
        message: if overall_status == "healthy" {
            None
        } else {
            Some("One or more components are unhealthy".to_string())
        },
    };

    let status_code = match overall_status.as_str() {
        "healthy" | "degraded" => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    };

    tracing::info!(
        status = %overall_status,
        duration_ms = start.elapsed().as_millis(),
        "health_check_completed"
    );

    (status_code, Json(health))
}

async fn check_database(ctx: &AppContext) -> ComponentHealth {
    let start = Instant::now();

    match db::test_connection(&ctx.db).await {
        Ok(_) => ComponentHealth {
            name: "database".to_string(),
            status: "healthy".to_string(),
            response_time_ms: Some(start.elapsed().as_millis() as u64),
            error: None,
            details: Some(serde_json::json!({
                "type": "sqlite",
                "pool_size": ctx.db.size(),
            })),
        },
        Err(e) => ComponentHealth {
            name: "database".to_string(),
            status: "unhealthy".to_string(),
            response_time_ms: Some(start.elapsed().as_millis() as u64),
            error: Some(e.to_string()),
            details: None,
        },
    }
}

/// Redis outage degrades rather than fails: the memory fallback keeps serving
async fn check_cache(ctx: &AppContext) -> ComponentHealth {
    let start = Instant::now();
    let backend = if ctx.cache.is_distributed() { "redis" } else { "memory" };

    let (status, error) = match ctx.cache.ping().await {
        Ok(_) => ("healthy", None),
        Err(e) => ("degraded", Some(e.to_string())),
    };

    ComponentHealth {
        name: "cache".to_string(),
        status: status.to_string(),
        response_time_ms: Some(start.elapsed().as_millis() as u64),
        error,
        details: Some(serde_json::json!({
            "backend": backend,
            "memory_entries": ctx.cache.memory().len(),
        })),
    }
}

fn determine_overall_status(checks: &[ComponentHealth]) -> String {
    if checks.iter().any(|c| c.status == "unhealthy") {
        "unhealthy".to_string()
    } else if checks.iter().any(|c| c.status == "degraded") {
        "degraded".to_string()
    } else {
        "healthy".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(status: &str) -> ComponentHealth {
        ComponentHealth {
            name: "c".to_string(),
            status: status.to_string(),
            response_time_ms: None,
            error: None,
            details: None,
        }
    }

    #[test]
    fn test_determine_overall_status() {
        assert_eq!(
            determine_overall_status(&[component("healthy"), component("healthy")]),
            "healthy"
        );
        assert_eq!(
            determine_overall_status(&[component("healthy"), component("degraded")]),
            "degraded"
        );
        assert_eq!(
            determine_overall_status(&[component("degraded"), component("unhealthy")]),
            "unhealthy"
        );
    }

    #[test]
    fn test_health_status_serialization() {
        let status = HealthStatus {
            status: "healthy".to_string(),
            version: "0.1.0".to_string(),
            checks: vec![component("healthy")],
            message: None,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "healthy");
        assert!(json.get("message").is_none());
        assert!(json["checks"][0].get("error").is_none());
    }
}
