/// HTTP server setup and routing
use crate::{
    api::middleware::report_errors,
    context::AppContext,
    error::{ApiError, ApiResult},
    metrics::{metrics_handler, track_metrics},
    rate_limit::rate_limit_middleware,
};
use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Build the main application router
/// Returns Router<()> because state is already provided
pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .merge(crate::api::routes())
        .fallback(not_found)
        .with_state(ctx.clone())
        // Innermost first: limit, then log/report whatever came back
        .layer(middleware::from_fn_with_state(ctx.clone(), rate_limit_middleware))
        .layer(middleware::from_fn_with_state(ctx.clone(), report_errors))
        .layer(middleware::from_fn(track_metrics))
        .layer(cors_layer(&ctx.config.service.allowed_origins))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

/// CORS with credentials; no configured origins means mirror any origin
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::mirror_request()
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// 404 handler
async fn not_found() -> ApiError {
    ApiError::NotFound
}

/// Start the HTTP server
pub async fn serve(ctx: AppContext) -> ApiResult<()> {
    let addr = format!("{}:{}", ctx.config.service.hostname, ctx.config.service.port);

    info!("🚀 TeleDrive API listening on {}", addr);
    info!("   Health check: {}/ping", ctx.service_url());

    let app = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

    // Peer addresses feed the per-IP rate limiter
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
