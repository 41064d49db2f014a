/// Error logging and reporting middleware
use crate::{context::AppContext, error::ApiError, reporting::ErrorReport};
use axum::{
    extract::{Request, State},
    http::header::HOST,
    middleware::Next,
    response::Response,
};
use tracing::{error, warn};

/// Log every error response; forward 5xx to the report chat if configured
///
/// Reports are sent from a detached task so the response is never delayed.
pub async fn report_errors(State(ctx): State<AppContext>, request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let url = match request.headers().get(HOST).and_then(|h| h.to_str().ok()) {
        Some(host) => format!("http://{}{}", host, request.uri()),
        None => request.uri().to_string(),
    };

    let response = next.run(request).await;
    let status = response.status();
    if !status.is_client_error() && !status.is_server_error() {
        return response;
    }

    let api_error = response.extensions().get::<ApiError>().cloned();
    let message = api_error
        .as_ref()
        .map(|e| e.body().error)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string());

    if status.is_server_error() {
        error!(
            status = status.as_u16(),
            method = %method,
            path = %path,
            error = ?api_error,
            "Error {}: {}", status.as_u16(), message
        );
    } else {
        warn!(
            status = status.as_u16(),
            method = %method,
            path = %path,
            "Error {}: {}", status.as_u16(), message
        );
    }

    if status.is_server_error() {
        if let Some(reporter) = ctx.reporter.clone() {
            let report = ErrorReport {
                status: status.as_u16(),
                method,
                url,
                message,
                detail: api_error
                    .map(|e| format!("{:?}", e))
                    .unwrap_or_else(|| "no detail".to_string()),
            };
            tokio::spawn(async move {
                reporter.send(&report).await;
            });
        }
    }

    response
}
