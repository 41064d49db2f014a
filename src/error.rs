/// Unified error types for the TeleDrive API
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the API
///
/// `Clone` so that a single failed cache fill can be handed to every
/// request waiting on the same in-flight resolution.
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    /// No credential in the Authorization header or cookie
    #[error("Auth key is required")]
    MissingCredential,

    /// Signature, expiry or claim shape check failed
    #[error("Access token is invalid")]
    InvalidToken { reason: String },

    /// Session blob could not be turned into a protocol client
    #[error("Invalid key")]
    ClientConstruction { reason: String },

    /// Transport handshake failed or timed out
    #[error("Failed to connect to Telegram")]
    Connection { reason: String },

    /// The remote "who am I" call failed
    #[error("Identity resolution error: {0}")]
    IdentityResolution(String),

    /// Remote identity has no local user row (required guard only)
    #[error("User not found")]
    UserNotFound,

    /// Database errors
    #[error("Database error: {0}")]
    Database(String),

    /// Cache store errors
    #[error("Cache error: {0}")]
    Cache(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate limiting errors
    #[error("Too many requests from this IP, please try again later.")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// Not found errors
    #[error("Not found")]
    NotFound,

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status this error maps to
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingCredential
            | ApiError::InvalidToken { .. }
            | ApiError::ClientConstruction { .. }
            | ApiError::UserNotFound => StatusCode::UNAUTHORIZED,
            ApiError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Connection { .. }
            | ApiError::IdentityResolution(_)
            | ApiError::Database(_)
            | ApiError::Cache(_)
            | ApiError::Config(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::MissingCredential => "missing_credential",
            ApiError::InvalidToken { .. } => "invalid_token",
            ApiError::ClientConstruction { .. } => "client_construction",
            ApiError::Connection { .. } => "connection",
            ApiError::IdentityResolution(_) => "identity_resolution",
            ApiError::UserNotFound => "user_not_found",
            ApiError::Database(_) => "database",
            ApiError::Cache(_) => "cache",
            ApiError::Config(_) => "config",
            ApiError::RateLimitExceeded { .. } => "rate_limited",
            ApiError::NotFound => "not_found",
            ApiError::Internal(_) => "internal",
        }
    }

    /// Body sent to the client
    pub fn body(&self) -> ErrorBody {
        let error = match self {
            // Don't leak details
            ApiError::Database(_) | ApiError::Cache(_) | ApiError::Internal(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };
        ErrorBody { error }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        ApiError::Database(e.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for ApiError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        ApiError::Database(format!("Migration failed: {}", e))
    }
}

impl From<redis::RedisError> for ApiError {
    fn from(e: redis::RedisError) -> Self {
        ApiError::Cache(e.to_string())
    }
}

/// JSON error body: `{"error": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Convert ApiError to HTTP response
///
/// The error itself rides along as a response extension so the reporting
/// middleware can log and forward it.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = (status, Json(self.body())).into_response();

        if let ApiError::RateLimitExceeded { retry_after } = &self {
            if let Ok(value) = retry_after.as_secs().to_string().parse() {
                response.headers_mut().insert("Retry-After", value);
            }
        }

        response.extensions_mut().insert(self);
        response
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_errors_are_unauthorized() {
        assert_eq!(ApiError::MissingCredential.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::InvalidToken { reason: "bad".into() }.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::ClientConstruction { reason: "bad".into() }.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::UserNotFound.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::Connection { reason: "timeout".into() }.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_user_visible_messages() {
        assert_eq!(ApiError::MissingCredential.body().error, "Auth key is required");
        assert_eq!(
            ApiError::InvalidToken { reason: "expired".into() }.body().error,
            "Access token is invalid"
        );
        assert_eq!(
            ApiError::ClientConstruction { reason: "base64".into() }.body().error,
            "Invalid key"
        );
        assert_eq!(
            ApiError::Connection { reason: "refused".into() }.body().error,
            "Failed to connect to Telegram"
        );
        assert_eq!(ApiError::UserNotFound.body().error, "User not found");
    }

    #[test]
    fn test_internal_details_hidden() {
        let err = ApiError::Database("no such table: users".into());
        assert_eq!(err.body().error, "Internal server error");
    }

    #[test]
    fn test_response_carries_error_extension() {
        let response = ApiError::UserNotFound.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(matches!(
            response.extensions().get::<ApiError>(),
            Some(ApiError::UserNotFound)
        ));
    }
}
