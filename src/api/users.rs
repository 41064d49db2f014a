/// Endpoints exposing the authenticated identity
use crate::{
    auth::{AuthContext, OptionalAuthContext},
    context::AppContext,
    db::User,
    telegram::RemoteIdentity,
};
use axum::{response::Json, routing::get, Router};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user: User,
    pub user_auth: RemoteIdentity,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub authenticated: bool,
    pub user: Option<User>,
    pub user_auth: Option<RemoteIdentity>,
}

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/v1/users/me", get(me))
        .route("/api/v1/auth/session", get(session))
}

/// Current user; requires a resolvable credential with a local user
pub async fn me(auth: AuthContext) -> Json<MeResponse> {
    Json(MeResponse {
        user: auth.user,
        user_auth: auth.user_auth,
    })
}

/// Session check; anonymous callers get `authenticated: false`
pub async fn session(auth: OptionalAuthContext) -> Json<SessionResponse> {
    Json(SessionResponse {
        authenticated: auth.is_authenticated(),
        user: auth.user().cloned(),
        user_auth: auth.user_auth().cloned(),
    })
}
