/// Authentication guards and extractors
///
/// Request pipeline: credential -> verify token -> build client -> connect ->
/// cache-first identity resolution (getMe with retries, then local user).
/// `AuthContext` rejects on any failure; `OptionalAuthContext` lets requests
/// with missing or unusable credentials through as anonymous.

pub mod token;

use crate::{
    cache::{categories, CacheClient},
    context::AppContext,
    db::{User, UserDirectory},
    error::{ApiError, ApiResult},
    identity::IdentityResolver,
    metrics,
    telegram::{ClientFactory, RemoteIdentity, TelegramClient},
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts, http::HeaderMap};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use token::{extract_credential, fingerprint, verify_token};
use tracing::{debug, error, warn};

/// Cached outcome of resolving a credential
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedIdentity {
    pub user_auth: RemoteIdentity,
    pub user: Option<User>,
}

/// What to do when the remote identity has no local user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MissingUser {
    /// Fail the fill; nothing is cached
    Reject,
    /// Cache and return `(identity, None)`
    Allow,
}

/// Authenticated context - the required guard's result
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub auth_key: String,
    /// Connected client; downstream handlers own its lifecycle
    pub tg: Arc<TelegramClient>,
    pub user: User,
    pub user_auth: RemoteIdentity,
}

/// A credential that verified and resolved, with or without a local user
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub auth_key: String,
    pub tg: Arc<TelegramClient>,
    pub user: Option<User>,
    pub user_auth: RemoteIdentity,
}

/// Optional authenticated context - the optional guard's result
///
/// `session: None` means "not authenticated"; `Some` with `user: None` means
/// "identity known, user unknown".
#[derive(Debug, Clone, Default)]
pub struct OptionalAuthContext {
    pub session: Option<SessionContext>,
}

impl OptionalAuthContext {
    pub fn anonymous() -> Self {
        Self { session: None }
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    pub fn user(&self) -> Option<&User> {
        self.session.as_ref().and_then(|s| s.user.as_ref())
    }

    pub fn user_auth(&self) -> Option<&RemoteIdentity> {
        self.session.as_ref().map(|s| &s.user_auth)
    }
}

/// Runs both guard policies over shared collaborators
#[derive(Clone)]
pub struct Authenticator {
    jwt_secret: String,
    cookie_name: String,
    clients: ClientFactory,
    resolver: IdentityResolver,
    cache: CacheClient,
    users: Arc<dyn UserDirectory>,
    ttl_secs: u64,
}

impl Authenticator {
    pub fn new(
        jwt_secret: String,
        cookie_name: String,
        clients: ClientFactory,
        resolver: IdentityResolver,
        cache: CacheClient,
        users: Arc<dyn UserDirectory>,
        ttl_secs: u64,
    ) -> Self {
        Self {
            jwt_secret,
            cookie_name,
            clients,
            resolver,
            cache,
            users,
            ttl_secs,
        }
    }

    /// Required guard
    pub async fn require(&self, headers: &HeaderMap, path: &str) -> ApiResult<AuthContext> {
        let result = self.require_inner(headers, path).await;
        if let Err(e) = &result {
            metrics::record_auth_failure("required", e.kind());
        }
        result
    }

    async fn require_inner(&self, headers: &HeaderMap, path: &str) -> ApiResult<AuthContext> {
        let auth_key = extract_credential(headers, &self.cookie_name).ok_or_else(|| {
            warn!(path = %path, "Auth: no auth key provided");
            ApiError::MissingCredential
        })?;

        let tg = Arc::new(self.build_client(&auth_key, path)?);
        self.connect(&tg, path).await?;

        let resolved = self.resolve(&auth_key, &tg, MissingUser::Reject).await?;

        // An optional-guard fill may have cached a user-less entry
        let user = resolved.user.ok_or_else(|| {
            warn!(path = %path, key = %fingerprint(&auth_key), "Auth: cached identity has no local user");
            ApiError::UserNotFound
        })?;

        Ok(AuthContext {
            auth_key,
            tg,
            user,
            user_auth: resolved.user_auth,
        })
    }

    /// Optional guard
    ///
    /// Missing credential, invalid token and unusable session continue as
    /// anonymous. Connection and identity-lookup failures still surface.
    pub async fn maybe(&self, headers: &HeaderMap, path: &str) -> ApiResult<OptionalAuthContext> {
        let Some(auth_key) = extract_credential(headers, &self.cookie_name) else {
            return Ok(OptionalAuthContext::anonymous());
        };

        let tg = match self.build_client(&auth_key, path) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                debug!(path = %path, "Auth: continuing unauthenticated ({})", e.kind());
                metrics::record_auth_failure("optional", e.kind());
                return Ok(OptionalAuthContext::anonymous());
            }
        };
        self.connect(&tg, path).await?;

        let resolved = match self.resolve(&auth_key, &tg, MissingUser::Allow).await {
            // Joined a required-guard fill that rejected
            Err(ApiError::UserNotFound) => self.resolve_unshared(&auth_key, &tg).await?,
            other => other?,
        };

        Ok(OptionalAuthContext {
            session: Some(SessionContext {
                auth_key,
                tg,
                user: resolved.user,
                user_auth: resolved.user_auth,
            }),
        })
    }

    /// Verify the token and build an unconnected client for its session
    fn build_client(&self, auth_key: &str, path: &str) -> ApiResult<TelegramClient> {
        let claim = verify_token(auth_key, &self.jwt_secret).map_err(|e| {
            if let ApiError::InvalidToken { reason } = &e {
                warn!(path = %path, "Auth: invalid token: {}", reason);
            }
            e
        })?;
        debug!(path = %path, "Auth: token verified");

        let client = self.clients.create(&claim.session).map_err(|e| {
            if let ApiError::ClientConstruction { reason } = &e {
                error!(path = %path, "Auth: failed to create Telegram client: {}", reason);
            }
            e
        })?;
        debug!(path = %path, "Auth: Telegram client created");

        Ok(client)
    }

    async fn connect(&self, tg: &TelegramClient, path: &str) -> ApiResult<()> {
        tg.connect().await.map_err(|e| {
            error!(path = %path, "Auth: failed to connect Telegram client: {}", e);
            e
        })?;
        debug!(path = %path, "Auth: Telegram client connected");
        Ok(())
    }

    /// Cache-first identity resolution keyed by the raw credential
    async fn resolve(
        &self,
        auth_key: &str,
        tg: &Arc<TelegramClient>,
        policy: MissingUser,
    ) -> ApiResult<ResolvedIdentity> {
        let resolver = self.resolver.clone();
        let users = Arc::clone(&self.users);
        let tg = Arc::clone(tg);
        let key = fingerprint(auth_key);

        self.cache
            .get_or_compute(categories::AUTH, auth_key, self.ttl_secs, move || {
                fill(resolver, users, tg, policy, key)
            })
            .await
    }

    /// Optional-policy resolution that never joins a shared fill
    ///
    /// Used once a joined fill has rejected: any flight on this key may be
    /// running the rejecting policy again.
    async fn resolve_unshared(
        &self,
        auth_key: &str,
        tg: &Arc<TelegramClient>,
    ) -> ApiResult<ResolvedIdentity> {
        if let Some(resolved) = self.cache.get(categories::AUTH, auth_key).await {
            return Ok(resolved);
        }

        let resolved = fill(
            self.resolver.clone(),
            Arc::clone(&self.users),
            Arc::clone(tg),
            MissingUser::Allow,
            fingerprint(auth_key),
        )
        .await?;

        if let Err(e) = self
            .cache
            .set(categories::AUTH, auth_key, &resolved, self.ttl_secs)
            .await
        {
            warn!("Auth: failed to cache resolved identity: {}", e);
        }
        Ok(resolved)
    }
}

/// One cache fill: remote identity, then the local user, then the policy
async fn fill(
    resolver: IdentityResolver,
    users: Arc<dyn UserDirectory>,
    tg: Arc<TelegramClient>,
    policy: MissingUser,
    key: String,
) -> ApiResult<ResolvedIdentity> {
    let user_auth = resolver.resolve(&tg).await?;
    let user = users.find_first_by_tg_id(&user_auth.external_id()).await?;

    match (user, policy) {
        (Some(user), _) => Ok(ResolvedIdentity {
            user_auth,
            user: Some(user),
        }),
        (None, MissingUser::Allow) => Ok(ResolvedIdentity { user_auth, user: None }),
        (None, MissingUser::Reject) => {
            warn!(key = %key, tg_id = user_auth.id, "Auth: user not found");
            Err(ApiError::UserNotFound)
        }
    }
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        state
            .authenticator
            .require(&parts.headers, parts.uri.path())
            .await
    }
}

#[async_trait]
impl FromRequestParts<AppContext> for OptionalAuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        state
            .authenticator
            .maybe(&parts.headers, parts.uri.path())
            .await
    }
}
