/// Per-client-IP rate limiting
use crate::{config::RateLimitConfig, context::AppContext, error::ApiError};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use governor::{
    clock::{Clock, DefaultClock},
    state::keyed::DefaultKeyedStateStore,
    Quota, RateLimiter as GovernorLimiter,
};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
    time::Duration,
};

type KeyedLimiter = GovernorLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

/// Paths under this prefix are limited
const LIMITED_PREFIX: &str = "/api";
/// Exempt from limiting
const HEALTH_PATH: &str = "/api/health";

/// Rate limiter keyed by client IP
///
/// Allows `max_requests` per `window`, replenished evenly across the window.
#[derive(Clone)]
pub struct RateLimiter {
    limiter: Arc<KeyedLimiter>,
    clock: DefaultClock,
    max_requests: NonZeroU32,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let max_requests = NonZeroU32::new(config.max_requests).unwrap_or(NonZeroU32::MIN);
        let period = config.window / max_requests.get();
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(max_requests))
            .allow_burst(max_requests);

        Self {
            limiter: Arc::new(GovernorLimiter::keyed(quota)),
            clock: DefaultClock::default(),
            max_requests,
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests.get()
    }

    /// Consume one request for `ip`
    pub fn check(&self, ip: IpAddr) -> Result<(), ApiError> {
        self.limiter.check_key(&ip).map_err(|not_until| {
            let wait = not_until.wait_time_from(self.clock.now());
            ApiError::RateLimitExceeded {
                retry_after: wait.max(Duration::from_secs(1)),
            }
        })
    }

    /// Drop state for clients that are back to a full quota
    pub fn retain_recent(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    /// Periodically forget idle clients
    pub fn spawn_cleanup(&self, every: Duration) -> tokio::task::JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                limiter.retain_recent();
            }
        })
    }
}

/// Client address: first `X-Forwarded-For` hop, else the peer address
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> IpAddr {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse().ok())
        .or_else(|| peer.map(|addr| addr.ip()))
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

fn is_limited(path: &str) -> bool {
    let under_api = path == LIMITED_PREFIX || path.starts_with("/api/");
    under_api && path != HEALTH_PATH
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(limiter) = ctx.rate_limiter.as_ref() else {
        return Ok(next.run(request).await);
    };
    if !is_limited(request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(request.headers(), peer);

    if let Err(e) = limiter.check(ip) {
        tracing::warn!(ip = %ip, path = %request.uri().path(), "Rate limit exceeded");
        return Err(e);
    }

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert("x-ratelimit-limit", limiter.max_requests().into());

    Ok(response)
}
