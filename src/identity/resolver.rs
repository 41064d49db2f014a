/// Identity Resolver - "who am I" with reconnect-before-retry
use crate::{error::ApiResult, metrics, telegram::{RemoteIdentity, TelegramClient}};
use std::time::Duration;
use tracing::{debug, warn};

/// Fixed-count, fixed-delay retry
///
/// Not exponential. Every error kind is retried the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub extra_attempts: u32,
    /// Pause before each extra attempt
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            extra_attempts: 2,
            delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IdentityResolver {
    policy: RetryPolicy,
}

impl IdentityResolver {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Resolve the identity behind `client`
    ///
    /// One attempt, then up to `extra_attempts` rounds of: sleep, `connect`,
    /// `get_me`. A failure anywhere in a round moves on to the next round; the
    /// last round's error is returned as is.
    pub async fn resolve(&self, client: &TelegramClient) -> ApiResult<RemoteIdentity> {
        let mut last_error = match client.get_me().await {
            Ok(me) => return Ok(me),
            Err(e) => e,
        };

        for attempt in 1..=self.policy.extra_attempts {
            warn!(
                "Identity lookup failed ({}), retry {}/{} in {:?}",
                last_error, attempt, self.policy.extra_attempts, self.policy.delay
            );
            metrics::record_identity_retry();
            tokio::time::sleep(self.policy.delay).await;

            let outcome = async {
                client.connect().await?;
                client.get_me().await
            }
            .await;

            match outcome {
                Ok(me) => {
                    debug!("Identity resolved on retry {}", attempt);
                    return Ok(me);
                }
                Err(e) => last_error = e,
            }
        }

        Err(last_error)
    }
}
