//! Anti-forgery token management.
//!
//! Every query and every tenant switch needs a token alongside the session
//! credentials. Tokens are short-lived and die on every tenant switch, so
//! the refresher is the single place that talks to the token-issuance
//! endpoint and the single mutator of the session's token field.

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{HarvestError, Result};
use crate::traits::transport::Transport;
use crate::types::session::SessionState;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY_MS: u64 = 500;
const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Bounded-retry policy with exponential backoff.
///
/// Shared by the refresher and the query executor; the delay doubles per
/// attempt and is capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,

    /// Delay before the first retry
    pub base_delay: Duration,

    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries, for tests and latency-sensitive paths.
    pub fn no_retries() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay to sleep before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Obtains and caches the anti-forgery token for a session.
#[derive(Debug, Clone, Default)]
pub struct CredentialRefresher {
    retry: RetryPolicy,
}

impl CredentialRefresher {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    /// Return a usable token, fetching one if needed.
    ///
    /// With `force = false` a cached token is returned as-is. Otherwise the
    /// issuance call runs with bounded retries for transient failures. An
    /// authorization rejection is terminal for the whole run
    /// ([`HarvestError::SessionInvalid`]) and is never retried; retry
    /// exhaustion yields [`HarvestError::CredentialRefreshFailed`].
    pub async fn ensure_token<T: Transport>(
        &self,
        transport: &T,
        session: &mut SessionState,
        force: bool,
    ) -> Result<String> {
        if !session.has_credentials() {
            return Err(HarvestError::SessionMissing);
        }

        if !force {
            if let Some(token) = session.token() {
                return Ok(token.to_string());
            }
        }

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match transport.issue_token(session).await {
                Ok(token) => {
                    debug!(attempt, "anti-forgery token refreshed");
                    session.set_token(token.clone());
                    return Ok(token);
                }
                Err(crate::error::TransportError::Unauthorized) => {
                    warn!("token issuance rejected; session is invalid");
                    return Err(HarvestError::SessionInvalid);
                }
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "token issuance failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    return Err(HarvestError::CredentialRefreshFailed {
                        attempts: attempt,
                        source: err,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::testing::MockTransport;

    fn session() -> SessionState {
        SessionState::from_credentials([("sid", "s3cret")])
    }

    #[tokio::test]
    async fn cached_token_is_returned_without_a_call() {
        let transport = MockTransport::new();
        let refresher = CredentialRefresher::default();
        let mut session = session();
        session.set_token("cached".into());

        let token = refresher
            .ensure_token(&transport, &mut session, false)
            .await
            .unwrap();
        assert_eq!(token, "cached");
        assert_eq!(transport.token_calls(), 0);
    }

    #[tokio::test]
    async fn force_refresh_replaces_cached_token() {
        let transport = MockTransport::new();
        let refresher = CredentialRefresher::default();
        let mut session = session();
        session.set_token("stale".into());

        let token = refresher
            .ensure_token(&transport, &mut session, true)
            .await
            .unwrap();
        assert_ne!(token, "stale");
        assert_eq!(session.token(), Some(token.as_str()));
        assert_eq!(transport.token_calls(), 1);
    }

    #[tokio::test]
    async fn missing_credentials_never_reach_the_wire() {
        let transport = MockTransport::new();
        let refresher = CredentialRefresher::default();
        let mut session = SessionState::from_credentials(Vec::<(String, String)>::new());

        let err = refresher
            .ensure_token(&transport, &mut session, false)
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::SessionMissing));
        assert_eq!(transport.token_calls(), 0);
    }

    #[tokio::test]
    async fn unauthorized_is_terminal_and_not_retried() {
        let transport = MockTransport::new().fail_token_with(|| TransportError::Unauthorized);
        let refresher = CredentialRefresher::default();
        let mut session = session();

        let err = refresher
            .ensure_token(&transport, &mut session, false)
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::SessionInvalid));
        assert_eq!(transport.token_calls(), 1);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_then_exhausted() {
        let transport = MockTransport::new().fail_token_with(|| TransportError::Server(503));
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        let refresher = CredentialRefresher::new(policy);
        let mut session = session();

        let err = refresher
            .ensure_token(&transport, &mut session, false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HarvestError::CredentialRefreshFailed { attempts: 3, .. }
        ));
        assert_eq!(transport.token_calls(), 3);
    }

    #[tokio::test]
    async fn transient_failure_recovers_mid_retry() {
        let transport = MockTransport::new().fail_token_times(2, || TransportError::Timeout);
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        let refresher = CredentialRefresher::new(policy);
        let mut session = session();

        let token = refresher
            .ensure_token(&transport, &mut session, false)
            .await
            .unwrap();
        assert!(!token.is_empty());
        assert_eq!(transport.token_calls(), 3);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(350));
        assert_eq!(policy.delay_for(4), Duration::from_millis(350));
    }
}
