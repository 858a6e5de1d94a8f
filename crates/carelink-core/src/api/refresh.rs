//! Single-flight coordination for token refreshes.
//!
//! Refreshes that overlap in time are collapsed by an
//! [`async_singleflight::Group`]: the first caller runs the exchange and
//! everyone who joins while it is in flight gets the same result.
//!
//! The group forgets a call as soon as it completes, so a request whose
//! 401 lands just after a refresh finished would start a second one. Every
//! request therefore records the gate generation before it is sent; a
//! settled refresh bumps the generation, and a caller whose generation is
//! stale reuses the recorded outcome instead of calling the server again.

use std::future::Future;
use std::sync::Mutex;

use async_singleflight::Group;
use tracing::debug;

use super::error::ApiError;
use crate::auth::StoreError;

/// Single key: there is one session per client.
const REFRESH_KEY: &str = "session";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RefreshOutcome {
    Refreshed(String),
    Failed(String),
}

/// Why a refresh produced no token. Shared with every joined caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RefreshFailure {
    /// Nothing to exchange; the original 401 stands.
    NoRefreshToken,
    /// The refresh endpoint rejected the token or never answered.
    Expired(String),
    /// Reading or writing the credential store failed.
    Store(String),
}

impl RefreshFailure {
    pub(crate) fn into_api_error(self) -> ApiError {
        match self {
            RefreshFailure::NoRefreshToken => {
                ApiError::Unauthorized("no refresh token stored".to_string())
            }
            RefreshFailure::Expired(reason) => ApiError::SessionExpired(reason),
            RefreshFailure::Store(reason) => ApiError::Store(StoreError::Reported(reason)),
        }
    }
}

#[derive(Debug, Default)]
struct GateState {
    generation: u64,
    last: Option<RefreshOutcome>,
}

pub(crate) struct RefreshGate {
    state: Mutex<GateState>,
    flight: Group<String, RefreshFailure>,
}

impl RefreshGate {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(GateState::default()),
            flight: Group::new(),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, GateState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn generation(&self) -> u64 {
        self.state().generation
    }

    /// Outcome settled after `seen_generation` was observed, if any.
    pub(crate) fn settled_since(&self, seen_generation: u64) -> Option<RefreshOutcome> {
        let state = self.state();
        if state.generation != seen_generation {
            state.last.clone()
        } else {
            None
        }
    }

    /// Run `refresh` unless an outcome newer than `seen_generation` exists,
    /// joining a refresh that is already in flight.
    ///
    /// A successful or expired refresh is recorded for later arrivals.
    /// [`RefreshFailure::NoRefreshToken`] and store failures are not.
    pub(crate) async fn run<F, Fut>(
        &self,
        seen_generation: u64,
        refresh: F,
    ) -> Result<String, RefreshFailure>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, RefreshFailure>>,
    {
        if let Some(outcome) = self.settled_since(seen_generation) {
            debug!("Reusing outcome of an earlier refresh");
            return outcome.into_result();
        }

        let (token, failure, _shared) = self
            .flight
            .work(REFRESH_KEY, async {
                // Settled between the check above and this flight starting
                if let Some(outcome) = self.settled_since(seen_generation) {
                    return outcome.into_result();
                }

                let result = refresh().await;
                match result {
                    Ok(ref token) => self.settle(RefreshOutcome::Refreshed(token.clone())),
                    Err(RefreshFailure::Expired(ref reason)) => {
                        self.settle(RefreshOutcome::Failed(reason.clone()))
                    }
                    Err(_) => {}
                }
                result
            })
            .await;

        match (token, failure) {
            (Some(token), _) => Ok(token),
            (None, Some(failure)) => Err(failure),
            (None, None) => Err(RefreshFailure::Expired(
                "refresh finished without a result".to_string(),
            )),
        }
    }

    /// Record a token obtained outside a refresh, e.g. by logging in.
    pub(crate) fn install(&self, access_token: String) {
        self.settle(RefreshOutcome::Refreshed(access_token));
    }

    /// Record that the session ended, e.g. by logging out.
    pub(crate) fn revoke(&self, reason: &str) {
        self.settle(RefreshOutcome::Failed(reason.to_string()));
    }

    fn settle(&self, outcome: RefreshOutcome) {
        let mut state = self.state();
        state.last = Some(outcome);
        state.generation += 1;
    }
}

impl RefreshOutcome {
    fn into_result(self) -> Result<String, RefreshFailure> {
        match self {
            RefreshOutcome::Refreshed(token) => Ok(token),
            RefreshOutcome::Failed(reason) => Err(RefreshFailure::Expired(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_first_caller_refreshes() {
        let gate = RefreshGate::new();
        let seen = gate.generation();

        let token = gate.run(seen, || async { Ok("new".to_string()) }).await;

        assert_eq!(token.as_deref(), Ok("new"));
        assert_eq!(gate.generation(), seen + 1);
    }

    #[tokio::test]
    async fn test_later_arrival_reuses_refreshed_token() {
        let gate = RefreshGate::new();
        let seen = gate.generation();
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let refresh = move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok("new".to_string())
        };
        gate.run(seen, refresh).await.unwrap();

        // Same generation observed before sending: the refresh already happened
        let reused = gate.run(seen, refresh).await;
        assert_eq!(reused.as_deref(), Ok("new"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // A request sent after the refresh leads its own attempt
        gate.run(gate.generation(), refresh).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_overlapping_callers_share_one_refresh() {
        let gate = RefreshGate::new();
        let seen = gate.generation();
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let refresh = move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok("new".to_string())
        };
        let results =
            futures::future::join_all((0..4).map(|_| gate.run(seen, refresh))).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| r.as_deref() == Ok("new")));
    }

    #[tokio::test]
    async fn test_failure_is_shared() {
        let gate = RefreshGate::new();
        let seen = gate.generation();

        let failed = gate
            .run(seen, || async {
                Err(RefreshFailure::Expired("refresh rejected".to_string()))
            })
            .await;
        assert_eq!(
            failed,
            Err(RefreshFailure::Expired("refresh rejected".to_string()))
        );

        assert_eq!(
            gate.settled_since(seen),
            Some(RefreshOutcome::Failed("refresh rejected".to_string()))
        );
    }

    #[tokio::test]
    async fn test_missing_refresh_token_is_not_recorded() {
        let gate = RefreshGate::new();
        let seen = gate.generation();

        let failed = gate
            .run(seen, || async { Err(RefreshFailure::NoRefreshToken) })
            .await;

        assert_eq!(failed, Err(RefreshFailure::NoRefreshToken));
        assert_eq!(gate.generation(), seen);
        assert!(gate.settled_since(seen).is_none());
    }

    #[tokio::test]
    async fn test_install_and_revoke_bump_generation() {
        let gate = RefreshGate::new();
        let seen = gate.generation();

        gate.install("login-token".to_string());
        assert_eq!(gate.generation(), seen + 1);

        gate.revoke("logged out");
        assert_eq!(
            gate.settled_since(seen),
            Some(RefreshOutcome::Failed("logged out".to_string()))
        );
    }
}
