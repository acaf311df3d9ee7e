//! Process-wide rate limiter + connection gate.
//!
//! Every outbound request acquires both a rate-limit token and a semaphore
//! permit before it is allowed to proceed; acquisition aborts promptly if
//! the passed cancellation token is tripped.

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{Quota, RateLimiter as GovernorLimiter};
use mirror_common::{Error, Result};
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_util::sync::CancellationToken;

type DirectLimiter = GovernorLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Joint token-bucket + semaphore gate. Cheap to clone; all clones share the
/// same underlying limiter and semaphore.
#[derive(Clone)]
pub struct Gate {
    limiter: Arc<DirectLimiter>,
    semaphore: Arc<Semaphore>,
}

/// Holds the semaphore permit for the lifetime of one in-flight request.
pub struct Permit<'a> {
    _permit: SemaphorePermit<'a>,
}

impl Gate {
    /// `permits_per_second` is `TMDB_RATE_LIMIT`, `max_connections` is
    /// `TMDB_MAX_CONNECTIONS`.
    pub fn new(permits_per_second: u32, max_connections: u32) -> Self {
        let quota = Quota::per_second(
            NonZeroU32::new(permits_per_second.max(1)).expect("nonzero by construction"),
        );
        Gate {
            limiter: Arc::new(GovernorLimiter::direct(quota)),
            semaphore: Arc::new(Semaphore::new(max_connections.max(1) as usize)),
        }
    }

    /// Waits for both a rate-limit token and a free connection slot, or
    /// returns `Error::Cancelled` if `cancel` is tripped first.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<Permit<'_>> {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = self.semaphore.acquire() => result.expect("semaphore never closed"),
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            _ = self.limiter.until_ready() => Ok(Permit { _permit: permit }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_succeeds_without_cancellation() {
        let gate = Gate::new(50, 5);
        let cancel = CancellationToken::new();
        assert!(gate.acquire(&cancel).await.is_ok());
    }

    #[tokio::test]
    async fn acquire_respects_pretripped_cancellation() {
        let gate = Gate::new(1, 1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = gate.acquire(&cancel).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn connection_slots_are_bounded() {
        let gate = Gate::new(50, 1);
        let cancel = CancellationToken::new();
        let first = gate.acquire(&cancel).await.unwrap();
        // Second acquire would block on the semaphore; verify the available
        // permit count reflects the cap rather than trying to race it.
        assert_eq!(gate.semaphore.available_permits(), 0);
        drop(first);
        assert_eq!(gate.semaphore.available_permits(), 1);
    }
}
