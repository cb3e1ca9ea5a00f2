//! Single-invocation guard.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::OrbitError;

/// Ensures at most one invocation runs per agent.
///
/// Acquisition is a non-blocking test-and-set: a second caller fails
/// immediately instead of queuing.
#[derive(Debug, Clone, Default)]
pub struct InvocationGuard {
    busy: Arc<AtomicBool>,
}

/// Held for the duration of an invocation; releases on drop, including when
/// the invocation future is dropped mid-flight or unwinds.
#[derive(Debug)]
pub struct InvocationPermit {
    busy: Arc<AtomicBool>,
}

impl InvocationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Result<InvocationPermit, OrbitError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| {
                tracing::debug!("invocation rejected: agent busy");
                OrbitError::Concurrency(
                    "agent is already processing a request; concurrent invocations are not supported"
                        .into(),
                )
            })?;
        Ok(InvocationPermit {
            busy: Arc::clone(&self.busy),
        })
    }

    pub fn is_held(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for InvocationPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_until_permit_drops() {
        let guard = InvocationGuard::new();
        let permit = guard.try_acquire().unwrap();
        assert!(guard.is_held());
        assert!(matches!(guard.try_acquire(), Err(OrbitError::Concurrency(_))));

        drop(permit);
        assert!(!guard.is_held());
        assert!(guard.try_acquire().is_ok());
    }

    #[test]
    fn permit_releases_on_panic() {
        let guard = InvocationGuard::new();
        let cloned = guard.clone();
        let outcome = std::panic::catch_unwind(move || {
            let _permit = cloned.try_acquire().unwrap();
            panic!("tool blew up");
        });
        assert!(outcome.is_err());
        assert!(!guard.is_held());
    }

    #[tokio::test]
    async fn dropping_an_invocation_future_releases_the_guard() {
        let guard = InvocationGuard::new();
        let inner = guard.clone();
        let task = tokio::spawn(async move {
            let _permit = inner.try_acquire().unwrap();
            std::future::pending::<()>().await;
        });
        tokio::task::yield_now().await;
        while !guard.is_held() {
            tokio::task::yield_now().await;
        }
        task.abort();
        let _ = task.await;
        assert!(!guard.is_held());
    }
}
