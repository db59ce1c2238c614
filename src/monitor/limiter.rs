// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-operation admission control.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;

/// Default number of concurrent executions per operation.
pub const DEFAULT_MAX_PARALLEL: usize = 4;

/// A held slot. The slot is released when this value is dropped.
#[derive(Debug)]
pub struct OperationPermit {
    _permit: OwnedSemaphorePermit,
}

/// Lazily created gate per operation name.
///
/// The first `acquire` for a name fixes that gate's size; later calls with a
/// different `max_parallel` reuse the existing gate. Configured overrides
/// take precedence over the size a caller asks for.
#[derive(Debug, Default)]
pub struct ConcurrencyLimiter {
    gates: DashMap<String, Arc<Semaphore>>,
    overrides: HashMap<String, usize>,
}

impl ConcurrencyLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a limiter with fixed per-operation caps.
    pub fn with_overrides(overrides: HashMap<String, usize>) -> Self {
        Self {
            gates: DashMap::new(),
            overrides,
        }
    }

    /// Wait for a slot on `name`'s gate.
    ///
    /// Waiters are queued FIFO by the semaphore. Gates are never closed, so
    /// this never fails.
    pub async fn acquire(&self, name: &str, max_parallel: usize) -> OperationPermit {
        let gate = self.gate(name, max_parallel);
        trace!(operation = %name, available = gate.available_permits(), "Waiting for slot");
        let permit = match gate.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => unreachable!("limiter gates are never closed"),
        };
        OperationPermit { _permit: permit }
    }

    /// Slots currently free on `name`'s gate, if it exists.
    pub fn available(&self, name: &str) -> Option<usize> {
        self.gates.get(name).map(|g| g.available_permits())
    }

    fn gate(&self, name: &str, max_parallel: usize) -> Arc<Semaphore> {
        let size = self
            .overrides
            .get(name)
            .copied()
            .unwrap_or(max_parallel)
            .max(1);
        self.gates
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(size)))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_at_most_max_parallel_run_together() {
        let limiter = Arc::new(ConcurrencyLimiter::new());
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..3)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                tokio::spawn(async move {
                    let _slot = limiter.acquire("sonar.scan", 2).await;
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_extra_caller_waits_for_release() {
        let limiter = ConcurrencyLimiter::new();
        let first = limiter.acquire("op", 1).await;

        let blocked =
            tokio::time::timeout(Duration::from_millis(20), limiter.acquire("op", 1)).await;
        assert!(blocked.is_err());

        drop(first);
        let admitted =
            tokio::time::timeout(Duration::from_millis(100), limiter.acquire("op", 1)).await;
        assert!(admitted.is_ok());
    }

    #[tokio::test]
    async fn test_different_names_do_not_contend() {
        let limiter = ConcurrencyLimiter::new();
        let _a = limiter.acquire("sonar.scan", 1).await;
        let b = tokio::time::timeout(Duration::from_millis(50), limiter.acquire("sonar.status", 1))
            .await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_override_wins() {
        let limiter =
            ConcurrencyLimiter::with_overrides(HashMap::from([("sonar.scan".to_string(), 1)]));
        let _slot = limiter.acquire("sonar.scan", DEFAULT_MAX_PARALLEL).await;
        assert_eq!(limiter.available("sonar.scan"), Some(0));
    }

    #[tokio::test]
    async fn test_permit_released_on_drop() {
        let limiter = ConcurrencyLimiter::new();
        {
            let _slot = limiter.acquire("op", 2).await;
            assert_eq!(limiter.available("op"), Some(1));
        }
        assert_eq!(limiter.available("op"), Some(2));
    }
}
