//! Per-component mutual exclusion.
//!
//! One lock key exists per (source, component). Locks are strictly
//! advisory: the dispatcher contract is that every write touching a
//! source's sub-record happens inside that source's lock. Acquisition
//! polls; an optional auto-release timeout frees the key regardless of
//! the holder.

use crate::core::time::Clock;
use crate::packet::types::Source;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("could not acquire {source} lock for component {component:?}")]
    Acquire { source: Source, component: String },
}

/// Exclusive lock keyed by component id, one instance per source.
#[async_trait]
pub trait ComponentLock: Send + Sync {
    /// Suspend until the key is free, then hold it. `auto_release` arms a
    /// timer that frees the key on expiry even if the holder never
    /// unlocks.
    async fn lock(&self, component: &str, auto_release: Option<Duration>)
        -> Result<(), LockError>;

    /// Free the key and cancel any pending auto-release.
    async fn unlock(&self, component: &str);
}

struct LockTable {
    held: Mutex<HashMap<String, Option<JoinHandle<()>>>>,
}

impl LockTable {
    /// Returns true when the key was free and is now held.
    fn try_acquire(&self, component: &str) -> bool {
        let mut held = self.held.lock();
        if held.contains_key(component) {
            false
        } else {
            held.insert(component.to_string(), None);
            true
        }
    }

    fn release(&self, component: &str) {
        if let Some(Some(timer)) = self.held.lock().remove(component) {
            timer.abort();
        }
    }
}

/// In-process lock coordinator; the default backing for the memory cache.
///
/// Deployments sharing one cache across dispatchers swap this for a
/// distributed implementation of [`ComponentLock`].
pub struct LockCoordinator<C: Clock> {
    source: Source,
    poll_interval: Duration,
    clock: C,
    table: Arc<LockTable>,
}

impl<C: Clock> LockCoordinator<C> {
    pub fn new(source: Source, poll_interval: Duration, clock: C) -> Self {
        Self {
            source,
            poll_interval,
            clock,
            table: Arc::new(LockTable {
                held: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn source(&self) -> Source {
        self.source
    }
}

#[async_trait]
impl<C: Clock> ComponentLock for LockCoordinator<C> {
    async fn lock(
        &self,
        component: &str,
        auto_release: Option<Duration>,
    ) -> Result<(), LockError> {
        while !self.table.try_acquire(component) {
            self.clock.sleep(self.poll_interval).await;
        }
        if let Some(after) = auto_release {
            let table = Arc::clone(&self.table);
            let key = component.to_string();
            let sleep = self.clock.sleep(after);
            let timer = tokio::spawn(async move {
                sleep.await;
                table.held.lock().remove(&key);
            });
            if let Some(slot) = self.table.held.lock().get_mut(component) {
                *slot = Some(timer);
            }
        }
        Ok(())
    }

    async fn unlock(&self, component: &str) {
        self.table.release(component);
    }
}

/// Run `action` with a set of locks held for one component.
///
/// Locks are acquired in the order given and released on every exit:
/// success, action error, or partial acquisition failure (which releases
/// what was acquired, then surfaces the lock error).
pub async fn with_locks<T, E, Fut>(
    locks: &[Arc<dyn ComponentLock>],
    component: &str,
    action: Fut,
) -> Result<T, E>
where
    E: From<LockError>,
    Fut: Future<Output = Result<T, E>>,
{
    let mut held: Vec<&Arc<dyn ComponentLock>> = Vec::with_capacity(locks.len());
    for lock in locks {
        match lock.lock(component, None).await {
            Ok(()) => held.push(lock),
            Err(err) => {
                for acquired in held {
                    acquired.unlock(component).await;
                }
                return Err(err.into());
            }
        }
    }
    let result = action.await;
    for lock in held {
        lock.unlock(component).await;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::SystemClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn coordinator() -> Arc<LockCoordinator<SystemClock>> {
        Arc::new(LockCoordinator::new(
            Source::System,
            Duration::from_millis(5),
            SystemClock,
        ))
    }

    #[tokio::test]
    async fn test_exclusive_within_component() {
        let locks = coordinator();
        locks.lock("c1", None).await.unwrap();
        // A different component is an independent key.
        locks.lock("c2", None).await.unwrap();

        let contender = Arc::clone(&locks);
        let waiter = tokio::spawn(async move {
            contender.lock("c1", None).await.unwrap();
            contender.unlock("c1").await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        locks.unlock("c1").await;
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should win the freed lock")
            .unwrap();
    }

    #[tokio::test]
    async fn test_auto_release_frees_key() {
        let locks = coordinator();
        locks
            .lock("c1", Some(Duration::from_millis(20)))
            .await
            .unwrap();
        // Second acquisition succeeds once the auto-release fires.
        tokio::time::timeout(Duration::from_secs(1), locks.lock("c1", None))
            .await
            .expect("auto-release should free the key")
            .unwrap();
        locks.unlock("c1").await;
    }

    #[tokio::test]
    async fn test_unlock_cancels_auto_release() {
        let locks = coordinator();
        locks
            .lock("c1", Some(Duration::from_millis(20)))
            .await
            .unwrap();
        locks.unlock("c1").await;
        locks.lock("c1", None).await.unwrap();
        // If the stale timer were still armed it would steal this hold.
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!locks.table.try_acquire("c1"));
        locks.unlock("c1").await;
    }

    #[tokio::test]
    async fn test_with_locks_releases_on_error() {
        let locks = coordinator();
        let set: Vec<Arc<dyn ComponentLock>> = vec![Arc::clone(&locks) as Arc<dyn ComponentLock>];

        let result: Result<(), LockError> = with_locks(&set, "c1", async {
            Err(LockError::Acquire {
                source: Source::System,
                component: "c1".into(),
            })
        })
        .await;
        assert!(result.is_err());

        // Both locks must be free again.
        assert!(locks.table.try_acquire("c1"));
        locks.unlock("c1").await;
    }

    #[tokio::test]
    async fn test_with_locks_serializes_actions() {
        let locks = coordinator();
        let set: Vec<Arc<dyn ComponentLock>> = vec![Arc::clone(&locks) as Arc<dyn ComponentLock>];
        let counter = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let set = set.clone();
            let counter = Arc::clone(&counter);
            tasks.push(tokio::spawn(async move {
                let _: Result<(), LockError> = with_locks(&set, "c1", async {
                    let seen = counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    counter.fetch_sub(1, Ordering::SeqCst);
                    assert_eq!(seen, 0, "two actions overlapped inside the lock");
                    Ok(())
                })
                .await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
    }
}
