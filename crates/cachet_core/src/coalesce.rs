use std::sync::Arc;

use cachet_cache::CacheKey;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-key async locks used to serialize concurrent misses on one key.
#[derive(Debug, Default)]
pub(crate) struct KeyLocks {
    locks: DashMap<CacheKey, Arc<Mutex<()>>>,
}

impl KeyLocks {
    pub(crate) async fn acquire(&self, key: CacheKey) -> KeyLockGuard<'_> {
        let lock = self
            .locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        KeyLockGuard {
            locks: self,
            key,
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.len()
    }
}

/// Held while a miss is being filled. Dropping it releases the key and
/// forgets the lock once nobody else is waiting on it.
pub(crate) struct KeyLockGuard<'a> {
    locks: &'a KeyLocks,
    key: CacheKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyLockGuard<'_> {
    fn drop(&mut self) {
        // Map entry + our guard = 2; anything above is a waiter.
        self.locks
            .locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) <= 2);
        self.guard.take();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use cachet_cache::CacheKey;

    use super::KeyLocks;

    #[tokio::test]
    async fn released_lock_is_forgotten() {
        let locks = KeyLocks::default();
        let key = CacheKey::new("GET", "/a", None);
        {
            let _g = locks.acquire(key).await;
            assert_eq!(locks.len(), 1);
        }
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn second_caller_waits_for_first() {
        let locks = Arc::new(KeyLocks::default());
        let key = CacheKey::new("GET", "/a", None);

        let first = locks.acquire(key).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.acquire(key).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(first);
        waiter.await.unwrap();
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = KeyLocks::default();
        let _a = locks.acquire(CacheKey::new("GET", "/a", None)).await;
        let _b = locks.acquire(CacheKey::new("GET", "/b", None)).await;
        assert_eq!(locks.len(), 2);
    }
}
