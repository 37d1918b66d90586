//! Replay registry (§4.11, §6 `N/` prefix): an append-only, TTL-indexed,
//! size-capped persistent set. Uniqueness is checked O(1) in memory; every
//! accepted key is durably appended so a restart recovers the set.

use std::collections::HashMap;
use std::sync::Arc;

use coc_common::H256;
use coc_storage::{KvStore, StoreError};
use parking_lot::RwLock;

const KEY_PREFIX: &[u8] = b"N/";

fn storage_key(key: H256) -> Vec<u8> {
    let mut k = KEY_PREFIX.to_vec();
    k.extend_from_slice(key.as_bytes());
    k
}

struct Inner {
    /// `key -> timestampMs`, the in-memory mirror used for O(1) uniqueness checks.
    seen: HashMap<H256, u64>,
}

pub struct ReplayRegistry {
    store: Option<Arc<dyn KvStore>>,
    inner: RwLock<Inner>,
    max_size: usize,
}

impl ReplayRegistry {
    /// A registry with no backing store, for tests and ephemeral dry-runs.
    pub fn in_memory() -> Self {
        Self {
            store: None,
            inner: RwLock::new(Inner { seen: HashMap::new() }),
            max_size: usize::MAX,
        }
    }

    pub fn new(store: Arc<dyn KvStore>, max_size: usize) -> Self {
        Self {
            store: Some(store),
            inner: RwLock::new(Inner { seen: HashMap::new() }),
            max_size,
        }
    }

    /// Loads every persisted key under the `N/` prefix into the in-memory set.
    pub async fn load(&self) -> Result<(), StoreError> {
        let Some(store) = &self.store else { return Ok(()) };
        let entries = store.iterate_prefix(KEY_PREFIX).await?;
        let mut inner = self.inner.write();
        for (k, v) in entries {
            if let (Some(key_bytes), Ok(ts_bytes)) = (k.get(KEY_PREFIX.len()..), v.as_slice().try_into().map(u64::from_be_bytes)) {
                inner.seen.insert(H256::from_slice(key_bytes), ts_bytes);
            }
        }
        Ok(())
    }

    /// Returns `true` and durably records `key` if unseen; `false` if it was
    /// already present (the caller should treat this as a replay).
    pub fn check_and_record(&self, key: H256, timestamp_ms: u64) -> bool {
        let mut inner = self.inner.write();
        if inner.seen.contains_key(&key) {
            return false;
        }
        inner.seen.insert(key, timestamp_ms);
        true
    }

    /// Durably appends `key`; call this after `check_and_record` returns
    /// `true` when a backing store is configured.
    pub async fn persist(&self, key: H256, timestamp_ms: u64) -> Result<(), StoreError> {
        if let Some(store) = &self.store {
            store
                .put(storage_key(key), timestamp_ms.to_be_bytes().to_vec())
                .await?;
        }
        Ok(())
    }

    /// Drops entries older than `ttl_ms` relative to `now_ms`, from both the
    /// in-memory mirror and (if configured) the backing store.
    pub async fn compact(&self, now_ms: u64, ttl_ms: u64) -> Result<usize, StoreError> {
        let expired: Vec<H256> = {
            let inner = self.inner.read();
            inner
                .seen
                .iter()
                .filter(|(_, ts)| now_ms.saturating_sub(**ts) > ttl_ms)
                .map(|(k, _)| *k)
                .collect()
        };
        {
            let mut inner = self.inner.write();
            for key in &expired {
                inner.seen.remove(key);
            }
        }
        if let Some(store) = &self.store {
            for key in &expired {
                store.delete(storage_key(*key)).await?;
            }
        }
        Ok(expired.len())
    }

    pub fn len(&self) -> usize {
        self.inner.read().seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_over_capacity(&self) -> bool {
        self.len() > self.max_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_a_replayed_key() {
        let reg = ReplayRegistry::in_memory();
        let key = H256::from_low_u64_be(1);
        assert!(reg.check_and_record(key, 1000));
        assert!(!reg.check_and_record(key, 2000));
    }

    #[tokio::test]
    async fn compaction_drops_expired_entries() {
        let reg = ReplayRegistry::in_memory();
        reg.check_and_record(H256::from_low_u64_be(1), 0);
        reg.check_and_record(H256::from_low_u64_be(2), 10_000);
        let dropped = reg.compact(20_000, 5_000).await.unwrap();
        assert_eq!(dropped, 1);
        assert_eq!(reg.len(), 1);
    }
}
