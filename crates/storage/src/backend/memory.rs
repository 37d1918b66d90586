//! In-memory KV backend: a `BTreeMap` under a lock, ordered by key so
//! `iterate_prefix` is a cheap range scan. Used by tests and by `ethrex
//! dev`-style single-process deployments; mirrors the teacher's
//! `store_db::in_memory::Store` shape.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::kv::{KvStore, WriteOp};

#[derive(Default, Clone)]
pub struct InMemoryStore {
    inner: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for InMemoryStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.inner.read().await.get(key).cloned())
    }

    async fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), StoreError> {
        self.inner.write().await.insert(key, value);
        Ok(())
    }

    async fn delete(&self, key: Vec<u8>) -> Result<(), StoreError> {
        self.inner.write().await.remove(&key);
        Ok(())
    }

    async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        for op in ops {
            match op {
                WriteOp::Put(k, v) => {
                    guard.insert(k, v);
                }
                WriteOp::Delete(k) => {
                    guard.remove(&k);
                }
            }
        }
        Ok(())
    }

    async fn iterate_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn repair(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_roundtrip() {
        let store = InMemoryStore::new();
        store.put(b"a".to_vec(), b"1".to_vec()).await.unwrap();
        assert_eq!(store.get(b"a").await.unwrap(), Some(b"1".to_vec()));
    }

    #[tokio::test]
    async fn iterate_prefix_is_ordered_and_scoped() {
        let store = InMemoryStore::new();
        for (k, v) in [("B/1", "x"), ("B/2", "y"), ("T/1", "z")] {
            store
                .put(k.as_bytes().to_vec(), v.as_bytes().to_vec())
                .await
                .unwrap();
        }
        let got = store.iterate_prefix(b"B/").await.unwrap();
        assert_eq!(
            got,
            vec![
                (b"B/1".to_vec(), b"x".to_vec()),
                (b"B/2".to_vec(), b"y".to_vec())
            ]
        );
    }

    #[tokio::test]
    async fn batch_write_is_all_or_nothing_visible() {
        let store = InMemoryStore::new();
        store
            .batch_write(vec![
                WriteOp::Put(b"a".to_vec(), b"1".to_vec()),
                WriteOp::Put(b"b".to_vec(), b"2".to_vec()),
            ])
            .await
            .unwrap();
        assert_eq!(store.get(b"a").await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get(b"b").await.unwrap(), Some(b"2".to_vec()));
    }
}
