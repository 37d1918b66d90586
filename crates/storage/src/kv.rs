//! The ordered-key KV store contract (C3, §4.3): `get`, `put`, `delete`,
//! `batchWrite`, `iterate(prefix)`, `close`, `repair`. Backends differ
//! (in-memory for tests, libmdbx for production) but share this interface so
//! the block/log index (C4) never depends on a concrete engine.

use async_trait::async_trait;

use crate::error::StoreError;

/// One write operation inside a batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    async fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), StoreError>;

    async fn delete(&self, key: Vec<u8>) -> Result<(), StoreError>;

    /// Applies every operation atomically: either all land, or none do.
    async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<(), StoreError>;

    /// Returns every `(key, value)` pair whose key starts with `prefix`, in
    /// key order, taken from a single consistent snapshot.
    async fn iterate_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;

    async fn close(&self) -> Result<(), StoreError>;

    /// Attempts to repair a corrupted store in place. Returns an error if
    /// repair is not possible; callers must then refuse to start (§4.3, §6
    /// exit code 2).
    async fn repair(&self) -> Result<(), StoreError>;
}
