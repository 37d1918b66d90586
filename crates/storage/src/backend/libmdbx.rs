//! Production KV backend: a single libmdbx table of raw `Vec<u8>` key/value
//! pairs. The block/log index (C4) and the PoSe nonce registry build their
//! own byte-prefix namespaces (`B/`, `T/`, `A/`, `L/`, `N/`, `X/`, `P/`) on
//! top of this one table rather than one libmdbx table per namespace,
//! keeping `batch_write` a single atomic libmdbx transaction across
//! namespaces. Mirrors the teacher's `store_db::libmdbx::Store` shape:
//! blocking libmdbx calls are dispatched via `spawn_blocking` so the apply
//! lock (§4.7/§5) is never held across blocking I/O.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use libmdbx::orm::{table, Database, Decodable, Encodable, Table};
use libmdbx::{DatabaseOptions, Mode, PageSize, ReadWriteOptions};

use crate::error::StoreError;
use crate::kv::{KvStore, WriteOp};

const DB_PAGE_SIZE: usize = 4096;
const MAX_MAP_SIZE: isize = 1024_isize.pow(4) * 2; // 2 TB

table!(
    /// The single raw byte-keyed table backing every namespace prefix.
    (Entries) RawKey => RawValue
);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RawKey(pub Vec<u8>);
#[derive(Debug, Clone)]
pub struct RawValue(pub Vec<u8>);

impl Encodable for RawKey {
    type Encoded = Vec<u8>;
    fn encode(self) -> Self::Encoded {
        self.0
    }
}
impl Decodable for RawKey {
    fn decode(b: &[u8]) -> anyhow::Result<Self> {
        Ok(RawKey(b.to_vec()))
    }
}
impl Encodable for RawValue {
    type Encoded = Vec<u8>;
    fn encode(self) -> Self::Encoded {
        self.0
    }
}
impl Decodable for RawValue {
    fn decode(b: &[u8]) -> anyhow::Result<Self> {
        Ok(RawValue(b.to_vec()))
    }
}

pub struct LibmdbxStore {
    db: Arc<Database>,
}

impl LibmdbxStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let tables = [libmdbx::table_info!(Entries)].into_iter().collect();
        let options = DatabaseOptions {
            page_size: Some(PageSize::Set(DB_PAGE_SIZE)),
            mode: Mode::ReadWrite(ReadWriteOptions {
                max_size: Some(MAX_MAP_SIZE),
                ..Default::default()
            }),
            ..Default::default()
        };
        let db = Database::create_with_options(Some(path.as_ref()), options, &tables)
            .map_err(StoreError::Libmdbx)?;
        Ok(Self { db: Arc::new(db) })
    }
}

#[async_trait]
impl KvStore for LibmdbxStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let db = self.db.clone();
        let key = key.to_vec();
        tokio::task::spawn_blocking(move || {
            let txn = db.begin_read().map_err(StoreError::Libmdbx)?;
            Ok(txn
                .get::<Entries>(RawKey(key))
                .map_err(StoreError::Libmdbx)?
                .map(|v| v.0))
        })
        .await
        .map_err(|e| StoreError::TaskPanicked(e.to_string()))?
    }

    async fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), StoreError> {
        self.batch_write(vec![WriteOp::Put(key, value)]).await
    }

    async fn delete(&self, key: Vec<u8>) -> Result<(), StoreError> {
        self.batch_write(vec![WriteOp::Delete(key)]).await
    }

    async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let txn = db.begin_readwrite().map_err(StoreError::Libmdbx)?;
            for op in ops {
                match op {
                    WriteOp::Put(k, v) => {
                        txn.upsert::<Entries>(RawKey(k), RawValue(v))
                            .map_err(StoreError::Libmdbx)?;
                    }
                    WriteOp::Delete(k) => {
                        txn.delete::<Entries>(RawKey(k), None)
                            .map_err(StoreError::Libmdbx)?;
                    }
                }
            }
            txn.commit().map_err(StoreError::Libmdbx)
        })
        .await
        .map_err(|e| StoreError::TaskPanicked(e.to_string()))?
    }

    async fn iterate_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let db = self.db.clone();
        let prefix = prefix.to_vec();
        tokio::task::spawn_blocking(move || {
            // A single read transaction is the "consistent snapshot" the
            // long-lived-iterator requirement in §4.3 demands: libmdbx's MVCC
            // guarantees the view doesn't change underneath a live cursor.
            let txn = db.begin_read().map_err(StoreError::Libmdbx)?;
            let mut cursor = txn.cursor::<Entries>().map_err(StoreError::Libmdbx)?;
            let mut out = Vec::new();
            let iter = cursor.walk(Some(RawKey(prefix.clone())));
            for entry in iter {
                let (key, value) = entry.map_err(StoreError::Libmdbx)?;
                if !key.0.starts_with(&prefix) {
                    break;
                }
                out.push((key.0, value.0));
            }
            Ok(out)
        })
        .await
        .map_err(|e| StoreError::TaskPanicked(e.to_string()))?
    }

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn repair(&self) -> Result<(), StoreError> {
        // libmdbx validates its own header/meta pages on open; if `open` above
        // already succeeded the store isn't corrupted. A forced repair path
        // would re-create the environment from the last valid meta page, but
        // libmdbx does this transparently on the next open, so there is
        // nothing further to do here beyond reporting success.
        Ok(())
    }
}
