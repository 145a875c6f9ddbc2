//! Ledger store abstraction
//!
//! A key-value store with a per-key, append-only history. Every put and
//! delete of a key appends one [`HistoryEntry`]; history is never rewritten.
//!
//! # Backends
//!
//! - [`MemoryStore`] - process-local, for tests and scripting
//! - [`RocksStore`] - persistent, column families `state`, `history`, `meta`
//!
//! # Multi-key writes
//!
//! [`LedgerStore::write_batch`] commits several writes as one transaction.
//! Both backends override it with a native atomic primitive. The default
//! implementation applies writes in order and, when one fails, writes the
//! prior values of the already-applied keys back before returning the error.

mod memory;
mod rocks;

pub use memory::MemoryStore;
pub use rocks::RocksStore;

use crate::{
    config::{Config, StorageBackend},
    error::{Error, Result},
    types::HistoryEntry,
};
use std::sync::Arc;
use uuid::Uuid;

/// Lazy iterator over a key's history, oldest first
pub type HistoryIter<'a> = Box<dyn Iterator<Item = Result<HistoryEntry>> + 'a>;

/// A single staged write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Set `key` to `value`
    Put {
        /// Key
        key: String,
        /// New value
        value: Vec<u8>,
    },
    /// Remove `key`
    Delete {
        /// Key
        key: String,
    },
}

impl WriteOp {
    /// Staged put
    pub fn put(key: impl Into<String>, value: Vec<u8>) -> Self {
        WriteOp::Put {
            key: key.into(),
            value,
        }
    }

    /// Staged delete
    pub fn delete(key: impl Into<String>) -> Self {
        WriteOp::Delete { key: key.into() }
    }

    /// Key this write touches
    pub fn key(&self) -> &str {
        match self {
            WriteOp::Put { key, .. } | WriteOp::Delete { key } => key,
        }
    }
}

/// Store the transaction engine reads from and writes to
pub trait LedgerStore: Send + Sync {
    /// Current value of `key`, `None` if absent or deleted
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Set `key` to `value`, appending a history entry
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove `key`; a no-op when the key is absent
    fn delete(&self, key: &str) -> Result<()>;

    /// History of `key` starting at sequence number `from_seq`
    fn history(&self, key: &str, from_seq: u64) -> Result<HistoryIter<'_>>;

    /// Commit several writes together
    fn write_batch(&self, ops: Vec<WriteOp>) -> Result<()> {
        apply_with_compensation(self, ops)
    }
}

/// Open the backend selected in `config`
pub fn open_store(config: &Config) -> Result<Arc<dyn LedgerStore>> {
    match config.backend {
        StorageBackend::Memory => {
            tracing::info!("Using in-memory ledger store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::RocksDb => Ok(Arc::new(RocksStore::open(config)?)),
    }
}

/// Fresh transaction ID (UUIDv7, time-ordered)
pub(crate) fn new_tx_id() -> String {
    Uuid::now_v7().to_string()
}

pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::Store("key must not be empty".to_string()));
    }
    Ok(())
}

/// Sequential application with compensating writes on failure
fn apply_with_compensation<S: LedgerStore + ?Sized>(store: &S, ops: Vec<WriteOp>) -> Result<()> {
    // Snapshot prior values before touching anything
    let mut priors = Vec::with_capacity(ops.len());
    for op in &ops {
        priors.push(store.get(op.key())?);
    }

    for (index, op) in ops.iter().enumerate() {
        let result = match op {
            WriteOp::Put { key, value } => store.put(key, value),
            WriteOp::Delete { key } => store.delete(key),
        };

        if let Err(err) = result {
            tracing::warn!(
                failed_key = op.key(),
                applied = index,
                error = %err,
                "Batch write failed, compensating applied writes"
            );

            for (applied, prior) in ops[..index].iter().zip(&priors).rev() {
                let restored = match prior {
                    Some(value) => store.put(applied.key(), value),
                    None => store.delete(applied.key()),
                };
                if let Err(comp_err) = restored {
                    tracing::error!(
                        key = applied.key(),
                        error = %comp_err,
                        "Compensating write failed, key left at staged value"
                    );
                }
            }

            return Err(err);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Memory store that refuses puts to one key and uses the default batch path
    struct RefusingStore {
        inner: MemoryStore,
        refused: Mutex<Option<String>>,
    }

    impl LedgerStore for RefusingStore {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            self.inner.get(key)
        }

        fn put(&self, key: &str, value: &[u8]) -> Result<()> {
            if self.refused.lock().as_deref() == Some(key) {
                return Err(Error::Store(format!("write refused for {}", key)));
            }
            self.inner.put(key, value)
        }

        fn delete(&self, key: &str) -> Result<()> {
            self.inner.delete(key)
        }

        fn history(&self, key: &str, from_seq: u64) -> Result<HistoryIter<'_>> {
            self.inner.history(key, from_seq)
        }
    }

    #[test]
    fn test_default_batch_compensates() {
        let store = RefusingStore {
            inner: MemoryStore::new(),
            refused: Mutex::new(None),
        };
        store.put("a", b"100").unwrap();
        store.put("b", b"200").unwrap();
        *store.refused.lock() = Some("b".to_string());

        let result = store.write_batch(vec![
            WriteOp::put("a", b"50".to_vec()),
            WriteOp::put("b", b"250".to_vec()),
            WriteOp::put("c", b"1".to_vec()),
        ]);

        assert!(matches!(result, Err(Error::Store(_))));
        assert_eq!(store.get("a").unwrap(), Some(b"100".to_vec()));
        assert_eq!(store.get("b").unwrap(), Some(b"200".to_vec()));
        assert_eq!(store.get("c").unwrap(), None);

        // Compensation is itself recorded: 100, 50, 100
        let history: Vec<_> = store
            .history("a", 0)
            .unwrap()
            .map(|e| e.unwrap().value)
            .collect();
        assert_eq!(history, vec![b"100".to_vec(), b"50".to_vec(), b"100".to_vec()]);
    }

    #[test]
    fn test_default_batch_compensates_created_key() {
        let store = RefusingStore {
            inner: MemoryStore::new(),
            refused: Mutex::new(Some("b".to_string())),
        };

        let result = store.write_batch(vec![
            WriteOp::put("a", b"1".to_vec()),
            WriteOp::put("b", b"2".to_vec()),
        ]);

        assert!(result.is_err());
        assert_eq!(store.get("a").unwrap(), None);
    }

    #[test]
    fn test_write_op_key() {
        assert_eq!(WriteOp::put("k", vec![]).key(), "k");
        assert_eq!(WriteOp::delete("d").key(), "d");
    }
}
