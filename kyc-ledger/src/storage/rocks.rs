//! RocksDB ledger store
//!
//! # Column Families
//!
//! - `state` - Current value per key (key: record key)
//! - `history` - Append-only modifications (key: u32be(len) || key || u64be(seq))
//! - `meta` - Next history sequence per key (key: record key)

use super::{new_tx_id, validate_key, HistoryIter, LedgerStore, WriteOp};
use crate::{
    error::{Error, Result},
    types::HistoryEntry,
    Config,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode, Options,
    WriteBatch, DB,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Column family names
const CF_STATE: &str = "state";
const CF_HISTORY: &str = "history";
const CF_META: &str = "meta";

/// History value as persisted (the sequence lives in the key)
#[derive(Debug, Serialize, Deserialize)]
struct StoredModification {
    tx_id: String,
    timestamp: DateTime<Utc>,
    value: Vec<u8>,
    is_delete: bool,
}

/// Persistent store backed by RocksDB
pub struct RocksStore {
    db: DB,
    /// Serialises sequence allocation and batch commit
    writer: Mutex<()>,
}

impl std::fmt::Debug for RocksStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksStore")
            .field("path", &self.db.path())
            .finish()
    }
}

impl RocksStore {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_STATE, Self::cf_options_state()),
            ColumnFamilyDescriptor::new(CF_HISTORY, Self::cf_options_history()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened RocksDB ledger store");

        Ok(Self {
            db,
            writer: Mutex::new(()),
        })
    }

    fn cf_options_state() -> Options {
        let mut opts = Options::default();
        // Point reads dominate
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_options_history() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Store(format!("Column family {} not found", name)))
    }

    // Key helpers

    fn history_prefix(key: &str) -> Vec<u8> {
        let mut prefix = Vec::with_capacity(4 + key.len() + 8);
        prefix.extend_from_slice(&(key.len() as u32).to_be_bytes());
        prefix.extend_from_slice(key.as_bytes());
        prefix
    }

    fn history_key(key: &str, seq: u64) -> Vec<u8> {
        let mut full = Self::history_prefix(key);
        full.extend_from_slice(&seq.to_be_bytes());
        full
    }

    fn decode_seq(history_key: &[u8]) -> Result<u64> {
        let tail = history_key
            .len()
            .checked_sub(8)
            .map(|start| &history_key[start..])
            .ok_or_else(|| Error::Store("truncated history key".to_string()))?;
        let bytes: [u8; 8] = tail
            .try_into()
            .map_err(|_| Error::Store("truncated history key".to_string()))?;
        Ok(u64::from_be_bytes(bytes))
    }

    fn next_seq(&self, key: &str, pending: &mut HashMap<String, u64>) -> Result<u64> {
        if let Some(seq) = pending.get_mut(key) {
            let current = *seq;
            *seq += 1;
            return Ok(current);
        }

        let cf_meta = self.cf_handle(CF_META)?;
        let current = match self.db.get_cf(cf_meta, key.as_bytes())? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    Error::Store(format!("corrupt sequence counter for {}", key))
                })?;
                u64::from_be_bytes(raw)
            }
            None => 0,
        };
        pending.insert(key.to_string(), current + 1);
        Ok(current)
    }

    /// Stage one write, returning false when it is a no-op
    fn stage(
        &self,
        batch: &mut WriteBatch,
        op: &WriteOp,
        tx_id: &str,
        timestamp: DateTime<Utc>,
        pending: &mut HashMap<String, u64>,
        live: &mut HashMap<String, bool>,
    ) -> Result<bool> {
        let cf_state = self.cf_handle(CF_STATE)?;
        let key = op.key();

        let exists = match live.get(key) {
            Some(exists) => *exists,
            None => self.db.get_cf(cf_state, key.as_bytes())?.is_some(),
        };

        let modification = match op {
            WriteOp::Put { value, .. } => {
                batch.put_cf(cf_state, key.as_bytes(), value);
                live.insert(key.to_string(), true);
                StoredModification {
                    tx_id: tx_id.to_string(),
                    timestamp,
                    value: value.clone(),
                    is_delete: false,
                }
            }
            WriteOp::Delete { .. } => {
                if !exists {
                    return Ok(false);
                }
                batch.delete_cf(cf_state, key.as_bytes());
                live.insert(key.to_string(), false);
                StoredModification {
                    tx_id: tx_id.to_string(),
                    timestamp,
                    value: Vec::new(),
                    is_delete: true,
                }
            }
        };

        let seq = self.next_seq(key, pending)?;
        batch.put_cf(
            self.cf_handle(CF_HISTORY)?,
            Self::history_key(key, seq),
            bincode::serialize(&modification)?,
        );
        batch.put_cf(
            self.cf_handle(CF_META)?,
            key.as_bytes(),
            (seq + 1).to_be_bytes(),
        );

        Ok(true)
    }

    /// Close database (graceful shutdown)
    pub fn close(self) -> Result<()> {
        drop(self.db);
        tracing::info!("RocksDB closed gracefully");
        Ok(())
    }
}

impl LedgerStore for RocksStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let cf = self.cf_handle(CF_STATE)?;
        Ok(self.db.get_cf(cf, key.as_bytes())?)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.write_batch(vec![WriteOp::put(key, value.to_vec())])
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.write_batch(vec![WriteOp::delete(key)])
    }

    fn history(&self, key: &str, from_seq: u64) -> Result<HistoryIter<'_>> {
        let cf = self.cf_handle(CF_HISTORY)?;
        let prefix = Self::history_prefix(key);
        let start = Self::history_key(key, from_seq);

        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&start, Direction::Forward))
            .take_while(move |item| match item {
                Ok((raw_key, _)) => raw_key.starts_with(&prefix),
                Err(_) => true,
            })
            .map(|item| -> Result<HistoryEntry> {
                let (raw_key, raw_value) = item?;
                let seq = Self::decode_seq(&raw_key)?;
                let stored: StoredModification = bincode::deserialize(&raw_value)?;
                Ok(HistoryEntry {
                    seq,
                    tx_id: stored.tx_id,
                    timestamp: stored.timestamp,
                    value: stored.value,
                    is_delete: stored.is_delete,
                })
            });

        Ok(Box::new(iter))
    }

    fn write_batch(&self, ops: Vec<WriteOp>) -> Result<()> {
        for op in &ops {
            validate_key(op.key())?;
        }

        let _guard = self.writer.lock();

        let tx_id = new_tx_id();
        let timestamp = Utc::now();
        let mut batch = WriteBatch::default();
        let mut pending = HashMap::new();
        let mut live = HashMap::new();
        let mut staged = 0usize;

        for op in &ops {
            if self.stage(&mut batch, op, &tx_id, timestamp, &mut pending, &mut live)? {
                staged += 1;
            }
        }

        if staged == 0 {
            return Ok(());
        }

        // Atomic commit
        self.db.write(batch)?;

        tracing::debug!(tx_id = %tx_id, writes = staged, "RocksDB batch committed");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (RocksStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (RocksStore::open(&config).unwrap(), temp_dir)
    }

    #[test]
    fn test_storage_open() {
        let (store, _temp) = test_store();
        assert!(store.db.cf_handle(CF_STATE).is_some());
        assert!(store.db.cf_handle(CF_HISTORY).is_some());
        assert!(store.db.cf_handle(CF_META).is_some());
    }

    #[test]
    fn test_put_get_delete() {
        let (store, _temp) = test_store();

        store.put("alice", b"100").unwrap();
        assert_eq!(store.get("alice").unwrap(), Some(b"100".to_vec()));

        store.delete("alice").unwrap();
        assert_eq!(store.get("alice").unwrap(), None);

        // Absent key: no error, no tombstone
        store.delete("nobody").unwrap();
        assert_eq!(store.history("nobody", 0).unwrap().count(), 0);
    }

    #[test]
    fn test_history_is_scoped_per_key() {
        let (store, _temp) = test_store();

        // "ab" must not leak into the history of "a"
        store.put("a", b"1").unwrap();
        store.put("ab", b"x").unwrap();
        store.put("a", b"2").unwrap();
        store.delete("a").unwrap();

        let entries: Vec<HistoryEntry> =
            store.history("a", 0).unwrap().map(|e| e.unwrap()).collect();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].value, b"1".to_vec());
        assert_eq!(entries[1].value, b"2".to_vec());
        assert!(entries[2].is_delete);
        assert_eq!(
            entries.iter().map(|e| e.seq).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );

        let tail: Vec<u64> = store
            .history("a", 1)
            .unwrap()
            .map(|e| e.unwrap().seq)
            .collect();
        assert_eq!(tail, vec![1, 2]);
    }

    #[test]
    fn test_batch_with_repeated_key() {
        let (store, _temp) = test_store();

        store
            .write_batch(vec![
                WriteOp::put("k", b"1".to_vec()),
                WriteOp::put("k", b"2".to_vec()),
            ])
            .unwrap();

        assert_eq!(store.get("k").unwrap(), Some(b"2".to_vec()));
        let seqs: Vec<u64> = store
            .history("k", 0)
            .unwrap()
            .map(|e| e.unwrap().seq)
            .collect();
        assert_eq!(seqs, vec![0, 1]);
    }

    #[test]
    fn test_history_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();

        {
            let store = RocksStore::open(&config).unwrap();
            store.put("k", b"v1").unwrap();
            store.close().unwrap();
        }

        let store = RocksStore::open(&config).unwrap();
        store.put("k", b"v2").unwrap();

        let values: Vec<Vec<u8>> = store
            .history("k", 0)
            .unwrap()
            .map(|e| e.unwrap().value)
            .collect();
        assert_eq!(values, vec![b"v1".to_vec(), b"v2".to_vec()]);
    }

    #[test]
    fn test_corrupt_history_entry_surfaces_error() {
        let (store, _temp) = test_store();
        store.put("k", b"v1").unwrap();

        let cf = store.cf_handle(CF_HISTORY).unwrap();
        store
            .db
            .put_cf(cf, RocksStore::history_key("k", 1), b"\xff")
            .unwrap();

        let results: Vec<Result<HistoryEntry>> = store.history("k", 0).unwrap().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }
}
