//! In-memory ledger store

use super::{new_tx_id, validate_key, HistoryIter, LedgerStore, WriteOp};
use crate::{
    error::{Error, Result},
    types::HistoryEntry,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default)]
struct Slot {
    current: Option<Vec<u8>>,
    history: Vec<HistoryEntry>,
}

impl Slot {
    fn record(&mut self, tx_id: &str, timestamp: DateTime<Utc>, value: Option<Vec<u8>>) {
        let is_delete = value.is_none();
        self.history.push(HistoryEntry {
            seq: self.history.len() as u64,
            tx_id: tx_id.to_string(),
            timestamp,
            value: value.clone().unwrap_or_default(),
            is_delete,
        });
        self.current = value;
    }
}

/// Process-local store; all writes go through one lock
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: RwLock<HashMap<String, Slot>>,
}

impl MemoryStore {
    /// Create empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with a current value
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .values()
            .filter(|slot| slot.current.is_some())
            .count()
    }

    /// Whether no key has a current value
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn apply(slots: &mut HashMap<String, Slot>, op: WriteOp, tx_id: &str, now: DateTime<Utc>) {
        match op {
            WriteOp::Put { key, value } => {
                slots.entry(key).or_default().record(tx_id, now, Some(value));
            }
            WriteOp::Delete { key } => {
                if let Some(slot) = slots.get_mut(&key) {
                    if slot.current.is_some() {
                        slot.record(tx_id, now, None);
                    }
                }
            }
        }
    }
}

impl LedgerStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .slots
            .read()
            .get(key)
            .and_then(|slot| slot.current.clone()))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.write_batch(vec![WriteOp::put(key, value.to_vec())])
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.write_batch(vec![WriteOp::delete(key)])
    }

    fn history(&self, key: &str, from_seq: u64) -> Result<HistoryIter<'_>> {
        let entries: Vec<HistoryEntry> = self
            .slots
            .read()
            .get(key)
            .map(|slot| {
                slot.history
                    .iter()
                    .skip(from_seq as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        Ok(Box::new(entries.into_iter().map(Ok::<_, Error>)))
    }

    fn write_batch(&self, ops: Vec<WriteOp>) -> Result<()> {
        for op in &ops {
            validate_key(op.key())?;
        }

        let tx_id = new_tx_id();
        let now = Utc::now();
        let mut slots = self.slots.write();
        for op in ops {
            tracing::debug!(key = op.key(), tx_id = %tx_id, "Memory store write");
            Self::apply(&mut slots, op, &tx_id, now);
        }

        Ok(())
    }
}
