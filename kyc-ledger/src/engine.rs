//! Transaction engine
//!
//! Implements the state-changing operations (Seed, Move, Insert, Update,
//! Delete) and the reads (Query, Retrieve, History) as short sequences of
//! store reads and writes. Nothing is cached between calls: every operation
//! re-reads the keys it touches.
//!
//! # Example
//!
//! ```
//! use kyc_ledger::{Config, TransactionEngine};
//! use kyc_ledger::storage::MemoryStore;
//! use std::sync::Arc;
//!
//! let engine = TransactionEngine::new(Arc::new(MemoryStore::new()), &Config::in_memory());
//! engine.seed("alice", "100", "bob", "200")?;
//! engine.move_asset("alice", "bob", "50")?;
//! assert_eq!(engine.query("alice")?, b"50".to_vec());
//! # Ok::<(), kyc_ledger::Error>(())
//! ```

use crate::{
    codec,
    config::HistoryConfig,
    metrics::Metrics,
    storage::{LedgerStore, WriteOp},
    types::{HistoryEntry, HistoryPage, Transfer},
    validator::InvariantValidator,
    Config, Error, Result,
};
use std::sync::Arc;

/// Transaction engine over a ledger store
#[derive(Clone)]
pub struct TransactionEngine {
    /// Backing store
    store: Arc<dyn LedgerStore>,

    /// Invariant checks
    validator: InvariantValidator,

    /// History read settings
    history: HistoryConfig,

    /// Optional metrics sink
    metrics: Option<Metrics>,
}

impl std::fmt::Debug for TransactionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionEngine")
            .field("validator", &self.validator)
            .field("history", &self.history)
            .finish()
    }
}

impl TransactionEngine {
    /// Create engine over `store`
    pub fn new(store: Arc<dyn LedgerStore>, config: &Config) -> Self {
        Self {
            store,
            validator: InvariantValidator::new(config.policy.balance_policy()),
            history: config.history.clone(),
            metrics: None,
        }
    }

    /// Attach metrics
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Backing store
    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    // Entity balances

    /// Write initial balances for two entities in one batch
    pub fn seed(&self, entity_a: &str, amount_a: &str, entity_b: &str, amount_b: &str) -> Result<()> {
        let balance_a = codec::parse_amount(amount_a)?;
        let balance_b = codec::parse_amount(amount_b)?;
        self.validator.check_balance(entity_a, balance_a)?;
        self.validator.check_balance(entity_b, balance_b)?;

        self.store.write_batch(vec![
            WriteOp::put(entity_a, codec::encode_balance(balance_a)),
            WriteOp::put(entity_b, codec::encode_balance(balance_b)),
        ])?;

        tracing::info!(
            entity_a,
            balance_a,
            entity_b,
            balance_b,
            "Entities seeded"
        );

        Ok(())
    }

    /// Move `amount` from `from` to `to`
    ///
    /// Both entities must exist. The debit and credit are committed in one
    /// batch, so either both balances change or neither does.
    pub fn move_asset(&self, from: &str, to: &str, amount: &str) -> Result<Transfer> {
        let amount = codec::parse_transfer_amount(amount)?;
        if from == to {
            return Err(Error::InvalidAmount(format!(
                "source and destination are the same entity ({})",
                from
            )));
        }

        let from_balance = self.read_balance(from)?;
        let to_balance = self.read_balance(to)?;

        let (new_from, new_to) =
            self.validator
                .check_transfer((from, from_balance), (to, to_balance), amount)?;

        self.store.write_batch(vec![
            WriteOp::put(from, codec::encode_balance(new_from)),
            WriteOp::put(to, codec::encode_balance(new_to)),
        ])?;

        tracing::info!(
            from,
            to,
            amount,
            from_balance = new_from,
            to_balance = new_to,
            "Asset moved"
        );

        Ok(Transfer {
            from: from.to_string(),
            from_balance: new_from,
            to: to.to_string(),
            to_balance: new_to,
        })
    }

    fn read_balance(&self, entity: &str) -> Result<i64> {
        let bytes = self
            .store
            .get(entity)?
            .ok_or_else(|| Error::KeyNotFound(entity.to_string()))?;
        codec::decode_balance(&bytes)
    }

    // Customer records

    /// Insert a customer record keyed by its national ID
    ///
    /// Returns the key. Re-inserting over an existing customer record is
    /// allowed only if the tax ID matches the stored one; any other stored
    /// value (an entity balance, say) is overwritten.
    pub fn insert(&self, payload: &[u8]) -> Result<String> {
        let customer = codec::decode_customer(payload)?;
        let key = customer.key().to_string();
        if key.is_empty() {
            return Err(Error::MalformedRecord(
                "record has an empty aadhar_no".to_string(),
            ));
        }

        if let Some(stored) = self.store.get(&key)? {
            match codec::decode_customer(&stored) {
                Ok(stored) => self.validator.check_immutable(&key, &stored, &customer)?,
                Err(err) => {
                    tracing::warn!(key = %key, error = %err, "Overwriting non-record value");
                }
            }
        }

        self.store.put(&key, &codec::encode_customer(&customer))?;

        tracing::info!(key = %key, "Customer record inserted");

        Ok(key)
    }

    /// Replace the record at `key`, keeping its immutable fields
    pub fn update(&self, key: &str, payload: &[u8]) -> Result<()> {
        let stored = self
            .store
            .get(key)?
            .ok_or_else(|| Error::KeyNotFound(key.to_string()))?;

        let stored = codec::decode_customer(&stored)?;
        let proposed = codec::decode_customer(payload)?;

        if let Err(err) = self.validator.check_immutable(key, &stored, &proposed) {
            tracing::warn!(key, error = %err, "Update rejected");
            return Err(err);
        }

        self.store.put(key, &codec::encode_customer(&proposed))?;

        tracing::info!(key, "Customer record updated");

        Ok(())
    }

    // Generic key operations

    /// Remove `key`; succeeds whether or not it exists
    pub fn delete(&self, key: &str) -> Result<()> {
        self.store.delete(key)?;
        tracing::info!(key, "Key deleted");
        Ok(())
    }

    /// Current value of `key`; absent keys are [`Error::KeyNotFound`]
    pub fn query(&self, key: &str) -> Result<Vec<u8>> {
        let value = self
            .store
            .get(key)?
            .ok_or_else(|| Error::KeyNotFound(key.to_string()))?;

        tracing::debug!(key, bytes = value.len(), "Query");

        Ok(value)
    }

    /// Current value of `key`; absent keys read as empty
    pub fn retrieve(&self, key: &str) -> Result<Vec<u8>> {
        Ok(self.store.get(key)?.unwrap_or_default())
    }

    // History

    /// Full history of `key`, oldest first
    pub fn history_entries(&self, key: &str) -> Result<Vec<HistoryEntry>> {
        let (entries, _) = self.drain_history(key, 0, None)?;
        Ok(entries)
    }

    /// Full history of `key` as a JSON array of value strings
    pub fn history(&self, key: &str) -> Result<Vec<u8>> {
        let entries = self.history_entries(key)?;
        codec::encode_history_values(&entries)
    }

    /// At most `limit` history entries of `key` starting at `cursor`
    ///
    /// A `limit` of 0 uses the configured default page size; larger limits
    /// are clamped to the configured maximum.
    pub fn history_page(&self, key: &str, cursor: u64, limit: usize) -> Result<HistoryPage> {
        let limit = match limit {
            0 => self.history.default_page_size,
            n => n.min(self.history.max_page_size),
        };

        let (entries, next_cursor) = self.drain_history(key, cursor, Some(limit))?;

        Ok(HistoryPage {
            key: key.to_string(),
            entries,
            next_cursor,
        })
    }

    /// Read history from `from`; returns the entries and the cursor after
    /// the last consumed position if more remain
    fn drain_history(
        &self,
        key: &str,
        from: u64,
        limit: Option<usize>,
    ) -> Result<(Vec<HistoryEntry>, Option<u64>)> {
        let mut iter = self.store.history(key, from)?.peekable();
        let mut entries = Vec::new();
        let mut consumed = 0usize;
        let mut skipped = 0usize;

        while limit.map_or(true, |limit| consumed < limit) {
            let item = match iter.next() {
                Some(item) => item,
                None => break,
            };
            consumed += 1;

            match item {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    skipped += 1;
                    tracing::warn!(
                        key,
                        position = from + consumed as u64 - 1,
                        error = %err,
                        "Unreadable history entry"
                    );
                }
            }
        }

        if skipped > 0 {
            if let Some(metrics) = &self.metrics {
                metrics.history_entries_skipped.inc_by(skipped as u64);
            }
            if !self.history.skip_corrupt_entries {
                return Err(Error::PartialHistory {
                    key: key.to_string(),
                    recovered: entries.len(),
                    skipped,
                });
            }
        }

        let next_cursor = match iter.peek() {
            Some(_) => Some(from + consumed as u64),
            None => None,
        };

        Ok((entries, next_cursor))
    }
}
