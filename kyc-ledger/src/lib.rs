//! KYC Ledger
//!
//! Ledger-backed record store with a small transaction API: integer asset
//! transfer between entities, customer-record insert/update with immutable
//! identifiers, point reads, and per-key mutation history.
//!
//! # Architecture
//!
//! - **Ledger Store**: key-value store with an append-only history per key
//! - **Record Codec**: customer records as JSON, balances as decimal strings
//! - **Invariant Validator**: immutable national/tax IDs, balance arithmetic
//! - **Transaction Engine**: Seed, Move, Insert, Update, Delete, Query, Retrieve, History
//! - **Command Router**: operation name → handler table, `Response` shaping
//! - **Actor**: single-writer queue in front of the router

#![forbid(unsafe_code)]
//!
//! # Invariants
//!
//! - Conservation: Move leaves `balance(A) + balance(B)` unchanged
//! - Immutability: a record's `aadhar_no` and `pan_no` never change
//! - Atomicity: multi-key writes land together or not at all
//! - Append-only: history entries are never modified or removed

#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod types;
pub mod codec;
pub mod validator;
pub mod storage;
pub mod engine;
pub mod router;
pub mod actor;
pub mod error;
pub mod config;
pub mod metrics;

// Re-exports
pub use error::{Error, Result};
pub use types::{Address, Customer, HistoryEntry, HistoryPage, Transfer};
pub use storage::{LedgerStore, MemoryStore, RocksStore, WriteOp};
pub use engine::TransactionEngine;
pub use router::{CommandRouter, Invocation, Operation, Response};
pub use actor::{spawn_router_actor, RouterHandle};
pub use config::Config;
pub use metrics::Metrics;
