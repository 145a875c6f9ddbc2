//! Error types for the record ledger

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
///
/// The `Display` text of each variant is the human-readable message carried
/// back to the caller in a failed [`Response`](crate::router::Response).
#[derive(Error, Debug)]
pub enum Error {
    /// Wrong number of positional arguments for an operation
    #[error("Incorrect number of arguments for {operation}: expected {expected}, got {got}")]
    BadArgumentCount {
        /// Operation being dispatched
        operation: String,
        /// Required argument count
        expected: usize,
        /// Supplied argument count
        got: usize,
    },

    /// Seed amount is not an integer
    #[error("Expecting integer value for asset holding, got {0:?}")]
    NotAnInteger(String),

    /// Transfer amount is not an integer, or the transfer overflows
    #[error("Invalid transaction amount: {0}")]
    InvalidAmount(String),

    /// Key has no current value in the store
    #[error("Entity not found: {0}")]
    KeyNotFound(String),

    /// Stored or supplied bytes are not a well-formed record
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// Update attempted to change national ID or tax ID
    #[error("Cannot update immutable fields ({fields}) of record {key}")]
    ImmutableFieldViolation {
        /// Record key
        key: String,
        /// Comma-separated names of the changed fields
        fields: String,
    },

    /// Transfer or seed would leave a negative balance under the non-negative policy
    #[error("Balance of {entity} would become negative ({balance})")]
    NegativeBalance {
        /// Entity key
        entity: String,
        /// Resulting balance
        balance: i64,
    },

    /// Unknown function or operation name
    #[error("Unknown operation {name:?}, expected one of: {expected}")]
    UnknownOperation {
        /// Name received
        name: String,
        /// Valid names
        expected: String,
    },

    /// History iteration hit corrupt entries
    #[error("History for {key} is incomplete: {recovered} entries read, {skipped} unreadable")]
    PartialHistory {
        /// Key whose history was read
        key: String,
        /// Entries decoded successfully
        recovered: usize,
        /// Entries that failed to decode
        skipped: usize,
    },

    /// Storage error (RocksDB or in-memory store)
    #[error("Storage error: {0}")]
    Store(String),

    /// Binary serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Short, stable label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Error::BadArgumentCount { .. } => "bad_argument_count",
            Error::NotAnInteger(_) => "not_an_integer",
            Error::InvalidAmount(_) => "invalid_amount",
            Error::KeyNotFound(_) => "key_not_found",
            Error::MalformedRecord(_) => "malformed_record",
            Error::ImmutableFieldViolation { .. } => "immutable_field_violation",
            Error::NegativeBalance { .. } => "negative_balance",
            Error::UnknownOperation { .. } => "unknown_operation",
            Error::PartialHistory { .. } => "partial_history",
            Error::Store(_) => "store",
            Error::Serialization(_) => "serialization",
            Error::Json(_) => "json",
            Error::Concurrency(_) => "concurrency",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
        }
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Store(err.to_string())
    }
}
