//! Command router
//!
//! Maps an invocation (function name + positional string arguments) onto the
//! transaction engine and shapes the result into a [`Response`].
//!
//! The operation table is built once in [`CommandRouter::new`]. Routing is
//! stateless per call.

use crate::{codec, engine::TransactionEngine, metrics::Metrics, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

/// Success status code
pub const OK: i32 = 200;

/// Error status code
pub const ERROR: i32 = 500;

/// Transient key whose value, when present, becomes the Seed/Move payload
pub const TRANSIENT_RESULT_KEY: &str = "result";

/// A call from the dispatcher
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    /// Entry point name (`invoke` for everything except seeding)
    pub function: String,

    /// Positional arguments; for `invoke`, `args[0]` is the operation
    #[serde(default)]
    pub args: Vec<String>,

    /// Caller-supplied data that is never written to the ledger
    #[serde(default)]
    pub transient: BTreeMap<String, String>,
}

impl Invocation {
    /// Invocation of `function` with `args`
    pub fn new<I, S>(function: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            function: function.into(),
            args: args.into_iter().map(Into::into).collect(),
            transient: BTreeMap::new(),
        }
    }

    /// Attach a transient entry
    pub fn with_transient(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.transient.insert(key.into(), value.into());
        self
    }
}

/// Result of a routed call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// [`OK`] or [`ERROR`]
    pub status: i32,

    /// Error message (empty on success)
    pub message: String,

    /// Payload bytes (empty on error)
    pub payload: Vec<u8>,
}

impl Response {
    /// Successful response
    pub fn success(payload: Vec<u8>) -> Self {
        Self {
            status: OK,
            message: String::new(),
            payload,
        }
    }

    /// Failed response
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ERROR,
            message: message.into(),
            payload: Vec::new(),
        }
    }

    /// Whether the call succeeded
    pub fn is_ok(&self) -> bool {
        self.status == OK
    }

    /// Payload as text (lossy)
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// JSON form used by the CLI
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "status": self.status,
            "message": self.message,
            "payload": self.payload_text(),
        })
    }
}

impl From<Result<Vec<u8>>> for Response {
    fn from(result: Result<Vec<u8>>) -> Self {
        match result {
            Ok(payload) => Response::success(payload),
            Err(err) => Response::error(err.to_string()),
        }
    }
}

/// Operations reachable through `invoke`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Remove a key
    Delete,
    /// Read a key, absent is an error
    Query,
    /// Transfer between two entities
    Move,
    /// Insert a customer record
    Insert,
    /// Update a customer record
    Update,
    /// Read a key, absent is empty
    Retrieve,
    /// Full history of a key
    History,
    /// One page of a key's history
    HistoryPage,
}

impl Operation {
    /// Every routable operation
    pub const ALL: [Operation; 8] = [
        Operation::Delete,
        Operation::Query,
        Operation::Move,
        Operation::Insert,
        Operation::Update,
        Operation::Retrieve,
        Operation::History,
        Operation::HistoryPage,
    ];

    /// Name used as `args[0]`
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Delete => "delete",
            Operation::Query => "query",
            Operation::Move => "move",
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Retrieve => "retrieve",
            Operation::History => "history",
            Operation::HistoryPage => "history_page",
        }
    }

    /// Exact argument count, operation name included
    pub fn arity(&self) -> usize {
        match self {
            Operation::Delete
            | Operation::Query
            | Operation::Insert
            | Operation::Retrieve
            | Operation::History => 2,
            Operation::Update => 3,
            Operation::Move | Operation::HistoryPage => 4,
        }
    }
}

/// Routes invocations to the transaction engine
pub struct CommandRouter {
    engine: TransactionEngine,
    table: HashMap<&'static str, Operation>,
    metrics: Metrics,
}

impl std::fmt::Debug for CommandRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRouter")
            .field("engine", &self.engine)
            .field("operations", &self.operation_names())
            .finish()
    }
}

impl CommandRouter {
    /// Build the router and its operation table
    pub fn new(engine: TransactionEngine, metrics: Metrics) -> Result<Self> {
        let mut table = HashMap::with_capacity(Operation::ALL.len());
        for op in Operation::ALL {
            if table.insert(op.name(), op).is_some() {
                return Err(Error::Config(format!(
                    "operation {} registered twice",
                    op.name()
                )));
            }
        }

        Ok(Self {
            engine: engine.with_metrics(metrics.clone()),
            table,
            metrics,
        })
    }

    /// Engine behind this router
    pub fn engine(&self) -> &TransactionEngine {
        &self.engine
    }

    /// Metrics recorded by this router
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Sorted operation names
    pub fn operation_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.table.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Seed entry point: `A, Aval, B, Bval`
    pub fn init(&self, invocation: &Invocation) -> Response {
        let started = Instant::now();
        let result = self.seed(invocation);
        self.finish("seed", started, result)
    }

    /// Operation entry point: function `invoke`, `args[0]` selects the operation
    pub fn invoke(&self, invocation: &Invocation) -> Response {
        let started = Instant::now();
        let (label, result) = match self.resolve(invocation) {
            Ok(op) => (op.name(), self.dispatch(op, invocation)),
            Err(err) => ("invoke", Err(err)),
        };
        self.finish(label, started, result)
    }

    fn finish(&self, label: &str, started: Instant, result: Result<Vec<u8>>) -> Response {
        let outcome = match &result {
            Ok(_) => "ok",
            Err(err) => err.kind(),
        };
        self.metrics.record(label, outcome, started.elapsed());

        if let Err(err) = &result {
            tracing::debug!(operation = label, error = %err, "Operation failed");
        }

        Response::from(result)
    }

    fn seed(&self, invocation: &Invocation) -> Result<Vec<u8>> {
        let args = &invocation.args;
        if args.len() != 4 {
            return Err(Error::BadArgumentCount {
                operation: "init".to_string(),
                expected: 4,
                got: args.len(),
            });
        }

        self.engine.seed(&args[0], &args[1], &args[2], &args[3])?;

        Ok(Self::transient_result(invocation).unwrap_or_default())
    }

    fn resolve(&self, invocation: &Invocation) -> Result<Operation> {
        if invocation.function != "invoke" {
            return Err(Error::UnknownOperation {
                name: invocation.function.clone(),
                expected: "invoke".to_string(),
            });
        }

        let args = &invocation.args;
        if args.len() < 2 {
            return Err(Error::BadArgumentCount {
                operation: "invoke".to_string(),
                expected: 2,
                got: args.len(),
            });
        }

        let op = self
            .table
            .get(args[0].as_str())
            .copied()
            .ok_or_else(|| Error::UnknownOperation {
                name: args[0].clone(),
                expected: self.operation_names().join(", "),
            })?;

        if args.len() != op.arity() {
            return Err(Error::BadArgumentCount {
                operation: op.name().to_string(),
                expected: op.arity(),
                got: args.len(),
            });
        }

        Ok(op)
    }

    fn dispatch(&self, op: Operation, invocation: &Invocation) -> Result<Vec<u8>> {
        let args = &invocation.args;
        match op {
            Operation::Delete => {
                self.engine.delete(&args[1])?;
                Ok(Vec::new())
            }
            Operation::Query => self.engine.query(&args[1]),
            Operation::Move => {
                let transfer = self.engine.move_asset(&args[1], &args[2], &args[3])?;
                match Self::transient_result(invocation) {
                    Some(payload) => Ok(payload),
                    None => Ok(serde_json::to_vec(&transfer)?),
                }
            }
            Operation::Insert => {
                self.engine.insert(args[1].as_bytes())?;
                Ok(b"Insert Success".to_vec())
            }
            Operation::Update => {
                self.engine.update(&args[1], args[2].as_bytes())?;
                Ok(b"Update Successful".to_vec())
            }
            Operation::Retrieve => self.engine.retrieve(&args[1]),
            Operation::History => self.engine.history(&args[1]),
            Operation::HistoryPage => {
                let cursor = args[2]
                    .parse::<u64>()
                    .map_err(|_| Error::NotAnInteger(args[2].clone()))?;
                let limit = args[3]
                    .parse::<usize>()
                    .map_err(|_| Error::NotAnInteger(args[3].clone()))?;
                let page = self.engine.history_page(&args[1], cursor, limit)?;
                codec::encode_history_page(&page)
            }
        }
    }

    fn transient_result(invocation: &Invocation) -> Option<Vec<u8>> {
        invocation
            .transient
            .get(TRANSIENT_RESULT_KEY)
            .map(|value| value.as_bytes().to_vec())
    }
}
