/// Per-invocation capabilities handed to the store: the transaction id and
/// the clock used to stamp records.

use chrono::Utc;
use uuid::Uuid;

/// Supplies the id of the transaction an operation runs in
pub trait TransactionContext: Send + Sync {
    fn current_transaction_id(&self) -> &str;
}

/// Concrete transaction context for one invocation
#[derive(Debug, Clone)]
pub struct Transaction {
    tx_id: String,
}

impl Transaction {
    /// Use an id assigned by the host
    pub fn new(tx_id: impl Into<String>) -> Self {
        Self { tx_id: tx_id.into() }
    }

    /// Start a transaction with a freshly generated id
    pub fn generate() -> Self {
        Self {
            tx_id: Uuid::new_v4().simple().to_string(),
        }
    }
}

impl TransactionContext for Transaction {
    fn current_transaction_id(&self) -> &str {
        &self.tx_id
    }
}

/// Source of the current time in unix seconds
pub trait Clock: Send + Sync {
    fn now_unix(&self) -> i64;
}

/// Wall clock, UTC
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        Utc::now().timestamp()
    }
}
