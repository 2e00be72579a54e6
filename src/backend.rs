/// Ledger Backend: the key-value world state the store writes into
///
/// Backends own durability, ordering and conflict detection. The store only
/// relies on point writes and ordered range scans.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// One (key, value) pair produced by a range scan
#[derive(Debug, Clone, PartialEq)]
pub struct KeyValue {
    pub key: String,
    pub value: Bytes,
}

/// Cursor over the results of a range scan
pub trait StateIterator: Send {
    fn has_next(&self) -> bool;

    fn next(&mut self) -> Result<KeyValue>;

    /// Release the cursor. Must be safe to call more than once.
    fn close(&mut self);
}

#[async_trait]
pub trait LedgerBackend: Send + Sync {
    /// Write `value` under `key`, replacing any previous value.
    async fn put(&self, key: &str, value: Bytes) -> Result<()>;

    /// Open a scan over `[start, end)` in key order.
    /// An empty `start` or `end` leaves that side of the range unbounded.
    async fn range_scan(&self, start: &str, end: &str) -> Result<Box<dyn StateIterator>>;
}

/// Owns an open iterator and closes it when dropped
pub struct ScanGuard {
    iter: Box<dyn StateIterator>,
}

impl ScanGuard {
    pub fn new(iter: Box<dyn StateIterator>) -> Self {
        Self { iter }
    }

    pub fn has_next(&self) -> bool {
        self.iter.has_next()
    }

    pub fn next(&mut self) -> Result<KeyValue> {
        self.iter.next()
    }
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        self.iter.close();
    }
}
