/// MemoryBackend: ordered in-memory world state
///
/// Keys are kept in a BTreeMap so range scans come back in lexicographic
/// byte order. Each scan iterates a snapshot taken when it was opened.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::backend::{KeyValue, LedgerBackend, StateIterator};
use crate::error::{AuditLedgerError, Result};

#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<RwLock<BTreeMap<String, Bytes>>>,

    /// Iterators handed out and not yet closed
    open_iterators: Arc<AtomicUsize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a write without going through the async interface
    pub(crate) fn apply(&self, key: String, value: Bytes) {
        self.state.write().insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().is_empty()
    }

    pub fn open_iterators(&self) -> usize {
        self.open_iterators.load(Ordering::SeqCst)
    }

    fn snapshot(&self, start: &str, end: &str) -> Vec<KeyValue> {
        if !start.is_empty() && !end.is_empty() && start >= end {
            return Vec::new();
        }

        let lower = if start.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Included(start.to_string())
        };
        let upper = if end.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Excluded(end.to_string())
        };

        self.state
            .read()
            .range::<String, _>((lower, upper))
            .map(|(key, value)| KeyValue {
                key: key.clone(),
                value: value.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl LedgerBackend for MemoryBackend {
    async fn put(&self, key: &str, value: Bytes) -> Result<()> {
        self.apply(key.to_string(), value);
        Ok(())
    }

    async fn range_scan(&self, start: &str, end: &str) -> Result<Box<dyn StateIterator>> {
        let entries = self.snapshot(start, end);
        debug!("Range scan [{:?}, {:?}) opened with {} entries", start, end, entries.len());

        self.open_iterators.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SnapshotIterator {
            entries: entries.into_iter(),
            peeked: None,
            open: Some(self.open_iterators.clone()),
        }))
    }
}

struct SnapshotIterator {
    entries: std::vec::IntoIter<KeyValue>,
    peeked: Option<KeyValue>,
    /// Cleared on close so the counter is decremented once
    open: Option<Arc<AtomicUsize>>,
}

impl SnapshotIterator {
    fn fill(&mut self) {
        if self.peeked.is_none() {
            self.peeked = self.entries.next();
        }
    }
}

impl StateIterator for SnapshotIterator {
    fn has_next(&self) -> bool {
        self.open.is_some() && (self.peeked.is_some() || self.entries.len() > 0)
    }

    fn next(&mut self) -> Result<KeyValue> {
        if self.open.is_none() {
            return Err(AuditLedgerError::ReadError("iterator is closed".into()));
        }
        self.fill();
        self.peeked
            .take()
            .ok_or_else(|| AuditLedgerError::ReadError("no more results".into()))
    }

    fn close(&mut self) {
        if let Some(counter) = self.open.take() {
            counter.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for SnapshotIterator {
    fn drop(&mut self) {
        self.close();
    }
}
