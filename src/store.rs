/// AppendLogStore: access-audit records over a ledger backend
///
/// The store seeds the ledger, appends one record per access and lists every
/// record back through an unbounded range scan. It holds no state of its own
/// beyond the backend handle and the clock; the transaction context is
/// passed into each call.

use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info};

use crate::backend::{LedgerBackend, ScanGuard};
use crate::context::{Clock, SystemClock, TransactionContext};
use crate::error::Result;
use crate::record::{seed_key, AccessRecord};

pub struct AppendLogStore {
    backend: Arc<dyn LedgerBackend>,
    clock: Arc<dyn Clock>,
}

impl AppendLogStore {
    /// Create a store stamping records with the system clock
    pub fn new(backend: Arc<dyn LedgerBackend>) -> Self {
        Self::with_clock(backend, Arc::new(SystemClock))
    }

    pub fn with_clock(backend: Arc<dyn LedgerBackend>, clock: Arc<dyn Clock>) -> Self {
        Self { backend, clock }
    }

    /// Write the seed records under `LOG-0`, `LOG-1`, ...
    pub async fn initialize(&self, ctx: &dyn TransactionContext) -> Result<()> {
        let seeds = vec![AccessRecord::new(
            "admin",
            "system",
            self.clock.now_unix(),
            ctx.current_transaction_id(),
        )];

        for (i, record) in seeds.iter().enumerate() {
            let key = seed_key(i);
            self.backend.put(&key, Bytes::from(record.encode()?)).await?;
            debug!("Seeded {}", key);
        }

        info!("Ledger initialized with {} seed record(s)", seeds.len());
        Ok(())
    }

    /// Record that `user` accessed `resource` in the current transaction
    pub async fn append(
        &self,
        ctx: &dyn TransactionContext,
        user: &str,
        resource: &str,
    ) -> Result<()> {
        let record = AccessRecord::new(
            user,
            resource,
            self.clock.now_unix(),
            ctx.current_transaction_id(),
        );
        let key = record.log_key();

        self.backend.put(&key, Bytes::from(record.encode()?)).await?;

        debug!("Appended {} (tx {})", key, record.transaction_id);
        Ok(())
    }

    /// Every record in the ledger, in backend key order
    pub async fn list_all(&self) -> Result<Vec<AccessRecord>> {
        let mut scan = ScanGuard::new(self.backend.range_scan("", "").await?);

        let mut records = Vec::new();
        while scan.has_next() {
            let kv = scan.next()?;
            records.push(AccessRecord::decode(&kv.key, &kv.value)?);
        }

        debug!("Listed {} records", records.len());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Transaction;
    use crate::memory::MemoryBackend;
    use crate::AuditLedgerError;

    struct FixedClock(i64);

    impl Clock for FixedClock {
        fn now_unix(&self) -> i64 {
            self.0
        }
    }

    fn store_at(backend: &MemoryBackend, now: i64) -> AppendLogStore {
        AppendLogStore::with_clock(Arc::new(backend.clone()), Arc::new(FixedClock(now)))
    }

    #[tokio::test]
    async fn test_initialize_writes_seed_record() {
        let backend = MemoryBackend::new();
        let store = store_at(&backend, 1_000);

        store.initialize(&Transaction::new("tx-init")).await.unwrap();

        let records = store.list_all().await.unwrap();
        assert_eq!(records, vec![AccessRecord::new("admin", "system", 1_000, "tx-init")]);
    }

    #[tokio::test]
    async fn test_initialize_twice_keeps_single_seed() {
        let backend = MemoryBackend::new();
        let store = store_at(&backend, 1_000);

        store.initialize(&Transaction::new("a")).await.unwrap();
        store.initialize(&Transaction::new("b")).await.unwrap();

        let records = store.list_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].transaction_id, "b");
    }

    #[tokio::test]
    async fn test_same_second_writes_collide() {
        let backend = MemoryBackend::new();
        let store = store_at(&backend, 77);

        store.append(&Transaction::new("t1"), "alice", "file1").await.unwrap();
        store.append(&Transaction::new("t2"), "alice", "file2").await.unwrap();

        let records = store.list_all().await.unwrap();
        assert_eq!(records, vec![AccessRecord::new("alice", "file2", 77, "t2")]);
    }

    #[tokio::test]
    async fn test_list_is_key_ordered_not_time_ordered() {
        let backend = MemoryBackend::new();

        store_at(&backend, 9).append(&Transaction::new("t1"), "alice", "r").await.unwrap();
        store_at(&backend, 10).append(&Transaction::new("t2"), "alice", "r").await.unwrap();

        let records = store_at(&backend, 0).list_all().await.unwrap();
        let stamps: Vec<i64> = records.iter().map(|r| r.timestamp).collect();
        assert_eq!(stamps, vec![10, 9]);
    }

    #[tokio::test]
    async fn test_decode_error_stops_listing_and_closes_scan() {
        let backend = MemoryBackend::new();
        let store = store_at(&backend, 5);

        store.append(&Transaction::new("t1"), "alice", "r").await.unwrap();
        backend.put("LOG-bad", Bytes::from_static(b"not json")).await.unwrap();
        store.append(&Transaction::new("t2"), "carol", "r").await.unwrap();

        match store.list_all().await {
            Err(AuditLedgerError::DecodeError { key, .. }) => assert_eq!(key, "LOG-bad"),
            other => panic!("expected decode error, got {:?}", other),
        }
        assert_eq!(backend.open_iterators(), 0);
    }
}
