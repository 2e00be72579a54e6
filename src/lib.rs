/// Audit Ledger - access-audit records over a key-value world state
///
/// Architecture:
/// 1. LedgerBackend: point writes and ordered range scans (MemoryBackend, WalBackend)
/// 2. WAL: crash-safe append log with CRC-checked entries
/// 3. AppendLogStore: seeds, appends and lists AccessRecords
/// 4. AuditContract / ContractServer: named entry points served to the host

pub mod error;
pub mod record;
pub mod context;
pub mod backend;
pub mod memory;
pub mod wal;
pub mod store;
pub mod contract;
pub mod config;
pub mod server;

pub use backend::{KeyValue, LedgerBackend, ScanGuard, StateIterator};
pub use config::ServiceConfig;
pub use context::{Clock, SystemClock, Transaction, TransactionContext};
pub use contract::AuditContract;
pub use error::{AuditLedgerError, Result};
pub use memory::MemoryBackend;
pub use record::AccessRecord;
pub use server::{ContractServer, InvocationRequest, InvocationResponse};
pub use store::AppendLogStore;
pub use wal::{WalBackend, WalEntry, WAL};
