/// AccessRecord: one audit event as stored in the ledger
///
/// Records are JSON objects `{user, resource, timestamp, txid}` with the
/// timestamp in whole unix seconds. The key layout keeps one user's records
/// adjacent and roughly ordered by time.

use serde::{Deserialize, Serialize};

use crate::error::{AuditLedgerError, Result};

/// Prefix shared by every record key
pub const KEY_PREFIX: &str = "LOG-";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessRecord {
    pub user: String,
    pub resource: String,
    pub timestamp: i64,
    #[serde(rename = "txid")]
    pub transaction_id: String,
}

impl AccessRecord {
    pub fn new(user: &str, resource: &str, timestamp: i64, transaction_id: &str) -> Self {
        Self {
            user: user.to_string(),
            resource: resource.to_string(),
            timestamp,
            transaction_id: transaction_id.to_string(),
        }
    }

    /// Key for a record written by `LogAccess`.
    ///
    /// Two records for the same user in the same second share a key, and the
    /// later write replaces the earlier one.
    pub fn log_key(&self) -> String {
        format!("{}{}-{}", KEY_PREFIX, self.user, self.timestamp)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(AuditLedgerError::EncodeError)
    }

    pub fn decode(key: &str, bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|source| AuditLedgerError::DecodeError {
            key: key.to_string(),
            source,
        })
    }
}

/// Key for the `index`-th seed record written by `InitLedger`
pub fn seed_key(index: usize) -> String {
    format!("{}{}", KEY_PREFIX, index)
}
