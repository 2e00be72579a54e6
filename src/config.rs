use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::{AuditLedgerError, Result};

pub const DEFAULT_SERVER_ADDRESS: &str = "0.0.0.0:9999";
pub const DEFAULT_CHAINCODE_ID: &str = "auditcc";

/// Settings injected by the host through the environment
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub listen_addr: SocketAddr,
    pub chaincode_id: String,
    /// WAL location; in-memory state when unset
    pub data_path: Option<PathBuf>,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let addr = lookup("CHAINCODE_SERVER_ADDRESS")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SERVER_ADDRESS.to_string());
        let listen_addr = addr.trim().parse::<SocketAddr>().map_err(|e| {
            AuditLedgerError::ConfigError(format!("invalid CHAINCODE_SERVER_ADDRESS {:?}: {}", addr, e))
        })?;

        let chaincode_id = lookup("CHAINCODE_ID")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CHAINCODE_ID.to_string());

        let data_path = lookup("LEDGER_DATA_PATH")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            listen_addr,
            chaincode_id,
            data_path,
        })
    }
}
