/// AuditContract: the named entry points the host invokes
///
/// `InitLedger`, `LogAccess(userId, resource)` and `GetAllLogs`. Payloads are
/// returned as bytes; only `GetAllLogs` has one (a JSON array of records).

use std::sync::Arc;
use tracing::debug;

use crate::backend::LedgerBackend;
use crate::context::TransactionContext;
use crate::error::{AuditLedgerError, Result};
use crate::store::AppendLogStore;

pub const INIT_LEDGER: &str = "InitLedger";
pub const LOG_ACCESS: &str = "LogAccess";
pub const GET_ALL_LOGS: &str = "GetAllLogs";

pub struct AuditContract {
    store: AppendLogStore,
}

impl AuditContract {
    pub fn new(store: AppendLogStore) -> Self {
        Self { store }
    }

    pub fn with_backend(backend: Arc<dyn LedgerBackend>) -> Self {
        Self::new(AppendLogStore::new(backend))
    }

    /// Registered entry point names
    pub fn functions() -> &'static [&'static str] {
        &[INIT_LEDGER, LOG_ACCESS, GET_ALL_LOGS]
    }

    pub async fn invoke(
        &self,
        ctx: &dyn TransactionContext,
        function: &str,
        args: &[String],
    ) -> Result<Vec<u8>> {
        debug!(
            "Invoking {} with {} arg(s) in tx {}",
            function,
            args.len(),
            ctx.current_transaction_id()
        );

        match function {
            INIT_LEDGER => {
                expect_args(function, args, 0)?;
                self.store.initialize(ctx).await?;
                Ok(Vec::new())
            }
            LOG_ACCESS => {
                expect_args(function, args, 2)?;
                self.store.append(ctx, &args[0], &args[1]).await?;
                Ok(Vec::new())
            }
            GET_ALL_LOGS => {
                expect_args(function, args, 0)?;
                let records = self.store.list_all().await?;
                serde_json::to_vec(&records).map_err(AuditLedgerError::EncodeError)
            }
            other => Err(AuditLedgerError::UnknownFunction(other.to_string())),
        }
    }
}

fn expect_args(function: &str, args: &[String], expected: usize) -> Result<()> {
    if args.len() != expected {
        return Err(AuditLedgerError::ArgumentCount {
            function: function.to_string(),
            expected,
            actual: args.len(),
        });
    }
    Ok(())
}
