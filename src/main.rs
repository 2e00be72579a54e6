use audit_ledger::{AuditContract, ContractServer, LedgerBackend, MemoryBackend, ServiceConfig, WalBackend};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt::init();

    if let Err(e) = run().await {
        error!("Error starting audit-trail chaincode: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env()?;

    let backend: Arc<dyn LedgerBackend> = match &config.data_path {
        Some(path) => Arc::new(WalBackend::open(path).await?),
        None => {
            info!("LEDGER_DATA_PATH not set, world state is in memory only");
            Arc::new(MemoryBackend::new())
        }
    };

    let contract = Arc::new(AuditContract::with_backend(backend));
    let server = ContractServer::bind(config.listen_addr, &config.chaincode_id, contract).await?;
    server.run().await?;

    Ok(())
}
