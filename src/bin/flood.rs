use audit_ledger::{AppendLogStore, Transaction, WalBackend};
use std::env;
use std::sync::Arc;
use std::time::Instant;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("\nAudit ledger flood");
    println!("==================");

    let path = env::var("LEDGER_DATA_PATH").unwrap_or_else(|_| "flood-ledger.wal".to_string());
    let total: usize = match env::var("FLOOD_RECORDS") {
        Ok(val) => val.parse()?,
        Err(_) => 1000,
    };

    println!("▶ Opening ledger at {}...", path);
    let backend = Arc::new(WalBackend::open(&path).await?);
    let store = AppendLogStore::new(backend.clone());
    println!("✓ Opened with {} existing keys.\n", backend.len());

    println!("▶ Logging {} accesses...", total);
    let start = Instant::now();

    // One user per record so same-second writes never share a key
    for i in 0..total {
        let tx = Transaction::generate();
        store
            .append(&tx, &format!("user-{:06}", i), &format!("GET /api/admin/{}", i % 16))
            .await?;

        if (i + 1) % 100 == 0 {
            println!("  {} records | LSN {}", i + 1, backend.current_lsn());
        }
    }

    let duration = start.elapsed();
    println!("\n✅ Done in {:.2?}", duration);
    println!("   Rate: {:.2} records/sec", total as f64 / duration.as_secs_f64());

    let records = store.list_all().await?;
    println!("\n📊 Ledger now holds {} records (LSN {})", records.len(), backend.current_lsn());

    Ok(())
}
