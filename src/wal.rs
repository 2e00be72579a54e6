/// WAL: Write-Ahead Log for durable world state
///
/// Every write is appended to a local log file and synced before it is
/// applied in memory. On open, the log is replayed to rebuild the keyspace.
///
/// Each line is one JSON frame carrying the entry, its LSN and a CRC32 of
/// the entry's JSON encoding. A final line without a newline is a torn write
/// from a crash and is dropped; any other bad line is corruption.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backend::{LedgerBackend, StateIterator};
use crate::error::{AuditLedgerError, Result};
use crate::memory::MemoryBackend;

/// WAL Entry types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum WalEntry {
    Put { key: String, value: Vec<u8> },
}

#[derive(Debug, Serialize, Deserialize)]
struct WalFrame {
    lsn: u64,
    crc: u32,
    entry: WalEntry,
}

async fn write_synced(file: &mut File, data: &[u8]) -> Result<()> {
    file.write_all(data).await?;
    file.flush().await?;
    file.sync_data().await?;
    Ok(())
}

fn checksum(entry: &WalEntry) -> Result<u32> {
    let bytes = serde_json::to_vec(entry).map_err(AuditLedgerError::EncodeError)?;
    Ok(crc32fast::hash(&bytes))
}

struct LogFile {
    file: File,

    /// Length of the log up to the last fully synced frame
    committed_len: u64,
}

/// Write-Ahead Log implementation
pub struct WAL {
    path: PathBuf,

    log: Mutex<LogFile>,

    /// Current log sequence number
    lsn: Arc<RwLock<u64>>,
}

impl WAL {
    /// Open the log at `path`, creating it (and its directory) if missing
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        info!("Opening WAL at {}", path.display());

        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                tokio::fs::create_dir_all(dir).await?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let committed_len = file.metadata().await?.len();

        Ok(Self {
            path,
            log: Mutex::new(LogFile { file, committed_len }),
            lsn: Arc::new(RwLock::new(0)),
        })
    }

    /// Append an entry and sync it to disk. Returns the entry's LSN.
    ///
    /// On failure the log is cut back to its last committed length, so a
    /// frame that was not synced never survives a restart.
    pub async fn append_entry(&self, entry: WalEntry) -> Result<u64> {
        let mut log = self.log.lock().await;
        let committed_len = log.committed_len;

        let on_disk = log.file.metadata().await?.len();
        if on_disk > committed_len {
            warn!(
                "WAL: Dropping {} uncommitted bytes before LSN {}",
                on_disk - committed_len,
                *self.lsn.read() + 1
            );
            log.file.set_len(committed_len).await?;
        }

        let lsn = *self.lsn.read() + 1;
        let frame = WalFrame {
            lsn,
            crc: checksum(&entry)?,
            entry,
        };

        let mut data = serde_json::to_vec(&frame).map_err(AuditLedgerError::EncodeError)?;
        data.push(b'\n');

        if let Err(e) = write_synced(&mut log.file, &data).await {
            if let Err(rollback) = log.file.set_len(committed_len).await {
                warn!("WAL: Failed to roll back LSN {}: {}", lsn, rollback);
            }
            return Err(e);
        }

        log.committed_len = committed_len + data.len() as u64;
        *self.lsn.write() = lsn;
        debug!("WAL: Appended entry at LSN {}", lsn);

        Ok(lsn)
    }

    /// Read back every complete entry in the log, in append order
    pub async fn replay(&self) -> Result<Vec<WalEntry>> {
        info!("WAL: Starting replay from {}", self.path.display());

        let contents = tokio::fs::read(&self.path).await?;
        let mut entries = Vec::new();
        let mut max_lsn = 0;
        let mut valid_len = 0usize;

        let mut lines = contents.split_inclusive(|b| *b == b'\n');
        while let Some(line) = lines.next() {
            if !line.ends_with(b"\n") {
                // Only the last segment can lack a newline
                warn!(
                    "WAL: Discarding torn tail of {} bytes after LSN {}",
                    line.len(),
                    max_lsn
                );
                // Later appends must start on a fresh line
                let mut log = self.log.lock().await;
                log.file.set_len(valid_len as u64).await?;
                log.committed_len = valid_len as u64;
                break;
            }
            valid_len += line.len();

            let body = &line[..line.len() - 1];
            if body.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let frame: WalFrame = serde_json::from_slice(body)
                .map_err(|_| AuditLedgerError::WalCorruption { lsn: max_lsn + 1 })?;

            if checksum(&frame.entry)? != frame.crc {
                return Err(AuditLedgerError::WalCorruption { lsn: frame.lsn });
            }

            max_lsn = max_lsn.max(frame.lsn);
            entries.push(frame.entry);
        }

        if valid_len == contents.len() {
            self.log.lock().await.committed_len = valid_len as u64;
        }
        *self.lsn.write() = max_lsn;

        info!("WAL: Recovered {} entries (up to LSN {})", entries.len(), max_lsn);

        Ok(entries)
    }

    /// Get the current LSN (Log Sequence Number)
    pub fn current_lsn(&self) -> u64 {
        *self.lsn.read()
    }
}

/// Durable backend: WAL on disk, keyspace in memory
pub struct WalBackend {
    wal: WAL,
    state: MemoryBackend,
}

impl WalBackend {
    /// Open the log at `path` and rebuild the keyspace from it
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let wal = WAL::open(path).await?;
        let state = MemoryBackend::new();

        for entry in wal.replay().await? {
            match entry {
                WalEntry::Put { key, value } => {
                    debug!("Recovered: PUT {}", key);
                    state.apply(key, Bytes::from(value));
                }
            }
        }

        info!("WalBackend ready with {} keys", state.len());
        Ok(Self { wal, state })
    }

    pub fn current_lsn(&self) -> u64 {
        self.wal.current_lsn()
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    pub fn open_iterators(&self) -> usize {
        self.state.open_iterators()
    }
}

#[async_trait]
impl LedgerBackend for WalBackend {
    async fn put(&self, key: &str, value: Bytes) -> Result<()> {
        // Durability point: nothing is applied unless the log accepted it
        self.wal
            .append_entry(WalEntry::Put {
                key: key.to_string(),
                value: value.to_vec(),
            })
            .await
            .map_err(|e| AuditLedgerError::write(key, e))?;

        self.state.apply(key.to_string(), value);
        Ok(())
    }

    async fn range_scan(&self, start: &str, end: &str) -> Result<Box<dyn StateIterator>> {
        self.state.range_scan(start, end).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_append_then_replay() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.wal");

        let wal = WAL::open(&path).await.unwrap();
        assert_eq!(
            wal.append_entry(WalEntry::Put { key: "k1".into(), value: b"v1".to_vec() })
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            wal.append_entry(WalEntry::Put { key: "k2".into(), value: b"v2".to_vec() })
                .await
                .unwrap(),
            2
        );
        drop(wal);

        let wal = WAL::open(&path).await.unwrap();
        let entries = wal.replay().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1], WalEntry::Put { key: "k2".into(), value: b"v2".to_vec() });
        assert_eq!(wal.current_lsn(), 2);
    }

    #[tokio::test]
    async fn test_replay_drops_torn_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.wal");

        let wal = WAL::open(&path).await.unwrap();
        wal.append_entry(WalEntry::Put { key: "k1".into(), value: b"v1".to_vec() })
            .await
            .unwrap();
        drop(wal);

        let mut raw = std::fs::read(&path).unwrap();
        raw.extend_from_slice(br#"{"lsn":2,"crc":1,"entry":{"Pu"#);
        std::fs::write(&path, raw).unwrap();

        let wal = WAL::open(&path).await.unwrap();
        assert_eq!(wal.replay().await.unwrap().len(), 1);
        assert_eq!(wal.current_lsn(), 1);

        wal.append_entry(WalEntry::Put { key: "k2".into(), value: b"v2".to_vec() })
            .await
            .unwrap();
        drop(wal);

        let wal = WAL::open(&path).await.unwrap();
        assert_eq!(wal.replay().await.unwrap().len(), 2);
        assert_eq!(wal.current_lsn(), 2);
    }

    #[tokio::test]
    async fn test_replay_detects_checksum_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.wal");

        let wal = WAL::open(&path).await.unwrap();
        wal.append_entry(WalEntry::Put { key: "k1".into(), value: b"v1".to_vec() })
            .await
            .unwrap();
        drop(wal);

        let raw = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, raw.replace("\"k1\"", "\"k9\"")).unwrap();

        let wal = WAL::open(&path).await.unwrap();
        match wal.replay().await {
            Err(AuditLedgerError::WalCorruption { lsn }) => assert_eq!(lsn, 1),
            other => panic!("expected corruption, got {:?}", other.map(|e| e.len())),
        }
    }

    #[tokio::test]
    async fn test_backend_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("ledger.wal");

        let backend = WalBackend::open(&path).await.unwrap();
        assert!(backend.is_empty());
        backend.put("LOG-a", Bytes::from_static(b"1")).await.unwrap();
        backend.put("LOG-b", Bytes::from_static(b"2")).await.unwrap();
        backend.put("LOG-a", Bytes::from_static(b"3")).await.unwrap();
        drop(backend);

        let backend = WalBackend::open(&path).await.unwrap();
        assert_eq!(backend.len(), 2);
        assert_eq!(backend.current_lsn(), 3);

        let mut iter = backend.range_scan("", "").await.unwrap();
        assert_eq!(backend.open_iterators(), 1);
        assert_eq!(iter.next().unwrap().value, Bytes::from_static(b"3"));
        iter.close();
        assert_eq!(backend.open_iterators(), 0);
    }

    fn append_raw(path: &Path, bytes: &[u8]) {
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new().append(true).open(path).unwrap();
        file.write_all(bytes).unwrap();
    }

    #[tokio::test]
    async fn test_uncommitted_bytes_are_cut_before_next_append() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.wal");

        // Leftovers of a write_all that failed halfway
        let backend = WalBackend::open(&path).await.unwrap();
        backend.put("LOG-a", Bytes::from_static(b"1")).await.unwrap();
        append_raw(&path, br#"{"lsn":2,"crc":12"#);
        backend.put("LOG-b", Bytes::from_static(b"2")).await.unwrap();
        drop(backend);

        let backend = WalBackend::open(&path).await.unwrap();
        assert_eq!(backend.len(), 2);
        assert_eq!(backend.current_lsn(), 2);

        // A whole frame whose sync failed: reported as a failed write, so it
        // must not come back after a restart
        let ghost = WalEntry::Put { key: "LOG-ghost".into(), value: b"x".to_vec() };
        let frame = WalFrame { lsn: 3, crc: checksum(&ghost).unwrap(), entry: ghost };
        let mut line = serde_json::to_vec(&frame).unwrap();
        line.push(b'\n');
        append_raw(&path, &line);
        backend.put("LOG-c", Bytes::from_static(b"3")).await.unwrap();
        drop(backend);

        let backend = WalBackend::open(&path).await.unwrap();
        assert_eq!(backend.len(), 3);
        assert_eq!(backend.current_lsn(), 3);

        let mut iter = backend.range_scan("LOG-c", "LOG-h").await.unwrap();
        assert_eq!(iter.next().unwrap().key, "LOG-c");
        assert!(!iter.has_next());
        iter.close();
    }
}
