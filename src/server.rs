/// Service loop: serves contract invocations from the host
///
/// Line-delimited JSON over TCP. Each request names a function, its string
/// arguments and optionally the transaction id assigned by the host. Each
/// response carries a status code (200, 400 or 500), the transaction id and
/// either a payload or an error message.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::context::{Transaction, TransactionContext};
use crate::contract::AuditContract;
use crate::error::{AuditLedgerError, Result};

pub const STATUS_OK: u16 = 200;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_ERROR: u16 = 500;

/// Longest request line accepted, newline included
pub const MAX_REQUEST_BYTES: usize = 64 * 1024;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvocationRequest {
    pub function: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txid: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvocationResponse {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl InvocationResponse {
    fn success(txid: &str, payload: Option<serde_json::Value>) -> Self {
        Self {
            status: STATUS_OK,
            txid: Some(txid.to_string()),
            payload,
            message: None,
        }
    }

    fn failure(status: u16, txid: Option<&str>, message: String) -> Self {
        Self {
            status,
            txid: txid.map(str::to_string),
            payload: None,
            message: Some(message),
        }
    }
}

pub struct ContractServer {
    listener: TcpListener,
    contract: Arc<AuditContract>,
    chaincode_id: String,
}

impl ContractServer {
    pub async fn bind(
        addr: SocketAddr,
        chaincode_id: &str,
        contract: Arc<AuditContract>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(
            "Chaincode {} listening on {} with functions {:?}",
            chaincode_id,
            listener.local_addr()?,
            AuditContract::functions()
        );

        Ok(Self {
            listener,
            contract,
            chaincode_id: chaincode_id.to_string(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until Ctrl-C
    pub async fn run(self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await
    }

    /// Accept connections until `shutdown` resolves, then wait for open
    /// connections to finish the invocation they are running
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Chaincode {} shutting down", self.chaincode_id);
                    break;
                }
                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = finished {
                        warn!("Connection task failed: {}", e);
                    }
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            // EMFILE, ECONNABORTED and friends: keep serving
                            warn!("Failed to accept connection: {}", e);
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                    };
                    debug!("Accepted connection from {}", peer);

                    let contract = self.contract.clone();
                    let stop = stop_rx.clone();
                    connections.spawn(async move {
                        if let Err(e) = serve_connection(stream, contract, stop).await {
                            warn!("Connection from {} ended with error: {}", peer, e);
                        }
                    });
                }
            }
        }

        let _ = stop_tx.send(true);
        if !connections.is_empty() {
            info!("Waiting for {} open connection(s)", connections.len());
        }
        while let Some(finished) = connections.join_next().await {
            if let Err(e) = finished {
                warn!("Connection task failed: {}", e);
            }
        }

        Ok(())
    }
}

async fn serve_connection(
    stream: TcpStream,
    contract: Arc<AuditContract>,
    mut stop: watch::Receiver<bool>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();

    loop {
        line.clear();

        let mut limited = (&mut reader).take(MAX_REQUEST_BYTES as u64 + 1);
        let read = tokio::select! {
            biased;
            _ = stop.changed() => break,
            read = limited.read_until(b'\n', &mut line) => read?,
        };
        if read == 0 {
            break;
        }

        if line.last() != Some(&b'\n') && line.len() > MAX_REQUEST_BYTES {
            let response = InvocationResponse::failure(
                STATUS_BAD_REQUEST,
                None,
                format!("request exceeds {} bytes", MAX_REQUEST_BYTES),
            );
            write_response(&mut writer, &response).await?;
            return Ok(());
        }

        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let response = match serde_json::from_slice::<InvocationRequest>(&line) {
            Ok(request) => dispatch(&contract, request).await,
            Err(e) => InvocationResponse::failure(
                STATUS_BAD_REQUEST,
                None,
                format!("malformed request: {}", e),
            ),
        };
        write_response(&mut writer, &response).await?;
    }

    Ok(())
}

async fn write_response(writer: &mut OwnedWriteHalf, response: &InvocationResponse) -> Result<()> {
    let mut data = serde_json::to_vec(response).map_err(AuditLedgerError::EncodeError)?;
    data.push(b'\n');
    writer.write_all(&data).await?;
    Ok(())
}

/// Run one invocation in its own transaction
pub async fn dispatch(contract: &AuditContract, request: InvocationRequest) -> InvocationResponse {
    let tx = match request.txid {
        Some(id) => Transaction::new(id),
        None => Transaction::generate(),
    };
    let txid = tx.current_transaction_id();

    match contract.invoke(&tx, &request.function, &request.args).await {
        Ok(payload) if payload.is_empty() => InvocationResponse::success(txid, None),
        Ok(payload) => match serde_json::from_slice(&payload) {
            Ok(value) => InvocationResponse::success(txid, Some(value)),
            Err(e) => InvocationResponse::failure(STATUS_ERROR, Some(txid), e.to_string()),
        },
        Err(e) => {
            warn!("{} failed in tx {}: {}", request.function, txid, e);
            InvocationResponse::failure(STATUS_ERROR, Some(txid), e.to_string())
        }
    }
}
