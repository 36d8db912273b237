//! Soroban JSON-RPC client for transaction submission and status polling.

use alloy::primitives::B256;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::error::ExecutorError;
use crate::types::TransactionStatus;

/// Request timeout for RPC calls.
const RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// Node-facing transaction operations.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Submit a signed envelope and return its transaction hash.
    async fn send_transaction(&self, envelope_xdr: &str) -> Result<B256, ExecutorError>;

    /// Look up the current status of a submitted transaction.
    async fn get_transaction(&self, hash: B256) -> Result<TransactionStatus, ExecutorError>;
}

/// JSON-RPC 2.0 client for a Soroban RPC node.
pub struct SorobanRpcClient {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

#[derive(Serialize)]
struct RpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Deserialize)]
struct RpcResponse<R> {
    result: Option<R>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Serialize)]
struct SendTransactionParams<'a> {
    transaction: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendTransactionResult {
    status: String,
    hash: String,
    error_result_xdr: Option<String>,
}

#[derive(Serialize)]
struct GetTransactionParams {
    hash: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetTransactionResult {
    status: String,
    result_xdr: Option<String>,
}

impl SorobanRpcClient {
    pub fn new(url: impl Into<String>) -> Result<Self, ExecutorError> {
        let client = reqwest::Client::builder().timeout(RPC_TIMEOUT).build()?;
        Ok(Self::with_client(client, url))
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<P, R>(&self, method: &str, params: P) -> Result<R, ExecutorError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let body: RpcResponse<R> = response.json().await?;
        match (body.result, body.error) {
            (_, Some(err)) => Err(ExecutorError::Transport(format!(
                "{method} returned rpc error {}: {}",
                err.code, err.message
            ))),
            (Some(result), None) => Ok(result),
            (None, None) => Err(ExecutorError::Transport(format!(
                "{method} returned neither result nor error"
            ))),
        }
    }
}

#[async_trait]
impl LedgerRpc for SorobanRpcClient {
    async fn send_transaction(&self, envelope_xdr: &str) -> Result<B256, ExecutorError> {
        let result: SendTransactionResult = self
            .call(
                "sendTransaction",
                SendTransactionParams {
                    transaction: envelope_xdr,
                },
            )
            .await?;

        debug!(status = %result.status, hash = %result.hash, "sendTransaction response");
        check_send_status(&result.status, result.error_result_xdr.as_deref())?;
        parse_hash(&result.hash)
    }

    async fn get_transaction(&self, hash: B256) -> Result<TransactionStatus, ExecutorError> {
        let result: GetTransactionResult = self
            .call(
                "getTransaction",
                GetTransactionParams {
                    hash: format!("{hash:x}"),
                },
            )
            .await?;

        map_transaction_status(&result.status, result.result_xdr)
    }
}

/// `PENDING` and `DUPLICATE` mean the node accepted the envelope.
fn check_send_status(status: &str, error_xdr: Option<&str>) -> Result<(), ExecutorError> {
    match status {
        "PENDING" | "DUPLICATE" => Ok(()),
        "TRY_AGAIN_LATER" => Err(ExecutorError::Submission(
            "node busy (TRY_AGAIN_LATER)".to_string(),
        )),
        other => Err(ExecutorError::Submission(format!(
            "status {other}: {}",
            error_xdr.unwrap_or("no error detail")
        ))),
    }
}

fn map_transaction_status(
    status: &str,
    result_xdr: Option<String>,
) -> Result<TransactionStatus, ExecutorError> {
    match status {
        "NOT_FOUND" => Ok(TransactionStatus::Pending),
        "SUCCESS" => Ok(TransactionStatus::Success),
        "FAILED" => Ok(TransactionStatus::Failed(
            result_xdr.unwrap_or_else(|| "no result detail".to_string()),
        )),
        other => Err(ExecutorError::Transport(format!(
            "unknown transaction status {other}"
        ))),
    }
}

fn parse_hash(hash: &str) -> Result<B256, ExecutorError> {
    hash.parse::<B256>()
        .map_err(|e| ExecutorError::Transport(format!("invalid transaction hash {hash}: {e}")))
}
