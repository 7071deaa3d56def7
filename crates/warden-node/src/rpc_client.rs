use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

use warden_core::boxes::UtxoBox;
use warden_core::error::WardenError;
use warden_core::transaction::SignedTransaction;
use warden_core::types::{Address, BoxId, Height, TokenId, TxId};
use warden_watcher::{ChainClient, ScanBatch, ScannerFeed};

/// Raw JSON-RPC 2.0 over HTTP POST.
struct JsonRpc {
    url: String,
    client: reqwest::Client,
}

impl JsonRpc {
    fn new(url: &str) -> Self {
        Self { url: url.to_string(), client: reqwest::Client::new() }
    }

    /// Call a JSON-RPC method and return the `result` field.
    async fn call(&self, method: &str, params: Value) -> Result<Value, WardenError> {
        result_of(method, self.envelope(method, params).await?)
    }

    /// The full response object. Only transport failures are errors here.
    async fn envelope(&self, method: &str, params: Value) -> Result<Value, WardenError> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });
        debug!(method, url = %self.url, "rpc call");
        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| WardenError::Network(format!("connecting to {}: {e}", self.url)))?;
        resp.json()
            .await
            .map_err(|e| WardenError::Network(format!("parsing {method} response: {e}")))
    }
}

fn result_of(method: &str, envelope: Value) -> Result<Value, WardenError> {
    if let Some(err) = envelope.get("error").filter(|e| !e.is_null()) {
        return Err(WardenError::Network(format!("{method}: {err}")));
    }
    Ok(envelope.get("result").cloned().unwrap_or(Value::Null))
}

fn decode<T: DeserializeOwned>(method: &str, value: Value) -> Result<T, WardenError> {
    serde_json::from_value(value).map_err(|e| WardenError::Serialization(format!("{method}: {e}")))
}

// ── Target chain ─────────────────────────────────────────────────────────────

pub struct ChainRpcClient {
    rpc: JsonRpc,
}

impl ChainRpcClient {
    pub fn new(url: &str) -> Self {
        Self { rpc: JsonRpc::new(url) }
    }
}

#[async_trait]
impl ChainClient for ChainRpcClient {
    async fn height(&self) -> Result<Height, WardenError> {
        let v = self.rpc.call("warden_getHeight", json!([])).await?;
        decode("warden_getHeight", v)
    }

    async fn submit(&self, tx: &SignedTransaction) -> Result<TxId, WardenError> {
        let envelope = self
            .rpc
            .envelope("warden_sendTransaction", json!([hex::encode(tx.to_bytes())]))
            .await?;
        if let Some(err) = envelope.get("error").filter(|e| !e.is_null()) {
            return Err(WardenError::TxRejected(err.to_string()));
        }
        decode("warden_sendTransaction", envelope.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn unspent_boxes_by_address(
        &self,
        address: &Address,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<UtxoBox>, WardenError> {
        let v = self
            .rpc
            .call("warden_getUnspentBoxes", json!([address.as_str(), offset, limit]))
            .await?;
        decode("warden_getUnspentBoxes", v)
    }

    async fn box_by_token_id(&self, token: &TokenId) -> Result<Option<UtxoBox>, WardenError> {
        let v = self.rpc.call("warden_getBoxByTokenId", json!([token.to_hex()])).await?;
        decode("warden_getBoxByTokenId", v)
    }

    async fn box_by_id(&self, id: &BoxId) -> Result<Option<UtxoBox>, WardenError> {
        let v = self.rpc.call("warden_getBox", json!([id.to_hex()])).await?;
        decode("warden_getBox", v)
    }

    async fn tx_confirmations(&self, tx_id: &TxId) -> Result<Option<u64>, WardenError> {
        let v = self.rpc.call("warden_getTxConfirmations", json!([tx_id.to_hex()])).await?;
        decode("warden_getTxConfirmations", v)
    }

    async fn is_in_mempool(&self, tx_id: &TxId) -> Result<bool, WardenError> {
        let v = self.rpc.call("warden_isInMempool", json!([tx_id.to_hex()])).await?;
        decode("warden_isInMempool", v)
    }
}

// ── Scanner ──────────────────────────────────────────────────────────────────

pub struct ScannerRpcClient {
    rpc: JsonRpc,
}

impl ScannerRpcClient {
    pub fn new(url: &str) -> Self {
        Self { rpc: JsonRpc::new(url) }
    }
}

#[async_trait]
impl ScannerFeed for ScannerRpcClient {
    async fn fetch(&self, from_height: Height) -> Result<Option<ScanBatch>, WardenError> {
        let v = self.rpc.call("scanner_getBatch", json!([from_height])).await?;
        decode("scanner_getBatch", v)
    }
}
