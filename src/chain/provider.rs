//! CometBFT JSON-RPC client
//!
//! Speaks the node's HTTP JSON-RPC surface: `broadcast_tx_sync`, `tx`,
//! `abci_query` (gRPC dispatch), `status` and `health`.

use super::{BroadcastOutcome, GrpcQuerier, InclusionResult, NodeRpc};
use crate::config::{RetryPolicy, Settings};
use crate::error::{TxError, TxResult};
use crate::events::Event;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error, warn};

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a, P: Serialize> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<R> {
    result: Option<R>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<String>,
}

impl JsonRpcError {
    fn into_tx_error(self) -> TxError {
        // The interesting part (e.g. "tx (..) not found") is in `data`
        match self.data {
            Some(data) if !data.is_empty() => {
                TxError::Rpc(format!("{} (code {}): {}", self.message, self.code, data))
            }
            _ => TxError::Rpc(format!("{} (code {})", self.message, self.code)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BroadcastTxResponse {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    codespace: String,
    #[serde(default)]
    log: String,
    hash: String,
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    hash: String,
    #[serde(deserialize_with = "de_u64")]
    height: u64,
    tx_result: ExecTxResult,
}

#[derive(Debug, Deserialize)]
struct ExecTxResult {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    codespace: String,
    #[serde(default)]
    log: String,
    #[serde(default, deserialize_with = "de_u64")]
    gas_wanted: u64,
    #[serde(default, deserialize_with = "de_u64")]
    gas_used: u64,
    #[serde(default)]
    events: Vec<Event>,
}

#[derive(Debug, Deserialize)]
struct AbciQueryResult {
    response: AbciQueryResponse,
}

#[derive(Debug, Deserialize)]
struct AbciQueryResponse {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    codespace: String,
    #[serde(default)]
    log: String,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    node_info: NodeInfo,
    sync_info: SyncInfo,
}

#[derive(Debug, Deserialize)]
struct NodeInfo {
    network: String,
    #[serde(default)]
    moniker: String,
    #[serde(default)]
    version: String,
}

#[derive(Debug, Deserialize)]
struct SyncInfo {
    #[serde(deserialize_with = "de_u64")]
    latest_block_height: u64,
    #[serde(default)]
    catching_up: bool,
}

/// Summary of the node's `status` endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub network: String,
    pub moniker: String,
    pub version: String,
    pub latest_block_height: u64,
    pub catching_up: bool,
}

/// JSON-RPC client for a single CometBFT endpoint
pub struct CometRpcClient {
    http_client: reqwest::Client,
    rpc_url: String,
    request_id: AtomicU64,
    /// Budget for generic gRPC queries
    query_retry: RetryPolicy,
}

impl CometRpcClient {
    /// Create a new client for `rpc_url`
    pub fn new(
        rpc_url: impl Into<String>,
        timeout: Duration,
        query_retry: RetryPolicy,
    ) -> TxResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TxError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            rpc_url: rpc_url.into(),
            request_id: AtomicU64::new(1),
            query_retry,
        })
    }

    /// Create a client for the first configured endpoint
    pub fn from_settings(settings: &Settings) -> TxResult<Self> {
        let rpc_url = settings
            .rpc
            .addrs
            .first()
            .ok_or_else(|| TxError::Config("rpc.addrs cannot be empty".to_string()))?;
        Self::new(rpc_url.clone(), settings.rpc_timeout(), settings.query_retry())
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Make a JSON-RPC call
    async fn call<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> TxResult<R> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        debug!("RPC {} (id {}) -> {}", method, id, self.rpc_url);

        let response = self
            .http_client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TxError::Timeout {
                        operation: method.to_string(),
                    }
                } else {
                    TxError::Rpc(format!("Failed to send {} request: {}", method, e))
                }
            })?;

        let rpc_response: JsonRpcResponse<R> = response
            .json()
            .await
            .map_err(|e| TxError::Rpc(format!("Failed to parse {} response: {}", method, e)))?;

        if let Some(error) = rpc_response.error {
            return Err(error.into_tx_error());
        }

        rpc_response
            .result
            .ok_or_else(|| TxError::Rpc(format!("{} response missing result", method)))
    }

    /// Query node identity and sync state
    pub async fn status(&self) -> TxResult<NodeStatus> {
        let status: StatusResponse = self.call("status", json!({})).await?;
        Ok(NodeStatus {
            network: status.node_info.network,
            moniker: status.node_info.moniker,
            version: status.node_info.version,
            latest_block_height: status.sync_info.latest_block_height,
            catching_up: status.sync_info.catching_up,
        })
    }

    /// Health check
    pub async fn health_check(&self) -> bool {
        match self.call::<_, serde_json::Value>("health", json!({})).await {
            Ok(_) => true,
            Err(e) => {
                error!("Health check failed for {}: {}", self.rpc_url, e);
                false
            }
        }
    }

    /// Single `abci_query`; a non-zero response code is an error
    async fn abci_query(&self, path: &str, data: &[u8]) -> TxResult<Vec<u8>> {
        let result: AbciQueryResult = self
            .call(
                "abci_query",
                json!({
                    "path": path,
                    "data": hex::encode(data),
                    "height": "0",
                    "prove": false,
                }),
            )
            .await?;

        let response = result.response;
        if response.code != 0 {
            return Err(TxError::Rpc(format!(
                "abci query {} failed: code={}, codespace={}, log={}",
                path, response.code, response.codespace, response.log
            )));
        }

        match response.value {
            Some(value) => STANDARD
                .decode(value)
                .map_err(|e| TxError::Encoding(format!("invalid abci query value: {}", e))),
            None => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl NodeRpc for CometRpcClient {
    async fn broadcast_tx_sync(&self, tx_bytes: &[u8]) -> TxResult<BroadcastOutcome> {
        let response: BroadcastTxResponse = self
            .call("broadcast_tx_sync", json!({ "tx": STANDARD.encode(tx_bytes) }))
            .await?;

        Ok(BroadcastOutcome {
            hash: response.hash,
            code: response.code,
            codespace: response.codespace,
            log: response.log,
        })
    }

    async fn tx(&self, hash: &str, prove: bool) -> TxResult<InclusionResult> {
        let hash_bytes = hex::decode(hash)
            .map_err(|e| TxError::Encoding(format!("invalid tx hash {}: {}", hash, e)))?;

        let response: TxResponse = self
            .call(
                "tx",
                json!({ "hash": STANDARD.encode(hash_bytes), "prove": prove }),
            )
            .await?;

        let result = response.tx_result;
        Ok(InclusionResult {
            hash: response.hash,
            height: response.height,
            code: result.code,
            codespace: result.codespace,
            log: result.log,
            gas_wanted: result.gas_wanted,
            gas_used: result.gas_used,
            events: result.events,
        })
    }
}

#[async_trait]
impl GrpcQuerier for CometRpcClient {
    async fn query_grpc(&self, method: &str, request: &[u8]) -> TxResult<Vec<u8>> {
        let attempts = self.query_retry.attempts;
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.abci_query(method, request).await {
                Ok(value) => return Ok(value),
                // Missing objects will not appear by asking again
                Err(e) if e.is_not_found() => return Err(e),
                Err(e) => {
                    warn!(
                        "Query {} failed (attempt {}/{}): {}",
                        method, attempt, attempts, e
                    );
                    last_error = Some(e);
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.query_retry.delay).await;
            }
        }

        Err(match last_error {
            Some(e) => TxError::exhausted(&format!("query {}", method), attempts, e),
            None => TxError::Config("query retry attempts cannot be zero".to_string()),
        })
    }
}

/// Accept integers encoded either as JSON numbers or as strings
pub(crate) fn de_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrString {
        Num(u64),
        Str(String),
    }

    match NumOrString::deserialize(deserializer)? {
        NumOrString::Num(n) => Ok(n),
        NumOrString::Str(s) if s.is_empty() => Ok(0),
        NumOrString::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::{extract::State, routing::post, Json, Router};
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Stub {
        /// method -> canned `result` or `error` object
        replies: Arc<HashMap<&'static str, Value>>,
        requests: Arc<std::sync::Mutex<Vec<Value>>>,
        calls: Arc<AtomicUsize>,
    }

    async fn handle(State(stub): State<Stub>, Json(request): Json<Value>) -> Json<Value> {
        stub.calls.fetch_add(1, Ordering::SeqCst);
        stub.requests.lock().unwrap().push(request.clone());

        let method = request["method"].as_str().unwrap_or_default();
        let mut reply = json!({ "jsonrpc": "2.0", "id": request["id"].clone() });
        match stub.replies.get(method) {
            Some(body) if body.get("error").is_some() => reply["error"] = body["error"].clone(),
            Some(body) => reply["result"] = body.clone(),
            None => {
                reply["error"] = json!({ "code": -32601, "message": "Method not found" });
            }
        }
        Json(reply)
    }

    async fn serve(replies: HashMap<&'static str, Value>) -> (CometRpcClient, Stub) {
        let stub = Stub {
            replies: Arc::new(replies),
            ..Default::default()
        };
        let app = Router::new().route("/", post(handle)).with_state(stub.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = CometRpcClient::new(
            format!("http://{}", addr),
            Duration::from_secs(5),
            RetryPolicy::new(3, Duration::ZERO),
        )
        .unwrap();
        (client, stub)
    }

    #[tokio::test]
    async fn test_broadcast_tx_sync_sends_base64() {
        let mut replies = HashMap::new();
        replies.insert(
            "broadcast_tx_sync",
            json!({ "code": 32, "codespace": "sdk", "log": "account sequence mismatch", "data": "", "hash": "ABCD" }),
        );
        let (client, stub) = serve(replies).await;

        let outcome = client.broadcast_tx_sync(&[1, 2, 3]).await.unwrap();
        assert_eq!(outcome.code, 32);
        assert_eq!(outcome.codespace, "sdk");
        assert_eq!(outcome.hash, "ABCD");

        let requests = stub.requests.lock().unwrap();
        assert_eq!(requests[0]["params"]["tx"], "AQID");
    }

    #[tokio::test]
    async fn test_tx_parses_string_numbers_and_events() {
        let mut replies = HashMap::new();
        replies.insert(
            "tx",
            json!({
                "hash": "0A0B",
                "height": "1234",
                "index": 0,
                "tx_result": {
                    "code": 0,
                    "log": "",
                    "gas_wanted": "200000",
                    "gas_used": "81234",
                    "events": [{
                        "type": "session.v1.EventStart",
                        "attributes": [
                            { "key": "id", "value": "\"42\"", "index": true },
                            { "key": "empty", "value": null, "index": false }
                        ]
                    }]
                }
            }),
        );
        let (client, stub) = serve(replies).await;

        let result = client.tx("0A0B", true).await.unwrap();
        assert_eq!(result.height, 1234);
        assert_eq!(result.gas_used, 81_234);
        assert!(result.is_ok());
        assert_eq!(result.events.len(), 1);
        assert_eq!(result.events[0].attribute("id"), Some("\"42\""));
        assert_eq!(result.events[0].attribute("empty"), Some(""));

        let requests = stub.requests.lock().unwrap();
        assert_eq!(requests[0]["params"]["hash"], "Cgs=");
        assert_eq!(requests[0]["params"]["prove"], true);
    }

    #[tokio::test]
    async fn test_rpc_error_keeps_data_text() {
        let mut replies = HashMap::new();
        replies.insert(
            "tx",
            json!({ "error": { "code": -32603, "message": "Internal error", "data": "tx (0A0B) not found" } }),
        );
        let (client, _stub) = serve(replies).await;

        let err = client.tx("0A0B", false).await.unwrap_err();
        assert!(matches!(err, TxError::Rpc(_)));
        assert!(err.is_not_found());
        assert!(err.to_string().contains("tx (0A0B) not found"));
    }

    #[tokio::test]
    async fn test_invalid_hash_is_rejected_locally() {
        let (client, stub) = serve(HashMap::new()).await;
        let err = client.tx("not-hex", false).await.unwrap_err();
        assert!(matches!(err, TxError::Encoding(_)));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_query_grpc_decodes_value() {
        let mut replies = HashMap::new();
        replies.insert(
            "abci_query",
            json!({ "response": { "code": 0, "log": "", "value": "CgVoZWxsbw==", "height": "10" } }),
        );
        let (client, stub) = serve(replies).await;

        let value = client
            .query_grpc("/cosmos.auth.v1beta1.Query/Account", &[0xde, 0xad])
            .await
            .unwrap();
        assert_eq!(value, b"\n\x05hello".to_vec());

        let requests = stub.requests.lock().unwrap();
        assert_eq!(requests[0]["params"]["data"], "dead");
        assert_eq!(requests[0]["params"]["path"], "/cosmos.auth.v1beta1.Query/Account");
    }

    #[tokio::test]
    async fn test_simulate_through_abci_query() {
        use crate::tx::{GasInfo, GrpcSimulator, TxSimulator, SIMULATE_METHOD};

        let mut replies = HashMap::new();
        replies.insert(
            "abci_query",
            json!({ "response": { "code": 0, "log": "", "value": "CgQIZBAy", "height": "10" } }),
        );
        let (client, stub) = serve(replies).await;

        let simulator = GrpcSimulator::new(Arc::new(client));
        let info = simulator.simulate(&[1, 2]).await.unwrap();
        assert_eq!(
            info,
            GasInfo {
                gas_wanted: 100,
                gas_used: 50,
            }
        );

        let requests = stub.requests.lock().unwrap();
        assert_eq!(requests[0]["params"]["path"], SIMULATE_METHOD);
        assert_eq!(requests[0]["params"]["data"], "12020102");
    }

    #[tokio::test]
    async fn test_query_grpc_not_found_is_not_retried() {
        let mut replies = HashMap::new();
        replies.insert(
            "abci_query",
            json!({ "response": {
                "code": 22,
                "codespace": "sdk",
                "log": "rpc error: code = NotFound desc = account cosmos1xyz not found"
            } }),
        );
        let (client, stub) = serve(replies).await;

        let err = client.query_grpc("/cosmos.auth.v1beta1.Query/Account", &[]).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_query_grpc_retries_other_failures() {
        let mut replies = HashMap::new();
        replies.insert(
            "abci_query",
            json!({ "response": { "code": 1, "codespace": "sdk", "log": "internal" } }),
        );
        let (client, stub) = serve(replies).await;

        let err = client.query_grpc("/x.Query/Y", &[]).await.unwrap_err();
        assert!(matches!(err, TxError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_status() {
        let mut replies = HashMap::new();
        replies.insert(
            "status",
            json!({
                "node_info": { "network": "testnet-1", "moniker": "node0", "version": "0.38.12" },
                "sync_info": { "latest_block_height": "777", "catching_up": false }
            }),
        );
        replies.insert("health", json!({}));
        let (client, _stub) = serve(replies).await;

        let status = client.status().await.unwrap();
        assert_eq!(status.network, "testnet-1");
        assert_eq!(status.latest_block_height, 777);
        assert!(client.health_check().await);
    }

    #[test]
    fn test_de_u64_accepts_both_encodings() {
        #[derive(Deserialize)]
        struct Wrapper {
            #[serde(deserialize_with = "de_u64")]
            n: u64,
        }

        let a: Wrapper = serde_json::from_str(r#"{"n": 5}"#).unwrap();
        let b: Wrapper = serde_json::from_str(r#"{"n": "5"}"#).unwrap();
        assert_eq!(a.n, b.n);
        assert!(serde_json::from_str::<Wrapper>(r#"{"n": "five"}"#).is_err());
    }
}
