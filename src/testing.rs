//! In-memory collaborators shared by the crate's tests

use crate::chain::{BroadcastOutcome, InclusionResult, NodeRpc};
use crate::config::{RetryPolicy, TxOptions};
use crate::error::{TxError, TxResult};
use crate::tx::{
    parse_dec_coins, tx_hash, AccountQuerier, AccountState, GasInfo, KeyRecord, PubKey, SignMode,
    SignerData, SigningProvider, TxCodec, TxEnvelope, TxSimulator,
};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub(crate) const SIGNER_ADDRESS: &str = "cosmos1signer";

pub(crate) fn options() -> TxOptions {
    TxOptions {
        chain_id: "testnet-1".to_string(),
        from_name: "main".to_string(),
        authz_granter: None,
        fee_granter: None,
        gas: 200_000,
        gas_adjustment: 1.5,
        gas_prices: parse_dec_coins("0.1stake").unwrap(),
        fees: Vec::new(),
        memo: String::new(),
        timeout_height: 0,
        sign_mode: SignMode::Direct,
        simulate_and_execute: false,
        broadcast_retry: RetryPolicy::new(3, Duration::ZERO),
        inclusion_retry: RetryPolicy::new(3, Duration::ZERO),
        query_prove: false,
    }
}

pub(crate) fn account(sequence: u64) -> AccountState {
    AccountState {
        account_number: 7,
        sequence,
    }
}

pub(crate) fn key_record(name: &str, address: &str) -> KeyRecord {
    KeyRecord {
        name: name.to_string(),
        address: address.to_string(),
        pub_key: PubKey {
            type_url: "/cosmos.crypto.secp256k1.PubKey".to_string(),
            key: vec![2; 33],
        },
    }
}

pub(crate) fn included(hash: &str, code: u32) -> InclusionResult {
    InclusionResult {
        hash: hash.to_string(),
        height: 100,
        code,
        codespace: if code == 0 { String::new() } else { "bank".to_string() },
        log: if code == 0 { String::new() } else { "insufficient funds".to_string() },
        gas_wanted: 200_000,
        gas_used: 80_000,
        events: Vec::new(),
    }
}

pub(crate) fn not_found(hash: &str) -> TxError {
    TxError::Rpc(format!("Internal error (code -32603): tx ({}) not found", hash))
}

/// Node with scripted replies; unscripted broadcasts are accepted
#[derive(Default)]
pub(crate) struct FakeNode {
    broadcasts: Mutex<VecDeque<TxResult<BroadcastOutcome>>>,
    queries: Mutex<VecDeque<TxResult<InclusionResult>>>,
    /// Reject repeated bytes the way a mempool cache does
    dedupe: bool,
    mempool: Mutex<HashSet<String>>,
    pub sent: Mutex<Vec<Vec<u8>>>,
    pub broadcast_calls: AtomicUsize,
    pub query_calls: AtomicUsize,
}

impl FakeNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mempool_cache() -> Self {
        Self {
            dedupe: true,
            ..Self::default()
        }
    }

    pub fn push_broadcast(&self, reply: TxResult<BroadcastOutcome>) {
        self.broadcasts.lock().unwrap().push_back(reply);
    }

    pub fn push_query(&self, reply: TxResult<InclusionResult>) {
        self.queries.lock().unwrap().push_back(reply);
    }

    pub fn broadcasts(&self) -> usize {
        self.broadcast_calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NodeRpc for FakeNode {
    async fn broadcast_tx_sync(&self, tx_bytes: &[u8]) -> TxResult<BroadcastOutcome> {
        self.broadcast_calls.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(tx_bytes.to_vec());

        if let Some(reply) = self.broadcasts.lock().unwrap().pop_front() {
            return reply;
        }

        let hash = tx_hash(tx_bytes);
        if self.dedupe && !self.mempool.lock().unwrap().insert(hash.clone()) {
            return Err(TxError::Rpc("tx already exists in cache".to_string()));
        }
        Ok(BroadcastOutcome {
            hash,
            code: 0,
            codespace: String::new(),
            log: "[]".to_string(),
        })
    }

    async fn tx(&self, hash: &str, _prove: bool) -> TxResult<InclusionResult> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        match self.queries.lock().unwrap().pop_front() {
            Some(reply) => reply,
            None => Ok(included(hash, 0)),
        }
    }
}

/// Account source replaying a list of states; the last one repeats
pub(crate) struct FakeAccounts {
    states: Mutex<VecDeque<Option<AccountState>>>,
    pub queried: Mutex<Vec<String>>,
}

impl FakeAccounts {
    pub fn new(states: Vec<Option<AccountState>>) -> Self {
        Self {
            states: Mutex::new(states.into()),
            queried: Mutex::new(Vec::new()),
        }
    }

    pub fn fixed(sequence: u64) -> Self {
        Self::new(vec![Some(account(sequence))])
    }

    pub fn calls(&self) -> usize {
        self.queried.lock().unwrap().len()
    }
}

#[async_trait]
impl AccountQuerier for FakeAccounts {
    async fn account(&self, address: &str) -> TxResult<Option<AccountState>> {
        self.queried.lock().unwrap().push(address.to_string());
        let mut states = self.states.lock().unwrap();
        if states.len() > 1 {
            Ok(states.pop_front().flatten())
        } else {
            Ok(states.front().cloned().flatten())
        }
    }
}

/// Keyring signing with SHA-256 of the sign-bytes
#[derive(Default)]
pub(crate) struct FakeKeyring {
    keys: HashMap<String, KeyRecord>,
    fail: bool,
    pub signed: Mutex<Vec<Vec<u8>>>,
}

impl FakeKeyring {
    pub fn with_key(name: &str, address: &str) -> Self {
        let mut keys = HashMap::new();
        keys.insert(name.to_string(), key_record(name, address));
        Self {
            keys,
            ..Self::default()
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

impl SigningProvider for FakeKeyring {
    fn key(&self, name: &str) -> TxResult<Option<KeyRecord>> {
        Ok(self.keys.get(name).cloned())
    }

    fn sign(&self, name: &str, bytes: &[u8]) -> TxResult<(Vec<u8>, PubKey)> {
        if self.fail {
            return Err(TxError::Keyring("keyring is locked".to_string()));
        }
        let key = self
            .keys
            .get(name)
            .ok_or_else(|| TxError::KeyNotFound {
                name: name.to_string(),
            })?;
        self.signed.lock().unwrap().push(bytes.to_vec());
        Ok((Sha256::digest(bytes).to_vec(), key.pub_key.clone()))
    }
}

/// Codec writing envelopes as JSON, so tests can decode what was sent
pub(crate) struct JsonCodec;

impl JsonCodec {
    pub fn decode(bytes: &[u8]) -> TxEnvelope {
        serde_json::from_slice(bytes).unwrap()
    }
}

impl TxCodec for JsonCodec {
    fn encode(&self, tx: &TxEnvelope) -> TxResult<Vec<u8>> {
        serde_json::to_vec(tx).map_err(|e| TxError::Encoding(e.to_string()))
    }

    fn sign_bytes(
        &self,
        mode: SignMode,
        signer: &SignerData,
        tx: &TxEnvelope,
    ) -> TxResult<Vec<u8>> {
        serde_json::to_vec(&(mode, signer, tx)).map_err(|e| TxError::Encoding(e.to_string()))
    }
}

/// Simulator reporting a fixed gas figure, or failing
pub(crate) struct FakeSimulator {
    gas_used: Option<u64>,
    pub calls: AtomicUsize,
}

impl FakeSimulator {
    pub fn new(gas_used: u64) -> Self {
        Self {
            gas_used: Some(gas_used),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            gas_used: None,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TxSimulator for FakeSimulator {
    async fn simulate(&self, tx_bytes: &[u8]) -> TxResult<GasInfo> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let tx = JsonCodec::decode(tx_bytes);
        assert!(!tx.is_signed(), "simulation runs on the unsigned envelope");

        match self.gas_used {
            Some(gas_used) => Ok(GasInfo {
                gas_wanted: tx.fee.gas_limit,
                gas_used,
            }),
            None => Err(TxError::Rpc(
                "rpc error: code = Unknown desc = out of gas in location: WriteFlat".to_string(),
            )),
        }
    }
}
