//! Chain module - node RPC surface and inclusion tracking
//!
//! This module provides:
//! - The narrow node interfaces the lifecycle manager depends on
//! - A CometBFT JSON-RPC client implementing them
//! - Inclusion polling for broadcast transactions

pub mod finality;
pub mod provider;

pub use finality::InclusionWatcher;
pub use provider::{CometRpcClient, NodeStatus};

use crate::error::TxResult;
use crate::events::Event;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of a synchronous broadcast; says nothing about execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastOutcome {
    pub hash: String,
    /// CheckTx code; zero means accepted into the mempool
    pub code: u32,
    pub codespace: String,
    pub log: String,
}

impl BroadcastOutcome {
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }

    /// Success-equivalent outcome for bytes the mempool already holds
    pub fn already_in_mempool(hash: impl Into<String>, log: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            code: 0,
            codespace: String::new(),
            log: log.into(),
        }
    }
}

/// Execution result of an indexed transaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionResult {
    pub hash: String,
    pub height: u64,
    /// DeliverTx code; zero means the messages executed
    pub code: u32,
    pub codespace: String,
    pub log: String,
    pub gas_wanted: u64,
    pub gas_used: u64,
    pub events: Vec<Event>,
}

impl InclusionResult {
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

/// Node endpoints used to submit and look up transactions
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NodeRpc: Send + Sync {
    /// Submit encoded bytes; returns once CheckTx has run
    async fn broadcast_tx_sync(&self, tx_bytes: &[u8]) -> TxResult<BroadcastOutcome>;

    /// Look up an indexed transaction by its hex hash
    async fn tx(&self, hash: &str, prove: bool) -> TxResult<InclusionResult>;
}

/// Generic read-only gRPC dispatch through the node
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GrpcQuerier: Send + Sync {
    /// Call `method` (e.g. `/cosmos.auth.v1beta1.Query/Account`) with a
    /// protobuf-encoded request, returning the protobuf-encoded response
    async fn query_grpc(&self, method: &str, request: &[u8]) -> TxResult<Vec<u8>>;
}
