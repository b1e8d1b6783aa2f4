//! Transaction lifecycle client for CometBFT-based ledgers
//!
//! Prepares, signs, broadcasts and confirms transactions through a node's
//! RPC surface, retrying on stale account sequences and polling until the
//! transaction is indexed.

pub mod chain;
pub mod classify;
pub mod config;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod metrics;
pub mod tx;

#[cfg(test)]
mod testing;

pub use chain::{BroadcastOutcome, CometRpcClient, InclusionResult, InclusionWatcher, NodeRpc};
pub use config::{RetryPolicy, Settings, TxOptions};
pub use error::{SubmitError, TxError, TxResult};
pub use lifecycle::{TxConfirmation, TxLifecycleManager};
