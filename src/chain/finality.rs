//! Inclusion polling for broadcast transactions
//!
//! A transaction accepted into the mempool becomes queryable by hash only
//! once it is committed and indexed, which usually takes a few block
//! intervals. Every query error is therefore treated as "not yet".

use super::{InclusionResult, NodeRpc};
use crate::config::RetryPolicy;
use crate::error::{TxError, TxResult};

use std::sync::Arc;
use tracing::{debug, info, warn};

/// Polls the node for a transaction until it is indexed
pub struct InclusionWatcher {
    node: Arc<dyn NodeRpc>,
    policy: RetryPolicy,
    /// Ask the node for an inclusion proof
    prove: bool,
    /// Metrics label
    chain_id: String,
}

impl InclusionWatcher {
    pub fn new(
        node: Arc<dyn NodeRpc>,
        policy: RetryPolicy,
        prove: bool,
        chain_id: impl Into<String>,
    ) -> Self {
        Self {
            node,
            policy,
            prove,
            chain_id: chain_id.into(),
        }
    }

    /// Wait until `hash` is indexed and return its execution result.
    ///
    /// A non-zero execution code is returned as `Ok`; only query failures are
    /// errors, and those surface after the attempt budget is spent.
    pub async fn await_inclusion(&self, hash: &str) -> TxResult<InclusionResult> {
        let max_attempts = self.policy.attempts;
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            crate::metrics::record_inclusion_poll(&self.chain_id);

            match self.node.tx(hash, self.prove).await {
                Ok(result) => {
                    info!(
                        "Transaction {} included at height {} with code {} (attempt {}/{})",
                        hash, result.height, result.code, attempt, max_attempts
                    );
                    return Ok(result);
                }
                Err(e) => {
                    if e.is_not_found() {
                        debug!(
                            "Transaction {} not indexed yet (attempt {}/{})",
                            hash, attempt, max_attempts
                        );
                    } else {
                        warn!(
                            "Failed to query transaction {} (attempt {}/{}): {}",
                            hash, attempt, max_attempts, e
                        );
                    }
                    last_error = Some(e);
                }
            }

            // Wait before retry
            if attempt < max_attempts {
                tokio::time::sleep(self.policy.delay).await;
            }
        }

        Err(match last_error {
            Some(e) => TxError::exhausted("tx query", max_attempts, e),
            None => TxError::Config("inclusion retry attempts cannot be zero".to_string()),
        })
    }
}
