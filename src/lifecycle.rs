//! Submit-and-confirm orchestration
//!
//! Composes the broadcaster and the inclusion watcher: broadcast with
//! sequence retry, reject on a non-OK CheckTx code, poll for inclusion,
//! then judge the execution code.

use crate::chain::{BroadcastOutcome, InclusionResult, InclusionWatcher, NodeRpc};
use crate::config::TxOptions;
use crate::error::{SubmitError, TxError, TxResult};
use crate::tx::{
    AccountQuerier, Broadcaster, MsgRef, Signer, SignerIdentity, SigningProvider, TxCodec,
    TxSimulator,
};

use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Outcome of a confirmed transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxConfirmation {
    pub broadcast: BroadcastOutcome,
    pub inclusion: InclusionResult,
}

/// Orchestrates signing, broadcast and inclusion of transactions
pub struct TxLifecycleManager {
    options: Arc<TxOptions>,
    keyring: Arc<dyn SigningProvider>,
    broadcaster: Broadcaster,
    watcher: InclusionWatcher,
}

impl TxLifecycleManager {
    /// Create a new lifecycle manager.
    ///
    /// `simulator` is required when `options.simulate_and_execute` is set;
    /// a [`GrpcSimulator`](crate::tx::GrpcSimulator) over the node client
    /// dry-runs through the node itself.
    pub fn new(
        options: TxOptions,
        node: Arc<dyn NodeRpc>,
        accounts: Arc<dyn AccountQuerier>,
        simulator: Option<Arc<dyn TxSimulator>>,
        keyring: Arc<dyn SigningProvider>,
        codec: Arc<dyn TxCodec>,
    ) -> TxResult<Self> {
        let options = Arc::new(options);

        let signer = Signer::new(
            keyring.clone(),
            codec.clone(),
            options.from_name.clone(),
            options.chain_id.clone(),
            options.sign_mode,
        );
        let broadcaster = Broadcaster::new(
            node.clone(),
            accounts,
            codec,
            signer,
            simulator,
            options.clone(),
        )?;
        let watcher = InclusionWatcher::new(
            node,
            options.inclusion_retry,
            options.query_prove,
            options.chain_id.clone(),
        );

        info!(
            "Transaction lifecycle manager initialized for chain {} with key {}",
            options.chain_id, options.from_name
        );

        Ok(Self {
            options,
            keyring,
            broadcaster,
            watcher,
        })
    }

    pub fn options(&self) -> &TxOptions {
        &self.options
    }

    /// Principal the messages should name as their sender.
    ///
    /// The authz granter when one is configured, otherwise the address of the
    /// configured key.
    pub fn message_sender(&self) -> TxResult<SignerIdentity> {
        let key_name = self.options.from_name.clone();
        if let Some(granter) = &self.options.authz_granter {
            return Ok(SignerIdentity {
                key_name,
                address: granter.clone(),
            });
        }

        let key = self
            .keyring
            .key(&key_name)?
            .ok_or_else(|| TxError::KeyNotFound {
                name: key_name.clone(),
            })?;
        Ok(SignerIdentity {
            key_name,
            address: key.address,
        })
    }

    /// Broadcast only; see [`Broadcaster::broadcast`]
    pub async fn broadcast(&self, msgs: &[MsgRef]) -> TxResult<BroadcastOutcome> {
        self.broadcaster.broadcast(msgs).await
    }

    /// Poll only; see [`InclusionWatcher::await_inclusion`]
    pub async fn await_inclusion(&self, hash: &str) -> TxResult<InclusionResult> {
        self.watcher.await_inclusion(hash).await
    }

    /// Broadcast `msgs` and wait until the transaction executes successfully.
    ///
    /// On failure the error carries whatever the node had already reported.
    pub async fn submit_and_confirm(
        &self,
        msgs: &[MsgRef],
    ) -> Result<TxConfirmation, SubmitError> {
        let chain_id = self.options.chain_id.as_str();
        let started = Instant::now();

        let broadcast = match self.broadcaster.broadcast(msgs).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Failed to broadcast transaction: {}", e);
                crate::metrics::record_tx_failed(chain_id, "broadcast");
                return Err(SubmitError::before_broadcast(e));
            }
        };

        if !broadcast.is_ok() {
            error!(
                "Transaction {} rejected by mempool: code={}, codespace={}, log={}",
                broadcast.hash, broadcast.code, broadcast.codespace, broadcast.log
            );
            crate::metrics::record_mempool_rejection(chain_id, &broadcast.codespace);
            crate::metrics::record_tx_failed(chain_id, "mempool");
            let error = TxError::MempoolRejected {
                hash: broadcast.hash.clone(),
                code: broadcast.code,
                codespace: broadcast.codespace.clone(),
                log: broadcast.log.clone(),
            };
            return Err(SubmitError {
                broadcast: Some(broadcast),
                inclusion: None,
                error,
            });
        }

        let inclusion = match self.watcher.await_inclusion(&broadcast.hash).await {
            Ok(result) => result,
            Err(e) => {
                error!(
                    "Transaction {} accepted but inclusion unknown: {}",
                    broadcast.hash, e
                );
                crate::metrics::record_tx_failed(chain_id, "inclusion");
                return Err(SubmitError {
                    broadcast: Some(broadcast),
                    inclusion: None,
                    error: e,
                });
            }
        };

        if !inclusion.is_ok() {
            error!(
                "Transaction {} failed at height {}: code={}, codespace={}, log={}",
                inclusion.hash, inclusion.height, inclusion.code, inclusion.codespace, inclusion.log
            );
            crate::metrics::record_tx_failed(chain_id, "execution");
            let error = TxError::ExecutionFailed {
                hash: broadcast.hash.clone(),
                height: inclusion.height,
                code: inclusion.code,
                codespace: inclusion.codespace.clone(),
                log: inclusion.log.clone(),
            };
            return Err(SubmitError {
                broadcast: Some(broadcast),
                inclusion: Some(inclusion),
                error,
            });
        }

        crate::metrics::record_tx_confirmed(chain_id, started.elapsed().as_secs_f64());
        info!(
            "Transaction {} confirmed at height {} (gas used {})",
            broadcast.hash, inclusion.height, inclusion.gas_used
        );

        Ok(TxConfirmation {
            broadcast,
            inclusion,
        })
    }
}
