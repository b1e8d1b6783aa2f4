//! Synchronous broadcast with sequence-mismatch retry
//!
//! One attempt resolves the signing key, validates and (optionally) wraps
//! the messages, fetches fresh account state, builds and simulates the
//! envelope, signs, encodes and submits it. Only a stale sequence sends the
//! whole attempt round again.

use super::account::{fetch_account, AccountQuerier, AccountState};
use super::builder::{tx_hash, TxBuilder, TxCodec};
use super::gas::{fee_for, GasEstimator, TxSimulator};
use super::msg::{wrap_for_granter, MsgRef};
use super::signer::{KeyRecord, Signer};
use crate::chain::{BroadcastOutcome, NodeRpc};
use crate::classify::{classify_broadcast_error, classify_check_tx, BroadcastClass};
use crate::config::TxOptions;
use crate::error::{TxError, TxResult};

use std::sync::Arc;
use tracing::{debug, info, warn};

/// Builds, signs and submits transactions to the mempool
pub struct Broadcaster {
    node: Arc<dyn NodeRpc>,
    accounts: Arc<dyn AccountQuerier>,
    codec: Arc<dyn TxCodec>,
    signer: Signer,
    /// Present when simulate-and-execute is enabled
    gas_estimator: Option<GasEstimator>,
    options: Arc<TxOptions>,
}

impl Broadcaster {
    /// Create a new broadcaster
    pub fn new(
        node: Arc<dyn NodeRpc>,
        accounts: Arc<dyn AccountQuerier>,
        codec: Arc<dyn TxCodec>,
        signer: Signer,
        simulator: Option<Arc<dyn TxSimulator>>,
        options: Arc<TxOptions>,
    ) -> TxResult<Self> {
        let gas_estimator = match (options.simulate_and_execute, simulator) {
            (true, Some(simulator)) => Some(GasEstimator::new(simulator, options.gas_adjustment)),
            (true, None) => {
                return Err(TxError::Config(
                    "simulate_and_execute is enabled but no simulator is available".to_string(),
                ))
            }
            (false, _) => None,
        };

        Ok(Self {
            node,
            accounts,
            codec,
            signer,
            gas_estimator,
            options,
        })
    }

    /// Submit `msgs`, retrying the full pipeline on a stale account sequence.
    ///
    /// Returns the node's CheckTx outcome; a non-zero code is returned as
    /// `Ok` for the caller to judge. Bytes already held by the mempool count
    /// as accepted.
    pub async fn broadcast(&self, msgs: &[MsgRef]) -> TxResult<BroadcastOutcome> {
        let chain_id = self.options.chain_id.as_str();
        let max_attempts = self.options.broadcast_retry.attempts;
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            crate::metrics::record_broadcast_attempt(chain_id);

            match self.try_broadcast(msgs).await {
                Ok(outcome) => {
                    info!(
                        "Transaction {} sent with code {} (attempt {}/{})",
                        outcome.hash, outcome.code, attempt, max_attempts
                    );
                    return Ok(outcome);
                }
                Err(e) if classify_broadcast_error(&e) == BroadcastClass::WrongSequence => {
                    warn!(
                        "Account sequence mismatch (attempt {}/{}): {}",
                        attempt, max_attempts, e
                    );
                    crate::metrics::record_sequence_retry(chain_id);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }

            // Wait before retry
            if attempt < max_attempts {
                tokio::time::sleep(self.options.broadcast_retry.delay).await;
            }
        }

        Err(match last_error {
            Some(e) => TxError::exhausted("tx sync broadcast", max_attempts, e),
            None => TxError::Config("broadcast retry attempts cannot be zero".to_string()),
        })
    }

    /// Messages as they go on the wire, after validation and authz wrapping
    fn prepare_messages(&self, key: &KeyRecord, msgs: &[MsgRef]) -> TxResult<Vec<MsgRef>> {
        for (index, msg) in msgs.iter().enumerate() {
            msg.validate_basic()
                .map_err(|reason| TxError::InvalidMessage { index, reason })?;
        }

        let granter = self.options.authz_granter.as_deref();
        let msgs = wrap_for_granter(&key.address, msgs, granter);
        if granter.is_some() {
            for (index, msg) in msgs.iter().enumerate() {
                msg.validate_basic()
                    .map_err(|reason| TxError::InvalidMessage { index, reason })?;
            }
        }

        Ok(msgs)
    }

    /// Envelope with static fee, gas, memo, timeout and a placeholder signature
    fn prepare_unsigned(
        &self,
        msgs: &[MsgRef],
        key: &KeyRecord,
        account: &AccountState,
    ) -> TxResult<TxBuilder> {
        let opts = &self.options;
        let fee = fee_for(&opts.gas_prices, &opts.fees, opts.gas)?;

        let mut builder = TxBuilder::new();
        builder
            .set_messages(msgs)
            .set_gas_limit(opts.gas)
            .set_fee_amount(fee)
            .set_fee_granter(opts.fee_granter.clone())
            .set_memo(opts.memo.clone())
            .set_timeout_height(opts.timeout_height)
            .set_signatures(vec![self.signer.placeholder(key, account)]);
        Ok(builder)
    }

    async fn try_broadcast(&self, msgs: &[MsgRef]) -> TxResult<BroadcastOutcome> {
        let key = self.signer.key()?;
        let msgs = self.prepare_messages(&key, msgs)?;

        // The grantee signs, so its account supplies the sequence
        let account = fetch_account(self.accounts.as_ref(), &key.address).await?;
        let mut builder = self.prepare_unsigned(&msgs, &key, &account)?;

        if let Some(estimator) = &self.gas_estimator {
            let gas_limit = estimator.estimate(self.codec.as_ref(), builder.tx()).await?;
            let fee = fee_for(&self.options.gas_prices, &self.options.fees, gas_limit)?;
            builder.set_gas_limit(gas_limit).set_fee_amount(fee);
        }

        self.signer.sign(&mut builder, &key, &account)?;

        let tx_bytes = self.codec.encode(builder.tx())?;
        let local_hash = tx_hash(&tx_bytes);
        debug!(
            "Broadcasting tx {} ({} bytes, gas {}, sequence {})",
            local_hash,
            tx_bytes.len(),
            builder.gas_limit(),
            account.sequence
        );

        match self.node.broadcast_tx_sync(&tx_bytes).await {
            Ok(outcome) => match classify_check_tx(outcome.code, &outcome.codespace, &outcome.log) {
                BroadcastClass::AlreadyInMempool => {
                    Ok(self.already_in_mempool(local_hash, outcome.log))
                }
                BroadcastClass::WrongSequence => {
                    Err(TxError::SequenceMismatch { log: outcome.log })
                }
                _ => Ok(outcome),
            },
            Err(e) => match classify_broadcast_error(&e) {
                BroadcastClass::AlreadyInMempool => {
                    Ok(self.already_in_mempool(local_hash, e.to_string()))
                }
                _ => Err(e),
            },
        }
    }

    fn already_in_mempool(&self, hash: String, log: String) -> BroadcastOutcome {
        info!("Transaction {} already in mempool cache", hash);
        crate::metrics::record_mempool_duplicate(&self.options.chain_id);
        BroadcastOutcome::already_in_mempool(hash, log)
    }
}
