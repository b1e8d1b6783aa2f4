//! Fee computation and simulation-based gas estimation

use super::builder::{TxCodec, TxEnvelope};
use super::coin::{Coin, DecCoin};
use super::msg::{put_len_delimited, read_fields, FieldValue};
use crate::chain::GrpcQuerier;
use crate::error::{TxError, TxResult};

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Gas figures reported by a simulation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GasInfo {
    pub gas_wanted: u64,
    pub gas_used: u64,
}

/// Dry-runs encoded transactions against current chain state
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TxSimulator: Send + Sync {
    async fn simulate(&self, tx_bytes: &[u8]) -> TxResult<GasInfo>;
}

/// Query route of the transaction simulation service
pub const SIMULATE_METHOD: &str = "/cosmos.tx.v1beta1.Service/Simulate";

/// Simulator that dry-runs transactions through the node's gRPC query route
pub struct GrpcSimulator {
    querier: Arc<dyn GrpcQuerier>,
}

impl GrpcSimulator {
    pub fn new(querier: Arc<dyn GrpcQuerier>) -> Self {
        Self { querier }
    }
}

#[async_trait]
impl TxSimulator for GrpcSimulator {
    async fn simulate(&self, tx_bytes: &[u8]) -> TxResult<GasInfo> {
        // SimulateRequest.tx_bytes
        let mut request = Vec::with_capacity(tx_bytes.len() + 8);
        put_len_delimited(&mut request, 2, tx_bytes);

        let response = self
            .querier
            .query_grpc(SIMULATE_METHOD, &request)
            .await
            .map_err(|e| TxError::Rpc(format!("failed to query simulate: {}", e)))?;

        decode_simulate_response(&response)
    }
}

/// Gas info out of a `SimulateResponse`; the execution result is ignored
fn decode_simulate_response(buf: &[u8]) -> TxResult<GasInfo> {
    let invalid = |e: String| TxError::Encoding(format!("invalid simulate response: {}", e));

    let gas_info = read_fields(buf)
        .map_err(invalid)?
        .into_iter()
        .find_map(|(field, value)| match (field, value) {
            (1, FieldValue::Bytes(bytes)) => Some(bytes),
            _ => None,
        })
        .ok_or_else(|| invalid("missing gas info".to_string()))?;

    let mut info = GasInfo::default();
    for (field, value) in read_fields(gas_info).map_err(invalid)? {
        match (field, value) {
            (1, FieldValue::Varint(v)) => info.gas_wanted = v,
            (2, FieldValue::Varint(v)) => info.gas_used = v,
            _ => {}
        }
    }
    Ok(info)
}

/// Fee for `gas_limit` at the given prices: `ceil(price * gas_limit)` per denom.
///
/// Zero-priced denoms are left out of the fee.
pub fn compute_fee(gas_prices: &[DecCoin], gas_limit: u64) -> TxResult<Vec<Coin>> {
    let mut fee = Vec::with_capacity(gas_prices.len());
    for price in gas_prices.iter().filter(|p| !p.amount.is_zero()) {
        let amount = price.amount.mul_ceil(gas_limit).ok_or_else(|| {
            TxError::GasEstimation(format!(
                "fee overflow for {} at gas limit {}",
                price, gas_limit
            ))
        })?;
        fee.push(Coin::new(price.denom.clone(), amount));
    }
    Ok(fee)
}

/// Whether any configured gas price is non-zero
pub fn has_gas_prices(gas_prices: &[DecCoin]) -> bool {
    gas_prices.iter().any(|p| !p.amount.is_zero())
}

/// Price-derived fee when gas prices are set, otherwise the fixed fee
pub fn fee_for(gas_prices: &[DecCoin], fixed: &[Coin], gas_limit: u64) -> TxResult<Vec<Coin>> {
    if has_gas_prices(gas_prices) {
        compute_fee(gas_prices, gas_limit)
    } else {
        Ok(fixed.to_vec())
    }
}

/// Gas estimator backed by a simulation endpoint
pub struct GasEstimator {
    simulator: Arc<dyn TxSimulator>,
    /// Safety multiplier applied to simulated gas used
    gas_adjustment: f64,
}

impl GasEstimator {
    pub fn new(simulator: Arc<dyn TxSimulator>, gas_adjustment: f64) -> Self {
        Self {
            simulator,
            gas_adjustment,
        }
    }

    /// Simulate `tx` (placeholder signature in place) and return an adjusted gas limit
    pub async fn estimate(&self, codec: &dyn TxCodec, tx: &TxEnvelope) -> TxResult<u64> {
        let tx_bytes = codec.encode(tx)?;
        let info = self
            .simulator
            .simulate(&tx_bytes)
            .await
            .map_err(|e| TxError::GasEstimation(format!("failed to simulate tx: {}", e)))?;

        // `as` saturates and truncates toward zero
        let gas_limit = (self.gas_adjustment * info.gas_used as f64) as u64;
        debug!(
            "Simulated gas used {} (adjustment {}), gas limit {}",
            info.gas_used, self.gas_adjustment, gas_limit
        );
        Ok(gas_limit)
    }
}
