//! Prometheus metrics for transaction submission
//!
//! Exposes metrics for:
//! - Broadcast attempts and their classification
//! - Inclusion polling
//! - Final outcomes and confirmation latency
//!
//! Metrics live in the default registry; embedders serve them however they
//! like, `gather_text` renders the text exposition format.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    // Broadcast metrics
    pub static ref BROADCAST_ATTEMPTS: CounterVec = register_counter_vec!(
        "chain_submit_broadcast_attempts_total",
        "Total synchronous broadcast attempts",
        &["chain_id"]
    ).unwrap();

    pub static ref SEQUENCE_RETRIES: CounterVec = register_counter_vec!(
        "chain_submit_sequence_retries_total",
        "Broadcast attempts rebuilt after an account sequence mismatch",
        &["chain_id"]
    ).unwrap();

    pub static ref MEMPOOL_DUPLICATES: CounterVec = register_counter_vec!(
        "chain_submit_mempool_duplicates_total",
        "Broadcasts answered with tx already in mempool cache",
        &["chain_id"]
    ).unwrap();

    pub static ref MEMPOOL_REJECTIONS: CounterVec = register_counter_vec!(
        "chain_submit_mempool_rejections_total",
        "Broadcasts rejected by CheckTx, by codespace",
        &["chain_id", "codespace"]
    ).unwrap();

    // Inclusion metrics
    pub static ref INCLUSION_POLLS: CounterVec = register_counter_vec!(
        "chain_submit_inclusion_polls_total",
        "Total tx-by-hash queries made while awaiting inclusion",
        &["chain_id"]
    ).unwrap();

    // Outcome metrics
    pub static ref TX_CONFIRMED: CounterVec = register_counter_vec!(
        "chain_submit_transactions_confirmed_total",
        "Transactions included with a successful execution code",
        &["chain_id"]
    ).unwrap();

    pub static ref TX_FAILED: CounterVec = register_counter_vec!(
        "chain_submit_transactions_failed_total",
        "Submissions that ended in an error, by stage",
        &["chain_id", "stage"]
    ).unwrap();

    pub static ref TX_LATENCY: HistogramVec = register_histogram_vec!(
        "chain_submit_confirmation_latency_seconds",
        "Time from first broadcast attempt to confirmed inclusion",
        &["chain_id"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    ).unwrap();
}

/// Render every registered metric in the Prometheus text format
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

// Helper functions to record metrics

pub fn record_broadcast_attempt(chain_id: &str) {
    BROADCAST_ATTEMPTS.with_label_values(&[chain_id]).inc();
}

pub fn record_sequence_retry(chain_id: &str) {
    SEQUENCE_RETRIES.with_label_values(&[chain_id]).inc();
}

pub fn record_mempool_duplicate(chain_id: &str) {
    MEMPOOL_DUPLICATES.with_label_values(&[chain_id]).inc();
}

pub fn record_mempool_rejection(chain_id: &str, codespace: &str) {
    MEMPOOL_REJECTIONS
        .with_label_values(&[chain_id, codespace])
        .inc();
}

pub fn record_inclusion_poll(chain_id: &str) {
    INCLUSION_POLLS.with_label_values(&[chain_id]).inc();
}

pub fn record_tx_confirmed(chain_id: &str, latency_secs: f64) {
    TX_CONFIRMED.with_label_values(&[chain_id]).inc();
    TX_LATENCY
        .with_label_values(&[chain_id])
        .observe(latency_secs);
}

pub fn record_tx_failed(chain_id: &str, stage: &str) {
    TX_FAILED.with_label_values(&[chain_id, stage]).inc();
}
