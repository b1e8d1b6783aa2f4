//! Error types for transaction submission and confirmation

use crate::chain::{BroadcastOutcome, InclusionResult};

use thiserror::Error;

/// Main error type for the transaction lifecycle
#[derive(Error, Debug)]
pub enum TxError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to validate message at index {index}: {reason}")]
    InvalidMessage { index: usize, reason: String },

    #[error("Key {name} does not exist")]
    KeyNotFound { name: String },

    #[error("Account {address} does not exist")]
    AccountNotFound { address: String },

    #[error("Keyring error: {0}")]
    Keyring(String),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Gas estimation error: {0}")]
    GasEstimation(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Incorrect account sequence: {log}")]
    SequenceMismatch { log: String },

    #[error("Tx sync broadcast failed: code={code}, codespace={codespace}, log={log}")]
    MempoolRejected {
        hash: String,
        code: u32,
        codespace: String,
        log: String,
    },

    #[error("Tx failed: code={code}, codespace={codespace}, log={log}")]
    ExecutionFailed {
        hash: String,
        height: u64,
        code: u32,
        codespace: String,
        log: String,
    },

    #[error("Transaction {hash} not found")]
    TxNotFound { hash: String },

    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<TxError>,
    },

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Event parsing error: {0}")]
    EventParsing(String),
}

impl TxError {
    /// Check if error may clear up on its own when the same call is repeated
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TxError::Rpc(_)
                | TxError::SequenceMismatch { .. }
                | TxError::TxNotFound { .. }
                | TxError::Timeout { .. }
        )
    }

    /// Check if error means the queried object is absent rather than broken
    pub fn is_not_found(&self) -> bool {
        match self {
            TxError::TxNotFound { .. }
            | TxError::AccountNotFound { .. }
            | TxError::KeyNotFound { .. } => true,
            TxError::Rpc(message) => crate::classify::is_not_found_text(message),
            TxError::RetriesExhausted { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    pub(crate) fn exhausted(operation: &str, attempts: u32, last: TxError) -> Self {
        TxError::RetriesExhausted {
            operation: operation.to_string(),
            attempts,
            source: Box::new(last),
        }
    }
}

/// Result type for transaction operations
pub type TxResult<T> = Result<T, TxError>;

/// Failure of a full submit-and-confirm run.
///
/// Carries whatever the node had already reported before the failure, so a
/// caller can tell "never reached the mempool" from "accepted, fate unknown"
/// from "included but failed".
#[derive(Error, Debug)]
#[error("{error}")]
pub struct SubmitError {
    pub broadcast: Option<BroadcastOutcome>,
    pub inclusion: Option<InclusionResult>,
    #[source]
    pub error: TxError,
}

impl SubmitError {
    pub(crate) fn before_broadcast(error: TxError) -> Self {
        Self {
            broadcast: None,
            inclusion: None,
            error,
        }
    }

    /// Whether the transaction is known to have reached the chain
    pub fn reached_chain(&self) -> bool {
        self.inclusion.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_keeps_last_error_as_source() {
        let err = TxError::exhausted(
            "tx query",
            3,
            TxError::Rpc("tx (ABCD) not found".to_string()),
        );
        assert_eq!(
            err.to_string(),
            "tx query failed after 3 attempts: RPC error: tx (ABCD) not found"
        );
        assert!(err.is_not_found());
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().contains("not found"));
    }

    #[test]
    fn test_retryable_classes() {
        assert!(TxError::SequenceMismatch { log: String::new() }.is_retryable());
        assert!(TxError::Rpc("connection reset".to_string()).is_retryable());
        assert!(!TxError::InvalidMessage {
            index: 0,
            reason: "empty".to_string()
        }
        .is_retryable());
        assert!(!TxError::MempoolRejected {
            hash: String::new(),
            code: 5,
            codespace: "sdk".to_string(),
            log: String::new()
        }
        .is_retryable());
    }

    #[test]
    fn test_execution_failure_message_has_code_and_codespace() {
        let err = TxError::ExecutionFailed {
            hash: "AA".to_string(),
            height: 10,
            code: 5,
            codespace: "bank".to_string(),
            log: "insufficient funds".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Tx failed: code=5, codespace=bank, log=insufficient funds"
        );
    }
}
