//! Classification of node responses
//!
//! Every decision that depends on what the node said (duplicate in mempool,
//! stale sequence, object not found) is made here. Structured CheckTx codes
//! are consulted first; the text patterns only cover nodes that report the
//! condition as a transport-level error string.

use crate::error::TxError;

use lazy_static::lazy_static;
use regex::Regex;

/// Codespace of the core SDK error registry
pub const CODESPACE_SDK: &str = "sdk";
/// `ErrTxInMempoolCache`
pub const CODE_TX_IN_MEMPOOL_CACHE: u32 = 19;
/// `ErrWrongSequence`
pub const CODE_WRONG_SEQUENCE: u32 = 32;

lazy_static! {
    static ref MEMPOOL_DUPLICATE: Regex = Regex::new(r"(?i)tx already exists in cache").unwrap();
    static ref WRONG_SEQUENCE: Regex =
        Regex::new(r"(?i)incorrect account sequence|account sequence mismatch").unwrap();
    static ref NOT_FOUND: Regex = Regex::new(r"(?i)code = NotFound|\bnot found\b").unwrap();
}

/// What a broadcast attempt amounts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastClass {
    /// Mempool accepted the transaction
    Accepted,
    /// The same bytes already sit in the mempool cache; success-equivalent
    AlreadyInMempool,
    /// Signed against a stale sequence; rebuild and resubmit
    WrongSequence,
    /// Node answered with a non-OK CheckTx code
    Rejected,
    /// Anything else; stop retrying
    Fatal,
}

/// Classify a CheckTx result returned by a synchronous broadcast
pub fn classify_check_tx(code: u32, codespace: &str, log: &str) -> BroadcastClass {
    if code == 0 {
        return BroadcastClass::Accepted;
    }

    if codespace == CODESPACE_SDK {
        match code {
            CODE_TX_IN_MEMPOOL_CACHE => return BroadcastClass::AlreadyInMempool,
            CODE_WRONG_SEQUENCE => return BroadcastClass::WrongSequence,
            _ => {}
        }
    }

    match classify_error_text(log) {
        BroadcastClass::Fatal => BroadcastClass::Rejected,
        class => class,
    }
}

/// Classify the text of a failed broadcast call
pub fn classify_error_text(message: &str) -> BroadcastClass {
    if MEMPOOL_DUPLICATE.is_match(message) {
        BroadcastClass::AlreadyInMempool
    } else if WRONG_SEQUENCE.is_match(message) {
        BroadcastClass::WrongSequence
    } else {
        BroadcastClass::Fatal
    }
}

/// Classify an error raised anywhere in one broadcast attempt
pub fn classify_broadcast_error(err: &TxError) -> BroadcastClass {
    match err {
        TxError::SequenceMismatch { .. } => BroadcastClass::WrongSequence,
        TxError::Rpc(message) => classify_error_text(message),
        // Local failures never carry node text worth matching
        TxError::Config(_)
        | TxError::InvalidMessage { .. }
        | TxError::KeyNotFound { .. }
        | TxError::AccountNotFound { .. }
        | TxError::Keyring(_)
        | TxError::Signing(_)
        | TxError::Encoding(_) => BroadcastClass::Fatal,
        other => classify_error_text(&other.to_string()),
    }
}

/// Whether error text reports a missing object
pub fn is_not_found_text(message: &str) -> bool {
    NOT_FOUND.is_match(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mempool_duplicate_text_any_case() {
        assert_eq!(
            classify_error_text("broadcast failed: Tx already exists in cache"),
            BroadcastClass::AlreadyInMempool
        );
        assert_eq!(
            classify_error_text("error: tx already exists in cache"),
            BroadcastClass::AlreadyInMempool
        );
    }

    #[test]
    fn test_wrong_sequence_text() {
        let log = "account sequence mismatch, expected 6, got 5: incorrect account sequence";
        assert_eq!(classify_error_text(log), BroadcastClass::WrongSequence);
        assert_eq!(
            classify_error_text("Incorrect Account Sequence"),
            BroadcastClass::WrongSequence
        );
    }

    #[test]
    fn test_other_text_is_fatal() {
        assert_eq!(
            classify_error_text("insufficient fees; got: 10stake required: 20stake"),
            BroadcastClass::Fatal
        );
    }

    #[test]
    fn test_structured_codes_take_priority() {
        assert_eq!(classify_check_tx(0, "", ""), BroadcastClass::Accepted);
        assert_eq!(
            classify_check_tx(CODE_TX_IN_MEMPOOL_CACHE, CODESPACE_SDK, ""),
            BroadcastClass::AlreadyInMempool
        );
        assert_eq!(
            classify_check_tx(CODE_WRONG_SEQUENCE, CODESPACE_SDK, ""),
            BroadcastClass::WrongSequence
        );
        // same numeric code in another module's codespace means something else
        assert_eq!(
            classify_check_tx(CODE_WRONG_SEQUENCE, "wasm", "contract error"),
            BroadcastClass::Rejected
        );
        assert_eq!(
            classify_check_tx(13, CODESPACE_SDK, "insufficient fee"),
            BroadcastClass::Rejected
        );
    }

    #[test]
    fn test_check_tx_log_fallback() {
        assert_eq!(
            classify_check_tx(1, "custom", "incorrect account sequence"),
            BroadcastClass::WrongSequence
        );
    }

    #[test]
    fn test_local_errors_are_fatal_even_with_matching_text() {
        let err = TxError::Signing("incorrect account sequence".to_string());
        assert_eq!(classify_broadcast_error(&err), BroadcastClass::Fatal);

        let err = TxError::Rpc("tx already exists in cache".to_string());
        assert_eq!(
            classify_broadcast_error(&err),
            BroadcastClass::AlreadyInMempool
        );
    }

    #[test]
    fn test_not_found_text() {
        assert!(is_not_found_text("rpc error: code = NotFound desc = account"));
        assert!(is_not_found_text("tx (0A1B) not found"));
        assert!(!is_not_found_text("connection refused"));
    }
}
