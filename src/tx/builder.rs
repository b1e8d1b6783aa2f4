//! Transaction envelope and builder
//!
//! The envelope is wire-format agnostic: turning it into bytes (and into the
//! canonical sign-bytes of a sign mode) is the job of a [`TxCodec`].

use super::coin::Coin;
use super::msg::{Any, MsgRef};
use super::signer::SignMode;
use crate::error::TxResult;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Public key with its type URL, e.g. `/cosmos.crypto.secp256k1.PubKey`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubKey {
    pub type_url: String,
    pub key: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    pub amount: Vec<Coin>,
    pub gas_limit: u64,
    pub granter: Option<String>,
}

/// One signer's entry; `signature` is empty until the tx is signed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEntry {
    pub pub_key: PubKey,
    pub sign_mode: SignMode,
    pub sequence: u64,
    pub signature: Vec<u8>,
}

impl SignatureEntry {
    /// Entry with correct signer metadata and no signature bytes yet
    pub fn placeholder(pub_key: PubKey, sign_mode: SignMode, sequence: u64) -> Self {
        Self {
            pub_key,
            sign_mode,
            sequence,
            signature: Vec::new(),
        }
    }
}

/// Chain-level signer metadata bound into the sign-bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerData {
    pub chain_id: String,
    pub account_number: u64,
    pub sequence: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxEnvelope {
    pub messages: Vec<Any>,
    pub memo: String,
    pub timeout_height: u64,
    pub fee: Fee,
    pub signatures: Vec<SignatureEntry>,
}

impl TxEnvelope {
    pub fn is_signed(&self) -> bool {
        !self.signatures.is_empty() && self.signatures.iter().all(|s| !s.signature.is_empty())
    }
}

/// Wire codec for envelopes
#[cfg_attr(test, mockall::automock)]
pub trait TxCodec: Send + Sync {
    /// Final transaction bytes as broadcast to the node
    fn encode(&self, tx: &TxEnvelope) -> TxResult<Vec<u8>>;

    /// Canonical bytes a signer signs for `mode`
    fn sign_bytes(&self, mode: SignMode, signer: &SignerData, tx: &TxEnvelope)
        -> TxResult<Vec<u8>>;
}

/// Accumulates the parts of one transaction
#[derive(Debug, Clone, Default)]
pub struct TxBuilder {
    tx: TxEnvelope,
}

impl TxBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_messages(&mut self, msgs: &[MsgRef]) -> &mut Self {
        self.tx.messages = msgs.iter().map(|m| m.to_any()).collect();
        self
    }

    pub fn set_fee_amount(&mut self, amount: Vec<Coin>) -> &mut Self {
        self.tx.fee.amount = amount;
        self
    }

    pub fn set_gas_limit(&mut self, gas_limit: u64) -> &mut Self {
        self.tx.fee.gas_limit = gas_limit;
        self
    }

    pub fn set_fee_granter(&mut self, granter: Option<String>) -> &mut Self {
        self.tx.fee.granter = granter;
        self
    }

    pub fn set_memo(&mut self, memo: impl Into<String>) -> &mut Self {
        self.tx.memo = memo.into();
        self
    }

    pub fn set_timeout_height(&mut self, height: u64) -> &mut Self {
        self.tx.timeout_height = height;
        self
    }

    pub fn set_signatures(&mut self, signatures: Vec<SignatureEntry>) -> &mut Self {
        self.tx.signatures = signatures;
        self
    }

    pub fn gas_limit(&self) -> u64 {
        self.tx.fee.gas_limit
    }

    pub fn fee(&self) -> &Fee {
        &self.tx.fee
    }

    pub fn signatures(&self) -> &[SignatureEntry] {
        &self.tx.signatures
    }

    pub fn tx(&self) -> &TxEnvelope {
        &self.tx
    }

    pub fn into_tx(self) -> TxEnvelope {
        self.tx
    }
}

/// Node-side transaction hash: upper-case hex SHA-256 of the encoded bytes
pub fn tx_hash(tx_bytes: &[u8]) -> String {
    hex::encode_upper(Sha256::digest(tx_bytes))
}
