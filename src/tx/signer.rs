//! Signing: key lookup, sign-bytes and signature installation

use super::account::AccountState;
use super::builder::{PubKey, SignatureEntry, SignerData, TxBuilder, TxCodec};
use crate::error::{TxError, TxResult};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Canonical sign-bytes flavour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignMode {
    #[default]
    Direct,
    LegacyAminoJson,
}

/// A key held by the keyring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRecord {
    pub name: String,
    pub address: String,
    pub pub_key: PubKey,
}

/// Principal a submission acts as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerIdentity {
    pub key_name: String,
    pub address: String,
}

/// Keyring collaborator; stores keys and signs raw bytes
#[cfg_attr(test, mockall::automock)]
pub trait SigningProvider: Send + Sync {
    /// Look up a key by name; `None` if the keyring has no such key
    fn key(&self, name: &str) -> TxResult<Option<KeyRecord>>;

    /// Sign `bytes` with the named key
    fn sign(&self, name: &str, bytes: &[u8]) -> TxResult<(Vec<u8>, PubKey)>;
}

/// Signs envelopes with one configured key
pub struct Signer {
    keyring: Arc<dyn SigningProvider>,
    codec: Arc<dyn TxCodec>,
    key_name: String,
    chain_id: String,
    sign_mode: SignMode,
}

impl Signer {
    pub fn new(
        keyring: Arc<dyn SigningProvider>,
        codec: Arc<dyn TxCodec>,
        key_name: impl Into<String>,
        chain_id: impl Into<String>,
        sign_mode: SignMode,
    ) -> Self {
        Self {
            keyring,
            codec,
            key_name: key_name.into(),
            chain_id: chain_id.into(),
            sign_mode,
        }
    }

    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    pub fn sign_mode(&self) -> SignMode {
        self.sign_mode
    }

    /// Resolve the configured key; a missing key is fatal
    pub fn key(&self) -> TxResult<KeyRecord> {
        self.keyring
            .key(&self.key_name)?
            .ok_or_else(|| TxError::KeyNotFound {
                name: self.key_name.clone(),
            })
    }

    /// Placeholder entry fixing signer metadata before sign-bytes are computed
    pub fn placeholder(&self, key: &KeyRecord, account: &AccountState) -> SignatureEntry {
        SignatureEntry::placeholder(key.pub_key.clone(), self.sign_mode, account.sequence)
    }

    /// Compute sign-bytes for the builder's current state and install the signature
    pub fn sign(
        &self,
        builder: &mut TxBuilder,
        key: &KeyRecord,
        account: &AccountState,
    ) -> TxResult<()> {
        builder.set_signatures(vec![self.placeholder(key, account)]);

        let signer_data = SignerData {
            chain_id: self.chain_id.clone(),
            account_number: account.account_number,
            sequence: account.sequence,
        };
        let bytes = self
            .codec
            .sign_bytes(self.sign_mode, &signer_data, builder.tx())?;

        let (signature, pub_key) = self
            .keyring
            .sign(&self.key_name, &bytes)
            .map_err(|e| TxError::Signing(e.to_string()))?;

        debug!(
            "Signed tx with key {} at sequence {}",
            self.key_name, account.sequence
        );

        builder.set_signatures(vec![SignatureEntry {
            pub_key,
            sign_mode: self.sign_mode,
            sequence: account.sequence,
            signature,
        }]);
        Ok(())
    }
}
