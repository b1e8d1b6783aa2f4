//! On-chain account state lookup

use crate::error::{TxError, TxResult};

use async_trait::async_trait;
use tracing::debug;

/// Snapshot of an account's signing counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountState {
    pub account_number: u64,
    pub sequence: u64,
}

/// Reads account state from the ledger
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountQuerier: Send + Sync {
    /// `Ok(None)` when the ledger has no such account
    async fn account(&self, address: &str) -> TxResult<Option<AccountState>>;
}

/// Fetch fresh account state; an absent account is fatal
pub async fn fetch_account(
    querier: &dyn AccountQuerier,
    address: &str,
) -> TxResult<AccountState> {
    let account = querier
        .account(address)
        .await?
        .ok_or_else(|| TxError::AccountNotFound {
            address: address.to_string(),
        })?;

    debug!(
        "Account {}: number={}, sequence={}",
        address, account.account_number, account.sequence
    );
    Ok(account)
}
