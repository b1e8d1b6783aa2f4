//! Transaction preparation, signing and submission
//!
//! Fee and gas computation, the unsigned/signed envelope, signing through an
//! external keyring and the retrying mempool broadcaster.

pub mod account;
pub mod builder;
pub mod coin;
pub mod gas;
pub mod msg;
pub mod sender;
pub mod signer;

pub use account::{fetch_account, AccountQuerier, AccountState};
pub use builder::{
    tx_hash, Fee, PubKey, SignatureEntry, SignerData, TxBuilder, TxCodec, TxEnvelope,
};
pub use coin::{parse_coins, parse_dec_coins, Coin, Dec, DecCoin, ParseCoinError};
pub use gas::{
    compute_fee, fee_for, has_gas_prices, GasEstimator, GasInfo, GrpcSimulator, TxSimulator,
    SIMULATE_METHOD,
};
pub use msg::{wrap_for_granter, Any, Msg, MsgExec, MsgRef, MSG_EXEC_TYPE_URL};
pub use sender::Broadcaster;
pub use signer::{KeyRecord, SignMode, Signer, SignerIdentity, SigningProvider};
