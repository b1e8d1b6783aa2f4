//! Configuration management for the transaction client
//!
//! Loads configuration from TOML files with environment variable substitution.
//! Every field has a default, so a file only needs the values it changes.

use crate::error::{TxError, TxResult};
use crate::tx::{parse_coins, parse_dec_coins, Coin, DecCoin, SignMode};

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Env var naming the config file
pub const CONFIG_ENV: &str = "CHAIN_SUBMIT_CONFIG";

const KEYRING_BACKENDS: &[&str] = &["file", "kwallet", "memory", "os", "pass", "test"];
const LOG_FORMATS: &[&str] = &["json", "text"];
const LOG_LEVELS: &[&str] = &["debug", "error", "info", "warn"];

lazy_static! {
    static ref ENV_VAR: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub rpc: RpcConfig,
    pub query: QueryConfig,
    pub tx: TxConfig,
    pub keyring: KeyringConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub addrs: Vec<String>,
    pub chain_id: String,
    pub timeout_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            addrs: vec!["http://127.0.0.1:26657".to_string()],
            chain_id: "localnet-1".to_string(),
            timeout_ms: 5_000,
        }
    }
}

/// Generic read-only queries (account lookup, simulation)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub prove: bool,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            prove: false,
            retry_attempts: 5,
            retry_delay_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TxConfig {
    pub from_name: String,
    pub authz_granter_addr: String,
    pub fee_granter_addr: String,
    pub gas: u64,
    pub gas_adjustment: f64,
    /// e.g. "0.1stake" or "0.1stake,0.025uatom"
    pub gas_prices: String,
    /// Fixed fee used when no non-zero gas price is configured
    pub fees: String,
    pub memo: String,
    pub timeout_height: u64,
    pub sign_mode: SignMode,
    pub simulate_and_execute: bool,
    pub broadcast_retry_attempts: u32,
    pub broadcast_retry_delay_ms: u64,
    pub query_retry_attempts: u32,
    pub query_retry_delay_ms: u64,
}

impl Default for TxConfig {
    fn default() -> Self {
        Self {
            from_name: "main".to_string(),
            authz_granter_addr: String::new(),
            fee_granter_addr: String::new(),
            gas: 200_000,
            gas_adjustment: 1.0 + 1.0 / 6.0,
            gas_prices: "0.1stake".to_string(),
            fees: String::new(),
            memo: String::new(),
            timeout_height: 0,
            sign_mode: SignMode::Direct,
            simulate_and_execute: true,
            broadcast_retry_attempts: 1,
            broadcast_retry_delay_ms: 5_000,
            query_retry_attempts: 30,
            query_retry_delay_ms: 1_000,
        }
    }
}

/// Keyring settings, consumed by whichever keyring implementation is plugged in
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyringConfig {
    pub backend: String,
    pub name: String,
}

impl Default for KeyringConfig {
    fn default() -> Self {
        Self {
            backend: "test".to_string(),
            name: "chain-submit".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: String,
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: "text".to_string(),
            level: "info".to_string(),
        }
    }
}

/// Fixed-delay retry budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }
}

/// Resolved, immutable parameters for one lifecycle manager
#[derive(Debug, Clone)]
pub struct TxOptions {
    pub chain_id: String,
    pub from_name: String,
    pub authz_granter: Option<String>,
    pub fee_granter: Option<String>,
    pub gas: u64,
    pub gas_adjustment: f64,
    pub gas_prices: Vec<DecCoin>,
    pub fees: Vec<Coin>,
    pub memo: String,
    pub timeout_height: u64,
    pub sign_mode: SignMode,
    pub simulate_and_execute: bool,
    pub broadcast_retry: RetryPolicy,
    pub inclusion_retry: RetryPolicy,
    pub query_prove: bool,
}

impl Settings {
    /// Load settings from the file named by `CHAIN_SUBMIT_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));
        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::from_toml_str(&config_str)
    }

    /// Parse and validate settings from TOML text
    pub fn from_toml_str(input: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(input);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Render settings as a TOML document
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).with_context(|| "Failed to render configuration")
    }

    /// Validate configuration
    pub fn validate(&self) -> TxResult<()> {
        if self.rpc.addrs.is_empty() {
            return Err(config_err("rpc.addrs cannot be empty"));
        }
        for addr in &self.rpc.addrs {
            validate_url(addr).map_err(|e| config_err(format!("invalid rpc addr {}: {}", addr, e)))?;
        }
        if self.rpc.chain_id.is_empty() {
            return Err(config_err("rpc.chain_id cannot be empty"));
        }

        if self.query.retry_attempts == 0 {
            return Err(config_err("query.retry_attempts cannot be zero"));
        }

        let tx = &self.tx;
        if tx.from_name.is_empty() {
            return Err(config_err("tx.from_name cannot be empty"));
        }
        if tx.broadcast_retry_attempts == 0 {
            return Err(config_err("tx.broadcast_retry_attempts cannot be zero"));
        }
        if tx.query_retry_attempts == 0 {
            return Err(config_err("tx.query_retry_attempts cannot be zero"));
        }
        if !tx.gas_adjustment.is_finite() || tx.gas_adjustment <= 0.0 {
            return Err(config_err("tx.gas_adjustment must be positive"));
        }
        parse_dec_coins(&tx.gas_prices)
            .map_err(|e| config_err(format!("invalid tx.gas_prices: {}", e)))?;
        parse_coins(&tx.fees).map_err(|e| config_err(format!("invalid tx.fees: {}", e)))?;
        validate_optional_address("tx.authz_granter_addr", &tx.authz_granter_addr)?;
        validate_optional_address("tx.fee_granter_addr", &tx.fee_granter_addr)?;

        if !KEYRING_BACKENDS.contains(&self.keyring.backend.as_str()) {
            return Err(config_err(format!(
                "keyring.backend must be one of: {}",
                KEYRING_BACKENDS.join(", ")
            )));
        }
        if self.keyring.name.is_empty() {
            return Err(config_err("keyring.name cannot be empty"));
        }

        if !LOG_FORMATS.contains(&self.log.format.as_str()) {
            return Err(config_err("log.format must be one of: json, text"));
        }
        if !LOG_LEVELS.contains(&self.log.level.as_str()) {
            return Err(config_err("log.level must be one of: debug, error, info, warn"));
        }

        Ok(())
    }

    /// Resolve the parameters the lifecycle manager runs with
    pub fn tx_options(&self) -> TxResult<TxOptions> {
        self.validate()?;

        let tx = &self.tx;
        Ok(TxOptions {
            chain_id: self.rpc.chain_id.clone(),
            from_name: tx.from_name.clone(),
            authz_granter: non_empty(&tx.authz_granter_addr),
            fee_granter: non_empty(&tx.fee_granter_addr),
            gas: tx.gas,
            gas_adjustment: tx.gas_adjustment,
            gas_prices: parse_dec_coins(&tx.gas_prices).map_err(config_err)?,
            fees: parse_coins(&tx.fees).map_err(config_err)?,
            memo: tx.memo.clone(),
            timeout_height: tx.timeout_height,
            sign_mode: tx.sign_mode,
            simulate_and_execute: tx.simulate_and_execute,
            broadcast_retry: RetryPolicy::new(
                tx.broadcast_retry_attempts,
                Duration::from_millis(tx.broadcast_retry_delay_ms),
            ),
            inclusion_retry: RetryPolicy::new(
                tx.query_retry_attempts,
                Duration::from_millis(tx.query_retry_delay_ms),
            ),
            query_prove: self.query.prove,
        })
    }

    /// Retry budget for generic gRPC queries
    pub fn query_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.query.retry_attempts,
            Duration::from_millis(self.query.retry_delay_ms),
        )
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc.timeout_ms)
    }
}

fn config_err(message: impl ToString) -> TxError {
    TxError::Config(message.to_string())
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn validate_optional_address(field: &str, value: &str) -> TxResult<()> {
    if value.is_empty() {
        return Ok(());
    }
    bech32::decode(value)
        .map(|_| ())
        .map_err(|e| config_err(format!("invalid {}: {}", field, e)))
}

fn validate_url(s: &str) -> Result<(), String> {
    let url = reqwest::Url::parse(s).map_err(|e| format!("invalid url: {}", e))?;
    if url.host_str().map_or(true, str::is_empty) {
        return Err("url must have a valid host".to_string());
    }
    match url.port_or_known_default() {
        Some(port) if port > 0 => Ok(()),
        _ => Err("url must have a valid port".to_string()),
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();

    for cap in ENV_VAR.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
