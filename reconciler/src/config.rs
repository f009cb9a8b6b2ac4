// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Environment configuration, parsed once at startup.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use promo_core::chain::{AddressError, ChainId, EvmNetwork};
use promo_core::fee_schedule::{FeeSchedule, FeeScheduleConfig, FeeScheduleError};
use thiserror::Error;

use crate::chain_adapter::{
    AdapterBuildError, AdapterSet, BitcoinAdapter, EvmAdapter, SolanaAdapter,
};
use crate::reconciliation::ReconcilerConfig;

const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_DB_PATH: &str = "promo.db";
const DEFAULT_SQLITE_SYNCHRONOUS: &str = "NORMAL";
const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024;
const DEFAULT_PENDING_TTL: Duration = Duration::from_secs(30 * 60);
const DEFAULT_MIN_CONFIRMATIONS: u64 = 1;

const DEFAULT_BTC_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_EVM_TIMEOUT_MS: u64 = 8_000;
const DEFAULT_SOL_TIMEOUT_MS: u64 = 6_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key}: invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("{key}: {chain} recipient rejected: {source}")]
    Recipient {
        key: &'static str,
        chain: ChainId,
        source: AddressError,
    },
    #[error("fee schedule file {path}: {reason}")]
    FeeScheduleFile { path: String, reason: String },
    #[error(transparent)]
    FeeSchedule(#[from] FeeScheduleError),
    #[error(transparent)]
    Adapter(#[from] AdapterBuildError),
    #[error("no chain enabled; set an endpoint URL and recipient for at least one chain")]
    NoChainEnabled,
}

/// Endpoint and payment address of one enabled chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSettings {
    pub chain: ChainId,
    pub endpoint: String,
    pub recipient: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_addr: String,
    pub db_path: String,
    pub sqlite_synchronous: String,
    pub max_body_bytes: usize,
    pub pending_ttl: Duration,
    pub min_confirmations: u64,
    pub fee_schedule_path: Option<String>,
    pub chains: Vec<ChainSettings>,
}

struct ChainKeys {
    chain: ChainId,
    url: &'static str,
    recipient: &'static str,
    timeout_ms: &'static str,
    default_timeout_ms: u64,
}

const CHAIN_KEYS: [ChainKeys; 4] = [
    ChainKeys {
        chain: ChainId::Bitcoin,
        url: "PROMO_BTC_API_URL",
        recipient: "PROMO_BTC_RECIPIENT",
        timeout_ms: "PROMO_BTC_TIMEOUT_MS",
        default_timeout_ms: DEFAULT_BTC_TIMEOUT_MS,
    },
    ChainKeys {
        chain: ChainId::Evm(EvmNetwork::Ethereum),
        url: "PROMO_ETH_RPC_URL",
        recipient: "PROMO_ETH_RECIPIENT",
        timeout_ms: "PROMO_ETH_TIMEOUT_MS",
        default_timeout_ms: DEFAULT_EVM_TIMEOUT_MS,
    },
    ChainKeys {
        chain: ChainId::Evm(EvmNetwork::Base),
        url: "PROMO_BASE_RPC_URL",
        recipient: "PROMO_BASE_RECIPIENT",
        timeout_ms: "PROMO_BASE_TIMEOUT_MS",
        default_timeout_ms: DEFAULT_EVM_TIMEOUT_MS,
    },
    ChainKeys {
        chain: ChainId::Solana,
        url: "PROMO_SOL_RPC_URL",
        recipient: "PROMO_SOL_RECIPIENT",
        timeout_ms: "PROMO_SOL_TIMEOUT_MS",
        default_timeout_ms: DEFAULT_SOL_TIMEOUT_MS,
    },
];

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut chains = Vec::new();
        for keys in &CHAIN_KEYS {
            let (Some(endpoint), Some(recipient)) = (get(keys.url), get(keys.recipient)) else {
                continue;
            };
            keys.chain
                .validate_address(&recipient)
                .map_err(|source| ConfigError::Recipient {
                    key: keys.recipient,
                    chain: keys.chain,
                    source,
                })?;
            let timeout_ms = parse_or(&get, keys.timeout_ms, keys.default_timeout_ms)?.max(1);
            chains.push(ChainSettings {
                chain: keys.chain,
                endpoint,
                recipient,
                timeout: Duration::from_millis(timeout_ms),
            });
        }
        if chains.is_empty() {
            return Err(ConfigError::NoChainEnabled);
        }

        Ok(Self {
            http_addr: get("PROMO_HTTP_ADDR").unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_string()),
            db_path: get("PROMO_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            sqlite_synchronous: get("PROMO_SQLITE_SYNCHRONOUS")
                .unwrap_or_else(|| DEFAULT_SQLITE_SYNCHRONOUS.to_string()),
            max_body_bytes: parse_or(&get, "PROMO_MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES)?,
            pending_ttl: Duration::from_secs(
                parse_or(
                    &get,
                    "PROMO_PENDING_TTL_SECS",
                    DEFAULT_PENDING_TTL.as_secs(),
                )?
                .max(1),
            ),
            min_confirmations: parse_or(
                &get,
                "PROMO_MIN_CONFIRMATIONS",
                DEFAULT_MIN_CONFIRMATIONS,
            )?
            .max(1),
            fee_schedule_path: get("PROMO_FEE_SCHEDULE_PATH"),
            chains,
        })
    }

    /// The configured JSON schedule, or the built-in table when no path is set.
    pub fn load_fee_schedule(&self) -> Result<FeeSchedule, ConfigError> {
        let Some(path) = &self.fee_schedule_path else {
            return Ok(FeeSchedule::with_defaults()?);
        };
        let file_error = |reason: String| ConfigError::FeeScheduleFile {
            path: path.clone(),
            reason,
        };
        let raw = std::fs::read_to_string(path).map_err(|err| file_error(err.to_string()))?;
        let parsed: FeeScheduleConfig =
            serde_json::from_str(&raw).map_err(|err| file_error(err.to_string()))?;
        Ok(FeeSchedule::from_config(&parsed)?)
    }

    pub fn build_adapters(&self) -> Result<AdapterSet, ConfigError> {
        let mut adapters = AdapterSet::new();
        for settings in &self.chains {
            match settings.chain {
                ChainId::Bitcoin => adapters.insert(Arc::new(BitcoinAdapter::new(
                    &settings.endpoint,
                    settings.timeout,
                )?)),
                ChainId::Evm(network) => adapters.insert(Arc::new(EvmAdapter::new(
                    network,
                    &settings.endpoint,
                    settings.timeout,
                )?)),
                ChainId::Solana => adapters.insert(Arc::new(SolanaAdapter::new(
                    &settings.endpoint,
                    settings.timeout,
                )?)),
            }
        }
        Ok(adapters)
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            pending_ttl: self.pending_ttl,
            recipients: self
                .chains
                .iter()
                .map(|settings| (settings.chain, settings.recipient.clone()))
                .collect::<BTreeMap<_, _>>(),
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(key) {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}
