// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Read-only chain access: fetch a transaction by id and describe it uniformly.
//!
//! Each adapter owns its endpoint and a per-chain timeout that bounds the whole
//! fetch. An elapsed timeout is [`FetchError::Transient`], never `NotFound`.

mod bitcoin;
mod evm;
mod solana;

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use alloy_primitives::U256;
use async_trait::async_trait;
use promo_core::chain::{ChainId, EvmNetwork};
use thiserror::Error;

pub use bitcoin::BitcoinAdapter;
pub use evm::EvmAdapter;
pub use solana::SolanaAdapter;

/// One value transfer observed in a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutput {
    pub address: String,
    pub amount: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// Depth of the including block (Bitcoin, EVM). Zero while pending.
    Blocks(u64),
    /// Solana commitment level reached by the slot.
    Commitment { finalized: bool },
}

impl fmt::Display for Confirmation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocks(depth) => write!(f, "{depth} blocks"),
            Self::Commitment { finalized: true } => f.write_str("finalized"),
            Self::Commitment { finalized: false } => f.write_str("confirmed"),
        }
    }
}

/// Chain-agnostic description of a fetched transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionView {
    pub chain: ChainId,
    pub tx_id: String,
    pub confirmed: bool,
    pub confirmation: Confirmation,
    pub outputs: Vec<TransferOutput>,
    pub sender: Option<String>,
    pub block_time: Option<SystemTime>,
    // Block height (Bitcoin, EVM) or slot (Solana); zero while pending.
    pub chain_reference: u64,
}

impl TransactionView {
    pub fn confirmations(&self) -> u64 {
        match self.confirmation {
            Confirmation::Blocks(depth) => depth,
            Confirmation::Commitment { .. } => u64::from(self.confirmed),
        }
    }

    /// Sum of every output paying `recipient`. `None` when the recipient is absent.
    pub fn amount_to(&self, recipient: &str) -> Option<U256> {
        let mut total: Option<U256> = None;
        for output in &self.outputs {
            if self.chain.addresses_equal(&output.address, recipient) {
                total = Some(total.unwrap_or_default().saturating_add(output.amount));
            }
        }
        total
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("transaction not found")]
    NotFound,
    #[error("transient chain access failure: {0}")]
    Transient(String),
    #[error("unsupported transaction: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum AdapterBuildError {
    #[error("invalid endpoint url {url}: {reason}")]
    Url { url: String, reason: String },
    #[error("cannot build http client: {0}")]
    Client(#[from] reqwest::Error),
}

#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn chain(&self) -> ChainId;

    async fn fetch(&self, tx_id: &str) -> Result<TransactionView, FetchError>;
}

/// Enabled adapters keyed by chain.
#[derive(Clone, Default)]
pub struct AdapterSet {
    adapters: BTreeMap<ChainId, Arc<dyn ChainAdapter>>,
}

impl AdapterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, adapter: Arc<dyn ChainAdapter>) {
        self.adapters.insert(adapter.chain(), adapter);
    }

    pub fn get(&self, chain: ChainId) -> Option<&Arc<dyn ChainAdapter>> {
        self.adapters.get(&chain)
    }

    pub fn chains(&self) -> impl Iterator<Item = ChainId> + '_ {
        self.adapters.keys().copied()
    }

    /// Enabled EVM networks in declaration order.
    pub fn evm_networks(&self) -> Vec<EvmNetwork> {
        EvmNetwork::ALL
            .into_iter()
            .filter(|network| self.adapters.contains_key(&ChainId::Evm(*network)))
            .collect()
    }
}

pub(crate) async fn with_timeout<F>(
    chain: ChainId,
    timeout: Duration,
    fetch: F,
) -> Result<TransactionView, FetchError>
where
    F: Future<Output = Result<TransactionView, FetchError>>,
{
    match tokio::time::timeout(timeout, fetch).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(chain = %chain, timeout_ms = timeout.as_millis() as u64, "chain fetch timed out");
            Err(FetchError::Transient(format!(
                "{chain} fetch timed out after {}ms",
                timeout.as_millis()
            )))
        }
    }
}

pub(crate) fn unix_secs(secs: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
}

/// Classifies a failed HTTP exchange. Connection problems, timeouts, rate limits
/// and server faults are retryable.
pub(crate) fn transient_from_reqwest(err: reqwest::Error) -> FetchError {
    if err.is_decode() {
        return FetchError::Invalid(format!("undecodable response: {err}"));
    }
    FetchError::Transient(err.to_string())
}

pub(crate) fn status_error(status: reqwest::StatusCode, body: String) -> FetchError {
    if status == reqwest::StatusCode::NOT_FOUND {
        FetchError::NotFound
    } else if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        FetchError::Transient(format!("http status {status}"))
    } else {
        FetchError::Invalid(format!("http status {status}: {body}"))
    }
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, AdapterBuildError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(outputs: Vec<(&str, u64)>) -> TransactionView {
        TransactionView {
            chain: ChainId::Bitcoin,
            tx_id: "ab".repeat(32),
            confirmed: true,
            confirmation: Confirmation::Blocks(3),
            outputs: outputs
                .into_iter()
                .map(|(address, amount)| TransferOutput {
                    address: address.to_string(),
                    amount: U256::from(amount),
                })
                .collect(),
            sender: None,
            block_time: None,
            chain_reference: 800_000,
        }
    }

    #[test]
    fn confirmation_renders_depth_or_commitment() {
        assert_eq!(Confirmation::Blocks(3).to_string(), "3 blocks");
        assert_eq!(
            Confirmation::Commitment { finalized: true }.to_string(),
            "finalized"
        );
        assert_eq!(
            Confirmation::Commitment { finalized: false }.to_string(),
            "confirmed"
        );
    }

    #[test]
    fn amount_to_sums_every_output_to_the_recipient() {
        let view = view(vec![
            ("bc1qrecipient", 60_000),
            ("bc1qchange", 5_000),
            ("bc1qrecipient", 40_000),
        ]);
        assert_eq!(view.amount_to("bc1qrecipient"), Some(U256::from(100_000_u64)));
        assert_eq!(view.amount_to("bc1qother"), None);
    }

    #[tokio::test]
    async fn elapsed_timeout_is_transient() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Err(FetchError::NotFound)
        };
        let result = with_timeout(ChainId::Solana, Duration::from_millis(10), slow).await;
        assert!(matches!(result, Err(FetchError::Transient(_))));
    }

    #[test]
    fn status_errors_map_to_fetch_errors() {
        assert_eq!(
            status_error(reqwest::StatusCode::NOT_FOUND, String::new()),
            FetchError::NotFound
        );
        assert!(matches!(
            status_error(reqwest::StatusCode::BAD_GATEWAY, String::new()),
            FetchError::Transient(_)
        ));
        assert!(matches!(
            status_error(reqwest::StatusCode::BAD_REQUEST, "Invalid hex string".into()),
            FetchError::Invalid(_)
        ));
    }
}
