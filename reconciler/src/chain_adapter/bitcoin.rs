// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::time::Duration;

use alloy_primitives::U256;
use async_trait::async_trait;
use promo_core::chain::ChainId;
use serde::Deserialize;
use tracing::debug;

use super::{
    AdapterBuildError, ChainAdapter, Confirmation, FetchError, TransactionView, TransferOutput,
    http_client, status_error, transient_from_reqwest, unix_secs, with_timeout,
};

/// Bitcoin over an Esplora-compatible REST API (`/tx/{txid}`, `/blocks/tip/height`).
pub struct BitcoinAdapter {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct EsploraTx {
    pub txid: String,
    #[serde(default)]
    pub vin: Vec<EsploraInput>,
    #[serde(default)]
    pub vout: Vec<EsploraOutput>,
    pub status: EsploraStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct EsploraInput {
    #[serde(default)]
    pub prevout: Option<EsploraOutput>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct EsploraOutput {
    #[serde(default)]
    pub scriptpubkey_address: Option<String>,
    pub value: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct EsploraStatus {
    pub confirmed: bool,
    #[serde(default)]
    pub block_height: Option<u64>,
    #[serde(default)]
    pub block_time: Option<u64>,
}

impl BitcoinAdapter {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AdapterBuildError> {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(AdapterBuildError::Url {
                url: base_url.to_string(),
                reason: "expected an http(s) url".to_string(),
            });
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client(timeout)?,
            timeout,
        })
    }

    async fn fetch_inner(&self, tx_id: &str) -> Result<TransactionView, FetchError> {
        let url = format!("{}/tx/{tx_id}", self.base_url);
        debug!(url = %url, "esplora tx lookup");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(transient_from_reqwest)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }
        let tx: EsploraTx = response.json().await.map_err(transient_from_reqwest)?;

        let tip_height = if tx.status.confirmed {
            Some(self.tip_height().await?)
        } else {
            None
        };
        view_from_esplora(tx, tip_height)
    }

    async fn tip_height(&self) -> Result<u64, FetchError> {
        let url = format!("{}/blocks/tip/height", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(transient_from_reqwest)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }
        let body = response.text().await.map_err(transient_from_reqwest)?;
        body.trim()
            .parse()
            .map_err(|_| FetchError::Transient(format!("unexpected tip height body: {body:?}")))
    }
}

#[async_trait]
impl ChainAdapter for BitcoinAdapter {
    fn chain(&self) -> ChainId {
        ChainId::Bitcoin
    }

    async fn fetch(&self, tx_id: &str) -> Result<TransactionView, FetchError> {
        with_timeout(ChainId::Bitcoin, self.timeout, self.fetch_inner(tx_id)).await
    }
}

/// Confirmations are `tip - height + 1` for a mined transaction.
pub(crate) fn view_from_esplora(
    tx: EsploraTx,
    tip_height: Option<u64>,
) -> Result<TransactionView, FetchError> {
    let (confirmations, chain_reference) = match (tx.status.confirmed, tx.status.block_height) {
        (true, Some(height)) => {
            let tip = tip_height.unwrap_or(height);
            (tip.saturating_sub(height).saturating_add(1), height)
        }
        (true, None) => {
            return Err(FetchError::Invalid(
                "confirmed transaction without block height".to_string(),
            ));
        }
        (false, _) => (0, 0),
    };

    // Outputs without an address (OP_RETURN, bare scripts) can never pay a recipient.
    let outputs = tx
        .vout
        .iter()
        .filter_map(|output| {
            output
                .scriptpubkey_address
                .as_ref()
                .map(|address| TransferOutput {
                    address: address.clone(),
                    amount: U256::from(output.value),
                })
        })
        .collect();
    let sender = tx
        .vin
        .first()
        .and_then(|input| input.prevout.as_ref())
        .and_then(|prevout| prevout.scriptpubkey_address.clone());

    Ok(TransactionView {
        chain: ChainId::Bitcoin,
        tx_id: tx.txid,
        confirmed: tx.status.confirmed,
        confirmation: Confirmation::Blocks(confirmations),
        outputs,
        sender,
        block_time: tx.status.block_time.map(unix_secs),
        chain_reference,
    })
}
