// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::time::Duration;

use alloy_primitives::U256;
use async_trait::async_trait;
use promo_core::chain::ChainId;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use super::{
    AdapterBuildError, ChainAdapter, Confirmation, FetchError, TransactionView, TransferOutput,
    http_client, status_error, transient_from_reqwest, unix_secs, with_timeout,
};

/// Solana JSON-RPC (`getSignatureStatuses`, `getTransaction`).
pub struct SolanaAdapter {
    rpc_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    #[serde(default = "Option::default")]
    result: Option<T>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct SignatureStatuses {
    value: Vec<Option<SignatureStatus>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignatureStatus {
    pub slot: u64,
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub confirmation_status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SolanaTransaction {
    pub slot: u64,
    #[serde(default)]
    pub block_time: Option<i64>,
    pub meta: Option<SolanaMeta>,
    pub transaction: SolanaTxBody,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SolanaMeta {
    #[serde(default)]
    pub err: Option<Value>,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    #[serde(default)]
    pub loaded_addresses: Option<LoadedAddresses>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct LoadedAddresses {
    #[serde(default)]
    pub writable: Vec<String>,
    #[serde(default)]
    pub readonly: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SolanaTxBody {
    pub signatures: Vec<String>,
    pub message: SolanaMessage,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SolanaMessage {
    pub account_keys: Vec<String>,
}

impl SolanaAdapter {
    pub fn new(rpc_url: &str, timeout: Duration) -> Result<Self, AdapterBuildError> {
        if !rpc_url.starts_with("http://") && !rpc_url.starts_with("https://") {
            return Err(AdapterBuildError::Url {
                url: rpc_url.to_string(),
                reason: "expected an http(s) url".to_string(),
            });
        }
        Ok(Self {
            rpc_url: rpc_url.to_string(),
            client: http_client(timeout)?,
            timeout,
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<Option<T>, FetchError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        debug!(method, "solana rpc call");
        let response = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(transient_from_reqwest)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status_error(status, body) {
                // A 404 from an RPC endpoint is a misrouted call, not a missing transaction.
                FetchError::NotFound => FetchError::Transient(format!("{method}: http 404")),
                other => other,
            });
        }
        let envelope: RpcEnvelope<T> = response.json().await.map_err(transient_from_reqwest)?;
        if let Some(error) = envelope.error {
            return Err(FetchError::Transient(format!(
                "{method}: rpc error {}: {}",
                error.code, error.message
            )));
        }
        Ok(envelope.result)
    }

    async fn fetch_inner(&self, signature: &str) -> Result<TransactionView, FetchError> {
        let statuses: Option<SignatureStatuses> = self
            .call(
                "getSignatureStatuses",
                json!([[signature], {"searchTransactionHistory": true}]),
            )
            .await?;
        let Some(status) = statuses
            .and_then(|statuses| statuses.value.into_iter().next())
            .flatten()
        else {
            return Err(FetchError::NotFound);
        };
        if !commitment_reached(&status) {
            return Ok(unconfirmed_view(signature, &status));
        }

        let tx: Option<SolanaTransaction> = self
            .call(
                "getTransaction",
                json!([
                    signature,
                    {
                        "encoding": "json",
                        "commitment": "confirmed",
                        "maxSupportedTransactionVersion": 0
                    }
                ]),
            )
            .await?;
        // Status says confirmed but the node cannot serve the body yet.
        let Some(tx) = tx else {
            return Err(FetchError::Transient(
                "transaction body not yet available".to_string(),
            ));
        };
        view_from_transaction(tx, &status)
    }
}

#[async_trait]
impl ChainAdapter for SolanaAdapter {
    fn chain(&self) -> ChainId {
        ChainId::Solana
    }

    async fn fetch(&self, tx_id: &str) -> Result<TransactionView, FetchError> {
        with_timeout(ChainId::Solana, self.timeout, self.fetch_inner(tx_id)).await
    }
}

fn commitment_reached(status: &SignatureStatus) -> bool {
    matches!(
        status.confirmation_status.as_deref(),
        Some("confirmed" | "finalized")
    )
}

fn unconfirmed_view(signature: &str, status: &SignatureStatus) -> TransactionView {
    TransactionView {
        chain: ChainId::Solana,
        tx_id: signature.to_string(),
        confirmed: false,
        confirmation: Confirmation::Commitment { finalized: false },
        outputs: Vec::new(),
        sender: None,
        block_time: None,
        chain_reference: status.slot,
    }
}

/// Outputs are the positive lamport deltas per account key. Keys loaded from
/// address lookup tables follow the static keys, writable before readonly.
pub(crate) fn view_from_transaction(
    tx: SolanaTransaction,
    status: &SignatureStatus,
) -> Result<TransactionView, FetchError> {
    let Some(meta) = tx.meta else {
        return Err(FetchError::Invalid(
            "transaction has no status metadata".to_string(),
        ));
    };
    let mut keys = tx.transaction.message.account_keys;
    let sender = keys.first().cloned();
    if let Some(loaded) = meta.loaded_addresses {
        keys.extend(loaded.writable);
        keys.extend(loaded.readonly);
    }
    if meta.pre_balances.len() != keys.len() || meta.post_balances.len() != keys.len() {
        return Err(FetchError::Invalid(format!(
            "balance arrays ({}/{}) do not match {} account keys",
            meta.pre_balances.len(),
            meta.post_balances.len(),
            keys.len()
        )));
    }

    let outputs = keys
        .into_iter()
        .zip(meta.pre_balances.iter().zip(meta.post_balances.iter()))
        .filter(|(_, (pre, post))| post > pre)
        .map(|(address, (pre, post))| TransferOutput {
            address,
            amount: U256::from(post - pre),
        })
        .collect();

    let failed = meta.err.is_some() || status.err.is_some();
    let tx_id = tx
        .transaction
        .signatures
        .into_iter()
        .next()
        .unwrap_or_default();

    Ok(TransactionView {
        chain: ChainId::Solana,
        tx_id,
        confirmed: !failed,
        confirmation: Confirmation::Commitment {
            finalized: status.confirmation_status.as_deref() == Some("finalized"),
        },
        outputs,
        sender,
        block_time: tx
            .block_time
            .and_then(|secs| u64::try_from(secs).ok())
            .map(unix_secs),
        chain_reference: tx.slot,
    })
}
