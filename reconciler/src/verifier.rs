// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Checks a fetched transaction against a recipient and an optional expected
//! amount. Never touches storage; calling it repeatedly for one id is harmless.

use std::time::SystemTime;

use alloy_primitives::U256;
use promo_core::chain::ChainId;
use promo_core::money::{AMOUNT_TOLERANCE, Money};
use thiserror::Error;
use tracing::{debug, warn};

use crate::chain_adapter::{AdapterSet, FetchError, TransactionView};

/// A transfer that satisfied every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedTransfer {
    pub chain: ChainId,
    pub tx_id: String,
    pub recipient: String,
    pub amount: Money,
    pub sender: Option<String>,
    pub chain_reference: u64,
    pub block_time: Option<SystemTime>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("transaction not confirmed ({confirmations}/{required} confirmations)")]
    NotConfirmed { confirmations: u64, required: u64 },
    #[error("transaction does not pay {recipient}")]
    WrongRecipient { recipient: String },
    #[error("amount mismatch: expected {expected}, received {actual}")]
    AmountMismatch { expected: Money, actual: Money },
    #[error("chain access failed: {0}")]
    Transient(String),
    #[error("unsupported transaction: {0}")]
    Invalid(String),
    #[error("no adapter configured for {0}")]
    UnsupportedChain(ChainId),
}

#[derive(Clone)]
pub struct TransactionVerifier {
    adapters: AdapterSet,
    min_confirmations: u64,
    tolerance: u64,
}

impl TransactionVerifier {
    pub fn new(adapters: AdapterSet, min_confirmations: u64) -> Self {
        Self {
            adapters,
            min_confirmations: min_confirmations.max(1),
            tolerance: AMOUNT_TOLERANCE,
        }
    }

    pub fn adapters(&self) -> &AdapterSet {
        &self.adapters
    }

    /// Fetches through the chain's adapter. A transaction the node does not know
    /// is reported as not confirmed so the user can retry later.
    pub async fn fetch(&self, chain: ChainId, tx_id: &str) -> Result<TransactionView, VerifyError> {
        self.locate(&[chain], tx_id).await
    }

    /// Tries each candidate chain in order and returns the first that knows the
    /// transaction. A transient failure on any candidate wins over "not found",
    /// since absence on that chain was never established.
    pub async fn locate(
        &self,
        candidates: &[ChainId],
        tx_id: &str,
    ) -> Result<TransactionView, VerifyError> {
        let mut transient = None;
        for chain in candidates {
            let adapter = self
                .adapters
                .get(*chain)
                .ok_or(VerifyError::UnsupportedChain(*chain))?;
            match adapter.fetch(tx_id).await {
                Ok(view) => {
                    debug!(
                        chain = %chain,
                        tx_id,
                        confirmation = %view.confirmation,
                        "transaction located"
                    );
                    return Ok(view);
                }
                Err(FetchError::NotFound) => {}
                Err(FetchError::Transient(reason)) => {
                    warn!(chain = %chain, tx_id, reason = %reason, "transient chain fetch failure");
                    transient = Some(reason);
                }
                Err(FetchError::Invalid(reason)) => return Err(VerifyError::Invalid(reason)),
            }
        }
        Err(match transient {
            Some(reason) => VerifyError::Transient(reason),
            None => VerifyError::NotConfirmed {
                confirmations: 0,
                required: self.min_confirmations,
            },
        })
    }

    pub async fn verify(
        &self,
        chain: ChainId,
        tx_id: &str,
        recipient: &str,
        expected: Option<&Money>,
    ) -> Result<VerifiedTransfer, VerifyError> {
        let view = self.fetch(chain, tx_id).await?;
        self.check_view(&view, recipient, expected)
    }

    pub fn check_view(
        &self,
        view: &TransactionView,
        recipient: &str,
        expected: Option<&Money>,
    ) -> Result<VerifiedTransfer, VerifyError> {
        check_view(view, recipient, expected, self.min_confirmations, self.tolerance)
    }
}

pub fn check_view(
    view: &TransactionView,
    recipient: &str,
    expected: Option<&Money>,
    min_confirmations: u64,
    tolerance: u64,
) -> Result<VerifiedTransfer, VerifyError> {
    let confirmations = view.confirmations();
    if !view.confirmed || confirmations < min_confirmations {
        return Err(VerifyError::NotConfirmed {
            confirmations,
            required: min_confirmations,
        });
    }

    let actual: U256 = view
        .amount_to(recipient)
        .ok_or_else(|| VerifyError::WrongRecipient {
            recipient: recipient.to_string(),
        })?;
    let actual = Money::new(view.chain, actual);

    if let Some(expected) = expected
        && !expected.within_tolerance(actual.base_units, tolerance)
    {
        return Err(VerifyError::AmountMismatch {
            expected: *expected,
            actual,
        });
    }

    Ok(VerifiedTransfer {
        chain: view.chain,
        tx_id: view.chain.normalize_tx_id(&view.tx_id),
        recipient: recipient.to_string(),
        amount: actual,
        sender: view.sender.clone(),
        chain_reference: view.chain_reference,
        block_time: view.block_time,
    })
}
