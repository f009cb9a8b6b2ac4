// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use promo_core::chain::{ChainDetectionError, ChainId};
use promo_core::money::Money;
use promo_core::promotion::PromoDuration;
use thiserror::Error;

use crate::verifier::VerifyError;

/// Why a reconciliation did not credit anything. Every variant is a value the
/// caller can report; none of them indicates the process should stop.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("transaction not confirmed ({confirmations}/{required})")]
    NotConfirmed { confirmations: u64, required: u64 },
    #[error("transaction does not pay {recipient}")]
    WrongRecipient { recipient: String },
    #[error("amount mismatch: expected {expected}, received {actual}")]
    AmountMismatch { expected: Money, actual: Money },
    #[error("transaction {key} already processed")]
    AlreadyProcessed { key: String, credited_to_caller: bool },
    #[error("no open payment request matches {observed}")]
    NoMatchingIntent {
        observed: Money,
        valid_amounts: Vec<(PromoDuration, Money)>,
    },
    #[error("{observed} does not correspond to any offered duration")]
    UnknownDuration {
        observed: Money,
        valid_amounts: Vec<(PromoDuration, Money)>,
    },
    #[error("transient chain access failure: {0}")]
    TransientError(String),
    #[error("cannot detect chain from transaction id: {0}")]
    ChainDetectionFailed(#[from] ChainDetectionError),
    #[error("unsupported transaction: {0}")]
    InvalidTransaction(String),
    #[error("pending payment {0} does not exist")]
    UnknownPendingPayment(i64),
    #[error("pending payment {0} has expired")]
    PendingPaymentExpired(i64),
    #[error("pending payment {0} was already paid by another transaction")]
    PendingPaymentAlreadyMatched(i64),
    #[error("payments on {0} are not enabled")]
    UnsupportedChain(ChainId),
    #[error("invalid offer: {0}")]
    InvalidOffer(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ReconcileError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotConfirmed { .. } => "NOT_CONFIRMED",
            Self::WrongRecipient { .. } => "WRONG_RECIPIENT",
            Self::AmountMismatch { .. } => "AMOUNT_MISMATCH",
            Self::AlreadyProcessed { .. } => "ALREADY_PROCESSED",
            Self::NoMatchingIntent { .. } => "NO_MATCHING_INTENT",
            Self::UnknownDuration { .. } => "UNKNOWN_DURATION",
            Self::TransientError(_) => "TRANSIENT_ERROR",
            Self::ChainDetectionFailed(_) => "CHAIN_DETECTION_FAILED",
            Self::InvalidTransaction(_) => "INVALID_TRANSACTION",
            Self::UnknownPendingPayment(_) => "UNKNOWN_PENDING_PAYMENT",
            Self::PendingPaymentExpired(_) => "PENDING_PAYMENT_EXPIRED",
            Self::PendingPaymentAlreadyMatched(_) => "PENDING_PAYMENT_MATCHED",
            Self::UnsupportedChain(_) => "UNSUPPORTED_CHAIN",
            Self::InvalidOffer(_) => "INVALID_OFFER",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Only chain-access and storage faults are worth retrying with the same id.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientError(_) | Self::Internal(_))
    }

    /// Text safe to show the paying user. Adapter and driver details stay in logs.
    pub fn user_message(&self) -> String {
        match self {
            Self::NotConfirmed { .. } => {
                "The transaction is not confirmed yet. Please try again in a few minutes."
                    .to_string()
            }
            Self::WrongRecipient { recipient } => {
                format!("This transaction was not sent to the payment address {recipient}.")
            }
            Self::AmountMismatch { expected, actual } => format!(
                "Amount mismatch: expected {expected}, received {actual}. Send the exact amount shown in the payment instructions."
            ),
            Self::AlreadyProcessed {
                credited_to_caller: true,
                ..
            } => "This transaction was already credited to your account.".to_string(),
            Self::AlreadyProcessed { .. } => {
                "This transaction has already been used by another account.".to_string()
            }
            Self::NoMatchingIntent {
                observed,
                valid_amounts,
            } => format!(
                "Received {observed}, but you have no open payment request for this amount. Valid amounts: {}.",
                list_amounts(valid_amounts)
            ),
            Self::UnknownDuration {
                observed,
                valid_amounts,
            } => format!(
                "Received {observed}, which does not match any offered duration. Valid amounts: {}.",
                list_amounts(valid_amounts)
            ),
            Self::TransientError(_) => {
                "The blockchain service is temporarily unavailable. Please try again shortly."
                    .to_string()
            }
            Self::ChainDetectionFailed(_) => {
                "This does not look like a Bitcoin, Ethereum or Solana transaction id.".to_string()
            }
            Self::InvalidTransaction(_) => {
                "This transaction is not a supported payment transfer.".to_string()
            }
            Self::UnknownPendingPayment(_) => {
                "Payment request not found. Please request new payment instructions.".to_string()
            }
            Self::PendingPaymentExpired(_) => {
                "This payment request has expired. Please request new payment instructions."
                    .to_string()
            }
            Self::PendingPaymentAlreadyMatched(_) => {
                "This payment request was already paid with another transaction.".to_string()
            }
            Self::UnsupportedChain(chain) => {
                format!("Payments on {chain} are not currently accepted.")
            }
            Self::InvalidOffer(message) => message.clone(),
            Self::Internal(_) => {
                "Something went wrong while processing your payment. Please try again.".to_string()
            }
        }
    }
}

impl From<VerifyError> for ReconcileError {
    fn from(value: VerifyError) -> Self {
        match value {
            VerifyError::NotConfirmed {
                confirmations,
                required,
            } => Self::NotConfirmed {
                confirmations,
                required,
            },
            VerifyError::WrongRecipient { recipient } => Self::WrongRecipient { recipient },
            VerifyError::AmountMismatch { expected, actual } => {
                Self::AmountMismatch { expected, actual }
            }
            VerifyError::Transient(reason) => Self::TransientError(reason),
            VerifyError::Invalid(reason) => Self::InvalidTransaction(reason),
            VerifyError::UnsupportedChain(chain) => Self::UnsupportedChain(chain),
        }
    }
}

fn list_amounts(amounts: &[(PromoDuration, Money)]) -> String {
    amounts
        .iter()
        .map(|(duration, amount)| format!("{duration} = {amount}"))
        .collect::<Vec<_>>()
        .join(", ")
}
