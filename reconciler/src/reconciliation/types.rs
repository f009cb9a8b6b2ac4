// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::time::SystemTime;

use promo_core::chain::ChainId;
use promo_core::money::Money;
use promo_core::promotion::{PromoDuration, PromotionKind, Tier};
use promo_core::records::ActivatedPromotion;

use super::ReconcileError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionRequest {
    pub user_id: String,
    pub target: String,
    pub kind: PromotionKind,
    pub duration: PromoDuration,
    pub tier: Tier,
    pub chain: ChainId,
}

/// Display data for a freshly created pending payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentInstructions {
    pub pending_payment_id: i64,
    pub chain: ChainId,
    pub recipient_address: String,
    pub amount: Money,
    pub human_readable_amount: String,
    pub expires_at: SystemTime,
}

/// Payment for a listing without a prior intent; the duration is read off the amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoDetectRequest {
    pub user_id: String,
    pub target: String,
    pub kind: PromotionKind,
    pub tier: Tier,
    pub tx_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub chain_qualified_tx_id: String,
    pub pending_payment_id: Option<i64>,
    pub duration: PromoDuration,
    pub promotion: ActivatedPromotion,
}

pub type ReconciliationResult = Result<Reconciled, ReconcileError>;
