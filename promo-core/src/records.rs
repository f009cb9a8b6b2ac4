// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::time::SystemTime;

use crate::chain::ChainId;
use crate::money::Money;
use crate::promotion::{PromoDuration, PromotionKind, Tier};

/// A time-boxed purchase intent. `matched_tx_id` is set exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPayment {
    pub id: i64,
    pub user_id: String,
    pub chain: ChainId,
    // Opaque reference to the promoted token, collection or ad slot.
    pub target: String,
    pub kind: PromotionKind,
    pub duration: PromoDuration,
    pub tier: Tier,
    pub expected_amount: Money,
    pub created_at: SystemTime,
    pub expires_at: SystemTime,
    pub matched_tx_id: Option<String>,
}

impl PendingPayment {
    /// Expiry is evaluated at query time: an intent is live strictly before `expires_at`.
    pub fn is_open_at(&self, now: SystemTime) -> bool {
        self.matched_tx_id.is_none() && self.expires_at > now
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPendingPayment {
    pub user_id: String,
    pub chain: ChainId,
    pub target: String,
    pub kind: PromotionKind,
    pub duration: PromoDuration,
    pub tier: Tier,
    pub expected_amount: Money,
    pub created_at: SystemTime,
    pub expires_at: SystemTime,
}

/// Idempotency-ledger entry. One row per credited on-chain transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedTransaction {
    pub chain_qualified_tx_id: String,
    pub user_id: String,
    pub recipient_address: String,
    pub sender_address: Option<String>,
    pub amount: Money,
    // Block height on Bitcoin/EVM, slot on Solana.
    pub chain_reference: u64,
    pub purpose: String,
    pub processed_at: SystemTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewActivatedPromotion {
    pub user_id: String,
    pub target: String,
    pub kind: PromotionKind,
    pub tier: Tier,
    pub amount: Money,
    pub start_time: SystemTime,
    pub end_time: SystemTime,
    pub source_tx_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivatedPromotion {
    pub id: i64,
    pub user_id: String,
    pub target: String,
    pub kind: PromotionKind,
    pub tier: Tier,
    pub amount: Money,
    pub start_time: SystemTime,
    pub end_time: SystemTime,
    pub source_tx_id: String,
}

impl NewActivatedPromotion {
    pub fn into_activated(self, id: i64) -> ActivatedPromotion {
        ActivatedPromotion {
            id,
            user_id: self.user_id,
            target: self.target,
            kind: self.kind,
            tier: self.tier,
            amount: self.amount,
            start_time: self.start_time,
            end_time: self.end_time,
            source_tx_id: self.source_tx_id,
        }
    }
}

impl ActivatedPromotion {
    pub fn is_active_at(&self, now: SystemTime) -> bool {
        self.start_time <= now && now < self.end_time
    }
}
