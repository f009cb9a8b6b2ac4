// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::time::SystemTime;

use promo_core::money::Money;
use promo_core::promotion::{PromoDuration, PromotionKind, Tier};
use promo_core::records::{NewActivatedPromotion, ProcessedTransaction};

use crate::verifier::VerifiedTransfer;

/// What a credited payment buys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Purchase {
    pub user_id: String,
    pub target: String,
    pub kind: PromotionKind,
    pub duration: PromoDuration,
    pub tier: Tier,
}

impl Purchase {
    /// Ledger purpose tag, e.g. `trending:premium:24h`.
    pub fn purpose(&self) -> String {
        format!("{}:{}:{}", self.kind, self.tier, self.duration)
    }
}

/// A fresh window `[now, now + duration)`. Existing windows for the same target
/// are never merged or extended.
pub fn plan_activation(
    purchase: &Purchase,
    amount: Money,
    source_tx_id: &str,
    now: SystemTime,
) -> NewActivatedPromotion {
    NewActivatedPromotion {
        user_id: purchase.user_id.clone(),
        target: purchase.target.clone(),
        kind: purchase.kind,
        tier: purchase.tier,
        amount,
        start_time: now,
        end_time: now + purchase.duration.as_duration(),
        source_tx_id: source_tx_id.to_string(),
    }
}

pub fn ledger_record(
    purchase: &Purchase,
    transfer: &VerifiedTransfer,
    key: &str,
    now: SystemTime,
) -> ProcessedTransaction {
    ProcessedTransaction {
        chain_qualified_tx_id: key.to_string(),
        user_id: purchase.user_id.clone(),
        recipient_address: transfer.recipient.clone(),
        sender_address: transfer.sender.clone(),
        amount: transfer.amount,
        chain_reference: transfer.chain_reference,
        purpose: purchase.purpose(),
        processed_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promo_core::chain::ChainId;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn window_length_equals_duration() {
        let purchase = Purchase {
            user_id: "user-1".into(),
            target: "ordinals-collection".into(),
            kind: PromotionKind::Footer,
            duration: PromoDuration::days(30),
            tier: Tier::Normal,
        };
        let now = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let planned = plan_activation(
            &purchase,
            Money::from_base_units(ChainId::Bitcoin, 150_000),
            "bitcoin:aa",
            now,
        );
        assert_eq!(planned.start_time, now);
        assert_eq!(
            planned.end_time.duration_since(planned.start_time).expect("ordered"),
            Duration::from_secs(30 * 24 * 3600)
        );
        assert_eq!(purchase.purpose(), "footer:normal:30d");
    }
}
