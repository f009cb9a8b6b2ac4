// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Validated price table: `(chain, kind, tier, duration) -> amount`.
//!
//! The table is built once at startup and never mutated. Construction rejects any
//! table in which two durations of the same `(chain, kind, tier)` share an amount,
//! since reverse lookup would then be ambiguous.

mod defaults;

use std::collections::{BTreeMap, BTreeSet};

use alloy_primitives::U256;
use serde::Deserialize;
use thiserror::Error;

use crate::chain::ChainId;
use crate::money::{Money, MoneyParseError};
use crate::promotion::{PromoDuration, PromotionError, PromotionKind, Tier};

pub use defaults::default_fee_rows;

type FeeKey = (ChainId, PromotionKind, Tier, PromoDuration);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeScheduleEntry {
    pub chain: ChainId,
    pub kind: PromotionKind,
    pub duration: PromoDuration,
    pub tier: Tier,
    pub amount: Money,
}

/// One row of a JSON fee-schedule file. Amounts are decimal strings in display
/// units (`"0.2"` on Ethereum is 0.2 ETH).
#[derive(Debug, Clone, Deserialize)]
pub struct FeeRowConfig {
    pub chain: ChainId,
    pub kind: PromotionKind,
    #[serde(default)]
    pub tier: Tier,
    #[serde(default)]
    pub duration_hours: Option<u32>,
    #[serde(default)]
    pub duration_days: Option<u32>,
    pub amount: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeeScheduleConfig {
    pub rows: Vec<FeeRowConfig>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FeeScheduleError {
    #[error(transparent)]
    Offer(#[from] PromotionError),
    #[error("fee row for {chain} {kind}: {source}")]
    Amount {
        chain: ChainId,
        kind: PromotionKind,
        #[source]
        source: MoneyParseError,
    },
    #[error("fee row for {chain} {kind} must set exactly one in-range duration_hours/duration_days")]
    DurationUnit { chain: ChainId, kind: PromotionKind },
    #[error("fee amount for {chain} {kind} {tier} {duration} is zero")]
    ZeroAmount {
        chain: ChainId,
        kind: PromotionKind,
        tier: Tier,
        duration: PromoDuration,
    },
    #[error("fee amount on {chain} does not belong to that chain")]
    ChainMismatch { chain: ChainId },
    #[error("duplicate fee row for {chain} {kind} {tier} {duration}")]
    Duplicate {
        chain: ChainId,
        kind: PromotionKind,
        tier: Tier,
        duration: PromoDuration,
    },
    #[error(
        "{chain} {kind} {tier}: durations {first} and {second} share amount {amount}; reverse lookup would be ambiguous"
    )]
    AmbiguousAmount {
        chain: ChainId,
        kind: PromotionKind,
        tier: Tier,
        first: PromoDuration,
        second: PromoDuration,
        amount: Money,
    },
    #[error("no fee configured for {chain} {kind} {tier} {duration}")]
    NotConfigured {
        chain: ChainId,
        kind: PromotionKind,
        tier: Tier,
        duration: PromoDuration,
    },
}

#[derive(Debug, Clone)]
pub struct FeeSchedule {
    table: BTreeMap<FeeKey, U256>,
}

impl FeeSchedule {
    pub fn from_entries(
        entries: impl IntoIterator<Item = FeeScheduleEntry>,
    ) -> Result<Self, FeeScheduleError> {
        let mut table = BTreeMap::new();
        for entry in entries {
            entry.kind.check_offer(entry.duration, entry.tier)?;
            if entry.amount.chain != entry.chain {
                return Err(FeeScheduleError::ChainMismatch { chain: entry.chain });
            }
            if entry.amount.is_zero() {
                return Err(FeeScheduleError::ZeroAmount {
                    chain: entry.chain,
                    kind: entry.kind,
                    tier: entry.tier,
                    duration: entry.duration,
                });
            }
            let key = (entry.chain, entry.kind, entry.tier, entry.duration);
            if table.insert(key, entry.amount.base_units).is_some() {
                return Err(FeeScheduleError::Duplicate {
                    chain: entry.chain,
                    kind: entry.kind,
                    tier: entry.tier,
                    duration: entry.duration,
                });
            }
        }

        let schedule = Self { table };
        schedule.check_injective()?;
        Ok(schedule)
    }

    pub fn from_config(config: &FeeScheduleConfig) -> Result<Self, FeeScheduleError> {
        let entries = config
            .rows
            .iter()
            .map(FeeRowConfig::to_entry)
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_entries(entries)
    }

    /// The built-in price list.
    pub fn with_defaults() -> Result<Self, FeeScheduleError> {
        Self::from_config(&FeeScheduleConfig {
            rows: default_fee_rows(),
        })
    }

    /// Expected amount for a purchase. Durations outside the kind's closed set are
    /// rejected even if the table happens to be empty for them.
    pub fn quote(
        &self,
        chain: ChainId,
        kind: PromotionKind,
        duration: PromoDuration,
        tier: Tier,
    ) -> Result<Money, FeeScheduleError> {
        kind.check_offer(duration, tier)?;
        self.table
            .get(&(chain, kind, tier, duration))
            .map(|amount| Money::new(chain, *amount))
            .ok_or(FeeScheduleError::NotConfigured {
                chain,
                kind,
                tier,
                duration,
            })
    }

    /// The unique duration whose quote equals `amount` exactly.
    pub fn reverse_lookup(
        &self,
        chain: ChainId,
        kind: PromotionKind,
        tier: Tier,
        amount: U256,
    ) -> Option<PromoDuration> {
        kind.durations().iter().copied().find(|duration| {
            self.table
                .get(&(chain, kind, tier, *duration))
                .is_some_and(|quoted| *quoted == amount)
        })
    }

    /// Every configured `(duration, amount)` for a listing, shortest first.
    pub fn valid_amounts(
        &self,
        chain: ChainId,
        kind: PromotionKind,
        tier: Tier,
    ) -> Vec<(PromoDuration, Money)> {
        kind.durations()
            .iter()
            .filter_map(|duration| {
                self.table
                    .get(&(chain, kind, tier, *duration))
                    .map(|amount| (*duration, Money::new(chain, *amount)))
            })
            .collect()
    }

    pub fn chains(&self) -> BTreeSet<ChainId> {
        self.table.keys().map(|(chain, ..)| *chain).collect()
    }

    fn check_injective(&self) -> Result<(), FeeScheduleError> {
        let mut seen: BTreeMap<(ChainId, PromotionKind, Tier, U256), PromoDuration> =
            BTreeMap::new();
        for ((chain, kind, tier, duration), amount) in &self.table {
            if let Some(first) = seen.insert((*chain, *kind, *tier, *amount), *duration) {
                return Err(FeeScheduleError::AmbiguousAmount {
                    chain: *chain,
                    kind: *kind,
                    tier: *tier,
                    first,
                    second: *duration,
                    amount: Money::new(*chain, *amount),
                });
            }
        }
        Ok(())
    }
}

impl FeeRowConfig {
    fn to_entry(&self) -> Result<FeeScheduleEntry, FeeScheduleError> {
        let duration = match (self.duration_hours, self.duration_days) {
            (Some(hours), None) => Some(PromoDuration::hours(hours)),
            (None, Some(days)) => PromoDuration::checked_days(days),
            _ => None,
        }
        .ok_or(FeeScheduleError::DurationUnit {
            chain: self.chain,
            kind: self.kind,
        })?;
        let amount = Money::parse_display(self.chain, &self.amount).map_err(|source| {
            FeeScheduleError::Amount {
                chain: self.chain,
                kind: self.kind,
                source,
            }
        })?;
        Ok(FeeScheduleEntry {
            chain: self.chain,
            kind: self.kind,
            duration,
            tier: self.tier,
            amount,
        })
    }
}
