// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Domain model for crypto-paid promotions.
//!
//! Money is always an integer count of a chain's base units. Floating point never
//! takes part in a comparison or a persisted amount; human-readable amounts are a
//! one-way projection for display.
pub mod chain;
pub mod fee_schedule;
pub mod money;
pub mod promotion;
pub mod records;

pub use chain::{ChainFamily, ChainId, EvmNetwork};
pub use fee_schedule::{FeeSchedule, FeeScheduleError};
pub use money::{AMOUNT_TOLERANCE, Money};
pub use promotion::{PromoDuration, PromotionKind, Tier};
