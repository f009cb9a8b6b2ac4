// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::fmt;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::ChainId;

/// Allowed gap between a quoted and an observed amount, in base units. Absorbs
/// unit-conversion rounding only; it is not a price-slippage allowance.
pub const AMOUNT_TOLERANCE: u64 = 1_000;

/// An amount in a chain's smallest indivisible unit (satoshi, wei, lamport).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    pub chain: ChainId,
    pub base_units: U256,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyParseError {
    #[error("amount is empty")]
    Empty,
    #[error("invalid amount {0:?}")]
    Invalid(String),
    #[error("amount {value:?} has more than {decimals} decimal places")]
    TooPrecise { value: String, decimals: u8 },
    #[error("amount {0:?} overflows")]
    Overflow(String),
}

impl Money {
    pub fn new(chain: ChainId, base_units: U256) -> Self {
        Self { chain, base_units }
    }

    pub fn from_base_units(chain: ChainId, base_units: u64) -> Self {
        Self::new(chain, U256::from(base_units))
    }

    /// Parses a display-unit decimal such as `"0.2"` into exact base units.
    pub fn parse_display(chain: ChainId, value: &str) -> Result<Self, MoneyParseError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(MoneyParseError::Empty);
        }
        let (whole, fraction) = value.split_once('.').unwrap_or((value, ""));
        let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if (whole.is_empty() && fraction.is_empty()) || !all_digits(whole) || !all_digits(fraction)
        {
            return Err(MoneyParseError::Invalid(value.to_string()));
        }

        let decimals = chain.decimals();
        if fraction.len() > usize::from(decimals) {
            return Err(MoneyParseError::TooPrecise {
                value: value.to_string(),
                decimals,
            });
        }

        let padded = format!("{fraction:0<width$}", width = usize::from(decimals));
        let digits = format!("{whole}{padded}");
        let digits = digits.trim_start_matches('0');
        let base_units = if digits.is_empty() {
            U256::ZERO
        } else {
            U256::from_str_radix(digits, 10)
                .map_err(|_| MoneyParseError::Overflow(value.to_string()))?
        };
        Ok(Self::new(chain, base_units))
    }

    pub fn is_zero(&self) -> bool {
        self.base_units.is_zero()
    }

    pub fn abs_diff(&self, other: U256) -> U256 {
        if self.base_units >= other {
            self.base_units - other
        } else {
            other - self.base_units
        }
    }

    /// True when `actual` lies in the closed window `[self - tolerance, self + tolerance]`.
    pub fn within_tolerance(&self, actual: U256, tolerance: u64) -> bool {
        self.abs_diff(actual) <= U256::from(tolerance)
    }

    /// Lossy display projection without trailing zeros, e.g. `0.2`.
    pub fn display_units(&self) -> String {
        let scale = U256::from(10_u64).pow(U256::from(self.chain.decimals()));
        let whole = self.base_units / scale;
        let fraction = self.base_units % scale;
        if fraction.is_zero() {
            return whole.to_string();
        }
        let fraction = format!(
            "{:0>width$}",
            fraction.to_string(),
            width = usize::from(self.chain.decimals())
        );
        format!("{whole}.{}", fraction.trim_end_matches('0'))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.display_units(), self.chain.ticker())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::EvmNetwork;

    const ETH: ChainId = ChainId::Evm(EvmNetwork::Ethereum);

    #[test]
    fn parse_display_is_exact_in_base_units() {
        let amount = Money::parse_display(ETH, "0.2").expect("parse");
        assert_eq!(amount.base_units, U256::from(200_000_000_000_000_000_u64));

        let sats = Money::parse_display(ChainId::Bitcoin, "0.00032").expect("parse");
        assert_eq!(sats.base_units, U256::from(32_000_u64));

        let lamports = Money::parse_display(ChainId::Solana, "3").expect("parse");
        assert_eq!(lamports.base_units, U256::from(3_000_000_000_u64));

        assert_eq!(
            Money::parse_display(ChainId::Bitcoin, ".5").expect("parse").base_units,
            U256::from(50_000_000_u64)
        );
    }

    #[test]
    fn parse_display_rejects_bad_input() {
        assert_eq!(Money::parse_display(ETH, " "), Err(MoneyParseError::Empty));
        assert!(matches!(
            Money::parse_display(ETH, "1,5"),
            Err(MoneyParseError::Invalid(_))
        ));
        assert!(matches!(
            Money::parse_display(ETH, "."),
            Err(MoneyParseError::Invalid(_))
        ));
        assert!(matches!(
            Money::parse_display(ChainId::Bitcoin, "0.000000001"),
            Err(MoneyParseError::TooPrecise { decimals: 8, .. })
        ));
        assert!(matches!(
            Money::parse_display(ETH, "-1"),
            Err(MoneyParseError::Invalid(_))
        ));
    }

    #[test]
    fn tolerance_window_is_closed_on_both_sides() {
        let expected = Money::from_base_units(ETH, 200_000_000_000_000_000);
        let e = expected.base_units;
        let tau = U256::from(AMOUNT_TOLERANCE);
        let one = U256::from(1_u64);

        assert!(expected.within_tolerance(e - tau, AMOUNT_TOLERANCE));
        assert!(expected.within_tolerance(e + tau, AMOUNT_TOLERANCE));
        assert!(!expected.within_tolerance(e - tau - one, AMOUNT_TOLERANCE));
        assert!(!expected.within_tolerance(e + tau + one, AMOUNT_TOLERANCE));
    }

    #[test]
    fn display_trims_trailing_zeros() {
        assert_eq!(
            Money::from_base_units(ETH, 200_000_000_000_000_000).to_string(),
            "0.2 ETH"
        );
        assert_eq!(
            Money::from_base_units(ETH, 199_999_999_998_000_000).display_units(),
            "0.199999999998"
        );
        assert_eq!(
            Money::from_base_units(ChainId::Bitcoin, 150_000_000).to_string(),
            "1.5 BTC"
        );
        assert_eq!(Money::from_base_units(ChainId::Solana, 0).display_units(), "0");
    }
}
