// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use crate::chain::{ChainId, EvmNetwork};
use crate::promotion::{PromotionKind, Tier};

use super::FeeRowConfig;

// Prices in display units, one column per duration of the kind's closed set.
const TRENDING_NORMAL: [(ChainId, [&str; 4]); 4] = [
    (ChainId::Bitcoin, ["0.0010", "0.0018", "0.0025", "0.0032"]),
    (ChainId::Evm(EvmNetwork::Ethereum), ["0.05", "0.09", "0.14", "0.20"]),
    (ChainId::Evm(EvmNetwork::Base), ["0.05", "0.09", "0.14", "0.20"]),
    (ChainId::Solana, ["0.8", "1.5", "2.2", "3.0"]),
];

const TRENDING_PREMIUM: [(ChainId, [&str; 4]); 4] = [
    (ChainId::Bitcoin, ["0.0020", "0.0035", "0.0050", "0.0065"]),
    (ChainId::Evm(EvmNetwork::Ethereum), ["0.10", "0.18", "0.27", "0.35"]),
    (ChainId::Evm(EvmNetwork::Base), ["0.10", "0.18", "0.27", "0.35"]),
    (ChainId::Solana, ["1.6", "3.0", "4.4", "6.0"]),
];

const IMAGE: [(ChainId, [&str; 5]); 4] = [
    (ChainId::Bitcoin, ["0.0005", "0.0009", "0.0013", "0.0024", "0.0045"]),
    (ChainId::Evm(EvmNetwork::Ethereum), ["0.02", "0.035", "0.05", "0.09", "0.16"]),
    (ChainId::Evm(EvmNetwork::Base), ["0.02", "0.035", "0.05", "0.09", "0.16"]),
    (ChainId::Solana, ["0.3", "0.55", "0.8", "1.5", "2.8"]),
];

const FOOTER: [(ChainId, [&str; 5]); 4] = [
    (ChainId::Bitcoin, ["0.0015", "0.0027", "0.0038", "0.0070", "0.0130"]),
    (ChainId::Evm(EvmNetwork::Ethereum), ["0.06", "0.11", "0.15", "0.28", "0.50"]),
    (ChainId::Evm(EvmNetwork::Base), ["0.06", "0.11", "0.15", "0.28", "0.50"]),
    (ChainId::Solana, ["1.0", "1.8", "2.6", "4.8", "9.0"]),
];

pub fn default_fee_rows() -> Vec<FeeRowConfig> {
    let mut rows = Vec::new();
    push_rows(&mut rows, PromotionKind::Trending, Tier::Normal, &TRENDING_NORMAL);
    push_rows(&mut rows, PromotionKind::Trending, Tier::Premium, &TRENDING_PREMIUM);
    push_rows(&mut rows, PromotionKind::Image, Tier::Normal, &IMAGE);
    push_rows(&mut rows, PromotionKind::Footer, Tier::Normal, &FOOTER);
    rows
}

fn push_rows<const N: usize>(
    rows: &mut Vec<FeeRowConfig>,
    kind: PromotionKind,
    tier: Tier,
    table: &[(ChainId, [&str; N])],
) {
    for (chain, prices) in table {
        for (duration, price) in kind.durations().iter().zip(prices.iter()) {
            rows.push(FeeRowConfig {
                chain: *chain,
                kind,
                tier,
                duration_hours: Some(duration.as_hours()),
                duration_days: None,
                amount: (*price).to_string(),
            });
        }
    }
}
