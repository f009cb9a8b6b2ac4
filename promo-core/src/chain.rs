// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Chain identity: naming, unit scale, transaction-id shapes and address formats.
//!
//! Every place that turns a user- or config-supplied chain name into a chain goes
//! through [`ChainId::parse`]; downstream code only ever matches on the enum.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
const BECH32_CHARSET: &str = "qpzry9x8gf2tvdw0s3jn54khce6mua7l";

const HEX_TX_ID_LEN: usize = 64;
const SOLANA_SIGNATURE_LEN: std::ops::RangeInclusive<usize> = 87..=88;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvmNetwork {
    Ethereum,
    Base,
}

impl EvmNetwork {
    pub const ALL: [EvmNetwork; 2] = [EvmNetwork::Ethereum, EvmNetwork::Base];

    pub fn key(self) -> &'static str {
        match self {
            Self::Ethereum => "ethereum",
            Self::Base => "base",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ChainId {
    Bitcoin,
    Evm(EvmNetwork),
    Solana,
}

/// Structural family of a chain. Transaction-id shape only identifies the family;
/// Ethereum-family networks share one id format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainFamily {
    Bitcoin,
    Evm,
    Solana,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown chain: {0}")]
pub struct ChainParseError(pub String);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unrecognized transaction id shape ({len} chars)")]
pub struct ChainDetectionError {
    pub len: usize,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid {chain} address: {address}")]
pub struct AddressError {
    pub chain: ChainId,
    pub address: String,
}

impl ChainId {
    pub const ALL: [ChainId; 4] = [
        ChainId::Bitcoin,
        ChainId::Evm(EvmNetwork::Ethereum),
        ChainId::Evm(EvmNetwork::Base),
        ChainId::Solana,
    ];

    /// Parses a chain name, accepting the ticker and common aliases.
    pub fn parse(value: &str) -> Result<Self, ChainParseError> {
        let normalized = value.trim().to_ascii_lowercase();
        let chain = match normalized.as_str() {
            "bitcoin" | "btc" => Self::Bitcoin,
            "ethereum" | "eth" | "ether" | "mainnet" => Self::Evm(EvmNetwork::Ethereum),
            "base" | "base-mainnet" => Self::Evm(EvmNetwork::Base),
            "solana" | "sol" => Self::Solana,
            _ => return Err(ChainParseError(value.to_string())),
        };
        Ok(chain)
    }

    /// Stable lowercase key used in storage and ledger keys.
    pub fn key(self) -> &'static str {
        match self {
            Self::Bitcoin => "bitcoin",
            Self::Evm(network) => network.key(),
            Self::Solana => "solana",
        }
    }

    pub fn family(self) -> ChainFamily {
        match self {
            Self::Bitcoin => ChainFamily::Bitcoin,
            Self::Evm(_) => ChainFamily::Evm,
            Self::Solana => ChainFamily::Solana,
        }
    }

    pub fn ticker(self) -> &'static str {
        match self {
            Self::Bitcoin => "BTC",
            Self::Evm(_) => "ETH",
            Self::Solana => "SOL",
        }
    }

    /// Number of decimal places between the display unit and the base unit.
    pub fn decimals(self) -> u8 {
        match self {
            Self::Bitcoin => 8,
            Self::Evm(_) => 18,
            Self::Solana => 9,
        }
    }

    pub fn validate_address(self, address: &str) -> Result<(), AddressError> {
        let ok = match self.family() {
            ChainFamily::Bitcoin => is_bitcoin_address(address),
            ChainFamily::Evm => is_evm_address(address),
            ChainFamily::Solana => is_base58(address) && (32..=44).contains(&address.len()),
        };
        if ok {
            Ok(())
        } else {
            Err(AddressError {
                chain: self,
                address: address.to_string(),
            })
        }
    }

    /// Compares two addresses on this chain. Hex and bech32 encodings are
    /// case-insensitive; base58 is not.
    pub fn addresses_equal(self, a: &str, b: &str) -> bool {
        match self.family() {
            ChainFamily::Evm => a.eq_ignore_ascii_case(b),
            ChainFamily::Bitcoin if is_bech32_like(a) || is_bech32_like(b) => {
                a.eq_ignore_ascii_case(b)
            }
            _ => a == b,
        }
    }

    pub fn normalize_tx_id(self, tx_id: &str) -> String {
        normalize_tx_id(self.family(), tx_id)
    }

    /// Globally unique ledger key for a transaction on this chain.
    pub fn qualified_tx_id(self, tx_id: &str) -> String {
        format!("{}:{}", self.key(), self.normalize_tx_id(tx_id))
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ChainId {
    type Err = ChainParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ChainId {
    type Error = ChainParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ChainId> for String {
    fn from(value: ChainId) -> Self {
        value.key().to_string()
    }
}

/// Detects the chain family from the shape of a transaction id.
///
/// A bare 64-hex-character id is always Bitcoin. This only holds because
/// Ethereum-family ids are always carried with their `0x` prefix; a caller that
/// strips the prefix gets a Bitcoin lookup.
pub fn detect_family(tx_id: &str) -> Result<ChainFamily, ChainDetectionError> {
    let tx_id = tx_id.trim();
    if let Some(hex) = tx_id.strip_prefix("0x")
        && is_hex_of_len(hex, HEX_TX_ID_LEN)
    {
        return Ok(ChainFamily::Evm);
    }
    if is_hex_of_len(tx_id, HEX_TX_ID_LEN) {
        return Ok(ChainFamily::Bitcoin);
    }
    if SOLANA_SIGNATURE_LEN.contains(&tx_id.len()) && is_base58(tx_id) {
        return Ok(ChainFamily::Solana);
    }
    Err(ChainDetectionError { len: tx_id.len() })
}

pub fn normalize_tx_id(family: ChainFamily, tx_id: &str) -> String {
    let trimmed = tx_id.trim();
    match family {
        ChainFamily::Bitcoin | ChainFamily::Evm => trimmed.to_ascii_lowercase(),
        ChainFamily::Solana => trimmed.to_string(),
    }
}

fn is_hex_of_len(value: &str, len: usize) -> bool {
    value.len() == len && value.bytes().all(|b| b.is_ascii_hexdigit())
}

fn is_base58(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| BASE58_ALPHABET.contains(c))
}

fn is_evm_address(value: &str) -> bool {
    value
        .strip_prefix("0x")
        .is_some_and(|hex| is_hex_of_len(hex, 40))
}

fn is_bech32_like(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    lower.starts_with("bc1") || lower.starts_with("tb1") || lower.starts_with("bcrt1")
}

fn is_bitcoin_address(value: &str) -> bool {
    if is_bech32_like(value) {
        // Mixed case is invalid bech32.
        let has_upper = value.chars().any(|c| c.is_ascii_uppercase());
        let has_lower = value.chars().any(|c| c.is_ascii_lowercase());
        if has_upper && has_lower {
            return false;
        }
        let lower = value.to_ascii_lowercase();
        let Some((_, data)) = lower.rsplit_once('1') else {
            return false;
        };
        return (14..=74).contains(&lower.len())
            && !data.is_empty()
            && data.chars().all(|c| BECH32_CHARSET.contains(c));
    }
    let legacy_prefix = matches!(value.chars().next(), Some('1' | '3' | 'm' | 'n' | '2'));
    legacy_prefix && (26..=35).contains(&value.len()) && is_base58(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BTC_TX: &str = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";
    const EVM_TX: &str = "0x88df016429689c079f3b2f6ad39fa052532c56795b733da78a91ebe6a713944b";
    const SOL_TX: &str = "5VERv8NMvzbJMEkV8xnrLkEaWRtSz9CosKDYjCJjBRnbJLgp8uirBgmQpjKhoR4tjF3ZpRzrFmBV6UjKdiSZkQUW";

    #[test]
    fn parse_accepts_aliases_and_rejects_unknown_names() {
        assert_eq!(ChainId::parse("BTC"), Ok(ChainId::Bitcoin));
        assert_eq!(ChainId::parse(" eth "), Ok(ChainId::Evm(EvmNetwork::Ethereum)));
        assert_eq!(ChainId::parse("base"), Ok(ChainId::Evm(EvmNetwork::Base)));
        assert_eq!(ChainId::parse("Sol"), Ok(ChainId::Solana));
        assert!(ChainId::parse("dogecoin").is_err());
    }

    #[test]
    fn serde_uses_the_storage_key() {
        let json = serde_json::to_string(&ChainId::Evm(EvmNetwork::Base)).expect("serialize");
        assert_eq!(json, "\"base\"");
        let parsed: ChainId = serde_json::from_str("\"btc\"").expect("deserialize alias");
        assert_eq!(parsed, ChainId::Bitcoin);
    }

    #[test]
    fn detection_classifies_each_id_shape() {
        assert_eq!(detect_family(EVM_TX), Ok(ChainFamily::Evm));
        assert_eq!(detect_family(BTC_TX), Ok(ChainFamily::Bitcoin));
        assert_eq!(detect_family(&BTC_TX.to_uppercase()), Ok(ChainFamily::Bitcoin));
        assert_eq!(SOL_TX.len(), 88);
        assert_eq!(detect_family(SOL_TX), Ok(ChainFamily::Solana));
        assert_eq!(detect_family(&SOL_TX[..87]), Ok(ChainFamily::Solana));
    }

    #[test]
    fn detection_rejects_everything_else() {
        assert!(detect_family("").is_err());
        assert!(detect_family(&BTC_TX[..63]).is_err());
        assert!(detect_family(&format!("{BTC_TX}a")).is_err());
        assert!(detect_family(&format!("0x{}", &BTC_TX[..62])).is_err());
        assert!(detect_family(&SOL_TX[..86]).is_err());
        // '0' and 'l' are outside the base58 alphabet.
        let bad_solana = format!("0{}", &SOL_TX[1..]);
        assert!(detect_family(&bad_solana).is_err());
        assert!(detect_family(&format!("{}zz", &EVM_TX[..64])).is_err());
    }

    #[test]
    fn qualified_ids_normalize_case_only_for_hex_chains() {
        let eth = ChainId::Evm(EvmNetwork::Ethereum);
        assert_eq!(
            eth.qualified_tx_id(&EVM_TX.to_uppercase().replacen("0X", "0x", 1)),
            format!("ethereum:{EVM_TX}")
        );
        assert_eq!(
            ChainId::Bitcoin.qualified_tx_id(&BTC_TX.to_uppercase()),
            format!("bitcoin:{BTC_TX}")
        );
        assert_eq!(
            ChainId::Solana.qualified_tx_id(SOL_TX),
            format!("solana:{SOL_TX}")
        );
    }

    #[test]
    fn address_validation_per_family() {
        let eth = ChainId::Evm(EvmNetwork::Ethereum);
        assert!(
            eth.validate_address("0x52908400098527886E0F7030069857D2E4169EE7")
                .is_ok()
        );
        assert!(eth.validate_address("52908400098527886E0F7030069857D2E4169EE7").is_err());

        assert!(
            ChainId::Bitcoin
                .validate_address("bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq")
                .is_ok()
        );
        assert!(
            ChainId::Bitcoin
                .validate_address("1BoatSLRHtKNngkdXEeobR76b53LETtpyT")
                .is_ok()
        );
        assert!(
            ChainId::Bitcoin
                .validate_address("bc1QAR0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq")
                .is_err()
        );

        assert!(
            ChainId::Solana
                .validate_address("9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM")
                .is_ok()
        );
        assert!(ChainId::Solana.validate_address("0xdeadbeef").is_err());
    }

    #[test]
    fn address_comparison_respects_encoding_case_rules() {
        let eth = ChainId::Evm(EvmNetwork::Ethereum);
        assert!(eth.addresses_equal(
            "0x52908400098527886E0F7030069857D2E4169EE7",
            "0x52908400098527886e0f7030069857d2e4169ee7"
        ));
        assert!(ChainId::Bitcoin.addresses_equal(
            "BC1QAR0SRRR7XFKVY5L643LYDNW9RE59GTZZWF5MDQ",
            "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq"
        ));
        assert!(!ChainId::Solana.addresses_equal(
            "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM",
            "9wzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM"
        ));
    }
}
