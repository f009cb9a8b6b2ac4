// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::time::Duration;

use alloy::consensus::Transaction as _;
use alloy::eips::BlockNumberOrTag;
use alloy::network::{ReceiptResponse as _, TransactionResponse as _};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::transports::http::reqwest::Url;
use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use promo_core::chain::{ChainId, EvmNetwork};
use tracing::debug;

use super::{
    AdapterBuildError, ChainAdapter, Confirmation, FetchError, TransactionView, TransferOutput,
    unix_secs, with_timeout,
};

/// Ethereum-family JSON-RPC through the alloy provider. Native value transfers only.
pub struct EvmAdapter {
    network: EvmNetwork,
    provider: DynProvider,
    timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EvmTxFacts {
    pub hash: B256,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EvmReceiptFacts {
    pub success: bool,
    pub block_number: u64,
}

impl EvmAdapter {
    pub fn new(
        network: EvmNetwork,
        rpc_url: &str,
        timeout: Duration,
    ) -> Result<Self, AdapterBuildError> {
        let url: Url = rpc_url.parse().map_err(|err| AdapterBuildError::Url {
            url: rpc_url.to_string(),
            reason: format!("{err}"),
        })?;
        let provider = ProviderBuilder::new().connect_http(url).erased();
        Ok(Self {
            network,
            provider,
            timeout,
        })
    }

    async fn fetch_inner(&self, tx_id: &str) -> Result<TransactionView, FetchError> {
        let hash: B256 = tx_id
            .parse()
            .map_err(|_| FetchError::Invalid(format!("not a transaction hash: {tx_id}")))?;
        debug!(network = self.network.key(), tx_id, "evm tx lookup");

        let Some(tx) = self
            .provider
            .get_transaction_by_hash(hash)
            .await
            .map_err(rpc_error)?
        else {
            return Err(FetchError::NotFound);
        };
        let facts = EvmTxFacts {
            hash: tx.tx_hash(),
            from: tx.from(),
            to: tx.to(),
            value: tx.value(),
        };

        // A known transaction without a receipt is still pending.
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(rpc_error)?;
        let Some(receipt) = receipt.and_then(|receipt| {
            receipt.block_number().map(|block_number| EvmReceiptFacts {
                success: receipt.status(),
                block_number,
            })
        }) else {
            return view_from_facts(self.network, facts, None, 0, None);
        };

        let head = self.provider.get_block_number().await.map_err(rpc_error)?;
        let block_time = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(receipt.block_number))
            .await
            .map_err(rpc_error)?
            .map(|block| block.header.timestamp);

        view_from_facts(self.network, facts, Some(receipt), head, block_time)
    }
}

#[async_trait]
impl ChainAdapter for EvmAdapter {
    fn chain(&self) -> ChainId {
        ChainId::Evm(self.network)
    }

    async fn fetch(&self, tx_id: &str) -> Result<TransactionView, FetchError> {
        with_timeout(self.chain(), self.timeout, self.fetch_inner(tx_id)).await
    }
}

fn rpc_error(err: impl std::fmt::Display) -> FetchError {
    FetchError::Transient(format!("rpc: {err}"))
}

/// Success is the receipt status; a reverted transfer moved no value.
pub(crate) fn view_from_facts(
    network: EvmNetwork,
    tx: EvmTxFacts,
    receipt: Option<EvmReceiptFacts>,
    head: u64,
    block_time: Option<u64>,
) -> Result<TransactionView, FetchError> {
    let Some(to) = tx.to else {
        return Err(FetchError::Invalid(
            "contract creation is not a payment".to_string(),
        ));
    };

    let (confirmed, confirmations, chain_reference) = match receipt {
        Some(receipt) => (
            receipt.success,
            head.saturating_sub(receipt.block_number).saturating_add(1),
            receipt.block_number,
        ),
        None => (false, 0, 0),
    };

    Ok(TransactionView {
        chain: ChainId::Evm(network),
        tx_id: format!("{:#x}", tx.hash),
        confirmed,
        confirmation: Confirmation::Blocks(confirmations),
        outputs: vec![TransferOutput {
            address: to.to_string(),
            amount: tx.value,
        }],
        sender: Some(tx.from.to_string()),
        block_time: block_time.map(unix_secs),
        chain_reference,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECIPIENT: &str = "0x00000000219ab540356cbb839cbe05303d7705fa";

    fn facts(value: u64) -> EvmTxFacts {
        EvmTxFacts {
            hash: B256::repeat_byte(0xab),
            from: Address::repeat_byte(0x11),
            to: Some(RECIPIENT.parse().expect("address")),
            value: U256::from(value),
        }
    }

    #[test]
    fn mined_successful_transfer_is_confirmed() {
        let receipt = EvmReceiptFacts {
            success: true,
            block_number: 100,
        };
        let view = view_from_facts(
            EvmNetwork::Ethereum,
            facts(7),
            Some(receipt),
            104,
            Some(1_700_000_000),
        )
        .expect("view");
        assert!(view.confirmed);
        assert_eq!(view.confirmations(), 5);
        assert_eq!(view.chain_reference, 100);
        assert_eq!(view.amount_to(RECIPIENT), Some(U256::from(7_u64)));
        assert_eq!(view.tx_id, format!("0x{}", "ab".repeat(32)));
    }

    #[test]
    fn reverted_transfer_is_not_confirmed() {
        let receipt = EvmReceiptFacts {
            success: false,
            block_number: 100,
        };
        let view =
            view_from_facts(EvmNetwork::Base, facts(7), Some(receipt), 100, None).expect("view");
        assert!(!view.confirmed);
        assert_eq!(view.chain, ChainId::Evm(EvmNetwork::Base));
    }

    #[test]
    fn pending_transfer_has_no_confirmations() {
        let view = view_from_facts(EvmNetwork::Ethereum, facts(7), None, 0, None).expect("view");
        assert!(!view.confirmed);
        assert_eq!(view.confirmations(), 0);
    }

    #[test]
    fn contract_creation_is_invalid() {
        let mut creation = facts(0);
        creation.to = None;
        assert!(matches!(
            view_from_facts(EvmNetwork::Ethereum, creation, None, 0, None),
            Err(FetchError::Invalid(_))
        ));
    }
}
