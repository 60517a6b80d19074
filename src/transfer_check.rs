use crate::chain::{ChainProvider, TransferQuery};
use crate::error::Result;
use crate::ranking::{sort_transfers_by_market_value, RankedSender};
use crate::types::*;
use std::sync::Arc;
use tracing::debug;

/// Looks up and ranks the outgoing transfers of a single address, used by the
/// reward classifier to measure funds flowing back out of a miner.
pub struct TransferCheck {
    chain: Arc<dyn ChainProvider>,
    network_type: NetworkType,
    significant_native_threshold: f64,
}

impl TransferCheck {
    pub fn new(
        chain: Arc<dyn ChainProvider>,
        network_type: NetworkType,
        significant_native_threshold: f64,
    ) -> Self {
        Self {
            chain,
            network_type,
            significant_native_threshold,
        }
    }

    /// Outgoing transfers from `address` since `from_block`, ranked by USD
    /// value per recipient-agnostic sender aggregation. Zero-address rows are
    /// dropped before ranking.
    pub async fn sorted_outgoing_transfers(
        &self,
        address: &str,
        from_block: u64,
        token_price_list: &[Token],
    ) -> Result<Vec<RankedSender>> {
        let query = TransferQuery {
            from_block,
            from_address: Some(normalize_address(address)),
            ..Default::default()
        };
        let transfers = self.chain.get_asset_transfers(&query).await?;

        let filtered: Vec<Transfer> = transfers
            .into_iter()
            .filter(|transfer| normalize_address(&transfer.from) != ZERO_ADDRESS)
            .map(|mut transfer| {
                transfer.from = normalize_address(&transfer.from);
                transfer
            })
            .collect();
        debug!(
            address,
            from_block,
            count = filtered.len(),
            "ranked outgoing transfers"
        );

        Ok(sort_transfers_by_market_value(
            &filtered,
            token_price_list,
            self.network_type,
            self.significant_native_threshold,
        ))
    }
}
