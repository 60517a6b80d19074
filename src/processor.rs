use crate::chain::ChainProvider;
use crate::error::{EngineError, Result};
use crate::lists::{PriceListProvider, WhitelistProvider};
use crate::store::CirculationStore;
use crate::tracer::AddressTracer;
use crate::types::*;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// Runs the circulation trace over a deposit batch and partitions the batch
/// into eligible and rejected entries. A fresh tracer is built per batch so
/// processed-set state never leaks across runs.
pub struct EligibleMiningProcessor {
    chain: Arc<dyn ChainProvider>,
    store: Arc<dyn CirculationStore>,
    prices: Arc<dyn PriceListProvider>,
    whitelist_provider: Arc<dyn WhitelistProvider>,
    network_type: NetworkType,
    tracer_settings: TracerSettings,
}

impl EligibleMiningProcessor {
    pub fn new(
        chain: Arc<dyn ChainProvider>,
        store: Arc<dyn CirculationStore>,
        prices: Arc<dyn PriceListProvider>,
        whitelist_provider: Arc<dyn WhitelistProvider>,
        network_type: NetworkType,
        tracer_settings: TracerSettings,
    ) -> Self {
        Self {
            chain,
            store,
            prices,
            whitelist_provider,
            network_type,
            tracer_settings,
        }
    }

    /// Trace every unique deposit address and split the batch. Every input
    /// deposit lands in exactly one partition; anything else is a data
    /// integrity failure.
    pub async fn categorize_deposits(
        &self,
        deposits: Vec<MiningData>,
    ) -> Result<CategorizedDeposits> {
        if deposits.is_empty() {
            return Ok(CategorizedDeposits::default());
        }

        let unique_addresses: HashSet<String> = deposits
            .iter()
            .map(|deposit| normalize_address(&deposit.address))
            .collect();
        info!(
            deposits = deposits.len(),
            addresses = unique_addresses.len(),
            "categorizing deposit batch"
        );

        let tracer = AddressTracer::new(
            self.chain.clone(),
            self.store.clone(),
            self.prices.clone(),
            self.whitelist_provider.clone(),
            self.network_type,
            self.tracer_settings.clone(),
        )?;
        tracer.enqueue_addresses(&unique_addresses).await;
        tracer.initialize().await?;
        let outcome = tracer.process_queued_addresses().await?;

        let total = deposits.len();
        let mut categorized = CategorizedDeposits::default();
        for mut deposit in deposits {
            let address = normalize_address(&deposit.address);
            if outcome.non_circulation_addresses.contains(&address) {
                deposit.is_eligible = true;
                deposit.reject_reason = None;
                categorized.non_circulation_entries.push(deposit);
            } else if let Some(reason) = outcome.reject_reasons.get(&address) {
                deposit.is_eligible = false;
                deposit.reject_reason = Some(*reason);
                categorized.circulation_entries.push(deposit);
            }
        }

        let partitioned =
            categorized.non_circulation_entries.len() + categorized.circulation_entries.len();
        if partitioned != total {
            return Err(EngineError::DataIntegrity {
                context: "deposit categorization".to_string(),
                expected: total,
                actual: partitioned,
            });
        }

        categorized.new_circulation_addresses =
            outcome.new_circulation_addresses.into_iter().collect();
        categorized.new_circulation_addresses.sort();

        info!(
            eligible = categorized.non_circulation_entries.len(),
            rejected = categorized.circulation_entries.len(),
            new_circulating = categorized.new_circulation_addresses.len(),
            "✅ deposit batch categorized"
        );
        Ok(categorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCirculationStore;
    use crate::test_support::{at, deposit, eth_price_list, MockChainProvider};
    use async_trait::async_trait;

    struct StaticLists;

    #[async_trait]
    impl PriceListProvider for StaticLists {
        async fn fetch_token_list(&self) -> Result<Vec<Token>> {
            Ok(eth_price_list(2000.0))
        }
    }

    #[async_trait]
    impl WhitelistProvider for StaticLists {
        async fn fetch_address_lists(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    fn settings() -> TracerSettings {
        TracerSettings {
            max_depth: 4,
            depth_limits: vec![5, 3, 2, 1],
            max_concurrent_tasks: 3,
            significant_native_threshold: 1.0,
            hub_from_days_ago: 7,
            hub_unique_addresses: 30,
            hub_min_native_balance: "10000000000000000000".to_string(),
            liquidity_contract_address: "0xliquidity".to_string(),
            contract_deployed_block: 0,
            blocks_per_day: 100,
        }
    }

    fn processor(
        chain: Arc<MockChainProvider>,
        store: Arc<MemoryCirculationStore>,
    ) -> EligibleMiningProcessor {
        let lists = Arc::new(StaticLists);
        EligibleMiningProcessor::new(
            chain,
            store,
            lists.clone(),
            lists,
            NetworkType::Ethereum,
            settings(),
        )
    }

    #[tokio::test]
    async fn test_empty_batch_short_circuits() {
        let chain = Arc::new(MockChainProvider::new());
        let result = processor(chain, Arc::new(MemoryCirculationStore::new()))
            .categorize_deposits(Vec::new())
            .await
            .unwrap();

        assert!(result.non_circulation_entries.is_empty());
        assert!(result.circulation_entries.is_empty());
        assert!(result.new_circulation_addresses.is_empty());
    }

    #[tokio::test]
    async fn test_batch_is_partitioned_completely() {
        let chain = Arc::new(MockChainProvider::new());
        // The tainted miner is funded by a known circulating address.
        chain.add_incoming_transfers(
            "0xtainted",
            vec![MockChainProvider::external_transfer(
                "0xorigin", "0xtainted", 10, 5.0,
            )],
        );
        let store = Arc::new(MemoryCirculationStore::with_records(vec![
            CirculationRecord::confirmed("0xorigin"),
        ]));

        let deposits = vec![
            deposit("d1", "0xClean", "100000000000000000", at(10, 0), 100),
            deposit("d2", "0xTainted", "100000000000000000", at(10, 5), 101),
            deposit("d3", "0xclean", "100000000000000000", at(10, 10), 102),
        ];
        let result = processor(chain, store)
            .categorize_deposits(deposits)
            .await
            .unwrap();

        assert_eq!(result.non_circulation_entries.len(), 2);
        assert!(result
            .non_circulation_entries
            .iter()
            .all(|entry| entry.is_eligible && entry.reject_reason.is_none()));

        assert_eq!(result.circulation_entries.len(), 1);
        assert_eq!(
            result.circulation_entries[0].reject_reason,
            Some(RejectReason::InCirculation)
        );
        assert!(!result.circulation_entries[0].is_eligible);

        assert_eq!(result.new_circulation_addresses, vec!["0xtainted"]);
    }

    #[tokio::test]
    async fn test_already_known_address_is_rejected_without_tracing() {
        let chain = Arc::new(MockChainProvider::new());
        let store = Arc::new(MemoryCirculationStore::with_records(vec![
            CirculationRecord::confirmed("0xknown"),
        ]));

        let deposits = vec![deposit("d1", "0xKnown", "100000000000000000", at(9, 0), 90)];
        let result = processor(chain.clone(), store)
            .categorize_deposits(deposits)
            .await
            .unwrap();

        assert_eq!(result.circulation_entries.len(), 1);
        assert_eq!(
            result.circulation_entries[0].reject_reason,
            Some(RejectReason::AlreadyInCirculation)
        );
        // Known addresses are rejected by the store pre-filter, never traced.
        assert_eq!(chain.fetch_count("0xknown"), 0);
        assert!(result.new_circulation_addresses.is_empty());
    }
}
