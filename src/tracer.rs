use crate::chain::{ChainProvider, TransferQuery};
use crate::error::{EngineError, Result};
use crate::lists::{PriceListProvider, WhitelistProvider};
use crate::queue::TraceQueue;
use crate::ranking::{sort_transfers_by_market_value, RankedSender};
use crate::store::CirculationStore;
use crate::types::*;
use futures::future::{join_all, BoxFuture};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

/// Recursive circulation tracer. Explores the incoming-transfer graph of each
/// queued address depth-first, marking an address as circulating as soon as
/// any significant funding path reaches a known-circulating address.
///
/// Shared mutable state (processed set, whitelist, price list) sits behind
/// async locks so concurrent root traces stay consistent.
pub struct AddressTracer {
    chain: Arc<dyn ChainProvider>,
    store: Arc<dyn CirculationStore>,
    prices: Arc<dyn PriceListProvider>,
    whitelist_provider: Arc<dyn WhitelistProvider>,
    network_type: NetworkType,
    settings: TracerSettings,
    hub_min_native_balance: u128,
    liquidity_contract: String,
    queue: Mutex<TraceQueue<String>>,
    processed: RwLock<HashSet<String>>,
    whitelist: RwLock<HashSet<String>>,
    token_price_list: RwLock<Vec<Token>>,
    current_block_number: RwLock<u64>,
}

impl AddressTracer {
    pub fn new(
        chain: Arc<dyn ChainProvider>,
        store: Arc<dyn CirculationStore>,
        prices: Arc<dyn PriceListProvider>,
        whitelist_provider: Arc<dyn WhitelistProvider>,
        network_type: NetworkType,
        settings: TracerSettings,
    ) -> Result<Self> {
        let hub_min_native_balance = settings
            .hub_min_native_balance
            .parse::<u128>()
            .map_err(|_| {
                EngineError::InvalidAmount(format!(
                    "hub_min_native_balance is not a wei amount: {}",
                    settings.hub_min_native_balance
                ))
            })?;
        let liquidity_contract = normalize_address(&settings.liquidity_contract_address);

        Ok(Self {
            chain,
            store,
            prices,
            whitelist_provider,
            network_type,
            settings,
            hub_min_native_balance,
            liquidity_contract,
            queue: Mutex::new(TraceQueue::new()),
            processed: RwLock::new(HashSet::new()),
            whitelist: RwLock::new(HashSet::new()),
            token_price_list: RwLock::new(Vec::new()),
            current_block_number: RwLock::new(0),
        })
    }

    pub async fn enqueue_addresses<I>(&self, addresses: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut queue = self.queue.lock().await;
        queue.enqueue_many(
            addresses
                .into_iter()
                .map(|address| normalize_address(address.as_ref())),
        );
    }

    /// Load the token price list, the whitelist and the chain head. All three
    /// must succeed before any trace starts.
    pub async fn initialize(&self) -> Result<()> {
        let (tokens, whitelist, head) = tokio::try_join!(
            self.prices.fetch_token_list(),
            self.whitelist_provider.fetch_address_lists(),
            self.chain.get_latest_block(),
        )?;

        info!(
            tokens = tokens.len(),
            whitelisted = whitelist.len(),
            head_block = head.number,
            "🔍 tracer initialized"
        );

        *self.token_price_list.write().await = tokens;
        *self.whitelist.write().await = whitelist
            .iter()
            .map(|address| normalize_address(address))
            .collect();
        *self.current_block_number.write().await = head.number;
        Ok(())
    }

    /// Drain the queue through a bounded pool of concurrent root traces.
    ///
    /// Addresses already present in the circulation store are rejected up
    /// front without a single chain request. A failed root trace is logged
    /// and skipped; the rest of the batch still completes.
    pub async fn process_queued_addresses(&self) -> Result<TraceOutcome> {
        let queued: Vec<String> = self.queue.lock().await.iter().cloned().collect();
        let known = self.store.fetch_in_circulations(&queued).await?;
        let existing: HashSet<String> = known
            .into_iter()
            .map(|record| normalize_address(&record.address))
            .collect();

        info!(
            queued = queued.len(),
            already_known = existing.len(),
            "⛏️ starting circulation trace"
        );

        let mut outcome = TraceOutcome::default();
        let mut running: FuturesUnordered<BoxFuture<'_, (String, Result<TraceNode>)>> =
            FuturesUnordered::new();

        loop {
            while running.len() < self.settings.max_concurrent_tasks {
                let next = self.queue.lock().await.dequeue();
                let Some(address) = next else {
                    break;
                };
                if existing.contains(&address) {
                    debug!(address, "address already in circulation, skipping trace");
                    outcome
                        .reject_reasons
                        .insert(address, RejectReason::AlreadyInCirculation);
                    continue;
                }
                running.push(Box::pin(async move {
                    let node = self.trace_address(address.clone(), 0, None).await;
                    (address, node)
                }));
            }

            let Some((address, result)) = running.next().await else {
                break;
            };
            match result {
                Ok(node) => {
                    debug!(
                        address,
                        circulating = node.is_circulation,
                        descendants = node.total_children(),
                        "trace complete"
                    );
                    if node.is_circulation {
                        outcome.new_circulation_addresses.insert(address.clone());
                        if let Some(reason) = node.rejected_reason {
                            outcome.reject_reasons.insert(address, reason);
                        }
                    } else {
                        outcome.non_circulation_addresses.insert(address);
                    }
                    for child in &node.children {
                        collect_circulating(
                            child,
                            &mut outcome.new_circulation_addresses,
                            &mut outcome.reject_reasons,
                        );
                    }
                    outcome.trace_results.push(node);
                }
                Err(e) => {
                    error!(address, "trace failed: {}", e);
                }
            }
        }

        info!(
            clean = outcome.non_circulation_addresses.len(),
            circulating = outcome.new_circulation_addresses.len(),
            "✅ circulation trace finished"
        );
        Ok(outcome)
    }

    /// One node of the exploration. Depth-bounded; a node at the depth limit
    /// is a clean leaf.
    fn trace_address(
        &self,
        address: String,
        depth: u32,
        high_value_sender: Option<HighValueSender>,
    ) -> BoxFuture<'_, Result<TraceNode>> {
        Box::pin(async move {
            let address = normalize_address(&address);
            let mut node = TraceNode::new(&address, high_value_sender);
            if depth >= self.settings.max_depth {
                return Ok(node);
            }
            self.processed.write().await.insert(address.clone());

            let query = TransferQuery {
                from_block: self.settings.contract_deployed_block,
                to_address: Some(address.clone()),
                ..Default::default()
            };
            let transfers = self.chain.get_asset_transfers(&query).await.map_err(|e| {
                EngineError::TraceFailed {
                    address: address.clone(),
                    message: e.to_string(),
                }
            })?;

            // Raw transfer count, before mint rows are dropped.
            node.transaction_count = transfers.len();
            let filtered: Vec<Transfer> = transfers
                .into_iter()
                .filter(|transfer| normalize_address(&transfer.from) != ZERO_ADDRESS)
                .map(|mut transfer| {
                    transfer.from = normalize_address(&transfer.from);
                    transfer
                })
                .collect();
            node.from_address_count = filtered
                .iter()
                .map(|transfer| transfer.from.as_str())
                .collect::<HashSet<_>>()
                .len();

            // A transfer straight from the liquidity contract is a hard
            // circulation signal; no recursion needed.
            if !self.liquidity_contract.is_empty()
                && filtered
                    .iter()
                    .any(|transfer| transfer.from == self.liquidity_contract)
            {
                node.is_circulation = true;
                node.rejected_reason = Some(RejectReason::IntmaxLiquidityContract);
                return Ok(node);
            }

            let (selected, ranked) = self.high_value_senders(&filtered, depth).await?;

            let above_threshold: Vec<String> = ranked
                .iter()
                .filter(|sender| sender.is_above_threshold)
                .map(|sender| sender.from_address.clone())
                .collect();
            if !above_threshold.is_empty() && self.store.any_address_exists(&above_threshold).await?
            {
                node.is_circulation = true;
                node.rejected_reason = Some(RejectReason::InCirculation);
                return Ok(node);
            }

            let mut pending = Vec::new();
            {
                // Claim children under one guard; two parents racing on the
                // same sender must not both launch a trace of it.
                let mut processed = self.processed.write().await;
                for sender in selected {
                    if !processed.insert(sender.from_address.clone()) {
                        continue;
                    }
                    let funding = HighValueSender {
                        from_address: sender.from_address.clone(),
                        total_usd_value_sent: sender.total_usd_value_sent,
                    };
                    pending.push(self.trace_address(
                        sender.from_address,
                        depth + 1,
                        Some(funding),
                    ));
                }
            }

            for child in join_all(pending).await {
                let child = child?;
                let circulating = child.is_circulation;
                node.children.push(child);
                if circulating {
                    node.is_circulation = true;
                    node.rejected_reason = Some(RejectReason::ChildInCirculation);
                    break;
                }
            }
            Ok(node)
        })
    }

    /// Rank the senders of the given transfers and pick the ones worth
    /// recursing into: above the significance threshold, not whitelisted, not
    /// already visited, not a hub, capped by the per-depth fan-out budget.
    /// Returns the selection together with the full ranking.
    async fn high_value_senders(
        &self,
        transfers: &[Transfer],
        depth: u32,
    ) -> Result<(Vec<RankedSender>, Vec<RankedSender>)> {
        let candidates: Vec<Transfer> = {
            let whitelist = self.whitelist.read().await;
            let processed = self.processed.read().await;
            transfers
                .iter()
                .filter(|transfer| {
                    !whitelist.contains(&transfer.from) && !processed.contains(&transfer.from)
                })
                .cloned()
                .collect()
        };

        let ranked = {
            let prices = self.token_price_list.read().await;
            sort_transfers_by_market_value(
                &candidates,
                &prices,
                self.network_type,
                self.settings.significant_native_threshold,
            )
        };

        let limit = self.address_limit_for_depth(depth);
        let mut selected: Vec<RankedSender> = Vec::new();
        for sender in &ranked {
            if selected.len() >= limit {
                break;
            }
            if !sender.is_above_threshold {
                continue;
            }
            if self.is_hub_address(&sender.from_address).await? {
                debug!(address = %sender.from_address, "hub address, not recursing");
                continue;
            }
            selected.push(sender.clone());
        }
        Ok((selected, ranked))
    }

    fn address_limit_for_depth(&self, depth: u32) -> usize {
        self.settings
            .depth_limits
            .get(depth as usize)
            .or_else(|| self.settings.depth_limits.last())
            .copied()
            .unwrap_or(1)
    }

    /// Hub heuristic: an address that both receives from and sends to many
    /// distinct counterparties in the recent block window while holding a
    /// large native balance is treated as infrastructure, not a funding
    /// source worth exploring.
    async fn is_hub_address(&self, address: &str) -> Result<bool> {
        let window = self.settings.hub_from_days_ago * self.settings.blocks_per_day;
        let head = *self.current_block_number.read().await;
        let from_block = head.saturating_sub(window);

        let outgoing_query = TransferQuery {
            from_block,
            from_address: Some(address.to_string()),
            ..Default::default()
        };
        let incoming_query = TransferQuery {
            from_block,
            to_address: Some(address.to_string()),
            ..Default::default()
        };
        let (outgoing, incoming) = tokio::try_join!(
            self.chain.get_asset_transfers(&outgoing_query),
            self.chain.get_asset_transfers(&incoming_query),
        )?;

        let recipients: HashSet<String> = outgoing
            .iter()
            .filter_map(|transfer| transfer.to.as_deref().map(normalize_address))
            .collect();
        let senders: HashSet<String> = incoming
            .iter()
            .map(|transfer| normalize_address(&transfer.from))
            .collect();
        let balance = self.chain.get_balance(address).await?;

        Ok(recipients.len() > self.settings.hub_unique_addresses
            && senders.len() > self.settings.hub_unique_addresses
            && balance > self.hub_min_native_balance)
    }
}

fn collect_circulating(
    node: &TraceNode,
    circulating: &mut HashSet<String>,
    reasons: &mut HashMap<String, RejectReason>,
) {
    if node.is_circulation {
        let address = normalize_address(&node.address);
        if let Some(reason) = node.rejected_reason {
            reasons.insert(address.clone(), reason);
        }
        circulating.insert(address);
    }
    for child in &node.children {
        collect_circulating(child, circulating, reasons);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCirculationStore;
    use crate::test_support::{eth_price_list, MockChainProvider};
    use async_trait::async_trait;

    struct StaticLists {
        tokens: Vec<Token>,
        addresses: Vec<String>,
    }

    #[async_trait]
    impl PriceListProvider for StaticLists {
        async fn fetch_token_list(&self) -> Result<Vec<Token>> {
            Ok(self.tokens.clone())
        }
    }

    #[async_trait]
    impl WhitelistProvider for StaticLists {
        async fn fetch_address_lists(&self) -> Result<Vec<String>> {
            Ok(self.addresses.clone())
        }
    }

    fn settings() -> TracerSettings {
        TracerSettings {
            max_depth: 4,
            depth_limits: vec![5, 3, 2, 1],
            max_concurrent_tasks: 3,
            significant_native_threshold: 1.0,
            hub_from_days_ago: 7,
            hub_unique_addresses: 2,
            hub_min_native_balance: "1000000000000000000".to_string(),
            liquidity_contract_address: "0xliquidity".to_string(),
            contract_deployed_block: 0,
            blocks_per_day: 100,
        }
    }

    fn tracer_with(
        chain: Arc<MockChainProvider>,
        store: Arc<MemoryCirculationStore>,
        settings: TracerSettings,
        whitelist: Vec<String>,
    ) -> AddressTracer {
        let lists = Arc::new(StaticLists {
            tokens: eth_price_list(2000.0),
            addresses: whitelist,
        });
        AddressTracer::new(
            chain,
            store,
            lists.clone(),
            lists,
            NetworkType::Ethereum,
            settings,
        )
        .unwrap()
    }

    async fn run(tracer: &AddressTracer, roots: &[&str]) -> TraceOutcome {
        tracer.enqueue_addresses(roots.iter().copied()).await;
        tracer.initialize().await.unwrap();
        tracer.process_queued_addresses().await.unwrap()
    }

    #[tokio::test]
    async fn test_address_with_no_significant_senders_is_clean() {
        let chain = Arc::new(MockChainProvider::new());
        chain.add_incoming_transfers(
            "0xminer",
            vec![MockChainProvider::external_transfer(
                "0xsmall", "0xminer", 10, 0.001,
            )],
        );
        let tracer = tracer_with(
            chain,
            Arc::new(MemoryCirculationStore::new()),
            settings(),
            vec![],
        );

        let outcome = run(&tracer, &["0xMiner"]).await;
        assert!(outcome.non_circulation_addresses.contains("0xminer"));
        assert!(outcome.new_circulation_addresses.is_empty());
        assert_eq!(outcome.trace_results.len(), 1);
        assert_eq!(outcome.trace_results[0].transaction_count, 1);
    }

    #[tokio::test]
    async fn test_known_circulating_root_skips_all_chain_requests() {
        let chain = Arc::new(MockChainProvider::new());
        let store = Arc::new(MemoryCirculationStore::with_records(vec![
            CirculationRecord::confirmed("0xtainted"),
        ]));
        let tracer = tracer_with(chain.clone(), store, settings(), vec![]);

        let outcome = run(&tracer, &["0xTainted"]).await;
        assert_eq!(
            outcome.reject_reasons.get("0xtainted"),
            Some(&RejectReason::AlreadyInCirculation)
        );
        assert!(outcome.non_circulation_addresses.is_empty());
        assert_eq!(chain.fetch_count("0xtainted"), 0);
        assert!(outcome.trace_results.is_empty());
    }

    #[tokio::test]
    async fn test_significant_sender_in_store_marks_root_circulating() {
        let chain = Arc::new(MockChainProvider::new());
        chain.add_incoming_transfers(
            "0xminer",
            vec![MockChainProvider::external_transfer(
                "0xfunder", "0xminer", 10, 5.0,
            )],
        );
        let store = Arc::new(MemoryCirculationStore::with_records(vec![
            CirculationRecord::confirmed("0xfunder"),
        ]));
        let tracer = tracer_with(chain, store, settings(), vec![]);

        let outcome = run(&tracer, &["0xminer"]).await;
        assert!(outcome.new_circulation_addresses.contains("0xminer"));
        assert_eq!(
            outcome.reject_reasons.get("0xminer"),
            Some(&RejectReason::InCirculation)
        );
    }

    #[tokio::test]
    async fn test_circulation_propagates_from_grandparent() {
        let chain = Arc::new(MockChainProvider::new());
        // miner <- middleman <- origin, all above the 1 ETH threshold.
        chain.add_incoming_transfers(
            "0xminer",
            vec![MockChainProvider::external_transfer(
                "0xmiddleman",
                "0xminer",
                10,
                5.0,
            )],
        );
        chain.add_incoming_transfers(
            "0xmiddleman",
            vec![MockChainProvider::external_transfer(
                "0xorigin",
                "0xmiddleman",
                5,
                5.0,
            )],
        );
        let store = Arc::new(MemoryCirculationStore::with_records(vec![
            CirculationRecord::confirmed("0xorigin"),
        ]));
        let tracer = tracer_with(chain, store, settings(), vec![]);

        let outcome = run(&tracer, &["0xminer"]).await;
        assert!(outcome.new_circulation_addresses.contains("0xminer"));
        assert!(outcome.new_circulation_addresses.contains("0xmiddleman"));
        assert_eq!(
            outcome.reject_reasons.get("0xminer"),
            Some(&RejectReason::ChildInCirculation)
        );
        assert_eq!(
            outcome.reject_reasons.get("0xmiddleman"),
            Some(&RejectReason::InCirculation)
        );
    }

    #[tokio::test]
    async fn test_depth_limit_produces_clean_leaf() {
        let chain = Arc::new(MockChainProvider::new());
        chain.add_incoming_transfers(
            "0xminer",
            vec![MockChainProvider::external_transfer(
                "0xfunder", "0xminer", 10, 5.0,
            )],
        );
        // The funder would be circulating if explored.
        chain.add_incoming_transfers(
            "0xfunder",
            vec![MockChainProvider::external_transfer(
                "0xorigin", "0xfunder", 5, 5.0,
            )],
        );
        let store = Arc::new(MemoryCirculationStore::with_records(vec![
            CirculationRecord::confirmed("0xorigin"),
        ]));

        let mut shallow = settings();
        shallow.max_depth = 1;
        let tracer = tracer_with(chain.clone(), store, shallow, vec![]);

        let outcome = run(&tracer, &["0xminer"]).await;
        assert!(outcome.non_circulation_addresses.contains("0xminer"));
        // The child leaf never issued a transfer fetch of its own.
        assert_eq!(chain.fetch_count("0xfunder"), 2); // hub check only
        assert_eq!(outcome.trace_results[0].children.len(), 1);
        assert!(!outcome.trace_results[0].children[0].is_circulation);
    }

    #[tokio::test]
    async fn test_transfer_from_liquidity_contract_is_terminal_circulation() {
        let chain = Arc::new(MockChainProvider::new());
        chain.add_incoming_transfers(
            "0xminer",
            vec![MockChainProvider::external_transfer(
                "0xLiquidity",
                "0xminer",
                10,
                0.001,
            )],
        );
        let tracer = tracer_with(
            chain,
            Arc::new(MemoryCirculationStore::new()),
            settings(),
            vec![],
        );

        let outcome = run(&tracer, &["0xminer"]).await;
        assert!(outcome.new_circulation_addresses.contains("0xminer"));
        assert_eq!(
            outcome.reject_reasons.get("0xminer"),
            Some(&RejectReason::IntmaxLiquidityContract)
        );
        assert!(outcome.trace_results[0].children.is_empty());
    }

    #[tokio::test]
    async fn test_shared_sender_is_traced_by_only_one_parent() {
        let chain = Arc::new(MockChainProvider::new());
        // Both roots are funded by the same sender and traced concurrently.
        chain.add_incoming_transfers(
            "0xroot1",
            vec![MockChainProvider::external_transfer(
                "0xshared", "0xroot1", 10, 5.0,
            )],
        );
        chain.add_incoming_transfers(
            "0xroot2",
            vec![MockChainProvider::external_transfer(
                "0xshared", "0xroot2", 11, 5.0,
            )],
        );
        let tracer = tracer_with(
            chain,
            Arc::new(MemoryCirculationStore::new()),
            settings(),
            vec![],
        );

        let outcome = run(&tracer, &["0xroot1", "0xroot2"]).await;
        assert!(outcome.non_circulation_addresses.contains("0xroot1"));
        assert!(outcome.non_circulation_addresses.contains("0xroot2"));

        let shared_children: usize = outcome
            .trace_results
            .iter()
            .map(|root| {
                root.children
                    .iter()
                    .filter(|child| child.address == "0xshared")
                    .count()
            })
            .sum();
        assert_eq!(shared_children, 1);
    }

    #[tokio::test]
    async fn test_whitelisted_sender_is_never_explored() {
        let chain = Arc::new(MockChainProvider::new());
        chain.add_incoming_transfers(
            "0xminer",
            vec![MockChainProvider::external_transfer(
                "0xexchange",
                "0xminer",
                10,
                5.0,
            )],
        );
        // Even a store hit on the whitelisted sender must not taint the root.
        let store = Arc::new(MemoryCirculationStore::with_records(vec![
            CirculationRecord::confirmed("0xexchange"),
        ]));
        let tracer = tracer_with(
            chain.clone(),
            store,
            settings(),
            vec!["0xExchange".to_string()],
        );

        let outcome = run(&tracer, &["0xminer"]).await;
        assert!(outcome.non_circulation_addresses.contains("0xminer"));
        assert_eq!(chain.fetch_count("0xexchange"), 0);
    }

    #[tokio::test]
    async fn test_hub_address_is_not_recursed_into() {
        let chain = Arc::new(MockChainProvider::new());
        chain.add_incoming_transfers(
            "0xminer",
            vec![MockChainProvider::external_transfer(
                "0xhub", "0xminer", 990_000, 5.0,
            )],
        );
        // Hub profile: more than 2 unique counterparties both ways and a
        // balance above the 1 ETH minimum.
        chain.add_incoming_transfers(
            "0xhub",
            vec![
                MockChainProvider::external_transfer("0xa", "0xhub", 999_500, 1.0),
                MockChainProvider::external_transfer("0xb", "0xhub", 999_501, 1.0),
                MockChainProvider::external_transfer("0xc", "0xhub", 999_502, 1.0),
            ],
        );
        chain.add_outgoing_transfers(
            "0xhub",
            vec![
                MockChainProvider::external_transfer("0xhub", "0xd", 999_500, 1.0),
                MockChainProvider::external_transfer("0xhub", "0xe", 999_501, 1.0),
                MockChainProvider::external_transfer("0xhub", "0xf", 999_502, 1.0),
            ],
        );
        chain.set_balance("0xhub", 2_000_000_000_000_000_000);

        let tracer = tracer_with(
            chain,
            Arc::new(MemoryCirculationStore::new()),
            settings(),
            vec![],
        );
        let outcome = run(&tracer, &["0xminer"]).await;
        assert!(outcome.non_circulation_addresses.contains("0xminer"));
        assert!(outcome.trace_results[0].children.is_empty());
    }

    #[tokio::test]
    async fn test_busy_address_without_balance_is_still_explored() {
        let chain = Arc::new(MockChainProvider::new());
        chain.add_incoming_transfers(
            "0xminer",
            vec![MockChainProvider::external_transfer(
                "0xbusy", "0xminer", 990_000, 5.0,
            )],
        );
        // Counterparty profile of a hub, but the balance stays below the
        // 1 ETH minimum, so all three conditions are not met.
        chain.add_incoming_transfers(
            "0xbusy",
            vec![
                MockChainProvider::external_transfer("0xa", "0xbusy", 999_500, 1.0),
                MockChainProvider::external_transfer("0xb", "0xbusy", 999_501, 1.0),
                MockChainProvider::external_transfer("0xc", "0xbusy", 999_502, 1.0),
            ],
        );
        chain.add_outgoing_transfers(
            "0xbusy",
            vec![
                MockChainProvider::external_transfer("0xbusy", "0xd", 999_500, 1.0),
                MockChainProvider::external_transfer("0xbusy", "0xe", 999_501, 1.0),
                MockChainProvider::external_transfer("0xbusy", "0xf", 999_502, 1.0),
            ],
        );

        let tracer = tracer_with(
            chain,
            Arc::new(MemoryCirculationStore::new()),
            settings(),
            vec![],
        );
        let outcome = run(&tracer, &["0xminer"]).await;
        assert_eq!(outcome.trace_results[0].children.len(), 1);
        assert_eq!(outcome.trace_results[0].children[0].address, "0xbusy");
    }

    #[tokio::test]
    async fn test_depth_fan_out_budget_is_enforced() {
        let chain = Arc::new(MockChainProvider::new());
        let senders: Vec<Transfer> = (0..8)
            .map(|i| {
                MockChainProvider::external_transfer(&format!("0xsender{}", i), "0xminer", 10, 5.0)
            })
            .collect();
        chain.add_incoming_transfers("0xminer", senders);

        let mut narrow = settings();
        narrow.depth_limits = vec![2, 1];
        narrow.max_depth = 2;
        let tracer = tracer_with(
            chain,
            Arc::new(MemoryCirculationStore::new()),
            narrow,
            vec![],
        );

        let outcome = run(&tracer, &["0xminer"]).await;
        assert_eq!(outcome.trace_results[0].children.len(), 2);
    }
}
