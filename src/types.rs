use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";
pub const NATIVE_TOKEN_ID: &str = "ethereum";
pub const NATIVE_SYMBOL: &str = "ETH";
pub const NATIVE_DECIMALS: u32 = 18;

/// Lowercase-normalize a chain address. Address identity is case-insensitive
/// everywhere in this crate; the lowercase form is the canonical map/set key.
pub fn normalize_address(address: &str) -> String {
    address.to_ascii_lowercase()
}

/// Configuration for the reward engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub network: NetworkSettings,
    pub tracer: TracerSettings,
    pub reward: RewardSettings,
    pub allocation: AllocationSettings,
    pub storage: StorageSettings,
    pub job: JobSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    Ethereum,
    Base,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    pub network_type: NetworkType,
    pub environment: String,
    pub rpc_base_url: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracerSettings {
    pub max_depth: u32,
    /// Fan-out budget per depth, indexed by depth; deeper levels fall back to
    /// the last configured limit.
    pub depth_limits: Vec<usize>,
    pub max_concurrent_tasks: usize,
    /// Threshold in native-asset units. A sender is high-value when its
    /// aggregate USD value converted back to native units exceeds this.
    pub significant_native_threshold: f64,
    pub hub_from_days_ago: u64,
    pub hub_unique_addresses: usize,
    /// Minimum native balance (wei, decimal string) for hub classification.
    pub hub_min_native_balance: String,
    pub liquidity_contract_address: String,
    pub contract_deployed_block: u64,
    pub blocks_per_day: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardSettings {
    pub minutes_threshold: i64,
    pub required_similar_count: usize,
    /// Deposits before this cutoff are unconditionally case1.
    pub initial_case_cutoff: Option<DateTime<Utc>>,
    pub rush_period_start: DateTime<Utc>,
    pub rush_period_end: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationSettings {
    pub first_term_duration: u32,
    pub term_token_allocation: f64,
    pub short_term_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    pub base_url: String,
    pub bucket: String,
    pub token_prices_path: String,
    pub exchanges_path: String,
    pub defi_protocols_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSettings {
    pub deposit_batch_path: String,
    pub circulation_snapshot_path: String,
    pub report_path: String,
    pub term: u32,
    pub tracer_depth: u32,
}

/// One on-chain asset movement, as returned by the transfer history provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub from: String,
    pub to: Option<String>,
    pub block_number: u64,
    pub category: TransferCategory,
    pub asset: Option<String>,
    /// Native-unit value for external/native transfers.
    pub value: Option<f64>,
    pub raw_contract: Option<RawContract>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferCategory {
    Native,
    External,
    Internal,
    Erc20,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawContract {
    pub address: Option<String>,
    /// Hex-encoded raw token value.
    pub value: Option<String>,
    /// Hex-encoded token decimals.
    pub decimal: Option<String>,
}

/// Why an address was classified as circulating. Exactly one applies per
/// circulating node; absence means non-circulating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    AlreadyInCirculation,
    IntmaxLiquidityContract,
    InCirculation,
    ChildInCirculation,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            RejectReason::AlreadyInCirculation => "Address is already in db circulation.",
            RejectReason::IntmaxLiquidityContract => {
                "Liquidity contract address found in from addresses."
            }
            RejectReason::InCirculation => "Address is in circulation.",
            RejectReason::ChildInCirculation => "Child address is in circulation.",
        };
        write!(f, "{}", msg)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighValueSender {
    pub from_address: String,
    pub total_usd_value_sent: Decimal,
}

/// A node in the trace exploration tree, built depth-first. Created per trace
/// invocation and discarded after classification extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceNode {
    pub address: String,
    pub from_address_count: usize,
    pub transaction_count: usize,
    pub is_circulation: bool,
    pub rejected_reason: Option<RejectReason>,
    pub children: Vec<TraceNode>,
    pub high_value_sender: Option<HighValueSender>,
}

impl TraceNode {
    pub fn new(address: &str, high_value_sender: Option<HighValueSender>) -> Self {
        Self {
            address: address.to_string(),
            from_address_count: 0,
            transaction_count: 0,
            is_circulation: false,
            rejected_reason: None,
            children: Vec::new(),
            high_value_sender,
        }
    }

    /// Total descendant count, used for trace diagnostics.
    pub fn total_children(&self) -> usize {
        self.children.len()
            + self
                .children
                .iter()
                .map(TraceNode::total_children)
                .sum::<usize>()
    }
}

/// Persisted circulation entity, keyed by address. Merge-write only; an
/// address present in the store is permanently treated as tainted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CirculationRecord {
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub withdraw_block_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circulation_block_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub withdraw_confirmed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circulation_confirmed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl CirculationRecord {
    pub fn confirmed(address: &str) -> Self {
        Self {
            address: normalize_address(address),
            withdraw_block_number: None,
            circulation_block_number: None,
            withdraw_confirmed: None,
            circulation_confirmed: Some(true),
            created_at: Some(Utc::now()),
        }
    }
}

/// Discrete reward tier controlling the short/long-term multipliers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardCase {
    Case1,
    Case2,
    Case3,
    Case4,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardPair {
    pub short_term_reward: f64,
    pub long_term_reward: f64,
}

impl RewardCase {
    /// The fixed reward multiplier table; total over all variants.
    pub fn rewards(self) -> RewardPair {
        match self {
            RewardCase::Case1 => RewardPair {
                short_term_reward: 1.0,
                long_term_reward: 1.0,
            },
            RewardCase::Case2 => RewardPair {
                short_term_reward: 1.0,
                long_term_reward: 0.0,
            },
            RewardCase::Case3 => RewardPair {
                short_term_reward: 0.1,
                long_term_reward: 0.0,
            },
            RewardCase::Case4 => RewardPair {
                short_term_reward: 0.0,
                long_term_reward: 0.0,
            },
        }
    }

    pub fn multiplier(self, axis: AllocationAxis) -> f64 {
        let rewards = self.rewards();
        match axis {
            AllocationAxis::Short => rewards.short_term_reward,
            AllocationAxis::Long => rewards.long_term_reward,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationAxis {
    Short,
    Long,
}

/// Per-axis reward tiers for one deposit. The two axes can diverge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardCaseAssignment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_term: Option<RewardCase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub long_term: Option<RewardCase>,
}

/// One deposit's full record. Created at registration, updated by the
/// circulation pass and the reward/allocation pass. Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiningData {
    pub deposit_id: String,
    pub deposit_hash: String,
    pub deposited_at: DateTime<Utc>,
    pub block_number: u64,
    pub address: String,
    /// Exact deposited amount in wei, as a decimal string.
    pub amount: String,
    pub term: u32,
    pub points: f64,
    pub is_eligible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<RejectReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_term_allocation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub long_term_allocation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward_case: Option<RewardCaseAssignment>,
}

/// Token price list entry, as published to external storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub id: String,
    pub symbol: String,
    pub price: f64,
    pub contract_address: String,
    pub base_contract_address: String,
    pub decimals: u32,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BlockInfo {
    pub number: u64,
    pub timestamp: i64,
}

/// Aggregates returned from one trace run over the whole queue.
#[derive(Debug, Default)]
pub struct TraceOutcome {
    pub non_circulation_addresses: HashSet<String>,
    pub new_circulation_addresses: HashSet<String>,
    pub reject_reasons: HashMap<String, RejectReason>,
    pub trace_results: Vec<TraceNode>,
}

/// Deposit batch partitioned by the circulation pass.
#[derive(Debug, Default)]
pub struct CategorizedDeposits {
    pub non_circulation_entries: Vec<MiningData>,
    pub circulation_entries: Vec<MiningData>,
    pub new_circulation_addresses: Vec<String>,
}

pub fn default_rush_period_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 11, 14, 4, 48, 0).unwrap()
}

pub fn default_rush_period_end() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 11, 14, 15, 32, 0).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_address() {
        assert_eq!(
            normalize_address("0xABCDef0123456789abcdef0123456789ABCDEF01"),
            "0xabcdef0123456789abcdef0123456789abcdef01"
        );
    }

    #[test]
    fn test_reward_table_is_total() {
        assert_eq!(RewardCase::Case1.multiplier(AllocationAxis::Short), 1.0);
        assert_eq!(RewardCase::Case1.multiplier(AllocationAxis::Long), 1.0);
        assert_eq!(RewardCase::Case2.multiplier(AllocationAxis::Long), 0.0);
        assert_eq!(RewardCase::Case3.multiplier(AllocationAxis::Short), 0.1);
        assert_eq!(RewardCase::Case4.multiplier(AllocationAxis::Short), 0.0);
    }

    #[test]
    fn test_trace_node_total_children() {
        let mut root = TraceNode::new("0xroot", None);
        let mut child = TraceNode::new("0xchild", None);
        child.children.push(TraceNode::new("0xgrandchild", None));
        root.children.push(child);
        root.children.push(TraceNode::new("0xleaf", None));

        assert_eq!(root.total_children(), 3);
    }

    #[test]
    fn test_reward_case_serde_keys() {
        let json = serde_json::to_string(&RewardCase::Case2).unwrap();
        assert_eq!(json, "\"case2\"");
        let back: RewardCase = serde_json::from_str("\"case3\"").unwrap();
        assert_eq!(back, RewardCase::Case3);
    }
}
