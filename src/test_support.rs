use crate::chain::{ChainProvider, TransferQuery};
use crate::error::{EngineError, Result};
use crate::types::*;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// Scripted chain provider for tracer and classifier tests. Transfers are
/// registered per queried address; every fetch is counted so tests can assert
/// on short-circuit behavior.
#[derive(Default)]
pub struct MockChainProvider {
    incoming: Mutex<HashMap<String, Vec<Transfer>>>,
    outgoing: Mutex<HashMap<String, Vec<Transfer>>>,
    balances: Mutex<HashMap<String, u128>>,
    blocks: Mutex<HashMap<u64, BlockInfo>>,
    head: Mutex<BlockInfo>,
    fetch_counts: Mutex<HashMap<String, usize>>,
}

impl MockChainProvider {
    pub fn new() -> Self {
        Self {
            head: Mutex::new(BlockInfo {
                number: 1_000_000,
                timestamp: Utc
                    .with_ymd_and_hms(2024, 12, 1, 0, 0, 0)
                    .unwrap()
                    .timestamp(),
            }),
            ..Default::default()
        }
    }

    pub fn add_incoming_transfers(&self, to_address: &str, transfers: Vec<Transfer>) {
        self.incoming
            .lock()
            .unwrap()
            .entry(normalize_address(to_address))
            .or_default()
            .extend(transfers);
    }

    pub fn add_outgoing_transfers(&self, from_address: &str, transfers: Vec<Transfer>) {
        self.outgoing
            .lock()
            .unwrap()
            .entry(normalize_address(from_address))
            .or_default()
            .extend(transfers);
    }

    pub fn set_balance(&self, address: &str, wei: u128) {
        self.balances
            .lock()
            .unwrap()
            .insert(normalize_address(address), wei);
    }

    pub fn set_head_block(&self, number: u64) {
        self.head.lock().unwrap().number = number;
    }

    pub fn add_block(&self, number: u64, timestamp: i64) {
        self.blocks
            .lock()
            .unwrap()
            .insert(number, BlockInfo { number, timestamp });
    }

    /// Number of transfer fetches issued for the given address, either side.
    pub fn fetch_count(&self, address: &str) -> usize {
        self.fetch_counts
            .lock()
            .unwrap()
            .get(&normalize_address(address))
            .copied()
            .unwrap_or(0)
    }

    pub fn external_transfer(from: &str, to: &str, block_number: u64, value: f64) -> Transfer {
        Transfer {
            from: from.to_string(),
            to: Some(to.to_string()),
            block_number,
            category: TransferCategory::External,
            asset: Some(NATIVE_SYMBOL.to_string()),
            value: Some(value),
            raw_contract: None,
        }
    }

    fn record_fetch(&self, address: &str) {
        *self
            .fetch_counts
            .lock()
            .unwrap()
            .entry(normalize_address(address))
            .or_default() += 1;
    }
}

#[async_trait]
impl ChainProvider for MockChainProvider {
    async fn get_asset_transfers(&self, query: &TransferQuery) -> Result<Vec<Transfer>> {
        if let Some(from_address) = &query.from_address {
            self.record_fetch(from_address);
            let outgoing = self.outgoing.lock().unwrap();
            return Ok(outgoing
                .get(&normalize_address(from_address))
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .filter(|transfer| transfer.block_number >= query.from_block)
                .collect());
        }
        if let Some(to_address) = &query.to_address {
            self.record_fetch(to_address);
            let incoming = self.incoming.lock().unwrap();
            return Ok(incoming
                .get(&normalize_address(to_address))
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .filter(|transfer| transfer.block_number >= query.from_block)
                .collect());
        }
        Err(EngineError::Rpc("query missing address filter".to_string()))
    }

    async fn get_balance(&self, address: &str) -> Result<u128> {
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(&normalize_address(address))
            .copied()
            .unwrap_or(0))
    }

    async fn get_latest_block(&self) -> Result<BlockInfo> {
        Ok(*self.head.lock().unwrap())
    }

    async fn get_block(&self, number: u64) -> Result<BlockInfo> {
        self.blocks
            .lock()
            .unwrap()
            .get(&number)
            .copied()
            .ok_or_else(|| EngineError::Rpc(format!("unknown block {}", number)))
    }
}

pub fn eth_price_list(price: f64) -> Vec<Token> {
    vec![Token {
        id: NATIVE_TOKEN_ID.to_string(),
        symbol: NATIVE_SYMBOL.to_string(),
        price,
        contract_address: String::new(),
        base_contract_address: String::new(),
        decimals: NATIVE_DECIMALS,
    }]
}

pub fn deposit(
    deposit_id: &str,
    address: &str,
    amount_wei: &str,
    deposited_at: DateTime<Utc>,
    block_number: u64,
) -> MiningData {
    MiningData {
        deposit_id: deposit_id.to_string(),
        deposit_hash: format!("0xhash-{}", deposit_id),
        deposited_at,
        block_number,
        address: address.to_string(),
        amount: amount_wei.to_string(),
        term: 1,
        points: 1.0,
        is_eligible: true,
        reject_reason: None,
        short_term_allocation: None,
        long_term_allocation: None,
        reward_case: None,
    }
}

pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 12, 1, hour, minute, 0).unwrap()
}
