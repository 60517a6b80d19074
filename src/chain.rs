use crate::error::{EngineError, Result};
use crate::types::*;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error};

const MAX_REQUESTS_PER_SECOND: usize = 30;
const TRANSFER_FETCH_MAX_RETRIES: u32 = 3;
const TRANSFER_FETCH_BASE_DELAY_MS: u64 = 1_000;

/// Query parameters for a transfer history fetch.
#[derive(Debug, Clone, Default)]
pub struct TransferQuery {
    pub from_block: u64,
    pub to_block: Option<u64>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    /// Defaults to the per-network category set when absent.
    pub categories: Option<Vec<TransferCategory>>,
}

/// On-chain data provider contract consumed by the tracer and the reward
/// classifier. Implementations must be safe to share across concurrent trace
/// branches.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    async fn get_asset_transfers(&self, query: &TransferQuery) -> Result<Vec<Transfer>>;

    /// Native-token balance in wei.
    async fn get_balance(&self, address: &str) -> Result<u128>;

    async fn get_latest_block(&self) -> Result<BlockInfo>;

    async fn get_block(&self, number: u64) -> Result<BlockInfo>;
}

/// Sliding-window limiter shared by every concurrent tracer branch. This is
/// the one place real throttling is enforced for the data API.
struct RateLimiter {
    timestamps: Mutex<VecDeque<Instant>>,
    max_per_second: usize,
}

impl RateLimiter {
    fn new(max_per_second: usize) -> Self {
        Self {
            timestamps: Mutex::new(VecDeque::new()),
            max_per_second,
        }
    }

    async fn acquire(&self) {
        let window = Duration::from_secs(1);
        loop {
            let delay = {
                let mut stamps = self.timestamps.lock().await;
                let now = Instant::now();
                while let Some(front) = stamps.front() {
                    if now.duration_since(*front) >= window {
                        stamps.pop_front();
                    } else {
                        break;
                    }
                }

                if stamps.len() >= self.max_per_second {
                    stamps
                        .front()
                        .map(|oldest| window.saturating_sub(now.duration_since(*oldest)))
                } else {
                    stamps.push_back(now);
                    None
                }
            };

            // A woken waiter goes back through the window check; several
            // waiters can wake at once and only the budget may pass.
            match delay {
                Some(delay) => tokio::time::sleep(delay).await,
                None => return,
            }
        }
    }
}

/// JSON-RPC client for an Alchemy-style transfer history endpoint.
pub struct AlchemyClient {
    http: reqwest::Client,
    endpoint: String,
    network_type: NetworkType,
    environment: String,
    rate_limiter: RateLimiter,
    request_count: AtomicU64,
}

impl AlchemyClient {
    pub fn new(network: &NetworkSettings) -> Result<Self> {
        let endpoint = if network.rpc_base_url.is_empty() {
            let host = network_host(network.network_type, &network.environment)?;
            format!("https://{}.g.alchemy.com/v2/{}", host, network.api_key)
        } else {
            format!(
                "{}/{}",
                network.rpc_base_url.trim_end_matches('/'),
                network.api_key
            )
        };

        Ok(Self {
            http: reqwest::Client::new(),
            endpoint,
            network_type: network.network_type,
            environment: network.environment.clone(),
            rate_limiter: RateLimiter::new(MAX_REQUESTS_PER_SECOND),
            request_count: AtomicU64::new(0),
        })
    }

    /// Internal transfers are only indexed on Ethereum mainnet.
    fn default_categories(&self) -> Vec<TransferCategory> {
        if self.network_type == NetworkType::Ethereum && self.environment == "mainnet" {
            vec![
                TransferCategory::Erc20,
                TransferCategory::Internal,
                TransferCategory::External,
            ]
        } else {
            vec![TransferCategory::Erc20, TransferCategory::External]
        }
    }

    async fn rpc<P: Serialize, R: DeserializeOwned>(&self, method: &str, params: P) -> Result<R> {
        self.rate_limiter.acquire().await;
        let count = self.request_count.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(request = count, method, "chain provider request");

        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let rpc: RpcResponse<R> = response.json().await?;
        if let Some(err) = rpc.error {
            return Err(EngineError::Rpc(err.message));
        }
        rpc.result
            .ok_or_else(|| EngineError::Rpc(format!("{} returned no result", method)))
    }

    async fn fetch_transfers_once(&self, query: &TransferQuery) -> Result<Vec<Transfer>> {
        let params = TransferParams {
            from_block: to_hex(query.from_block as u128),
            to_block: query
                .to_block
                .map(|block| to_hex(block as u128))
                .unwrap_or_else(|| "latest".to_string()),
            from_address: query.from_address.clone(),
            to_address: query.to_address.clone(),
            category: query
                .categories
                .clone()
                .unwrap_or_else(|| self.default_categories()),
            with_metadata: true,
            exclude_zero_value: false,
            order: "desc".to_string(),
        };

        let result: TransfersResult = self
            .rpc("alchemy_getAssetTransfers", [&params])
            .await?;

        let mut transfers = Vec::with_capacity(result.transfers.len());
        for raw in result.transfers {
            let Some(category) = parse_category(&raw.category) else {
                debug!(category = %raw.category, "skipping transfer with unsupported category");
                continue;
            };

            transfers.push(Transfer {
                from: raw.from,
                to: raw.to,
                block_number: parse_hex_u64(&raw.block_num).unwrap_or(0),
                category,
                asset: raw.asset,
                value: raw.value,
                raw_contract: raw.raw_contract,
            });
        }
        Ok(transfers)
    }
}

#[async_trait]
impl ChainProvider for AlchemyClient {
    async fn get_asset_transfers(&self, query: &TransferQuery) -> Result<Vec<Transfer>> {
        let mut last_error = String::new();

        for attempt in 0..TRANSFER_FETCH_MAX_RETRIES {
            match self.fetch_transfers_once(query).await {
                Ok(transfers) => return Ok(transfers),
                Err(e) => {
                    last_error = e.to_string();
                    let is_last = attempt == TRANSFER_FETCH_MAX_RETRIES - 1;
                    if is_last {
                        break;
                    }

                    let delay = TRANSFER_FETCH_BASE_DELAY_MS * 2u64.pow(attempt);
                    error!(
                        attempt = attempt + 1,
                        delay_ms = delay,
                        "transfer fetch failed, retrying: {}",
                        last_error
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
            }
        }

        Err(EngineError::ProviderExhausted {
            attempts: TRANSFER_FETCH_MAX_RETRIES,
            message: last_error,
        })
    }

    async fn get_balance(&self, address: &str) -> Result<u128> {
        let result: String = self.rpc("eth_getBalance", (address, "latest")).await?;
        parse_hex_u128(&result)
    }

    async fn get_latest_block(&self) -> Result<BlockInfo> {
        let raw: RawBlock = self
            .rpc("eth_getBlockByNumber", ("latest", false))
            .await?;
        raw.into_block_info()
    }

    async fn get_block(&self, number: u64) -> Result<BlockInfo> {
        let raw: RawBlock = self
            .rpc("eth_getBlockByNumber", (to_hex(number as u128), false))
            .await?;
        raw.into_block_info()
    }
}

fn network_host(network_type: NetworkType, environment: &str) -> Result<&'static str> {
    match (network_type, environment) {
        (NetworkType::Ethereum, "mainnet") => Ok("eth-mainnet"),
        (NetworkType::Ethereum, "sepolia") => Ok("eth-sepolia"),
        (NetworkType::Base, "mainnet") => Ok("base-mainnet"),
        (NetworkType::Base, "sepolia") => Ok("base-sepolia"),
        (_, env) => Err(EngineError::Other(format!(
            "Unsupported network environment: {}",
            env
        ))),
    }
}

fn parse_category(raw: &str) -> Option<TransferCategory> {
    match raw {
        "native" => Some(TransferCategory::Native),
        "external" => Some(TransferCategory::External),
        "internal" => Some(TransferCategory::Internal),
        "erc20" => Some(TransferCategory::Erc20),
        _ => None,
    }
}

pub fn to_hex(value: u128) -> String {
    format!("0x{:x}", value)
}

pub fn parse_hex_u64(value: &str) -> Result<u64> {
    let clean = value.strip_prefix("0x").unwrap_or(value);
    u64::from_str_radix(clean, 16).map_err(|_| EngineError::InvalidAmount(value.to_string()))
}

pub fn parse_hex_u128(value: &str) -> Result<u128> {
    let clean = value.strip_prefix("0x").unwrap_or(value);
    u128::from_str_radix(clean, 16).map_err(|_| EngineError::InvalidAmount(value.to_string()))
}

pub fn parse_hex_u32(value: &str) -> Result<u32> {
    let clean = value.strip_prefix("0x").unwrap_or(value);
    u32::from_str_radix(clean, 16).map_err(|_| EngineError::InvalidAmount(value.to_string()))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TransferParams {
    from_block: String,
    to_block: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    from_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    to_address: Option<String>,
    category: Vec<TransferCategory>,
    with_metadata: bool,
    exclude_zero_value: bool,
    order: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[allow(dead_code)]
    code: Option<i64>,
    message: String,
}

#[derive(Debug, Deserialize)]
struct TransfersResult {
    transfers: Vec<RawTransfer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTransfer {
    from: String,
    to: Option<String>,
    value: Option<f64>,
    asset: Option<String>,
    category: String,
    block_num: String,
    raw_contract: Option<RawContract>,
}

#[derive(Debug, Deserialize)]
struct RawBlock {
    number: String,
    timestamp: String,
}

impl RawBlock {
    fn into_block_info(self) -> Result<BlockInfo> {
        Ok(BlockInfo {
            number: parse_hex_u64(&self.number)?,
            timestamp: parse_hex_u64(&self.timestamp)? as i64,
        })
    }
}
