use crate::error::Result;
use crate::types::{StorageSettings, Token};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

/// Token price list contract. Failure degrades to an empty list downstream
/// (zero-valued transfers), never an abort.
#[async_trait]
pub trait PriceListProvider: Send + Sync {
    async fn fetch_token_list(&self) -> Result<Vec<Token>>;
}

/// Whitelist contract: known exchange and DeFi protocol addresses,
/// concatenated. Failure here is fatal to tracer initialization.
#[async_trait]
pub trait WhitelistProvider: Send + Sync {
    async fn fetch_address_lists(&self) -> Result<Vec<String>>;
}

/// Fetches published JSON blobs from object storage over HTTP.
pub struct StorageListClient {
    http: reqwest::Client,
    settings: StorageSettings,
}

#[derive(Debug, Deserialize)]
struct ExchangeList {
    result: ExchangeRows,
}

#[derive(Debug, Deserialize)]
struct ExchangeRows {
    rows: Vec<ExchangeRow>,
}

#[derive(Debug, Deserialize)]
struct ExchangeRow {
    address: String,
}

impl StorageListClient {
    pub fn new(settings: StorageSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.bucket,
            path
        )
    }

    async fn download<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.object_url(path);
        debug!(url, "downloading list object");
        let data = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<T>()
            .await?;
        Ok(data)
    }
}

#[async_trait]
impl PriceListProvider for StorageListClient {
    async fn fetch_token_list(&self) -> Result<Vec<Token>> {
        match self
            .download::<Vec<Token>>(&self.settings.token_prices_path)
            .await
        {
            Ok(tokens) => Ok(tokens),
            Err(e) => {
                warn!("token list not found: {}", e);
                Ok(Vec::new())
            }
        }
    }
}

#[async_trait]
impl WhitelistProvider for StorageListClient {
    async fn fetch_address_lists(&self) -> Result<Vec<String>> {
        let (exchanges, defi_protocols) = tokio::try_join!(
            self.download::<ExchangeList>(&self.settings.exchanges_path),
            self.download::<Vec<String>>(&self.settings.defi_protocols_path),
        )?;

        let mut addresses = defi_protocols;
        addresses.extend(exchanges.result.rows.into_iter().map(|row| row.address));
        Ok(addresses)
    }
}
