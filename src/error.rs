use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Provider request failed after {attempts} attempts: {message}")]
    ProviderExhausted { attempts: u32, message: String },

    #[error("Circulation store error: {0}")]
    Store(String),

    #[error("Trace failed for address {address}: {message}")]
    TraceFailed { address: String, message: String },

    #[error("Invalid on-chain amount '{0}'")]
    InvalidAmount(String),

    #[error("Short term reward case is not set for deposit {deposit_id}")]
    MissingShortTermCase { deposit_id: String },

    #[error("Data integrity violation in {context}: expected {expected}, found {actual}")]
    DataIntegrity {
        context: String,
        expected: usize,
        actual: usize,
    },

    #[error("Other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl From<String> for EngineError {
    fn from(msg: String) -> Self {
        EngineError::Other(msg)
    }
}

impl From<&str> for EngineError {
    fn from(msg: &str) -> Self {
        EngineError::Other(msg.to_string())
    }
}
