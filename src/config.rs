use crate::error::{EngineError, Result};
use crate::types::*;
use chrono::{TimeZone, Utc};
use config::{Config, ConfigError, Environment, File};
use std::env;

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            network: NetworkSettings {
                network_type: NetworkType::Ethereum,
                environment: "mainnet".to_string(),
                rpc_base_url: String::new(),
                api_key: String::new(),
            },
            tracer: TracerSettings {
                max_depth: 4,
                depth_limits: vec![5, 3, 2, 1],
                max_concurrent_tasks: 3,
                significant_native_threshold: 10.0,
                hub_from_days_ago: 7,
                hub_unique_addresses: 30,
                hub_min_native_balance: "10000000000000000000".to_string(),
                liquidity_contract_address: String::new(),
                contract_deployed_block: 0,
                blocks_per_day: 43_200,
            },
            reward: RewardSettings {
                minutes_threshold: 5,
                required_similar_count: 3,
                initial_case_cutoff: Some(Utc.with_ymd_and_hms(2024, 10, 11, 0, 0, 0).unwrap()),
                rush_period_start: default_rush_period_start(),
                rush_period_end: default_rush_period_end(),
            },
            allocation: AllocationSettings {
                first_term_duration: 16,
                term_token_allocation: 143_000_000.0,
                short_term_ratio: 1.0 / 3.0,
            },
            storage: StorageSettings {
                base_url: "https://storage.googleapis.com".to_string(),
                bucket: "mining-lists".to_string(),
                token_prices_path: "tokens/tokenPrices.json".to_string(),
                exchanges_path: "addresses/exchanges.json".to_string(),
                defi_protocols_path: "addresses/defiProtocols.json".to_string(),
            },
            job: JobSettings {
                deposit_batch_path: "./deposits.json".to_string(),
                circulation_snapshot_path: "./circulations.json".to_string(),
                report_path: "./reward_report.json".to_string(),
                term: 1,
                tracer_depth: 4,
            },
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables and config files
    pub fn load() -> Result<Self> {
        let mut config_builder = Config::builder()
            .add_source(Config::try_from(&EngineConfig::default())?)
            .add_source(Environment::with_prefix("MINING").separator("_"));

        // Try to load from config file if specified
        if let Ok(config_file) = env::var("MINING_CONFIG_FILE") {
            config_builder =
                config_builder.add_source(File::with_name(&config_file).required(false));
        }

        // Try common config file locations
        config_builder = config_builder
            .add_source(File::with_name("mining.toml").required(false))
            .add_source(File::with_name("config/mining.toml").required(false));

        let config = config_builder.build()?;
        let engine_config: EngineConfig = config.try_deserialize()?;

        engine_config.validate()?;
        Ok(engine_config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(Config::try_from(&EngineConfig::default())?)
            .add_source(File::with_name(path))
            .build()?;

        let engine_config: EngineConfig = config.try_deserialize()?;
        engine_config.validate()?;
        Ok(engine_config)
    }

    /// Create configuration from environment variables only
    pub fn from_env() -> Result<Self> {
        let config = Config::builder()
            .add_source(Config::try_from(&EngineConfig::default())?)
            .add_source(Environment::with_prefix("MINING").separator("_"))
            .build()?;

        let engine_config: EngineConfig = config.try_deserialize()?;
        engine_config.validate()?;
        Ok(engine_config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !["mainnet", "sepolia"].contains(&self.network.environment.as_str()) {
            return Err(EngineError::Config(ConfigError::Message(
                "Environment must be 'mainnet' or 'sepolia'".to_string(),
            )));
        }

        if self.tracer.max_depth == 0 {
            return Err(EngineError::Config(ConfigError::Message(
                "Tracer max depth must be greater than 0".to_string(),
            )));
        }

        if self.tracer.depth_limits.is_empty() {
            return Err(EngineError::Config(ConfigError::Message(
                "At least one depth limit must be configured".to_string(),
            )));
        }

        if self.tracer.max_concurrent_tasks == 0 {
            return Err(EngineError::Config(ConfigError::Message(
                "Max concurrent trace tasks must be greater than 0".to_string(),
            )));
        }

        if self.tracer.significant_native_threshold <= 0.0 {
            return Err(EngineError::Config(ConfigError::Message(
                "Significant native threshold must be greater than 0".to_string(),
            )));
        }

        if self.tracer.hub_min_native_balance.parse::<u128>().is_err() {
            return Err(EngineError::Config(ConfigError::Message(
                "Hub minimum native balance must be a wei amount".to_string(),
            )));
        }

        if self.reward.rush_period_end < self.reward.rush_period_start {
            return Err(EngineError::Config(ConfigError::Message(
                "Rush period end must not precede its start".to_string(),
            )));
        }

        if self.reward.required_similar_count < 2 {
            return Err(EngineError::Config(ConfigError::Message(
                "Required similar interval count must be at least 2".to_string(),
            )));
        }

        if self.allocation.first_term_duration == 0 {
            return Err(EngineError::Config(ConfigError::Message(
                "First term duration must be greater than 0".to_string(),
            )));
        }

        if !(0.0..=1.0).contains(&self.allocation.short_term_ratio) {
            return Err(EngineError::Config(ConfigError::Message(
                "Short term ratio must be between 0 and 1".to_string(),
            )));
        }

        if self.job.term == 0 {
            return Err(EngineError::Config(ConfigError::Message(
                "Term must be greater than 0".to_string(),
            )));
        }

        Ok(())
    }

    /// Check if this is a development environment
    pub fn is_development(&self) -> bool {
        env::var("MINING_ENV").unwrap_or_default() == "development"
            || env::var("RUST_ENV").unwrap_or_default() == "development"
    }

    /// Get the log level
    pub fn log_level(&self) -> String {
        env::var("MINING_LOG_LEVEL")
            .or_else(|_| env::var("RUST_LOG"))
            .unwrap_or_else(|_| {
                if self.is_development() {
                    "debug".to_string()
                } else {
                    "info".to_string()
                }
            })
    }
}

/// Initialize tracing with the given configuration
pub fn init_tracing(config: &EngineConfig) -> Result<()> {
    use tracing_subscriber::{filter::LevelFilter, fmt, EnvFilter};

    let log_level = config.log_level();

    let filter = EnvFilter::builder()
        .with_default_directive(
            log_level
                .parse::<LevelFilter>()
                .unwrap_or(LevelFilter::INFO)
                .into(),
        )
        .from_env_lossy()
        .add_directive("mining_reward_engine=debug".parse().unwrap());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true)
        .with_file(config.is_development())
        .init();

    Ok(())
}
