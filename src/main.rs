use mining_reward_engine::{
    apply_non_eligible_case, calculate_allocations, init_tracing, normalize_address,
    AlchemyClient, AllocationAxis, AllocationSummary, CirculationRecord, CirculationStore,
    EligibleMiningProcessor, EngineConfig, MemoryCirculationStore, MiningData, PriceListProvider,
    Result, RewardCaseClassifier, StorageListClient, TransferCheck,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RewardReport {
    term: u32,
    short_term: AxisReport,
    long_term: AxisReport,
    deposits: Vec<MiningData>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AxisReport {
    daily_allocation: f64,
    total_allocated: f64,
    burn_amount: f64,
}

impl From<AllocationSummary> for AxisReport {
    fn from(summary: AllocationSummary) -> Self {
        Self {
            daily_allocation: summary.daily_allocation,
            total_allocated: summary.total_allocated,
            burn_amount: summary.burn_amount,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("🚀 Mining Reward Engine Starting...");

    // Load configuration
    let config = match EngineConfig::load() {
        Ok(config) => {
            println!("✅ Configuration loaded successfully");
            config
        }
        Err(e) => {
            eprintln!("❌ Failed to load configuration: {}", e);
            eprintln!("💡 Hint: Set MINING_NETWORK_APIKEY for the transfer data provider");
            eprintln!("   Example: MINING_NETWORK_APIKEY=alch-... MINING_JOB_TERM=1");
            return Err(e);
        }
    };

    // Initialize logging
    if let Err(e) = init_tracing(&config) {
        eprintln!("❌ Failed to initialize logging: {}", e);
        return Err(e);
    }

    info!("🎯 Mining Reward Engine v{}", env!("CARGO_PKG_VERSION"));
    info!("🔧 Configuration:");
    info!("   Network: {:?} ({})", config.network.network_type, config.network.environment);
    info!("   Term: {}", config.job.term);
    info!("   Trace depth: {}", config.job.tracer_depth);
    info!("   Deposit batch: {}", config.job.deposit_batch_path);

    // Load the deposit batch
    let raw = tokio::fs::read_to_string(&config.job.deposit_batch_path).await?;
    let deposits: Vec<MiningData> = serde_json::from_str(&raw)?;
    info!("📦 Loaded {} deposits", deposits.len());

    // Wire up the providers
    let chain = Arc::new(AlchemyClient::new(&config.network)?);
    let lists = Arc::new(StorageListClient::new(config.storage.clone()));
    let store = Arc::new(
        MemoryCirculationStore::load_snapshot(&config.job.circulation_snapshot_path).await?,
    );

    let mut tracer_settings = config.tracer.clone();
    tracer_settings.max_depth = config.job.tracer_depth;

    // Circulation pass
    let processor = EligibleMiningProcessor::new(
        chain.clone(),
        store.clone(),
        lists.clone(),
        lists.clone(),
        config.network.network_type,
        tracer_settings,
    );
    let categorized = match processor.categorize_deposits(deposits).await {
        Ok(categorized) => categorized,
        Err(e) => {
            error!("❌ Circulation pass failed: {}", e);
            return Err(e);
        }
    };

    // Persist newly discovered circulating addresses
    if !categorized.new_circulation_addresses.is_empty() {
        let records: Vec<CirculationRecord> = categorized
            .new_circulation_addresses
            .iter()
            .map(|address| CirculationRecord::confirmed(address))
            .collect();
        let written = store.upsert_batch(&records).await?;
        info!("💾 Recorded {} new circulating addresses", written);
    }
    store
        .save_snapshot(&config.job.circulation_snapshot_path)
        .await?;

    // Reward case pass
    let token_price_list = lists.fetch_token_list().await?;
    if token_price_list.is_empty() {
        warn!("token price list is empty, transfer values will rank as zero");
    }
    let classifier = RewardCaseClassifier::new(
        TransferCheck::new(
            chain.clone(),
            config.network.network_type,
            config.tracer.significant_native_threshold,
        ),
        config.network.network_type,
        config.reward.clone(),
        token_price_list,
    );

    let mut eligible = categorized.non_circulation_entries;
    let mut rejected = categorized.circulation_entries;
    for mining in rejected.iter_mut() {
        apply_non_eligible_case(mining);
    }

    // Histories must span the full batch, rejected deposits included, so an
    // ineligible cohort member drags its amount cohort to case4.
    let mut history_by_address: HashMap<String, Vec<MiningData>> = HashMap::new();
    for mining in eligible.iter().chain(rejected.iter()) {
        history_by_address
            .entry(normalize_address(&mining.address))
            .or_default()
            .push(mining.clone());
    }
    for history in history_by_address.values_mut() {
        history.sort_by_key(|mining| mining.deposited_at);
    }

    classifier
        .classify_batch(&mut eligible, &history_by_address, AllocationAxis::Short)
        .await?;
    classifier
        .classify_batch(&mut eligible, &history_by_address, AllocationAxis::Long)
        .await?;

    // Allocation pass over the whole batch; rejected deposits weigh zero
    let mut all_deposits = eligible;
    all_deposits.append(&mut rejected);
    let short_summary = calculate_allocations(
        &mut all_deposits,
        &config.allocation,
        config.job.term,
        AllocationAxis::Short,
    );
    let long_summary = calculate_allocations(
        &mut all_deposits,
        &config.allocation,
        config.job.term,
        AllocationAxis::Long,
    );

    let report = RewardReport {
        term: config.job.term,
        short_term: short_summary.into(),
        long_term: long_summary.into(),
        deposits: all_deposits,
    };
    tokio::fs::write(
        &config.job.report_path,
        serde_json::to_string_pretty(&report)?,
    )
    .await?;

    info!("📊 Report written to {}", config.job.report_path);
    info!(
        "   Short-term: {:.3} allocated, {:.3} burned",
        report.short_term.total_allocated, report.short_term.burn_amount
    );
    info!(
        "   Long-term:  {:.3} allocated, {:.3} burned",
        report.long_term.total_allocated, report.long_term.burn_amount
    );
    info!("✅ Run complete");
    Ok(())
}
