use crate::error::{EngineError, Result};
use crate::patterns::{
    completed_within_two_weeks, filter_non_rush_deposits, has_high_frequency_deposits,
    has_similar_timing_deposits, over_threshold_return,
};
use crate::transfer_check::TransferCheck;
use crate::types::*;
use futures::future::BoxFuture;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A full mining set. Cohorts of exactly this size get the strict analysis;
/// larger cohorts are chunked into sets of this size first.
pub const STANDARD_MINING_SIZE: usize = 10;

/// Classifies each deposit into a reward case by analyzing the miner's
/// deposit history at the same amount. Results are memoized per
/// (address, amount) pair, so one cohort is analyzed once per run.
pub struct RewardCaseClassifier {
    transfer_check: TransferCheck,
    network_type: NetworkType,
    settings: RewardSettings,
    token_price_list: Vec<Token>,
    cache: Mutex<HashMap<(String, String), RewardCase>>,
}

impl RewardCaseClassifier {
    pub fn new(
        transfer_check: TransferCheck,
        network_type: NetworkType,
        settings: RewardSettings,
        token_price_list: Vec<Token>,
    ) -> Self {
        Self {
            transfer_check,
            network_type,
            settings,
            token_price_list,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Reward case for one deposit given the miner's full history. Deposits
    /// before the initial-period cutoff are unconditionally case1.
    pub async fn assign_reward_case(
        &self,
        target: &MiningData,
        history: &[MiningData],
    ) -> Result<RewardCase> {
        if let Some(cutoff) = self.settings.initial_case_cutoff {
            if target.deposited_at < cutoff {
                return Ok(RewardCase::Case1);
            }
        }

        let key = (normalize_address(&target.address), target.amount.clone());
        if let Some(case) = self.cache.lock().await.get(&key) {
            return Ok(*case);
        }

        let case = self.determine_mining_reward_case(target, history).await?;
        debug!(
            address = %key.0,
            amount = %key.1,
            case = ?case,
            "reward case determined"
        );
        self.cache.lock().await.insert(key, case);
        Ok(case)
    }

    /// Assign and apply the given axis for every deposit in the batch. The
    /// history passed in must cover each miner's complete deposit record,
    /// including entries outside this batch.
    pub async fn classify_batch(
        &self,
        deposits: &mut [MiningData],
        history_by_address: &HashMap<String, Vec<MiningData>>,
        axis: AllocationAxis,
    ) -> Result<()> {
        let empty = Vec::new();
        for i in 0..deposits.len() {
            let address = normalize_address(&deposits[i].address);
            let history = history_by_address.get(&address).unwrap_or(&empty);
            let target = deposits[i].clone();
            let case = self.assign_reward_case(&target, history).await?;
            apply_reward_case(&mut deposits[i], case, axis)?;
        }
        info!(deposits = deposits.len(), axis = ?axis, "reward cases applied");
        Ok(())
    }

    /// Analyze the same-amount cohort. Oversized cohorts are split into
    /// standard-size chunks by position and the chunk holding the target is
    /// re-analyzed, so a trailing partial chunk gets the incomplete-set
    /// treatment.
    fn determine_mining_reward_case<'a>(
        &'a self,
        target: &'a MiningData,
        history: &'a [MiningData],
    ) -> BoxFuture<'a, Result<RewardCase>> {
        Box::pin(async move {
            let cohort: Vec<MiningData> = history
                .iter()
                .filter(|deposit| deposit.amount == target.amount)
                .cloned()
                .collect();

            if cohort.len() < STANDARD_MINING_SIZE {
                return self.analyze_incomplete_set(&cohort);
            }
            if cohort.len() > STANDARD_MINING_SIZE {
                let chunk = cohort
                    .chunks(STANDARD_MINING_SIZE)
                    .find(|chunk| {
                        chunk
                            .iter()
                            .any(|deposit| deposit.deposit_id == target.deposit_id)
                    })
                    .ok_or_else(|| EngineError::DataIntegrity {
                        context: format!("deposit {} missing from its cohort", target.deposit_id),
                        expected: 1,
                        actual: 0,
                    })?;
                return self.determine_mining_reward_case(target, chunk).await;
            }
            self.analyze_standard_set(&cohort).await
        })
    }

    /// Fewer than ten deposits at this amount. Suspicious timing drops to
    /// case3; otherwise the incomplete set itself is only tolerated on
    /// Ethereum.
    fn analyze_incomplete_set(&self, cohort: &[MiningData]) -> Result<RewardCase> {
        if !cohort.iter().all(|deposit| deposit.is_eligible) {
            return Ok(RewardCase::Case4);
        }

        let non_rush = filter_non_rush_deposits(
            cohort,
            self.settings.rush_period_start,
            self.settings.rush_period_end,
        );
        if has_high_frequency_deposits(&non_rush)
            || has_similar_timing_deposits(
                &non_rush,
                self.settings.minutes_threshold,
                self.settings.required_similar_count,
            )
        {
            return Ok(RewardCase::Case3);
        }

        match self.network_type {
            NetworkType::Ethereum => Ok(RewardCase::Case1),
            NetworkType::Base => Ok(RewardCase::Case3),
        }
    }

    /// Exactly ten deposits at this amount. Timing anomalies and slow
    /// completion drop to case3, returned funds to case2, a clean set earns
    /// case1.
    async fn analyze_standard_set(&self, cohort: &[MiningData]) -> Result<RewardCase> {
        if !cohort.iter().all(|deposit| deposit.is_eligible) {
            return Ok(RewardCase::Case4);
        }

        let non_rush = filter_non_rush_deposits(
            cohort,
            self.settings.rush_period_start,
            self.settings.rush_period_end,
        );
        if has_high_frequency_deposits(&non_rush)
            || has_similar_timing_deposits(
                &non_rush,
                self.settings.minutes_threshold,
                self.settings.required_similar_count,
            )
            || !completed_within_two_weeks(cohort, self.network_type)
        {
            return Ok(RewardCase::Case3);
        }

        if over_threshold_return(&self.transfer_check, cohort, &self.token_price_list).await? {
            return Ok(RewardCase::Case2);
        }
        Ok(RewardCase::Case1)
    }
}

/// Write the computed case onto the deposit for one axis. On the long-term
/// axis a computed case1 defers to a worse short-term case, so a deposit can
/// never earn more on the long axis than it did on the short one.
pub fn apply_reward_case(
    mining: &mut MiningData,
    case: RewardCase,
    axis: AllocationAxis,
) -> Result<()> {
    let mut assignment = mining.reward_case.unwrap_or_default();
    match axis {
        AllocationAxis::Short => {
            assignment.short_term = Some(case);
        }
        AllocationAxis::Long => {
            let effective = if case == RewardCase::Case1 {
                let short =
                    assignment
                        .short_term
                        .ok_or_else(|| EngineError::MissingShortTermCase {
                            deposit_id: mining.deposit_id.clone(),
                        })?;
                if short != RewardCase::Case1 {
                    short
                } else {
                    case
                }
            } else {
                case
            };
            assignment.long_term = Some(effective);
        }
    }
    mining.reward_case = Some(assignment);
    Ok(())
}

/// Non-eligible deposits never reach the classifier; they get case4 on both
/// axes directly.
pub fn apply_non_eligible_case(mining: &mut MiningData) {
    mining.reward_case = Some(RewardCaseAssignment {
        short_term: Some(RewardCase::Case4),
        long_term: Some(RewardCase::Case4),
    });
}
