use crate::types::*;
use tracing::info;

/// Term duration in days. Each term is twice as long as the previous one.
pub fn current_term_duration(first_term_duration: u32, term: u32) -> u32 {
    first_term_duration * 2u32.pow(term.saturating_sub(1))
}

/// Outcome of one allocation pass. Allocations themselves are written onto
/// the deposits; anything not distributed is burned.
#[derive(Debug, Clone, Copy)]
pub struct AllocationSummary {
    pub daily_allocation: f64,
    pub total_allocated: f64,
    pub burn_amount: f64,
}

/// Distribute one day's token allocation over the batch, proportional to
/// points weighted by each deposit's reward-case multiplier. Per-deposit
/// amounts are floored to three decimals and the shaved remainder is burned,
/// so distributed plus burned always equals the daily allocation.
///
/// A deposit without a reward case on the requested axis weighs zero, the
/// same as case4.
pub fn calculate_allocations(
    deposits: &mut [MiningData],
    settings: &AllocationSettings,
    term: u32,
    axis: AllocationAxis,
) -> AllocationSummary {
    let duration = current_term_duration(settings.first_term_duration, term);
    let ratio = match axis {
        AllocationAxis::Short => settings.short_term_ratio,
        AllocationAxis::Long => 1.0 - settings.short_term_ratio,
    };
    let daily_allocation = settings.term_token_allocation / duration as f64 * ratio;

    let total_weight: f64 = deposits
        .iter()
        .map(|deposit| deposit.points * axis_multiplier(deposit, axis))
        .sum();
    if total_weight == 0.0 {
        for deposit in deposits.iter_mut() {
            set_axis_allocation(deposit, axis, 0.0);
        }
        info!(term, axis = ?axis, burned = daily_allocation, "no weighted points, burning full allocation");
        return AllocationSummary {
            daily_allocation,
            total_allocated: 0.0,
            burn_amount: daily_allocation,
        };
    }

    let mut total_allocated = 0.0;
    let mut burn_amount = 0.0;
    for deposit in deposits.iter_mut() {
        let weight = deposit.points * axis_multiplier(deposit, axis);
        let raw = weight / total_weight * daily_allocation;
        let rounded = floor_to_milli(raw);
        total_allocated += rounded;
        burn_amount += raw - rounded;
        set_axis_allocation(deposit, axis, rounded);
    }

    info!(
        term,
        axis = ?axis,
        allocated = total_allocated,
        burned = burn_amount,
        "allocations calculated"
    );
    AllocationSummary {
        daily_allocation,
        total_allocated,
        burn_amount,
    }
}

fn axis_multiplier(deposit: &MiningData, axis: AllocationAxis) -> f64 {
    let case = deposit.reward_case.and_then(|assignment| match axis {
        AllocationAxis::Short => assignment.short_term,
        AllocationAxis::Long => assignment.long_term,
    });
    case.unwrap_or(RewardCase::Case4).multiplier(axis)
}

fn set_axis_allocation(deposit: &mut MiningData, axis: AllocationAxis, amount: f64) {
    match axis {
        AllocationAxis::Short => deposit.short_term_allocation = Some(amount),
        AllocationAxis::Long => deposit.long_term_allocation = Some(amount),
    }
}

fn floor_to_milli(value: f64) -> f64 {
    (value * 1000.0).floor() / 1000.0
}
