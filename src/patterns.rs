use crate::error::{EngineError, Result};
use crate::transfer_check::TransferCheck;
use crate::types::*;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::HashSet;
use tracing::debug;

/// Deposits within this window of a base deposit count toward one burst.
const HIGH_FREQUENCY_WINDOW_HOURS: i64 = 4;
/// Minimum burst size before its members are flagged.
const HIGH_FREQUENCY_MIN_GROUP: usize = 3;
/// Minimum number of flagged deposits for the cohort to count as
/// high-frequency overall.
const HIGH_FREQUENCY_MIN_FLAGGED: usize = 5;
/// Interval windows containing any gap beyond this are ignored by the
/// similar-timing check.
const SIMILAR_TIMING_MAX_GAP_HOURS: f64 = 7.0;
/// Outgoing value as a percentage of deposited value at or above which the
/// cohort counts as returning its funds.
const RETURN_RATIO_PERCENT: f64 = 30.0;

/// Drop deposits made during the configured rush window, boundaries included.
pub fn filter_non_rush_deposits(
    deposits: &[MiningData],
    rush_start: DateTime<Utc>,
    rush_end: DateTime<Utc>,
) -> Vec<MiningData> {
    deposits
        .iter()
        .filter(|deposit| deposit.deposited_at < rush_start || deposit.deposited_at > rush_end)
        .cloned()
        .collect()
}

/// Burst detection: walk the time-sorted cohort, grouping each deposit with
/// every later deposit inside the four-hour window. Any group of three or
/// more flags all of its members; the cohort is high-frequency once five
/// distinct deposits are flagged.
pub fn has_high_frequency_deposits(deposits: &[MiningData]) -> bool {
    let mut sorted: Vec<&MiningData> = deposits.iter().collect();
    sorted.sort_by_key(|deposit| deposit.deposited_at);

    let window = Duration::hours(HIGH_FREQUENCY_WINDOW_HOURS);
    let mut flagged: HashSet<&str> = HashSet::new();
    for i in 0..sorted.len().saturating_sub(HIGH_FREQUENCY_MIN_GROUP - 1) {
        let base = sorted[i].deposited_at;
        let mut group = vec![sorted[i].deposit_id.as_str()];
        for candidate in &sorted[i + 1..] {
            if candidate.deposited_at - base <= window {
                group.push(candidate.deposit_id.as_str());
            } else {
                break;
            }
        }
        if group.len() >= HIGH_FREQUENCY_MIN_GROUP {
            flagged.extend(group);
        }
    }
    flagged.len() >= HIGH_FREQUENCY_MIN_FLAGGED
}

/// Interval clustering: compute the gaps between consecutive deposits, sort
/// them, and look for `required_similar_count` adjacent gaps whose spread is
/// under twice the minutes threshold. Windows containing a gap over seven
/// hours are ignored.
pub fn has_similar_timing_deposits(
    deposits: &[MiningData],
    minutes_threshold: i64,
    required_similar_count: usize,
) -> bool {
    let mut sorted: Vec<&MiningData> = deposits.iter().collect();
    sorted.sort_by_key(|deposit| deposit.deposited_at);

    let mut intervals: Vec<f64> = sorted
        .windows(2)
        .map(|pair| (pair[1].deposited_at - pair[0].deposited_at).num_seconds() as f64 / 60.0)
        .collect();
    if intervals.len() < required_similar_count {
        return false;
    }
    intervals.sort_by(|a, b| a.total_cmp(b));

    let max_gap = SIMILAR_TIMING_MAX_GAP_HOURS * 60.0;
    let max_spread = 2.0 * minutes_threshold as f64;
    for window in intervals.windows(required_similar_count) {
        let smallest = window[0];
        let largest = window[required_similar_count - 1];
        if largest > max_gap {
            continue;
        }
        if largest - smallest < max_spread {
            return true;
        }
    }
    false
}

/// Whether the cohort was deposited within a two-week span. On Ethereum the
/// check always passes; deposit cost there already disincentivizes slow
/// accumulation.
pub fn completed_within_two_weeks(deposits: &[MiningData], network_type: NetworkType) -> bool {
    if network_type == NetworkType::Ethereum {
        return true;
    }
    let (Some(first), Some(last)) = (
        deposits.iter().map(|d| d.deposited_at).min(),
        deposits.iter().map(|d| d.deposited_at).max(),
    ) else {
        return true;
    };
    last - first <= Duration::days(14)
}

/// Whether the miner sent out at least 30% of the cohort's deposited value
/// after the final deposit. A cohort with zero deposited value never counts
/// as returned.
pub async fn over_threshold_return(
    transfer_check: &TransferCheck,
    deposits: &[MiningData],
    token_price_list: &[Token],
) -> Result<bool> {
    let Some(last) = deposits.iter().max_by_key(|d| d.deposited_at) else {
        return Ok(false);
    };

    let native_price = token_price_list
        .iter()
        .find(|token| token.id == NATIVE_TOKEN_ID)
        .map(|token| token.price)
        .unwrap_or(0.0);
    let native_price = Decimal::from_f64(native_price).unwrap_or_default();

    let mut deposited_usd = Decimal::ZERO;
    for deposit in deposits {
        let raw = deposit
            .amount
            .parse::<u128>()
            .ok()
            .and_then(|wei| i128::try_from(wei).ok())
            .ok_or_else(|| EngineError::InvalidAmount(deposit.amount.clone()))?;
        deposited_usd += Decimal::from_i128_with_scale(raw, NATIVE_DECIMALS) * native_price;
    }
    if deposited_usd.is_zero() {
        return Ok(false);
    }

    let ranked = transfer_check
        .sorted_outgoing_transfers(&last.address, last.block_number, token_price_list)
        .await?;
    let returned_usd: Decimal = ranked
        .iter()
        .map(|sender| sender.total_usd_value_sent)
        .sum();

    let ratio = returned_usd / deposited_usd * Decimal::from(100);
    debug!(
        address = %last.address,
        %deposited_usd,
        %returned_usd,
        "fund return ratio computed"
    );
    Ok(ratio >= Decimal::from_f64(RETURN_RATIO_PERCENT).unwrap_or_default())
}
