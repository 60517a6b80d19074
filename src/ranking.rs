use crate::chain::parse_hex_u128;
use crate::chain::parse_hex_u32;
use crate::types::*;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// A sender ranked by aggregate USD value sent to the traced address.
#[derive(Debug, Clone)]
pub struct RankedSender {
    pub from_address: String,
    pub total_usd_value_sent: Decimal,
    pub is_above_threshold: bool,
}

/// Rank transfer senders by aggregate USD-equivalent value, descending.
///
/// The threshold comparison is intentionally indirect: the USD total is
/// converted back to native-asset units and compared against a native-unit
/// threshold. With no native price available everything ranks below the
/// threshold.
pub fn sort_transfers_by_market_value(
    transfers: &[Transfer],
    token_price_list: &[Token],
    network_type: NetworkType,
    significant_native_threshold: f64,
) -> Vec<RankedSender> {
    let native_price = token_price_list
        .iter()
        .find(|token| token.id == NATIVE_TOKEN_ID)
        .map(|token| token.price)
        .unwrap_or(0.0);
    let native_price = Decimal::from_f64(native_price).unwrap_or_default();
    let threshold = Decimal::from_f64(significant_native_threshold).unwrap_or_default();

    let mut totals: HashMap<String, Decimal> = HashMap::new();
    for transfer in transfers {
        let usd_value = transfer_usd_value(transfer, token_price_list, network_type, native_price);
        let sender = normalize_address(&transfer.from);
        *totals.entry(sender).or_default() += usd_value;
    }

    let mut ranked: Vec<RankedSender> = totals
        .into_iter()
        .map(|(from_address, total_usd_value_sent)| {
            let is_above_threshold = if native_price > Decimal::ZERO {
                total_usd_value_sent / native_price > threshold
            } else {
                false
            };
            RankedSender {
                from_address,
                total_usd_value_sent,
                is_above_threshold,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.total_usd_value_sent
            .cmp(&a.total_usd_value_sent)
            .then_with(|| a.from_address.cmp(&b.from_address))
    });
    ranked
}

fn transfer_usd_value(
    transfer: &Transfer,
    token_price_list: &[Token],
    network_type: NetworkType,
    native_price: Decimal,
) -> Decimal {
    match transfer.category {
        TransferCategory::External if transfer.asset.as_deref() == Some(NATIVE_SYMBOL) => {
            let value = Decimal::from_f64(transfer.value.unwrap_or(0.0)).unwrap_or_default();
            value * native_price
        }
        TransferCategory::Erc20 => erc20_usd_value(transfer, token_price_list, network_type),
        _ => Decimal::ZERO,
    }
}

fn erc20_usd_value(
    transfer: &Transfer,
    token_price_list: &[Token],
    network_type: NetworkType,
) -> Decimal {
    let Some(raw_contract) = &transfer.raw_contract else {
        return Decimal::ZERO;
    };
    let Some(contract) = &raw_contract.address else {
        return Decimal::ZERO;
    };
    let contract = normalize_address(contract);

    // The lookup key is network-specific: Base token lists publish the Base
    // contract address in a separate field.
    let price = token_price_list
        .iter()
        .find(|token| match network_type {
            NetworkType::Ethereum => token.contract_address == contract,
            NetworkType::Base => token.base_contract_address == contract,
        })
        .map(|token| token.price)
        .unwrap_or(0.0);
    if price == 0.0 {
        return Decimal::ZERO;
    }

    let (Some(raw_value), Some(raw_decimal)) = (&raw_contract.value, &raw_contract.decimal) else {
        return Decimal::ZERO;
    };
    let Ok(raw_value) = parse_hex_u128(raw_value) else {
        return Decimal::ZERO;
    };
    let Ok(decimals) = parse_hex_u32(raw_decimal) else {
        return Decimal::ZERO;
    };
    if decimals > 28 {
        return Decimal::ZERO;
    }
    let Ok(raw_value) = i128::try_from(raw_value) else {
        return Decimal::ZERO;
    };

    let amount = Decimal::from_i128_with_scale(raw_value, decimals);
    amount * Decimal::from_f64(price).unwrap_or_default()
}
