use ruint::aliases::U512;
use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::registry::HolderRecord;

/// A holder that passed the USD threshold. Encounter order from the registry
/// read is preserved so the allocation step stays deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibleHolder {
    pub owner: Pubkey,
    pub raw_balance: u128,
}

/// Pure eligibility filter.
///
/// With no price, no holder can be proven eligible, so the result is empty;
/// that is deliberate policy, not an error. Exclusion matches either the
/// owner wallet or the token account itself (pool and treasury accounts are
/// excluded by account address).
pub fn filter_eligible(
    records: &[HolderRecord],
    decimals: u8,
    price_usd: Option<Decimal>,
    threshold_usd: Decimal,
    excluded: &HashSet<Pubkey>,
) -> Vec<EligibleHolder> {
    let Some(price) = price_usd.filter(|p| *p > Decimal::ZERO) else {
        warn!("price unavailable; treating every holder as ineligible");
        return Vec::new();
    };

    let mut eligible = Vec::new();
    for record in records {
        if excluded.contains(&record.owner) || excluded.contains(&record.token_account) {
            debug!(owner = %record.owner, "excluded from rewards");
            continue;
        }
        if meets_threshold(record.raw_balance, decimals, price, threshold_usd) {
            eligible.push(EligibleHolder {
                owner: record.owner,
                raw_balance: record.raw_balance,
            });
        }
    }
    info!(
        holders = records.len(),
        eligible = eligible.len(),
        %threshold_usd,
        "eligibility filter complete"
    );
    eligible
}

/// Exact threshold test: `raw_balance / 10^decimals * price >= threshold`.
///
/// Both decimals are decomposed into integer mantissa and scale and the
/// comparison is done on cross-multiplied 512-bit integers, so the boundary
/// case cannot be flipped by rounding:
///
///   raw_balance * price_mantissa * 10^threshold_scale
///     >= threshold_mantissa * 10^(decimals + price_scale)
pub fn meets_threshold(
    raw_balance: u128,
    decimals: u8,
    price_usd: Decimal,
    threshold_usd: Decimal,
) -> bool {
    let price_mantissa = price_usd.mantissa().max(0) as u128;
    let threshold_mantissa = threshold_usd.mantissa().max(0) as u128;

    let ten = U512::from(10u64);
    let lhs = U512::from(raw_balance)
        * U512::from(price_mantissa)
        * ten.pow(U512::from(threshold_usd.scale()));
    let rhs = U512::from(threshold_mantissa)
        * ten.pow(U512::from(decimals as u32 + price_usd.scale()));
    lhs >= rhs
}
