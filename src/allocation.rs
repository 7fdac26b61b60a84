use ruint::aliases::U256;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;
use tracing::info;

use crate::eligibility::EligibleHolder;

/// One holder's share of a distribution run, in smallest units of the
/// payout token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub recipient: Pubkey,
    pub amount: u128,
}

/// Result of one allocation run. Always holds:
/// `sum(amount) + undistributed_remainder == total_payout`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationSet {
    pub allocations: Vec<Allocation>,
    pub undistributed_remainder: u128,
}

impl AllocationSet {
    fn nothing_to_distribute(total_payout: u128) -> Self {
        AllocationSet {
            allocations: Vec::new(),
            undistributed_remainder: total_payout,
        }
    }

    pub fn distributed_total(&self) -> u128 {
        self.allocations.iter().map(|a| a.amount).sum()
    }
}

/// Converts the distributable share of a USD fee pool into smallest units of
/// the payout token, flooring. `share_bps` is the distributed fraction in
/// basis points (5000 = 50% of collected fees).
pub fn payout_pool_units(fee_pool_usd: Decimal, share_bps: u16, payout_decimals: u8) -> u128 {
    if fee_pool_usd <= Decimal::ZERO || share_bps == 0 {
        return 0;
    }
    let share = fee_pool_usd * Decimal::from(share_bps) / Decimal::from(10_000u32);
    let scaled = share * Decimal::from(10u64.pow(payout_decimals as u32));
    scaled.trunc().to_u128().unwrap_or(0)
}

/// Largest-remainder (Hare quota) apportionment.
///
/// Every holder gets the floor of their exact proportional share; the units
/// lost to flooring (always fewer than the number of holders) go one each to
/// the holders with the largest division remainders, ties broken by
/// encounter order. Identical inputs always produce identical outputs, and
/// the amounts sum to `total_payout` exactly whenever any holder has a
/// non-zero balance.
///
/// Zero-amount allocations are kept in the output for auditability; the
/// executor's caller drops them before submission.
pub fn largest_remainder(holders: &[EligibleHolder], total_payout: u128) -> AllocationSet {
    if total_payout == 0 || holders.is_empty() {
        return AllocationSet::nothing_to_distribute(total_payout);
    }

    let total_balance = holders
        .iter()
        .fold(U256::ZERO, |acc, h| acc + U256::from(h.raw_balance));
    if total_balance.is_zero() {
        // All eligible balances are zero: a valid "nothing to distribute"
        // outcome, not a division error.
        return AllocationSet::nothing_to_distribute(total_payout);
    }

    // Floor shares with 256-bit intermediates; u128 * u128 cannot overflow.
    let payout = U256::from(total_payout);
    let mut amounts = Vec::with_capacity(holders.len());
    let mut remainders = Vec::with_capacity(holders.len());
    let mut allocated: u128 = 0;
    for holder in holders {
        let numerator = U256::from(holder.raw_balance) * payout;
        let base = (numerator / total_balance).to::<u128>();
        remainders.push(numerator % total_balance);
        amounts.push(base);
        allocated += base;
    }

    // Hand the flooring leftover to the largest remainders. The sort is
    // stable, so equal remainders resolve by encounter order.
    let leftover = total_payout - allocated;
    let mut order: Vec<usize> = (0..holders.len()).collect();
    order.sort_by(|&a, &b| remainders[b].cmp(&remainders[a]));
    for &idx in order.iter().take(leftover as usize) {
        amounts[idx] += 1;
    }

    let allocations: Vec<Allocation> = holders
        .iter()
        .zip(amounts)
        .map(|(holder, amount)| Allocation {
            recipient: holder.owner,
            amount,
        })
        .collect();

    info!(
        holders = allocations.len(),
        total_payout,
        leftover_redistributed = leftover,
        "allocation complete"
    );
    AllocationSet {
        allocations,
        undistributed_remainder: 0,
    }
}
