use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::allocation::{self, Allocation, AllocationSet};
use crate::config::Settings;
use crate::eligibility;
use crate::error::DistributionError;
use crate::oracle::PriceOracle;
use crate::payout::{PayoutExecutor, PayoutParams, PayoutResult, RpcLedger, TokenLedger};
use crate::registry::{self, HolderSnapshot};

/// Aggregate result of one distribution run. Conservation holds across the
/// whole struct: distributed amounts plus `undistributed_remainder` equal
/// the requested payout.
#[derive(Debug)]
pub struct DistributionOutcome {
    pub allocations: Vec<Allocation>,
    pub results: Vec<PayoutResult>,
    pub undistributed_remainder: u128,
}

pub struct Distributor<L: TokenLedger> {
    rpc: Arc<RpcClient>,
    oracle: PriceOracle,
    executor: PayoutExecutor<L>,
    eligibility_mint: Pubkey,
    excluded: HashSet<Pubkey>,
    settings: Settings,
}

impl Distributor<RpcLedger> {
    pub fn new(
        rpc: Arc<RpcClient>,
        settings: Settings,
        authority: Arc<Keypair>,
        source_account: Pubkey,
    ) -> Result<Self, DistributionError> {
        let eligibility_mint = settings
            .eligibility_mint()
            .map_err(|e| DistributionError::InvalidConfig(e.to_string()))?;
        let payout_mint = settings
            .payout_mint()
            .map_err(|e| DistributionError::InvalidConfig(e.to_string()))?;
        let excluded = settings
            .excluded_set()
            .map_err(|e| DistributionError::InvalidConfig(e.to_string()))?;
        let params = PayoutParams {
            payout_mint,
            payout_decimals: settings.payout.decimals,
            source_account,
        };
        let executor = PayoutExecutor::new(RpcLedger::new(rpc.clone()), params, authority);
        Ok(Distributor {
            rpc,
            oracle: PriceOracle::new(&settings.oracle),
            executor,
            eligibility_mint,
            excluded,
            settings,
        })
    }
}

impl<L: TokenLedger> Distributor<L> {
    /// Runs one full distribution cycle for `total_payout` smallest units of
    /// the payout token.
    ///
    /// Computation-stage failures (registry, treasury read) abort before any
    /// funds move; per-recipient execution failures are collected in
    /// `results`. An unavailable price or an empty eligible set is a valid
    /// "nothing to distribute" outcome, not an error.
    pub async fn run_distribution(
        &self,
        total_payout: u128,
    ) -> Result<DistributionOutcome, DistributionError> {
        if total_payout == 0 {
            info!("requested payout is zero; nothing to distribute");
            return Ok(DistributionOutcome {
                allocations: Vec::new(),
                results: Vec::new(),
                undistributed_remainder: 0,
            });
        }

        // The registry read and the price fetch are independent and
        // read-only, so they run concurrently. Each carries its own bounded
        // retry.
        let retries = self.settings.network.max_retries;
        let delay = self.settings.retry_delay();
        let (snapshot, price) = tokio::join!(
            self.fetch_holders_with_retry(retries, delay),
            self.oracle.price_usd(retries, delay),
        );
        let snapshot = snapshot?;

        let eligible = eligibility::filter_eligible(
            &snapshot.records,
            snapshot.meta.decimals,
            price,
            self.settings.eligibility.threshold_usd,
            &self.excluded,
        );
        let AllocationSet {
            allocations,
            undistributed_remainder,
        } = allocation::largest_remainder(&eligible, total_payout);

        // Zero allocations are kept for the audit trail but never submitted.
        let to_pay: Vec<Allocation> = allocations
            .iter()
            .filter(|a| a.amount > 0)
            .cloned()
            .collect();
        let results = if to_pay.is_empty() {
            info!("no payable allocations this run");
            Vec::new()
        } else {
            self.executor.execute(&to_pay).await?
        };

        Ok(DistributionOutcome {
            allocations,
            results,
            undistributed_remainder,
        })
    }

    async fn fetch_holders_with_retry(
        &self,
        max_attempts: u32,
        base_delay: Duration,
    ) -> Result<HolderSnapshot, DistributionError> {
        let mut delay = base_delay;
        let mut last_err = None;
        for attempt in 1..=max_attempts.max(1) {
            match registry::fetch_holders(
                &self.rpc,
                &self.eligibility_mint,
                self.settings.commitment(),
            )
            .await
            {
                Ok(snapshot) => return Ok(snapshot),
                Err(err @ DistributionError::RegistryUnavailable(_)) => {
                    warn!(attempt, %err, "holder registry read failed");
                    last_err = Some(err);
                    if attempt < max_attempts {
                        sleep(delay).await;
                        delay = delay.saturating_mul(2);
                    }
                }
                // Anything other than an RPC failure will not heal on retry.
                Err(err) => return Err(err),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            DistributionError::InvalidConfig("retry loop ran zero attempts".to_string())
        }))
    }
}
