use anyhow::Result;
use rust_decimal::Decimal;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::signature::{read_keypair_file, Signer};
use sonian_distributor::{
    payout_pool_units, payout::RpcLedger, DistributionOutcome, Distributor, PayoutOutcome,
    Settings,
};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let config_path = args
        .get(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));
    let run_once = args.iter().any(|a| a == "--once");

    let settings = Settings::load(&config_path)?;
    let authority = Arc::new(
        read_keypair_file(&settings.payout.keypair_path)
            .map_err(|e| anyhow::anyhow!("failed to read keypair: {e}"))?,
    );
    info!(authority = %authority.pubkey(), "distributor wallet loaded");

    let rpc = Arc::new(RpcClient::new_with_timeout_and_commitment(
        settings.network.rpc_url.clone(),
        settings.request_timeout(),
        settings.commitment(),
    ));

    // Default treasury source: the authority's associated account for the
    // payout mint, same as the original wallet setup.
    let source_account = match settings.source_account()? {
        Some(account) => account,
        None => spl_associated_token_account::get_associated_token_address(
            &authority.pubkey(),
            &settings.payout_mint()?,
        ),
    };
    info!(%source_account, "payout source account");

    let interval_secs = settings.cycle.interval_secs;
    let share_bps = settings.payout.share_bps;
    let payout_decimals = settings.payout.decimals;
    let distributor = Distributor::new(rpc, settings, authority, source_account)?;

    let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_cycle(&distributor, share_bps, payout_decimals).await;
                if run_once {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }
    Ok(())
}

/// One distribution cycle. The fee-pool USD total comes from the external
/// volume collector via the FEE_POOL_USD environment variable; converting it
/// and running the distribution is this binary's whole job.
async fn run_cycle(
    distributor: &Distributor<RpcLedger>,
    share_bps: u16,
    payout_decimals: u8,
) {
    let fee_pool_usd = match env::var("FEE_POOL_USD")
        .ok()
        .map(|raw| Decimal::from_str(&raw))
    {
        Some(Ok(value)) => value,
        Some(Err(e)) => {
            error!("FEE_POOL_USD is not a decimal: {e}");
            return;
        }
        None => {
            warn!("FEE_POOL_USD not set; skipping cycle");
            return;
        }
    };

    let total_payout = payout_pool_units(fee_pool_usd, share_bps, payout_decimals);
    info!(%fee_pool_usd, share_bps, total_payout, "starting distribution cycle");

    match distributor.run_distribution(total_payout).await {
        Ok(outcome) => log_outcome(&outcome),
        Err(e) => error!("distribution run aborted: {e}"),
    }
}

fn log_outcome(outcome: &DistributionOutcome) {
    let sent = outcome
        .results
        .iter()
        .filter(|r| matches!(r.outcome, PayoutOutcome::Sent(_)))
        .count();
    let failed = outcome.results.len() - sent;
    info!(
        allocations = outcome.allocations.len(),
        sent,
        failed,
        undistributed_remainder = outcome.undistributed_remainder,
        "distribution cycle complete"
    );
    for result in &outcome.results {
        if let PayoutOutcome::Failed(reason) = &result.outcome {
            warn!(recipient = %result.recipient, amount = result.amount, %reason, "payout failed");
        }
    }
}
