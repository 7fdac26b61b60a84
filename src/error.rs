use solana_client::client_error::ClientError;
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

/// Computation-stage failures. Any of these aborts the run before a single
/// transfer is attempted; execution-stage failures are collected per
/// recipient as [`PayoutFailure`] instead.
#[derive(Debug, Error)]
pub enum DistributionError {
    #[error("holder registry unavailable: {0}")]
    RegistryUnavailable(#[source] ClientError),

    #[error("token account {account} has unexpected data: {reason}")]
    MalformedMint { account: Pubkey, reason: String },

    #[error("could not read treasury balance of {account}: {source}")]
    TreasuryUnavailable {
        account: Pubkey,
        #[source]
        source: ClientError,
    },

    #[error("insufficient treasury balance: have {available}, need {required}")]
    InsufficientTreasuryBalance { available: u128, required: u128 },

    #[error("requested payout overflows the batch total")]
    AmountOverflow,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Per-recipient payout failures. `InsufficientFunds` is fatal for the whole
/// run (no further submissions are issued); the others only affect the one
/// recipient they are reported for.
#[derive(Debug, Clone, Error)]
pub enum PayoutFailure {
    /// Network or RPC submission error. Transient; the caller may retry this
    /// recipient in a later batch.
    #[error("submission failed: {0}")]
    Submission(String),

    /// The source account ran out of funds at submission time.
    #[error("source account out of funds at submission: {0}")]
    InsufficientFunds(String),

    /// The transfer instruction could not be built for this recipient.
    #[error("could not build transfer: {0}")]
    InstructionBuild(String),

    /// The allocation does not fit the ledger's 64-bit transfer width.
    #[error("amount {0} exceeds the ledger transfer width")]
    AmountTooLarge(u128),
}

impl PayoutFailure {
    /// True when this failure must stop the remainder of the batch.
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(self, PayoutFailure::InsufficientFunds(_))
    }
}
