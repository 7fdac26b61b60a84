//! Proportional trading-fee distribution for SONIAN holders.
//!
//! One cycle: snapshot every holder of the eligibility token, filter by USD
//! value against a configured threshold (price from DexScreener), apportion
//! the distributable fee pool with the largest-remainder method, and pay
//! each share in the payout token, creating recipient token accounts
//! idempotently as needed.

pub mod allocation;
pub mod config;
pub mod distributor;
pub mod eligibility;
pub mod error;
pub mod oracle;
pub mod payout;
pub mod registry;

pub use allocation::{largest_remainder, payout_pool_units, Allocation, AllocationSet};
pub use config::Settings;
pub use distributor::{DistributionOutcome, Distributor};
pub use eligibility::{filter_eligible, EligibleHolder};
pub use error::{DistributionError, PayoutFailure};
pub use oracle::PriceOracle;
pub use payout::{PayoutExecutor, PayoutOutcome, PayoutParams, PayoutResult, TokenLedger};
pub use registry::{HolderRecord, HolderSnapshot, TokenMeta};
