use solana_account_decoder::UiAccountEncoding;
use solana_client::{
    nonblocking::rpc_client::RpcClient,
    rpc_config::{RpcAccountInfoConfig, RpcProgramAccountsConfig},
    rpc_filter::{Memcmp, RpcFilterType},
};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::program_pack::Pack;
use solana_sdk::pubkey::Pubkey;
use spl_token::state::{Account as TokenAccount, Mint};
use tracing::{debug, info, warn};

use crate::error::DistributionError;

/// One token account holding the eligibility token, observed at read time.
/// Balances are in smallest units; zero-balance accounts are never emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolderRecord {
    pub token_account: Pubkey,
    pub owner: Pubkey,
    pub raw_balance: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenMeta {
    pub decimals: u8,
    pub total_observed_supply: u128,
}

#[derive(Debug, Clone)]
pub struct HolderSnapshot {
    pub records: Vec<HolderRecord>,
    pub meta: TokenMeta,
}

/// Fetches every token account of `mint` and the mint's decimals.
///
/// Accounts that fail to unpack are skipped with a warning; an RPC failure
/// is fatal and surfaces as `RegistryUnavailable`. Read-only.
pub async fn fetch_holders(
    rpc: &RpcClient,
    mint: &Pubkey,
    commitment: CommitmentConfig,
) -> Result<HolderSnapshot, DistributionError> {
    let decimals = fetch_mint_decimals(rpc, mint).await?;

    let filters = vec![
        RpcFilterType::DataSize(TokenAccount::LEN as u64),
        RpcFilterType::Memcmp(Memcmp::new_base58_encoded(0, &mint.to_bytes())),
    ];
    let config = RpcProgramAccountsConfig {
        filters: Some(filters),
        account_config: RpcAccountInfoConfig {
            encoding: Some(UiAccountEncoding::Base64),
            commitment: Some(commitment),
            ..RpcAccountInfoConfig::default()
        },
        ..RpcProgramAccountsConfig::default()
    };

    let accounts = rpc
        .get_program_accounts_with_config(&spl_token::id(), config)
        .await
        .map_err(DistributionError::RegistryUnavailable)?;

    let mut records = Vec::with_capacity(accounts.len());
    let mut total: u128 = 0;
    for (pubkey, account) in &accounts {
        match decode_holder(pubkey, &account.data) {
            Ok(Some(record)) => {
                total = total.saturating_add(record.raw_balance);
                records.push(record);
            }
            Ok(None) => debug!(account = %pubkey, "skipping zero-balance account"),
            Err(reason) => warn!(account = %pubkey, %reason, "skipping malformed token account"),
        }
    }

    info!(
        mint = %mint,
        accounts = accounts.len(),
        holders = records.len(),
        decimals,
        supply = total,
        "holder snapshot complete"
    );

    Ok(HolderSnapshot {
        records,
        meta: TokenMeta {
            decimals,
            total_observed_supply: total,
        },
    })
}

async fn fetch_mint_decimals(
    rpc: &RpcClient,
    mint: &Pubkey,
) -> Result<u8, DistributionError> {
    let account = rpc
        .get_account(mint)
        .await
        .map_err(DistributionError::RegistryUnavailable)?;
    if account.owner != spl_token::id() {
        return Err(DistributionError::MalformedMint {
            account: *mint,
            reason: "not owned by the SPL token program".to_string(),
        });
    }
    let state = Mint::unpack(&account.data).map_err(|e| DistributionError::MalformedMint {
        account: *mint,
        reason: e.to_string(),
    })?;
    Ok(state.decimals)
}

/// Decodes one raw SPL token account. Returns `None` for zero balances and
/// an error string for undecodable data (the caller skips those).
fn decode_holder(pubkey: &Pubkey, data: &[u8]) -> Result<Option<HolderRecord>, String> {
    let account = TokenAccount::unpack(data).map_err(|e| e.to_string())?;
    if account.amount == 0 {
        return Ok(None);
    }
    Ok(Some(HolderRecord {
        token_account: *pubkey,
        owner: account.owner,
        raw_balance: account.amount as u128,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use spl_token::state::AccountState;

    fn packed_account(owner: Pubkey, mint: Pubkey, amount: u64) -> Vec<u8> {
        let account = TokenAccount {
            mint,
            owner,
            amount,
            state: AccountState::Initialized,
            ..TokenAccount::default()
        };
        let mut buf = vec![0u8; TokenAccount::LEN];
        TokenAccount::pack(account, &mut buf).unwrap();
        buf
    }

    #[test]
    fn decodes_funded_account() {
        let owner = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let token_account = Pubkey::new_unique();
        let data = packed_account(owner, mint, 1_234);

        let record = decode_holder(&token_account, &data).unwrap().unwrap();
        assert_eq!(record.owner, owner);
        assert_eq!(record.token_account, token_account);
        assert_eq!(record.raw_balance, 1_234);
    }

    #[test]
    fn drops_zero_balance_account() {
        let data = packed_account(Pubkey::new_unique(), Pubkey::new_unique(), 0);
        assert!(decode_holder(&Pubkey::new_unique(), &data).unwrap().is_none());
    }

    #[test]
    fn rejects_garbage_data() {
        assert!(decode_holder(&Pubkey::new_unique(), &[0u8; 7]).is_err());
    }

    #[test]
    fn rejects_uninitialized_account() {
        // All-zero bytes parse as an uninitialized account, which unpack refuses.
        let data = vec![0u8; TokenAccount::LEN];
        assert!(decode_holder(&Pubkey::new_unique(), &data).is_err());
    }
}
