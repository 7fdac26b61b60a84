use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub network: NetworkSettings,
    pub oracle: OracleSettings,
    pub eligibility: EligibilitySettings,
    pub payout: PayoutSettings,
    pub cycle: CycleSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    pub rpc_url: String,
    pub commitment: String,
    pub request_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleSettings {
    pub endpoint: String,
    pub pair_id: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilitySettings {
    /// Mint of the reward-eligibility token (SONIAN).
    pub token_mint: String,
    /// Minimum USD value of a holding to qualify for the reward share.
    pub threshold_usd: Decimal,
    /// Wallets or token accounts that never receive a share (pools, the
    /// treasury itself, program-owned accounts).
    pub excluded_addresses: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutSettings {
    /// Mint of the payout token (USDT).
    pub mint: String,
    pub decimals: u8,
    /// Share of the collected fee pool that is distributed, in basis points.
    pub share_bps: u16,
    pub keypair_path: String,
    /// Source token account holding the payout balance. When absent, the
    /// authority's associated token account for the payout mint is used.
    pub source_account: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleSettings {
    pub interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            network: NetworkSettings {
                rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
                commitment: "confirmed".to_string(),
                request_timeout_ms: 30_000,
                max_retries: 3,
                retry_delay_ms: 500,
            },
            oracle: OracleSettings {
                endpoint: "https://api.dexscreener.com/latest/dex/pairs/solana".to_string(),
                pair_id: "KpmMXpSzmtTxsdGyZZqZQXWvYSSEzbxzLyB3qcnRSoE".to_string(),
                timeout_ms: 5_000,
            },
            eligibility: EligibilitySettings {
                token_mint: String::new(),
                threshold_usd: Decimal::new(50, 0),
                excluded_addresses: Vec::new(),
            },
            payout: PayoutSettings {
                mint: "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB".to_string(),
                decimals: 6,
                share_bps: 5_000,
                keypair_path: "./distributor.json".to_string(),
                source_account: None,
            },
            cycle: CycleSettings { interval_secs: 3_600 },
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let mut settings: Settings =
            toml::from_str(&raw).context("failed to parse config file")?;
        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(rpc) = env::var("SOLANA_RPC_URL") {
            self.network.rpc_url = rpc;
        }
        if let Ok(path) = env::var("WALLET_KEYPAIR_PATH") {
            self.payout.keypair_path = path;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.network.rpc_url.starts_with("http") {
            bail!("network.rpc_url must be an http(s) endpoint");
        }
        Pubkey::from_str(&self.eligibility.token_mint)
            .context("eligibility.token_mint is not a valid address")?;
        Pubkey::from_str(&self.payout.mint).context("payout.mint is not a valid address")?;
        if let Some(source) = &self.payout.source_account {
            Pubkey::from_str(source).context("payout.source_account is not a valid address")?;
        }
        for addr in &self.eligibility.excluded_addresses {
            Pubkey::from_str(addr)
                .with_context(|| format!("excluded address {addr} is not valid"))?;
        }
        if self.eligibility.threshold_usd.is_sign_negative() {
            bail!("eligibility.threshold_usd must not be negative");
        }
        if self.payout.share_bps > 10_000 {
            bail!("payout.share_bps must not exceed 10000");
        }
        if self.payout.decimals > 12 {
            bail!("payout.decimals must not exceed 12");
        }
        if self.network.max_retries == 0 {
            bail!("network.max_retries must be at least 1");
        }
        Ok(())
    }

    pub fn eligibility_mint(&self) -> Result<Pubkey> {
        Pubkey::from_str(&self.eligibility.token_mint)
            .context("eligibility.token_mint is not a valid address")
    }

    pub fn payout_mint(&self) -> Result<Pubkey> {
        Pubkey::from_str(&self.payout.mint).context("payout.mint is not a valid address")
    }

    pub fn source_account(&self) -> Result<Option<Pubkey>> {
        self.payout
            .source_account
            .as_deref()
            .map(|s| Pubkey::from_str(s).context("payout.source_account is not a valid address"))
            .transpose()
    }

    pub fn excluded_set(&self) -> Result<HashSet<Pubkey>> {
        self.eligibility
            .excluded_addresses
            .iter()
            .map(|s| {
                Pubkey::from_str(s).with_context(|| format!("excluded address {s} is not valid"))
            })
            .collect()
    }

    pub fn commitment(&self) -> CommitmentConfig {
        match self.network.commitment.as_str() {
            "processed" => CommitmentConfig::processed(),
            "finalized" => CommitmentConfig::finalized(),
            _ => CommitmentConfig::confirmed(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.network.request_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.network.retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn valid_settings() -> Settings {
        let mut settings = Settings::default();
        settings.eligibility.token_mint = Pubkey::new_unique().to_string();
        settings
    }

    #[test]
    fn roundtrip_through_toml() {
        let settings = valid_settings();
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", toml::to_string(&settings).unwrap()).unwrap();

        let loaded = Settings::load(file.path()).unwrap();
        assert_eq!(loaded.payout.decimals, 6);
        assert_eq!(loaded.payout.share_bps, 5_000);
        assert_eq!(loaded.eligibility.threshold_usd, Decimal::new(50, 0));
    }

    #[test]
    fn env_var_overrides_rpc_url() {
        let settings = valid_settings();
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", toml::to_string(&settings).unwrap()).unwrap();

        env::set_var("SOLANA_RPC_URL", "https://rpc.example.org");
        let loaded = Settings::load(file.path()).unwrap();
        env::remove_var("SOLANA_RPC_URL");
        assert_eq!(loaded.network.rpc_url, "https://rpc.example.org");
    }

    #[test]
    fn rejects_bad_mint() {
        let mut settings = valid_settings();
        settings.eligibility.token_mint = "not-a-pubkey".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_share_over_100_percent() {
        let mut settings = valid_settings();
        settings.payout.share_bps = 10_001;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_negative_threshold() {
        let mut settings = valid_settings();
        settings.eligibility.threshold_usd = Decimal::new(-1, 0);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn excluded_set_matches_config() {
        let mut settings = valid_settings();
        let addr = Pubkey::new_unique();
        settings.eligibility.excluded_addresses = vec![addr.to_string()];
        assert!(settings.excluded_set().unwrap().contains(&addr));
    }
}
