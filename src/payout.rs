use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    instruction::{Instruction, InstructionError},
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::{Transaction, TransactionError},
};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::allocation::Allocation;
use crate::error::{DistributionError, PayoutFailure};

/// Minimal ledger surface the executor needs. The production implementation
/// wraps the nonblocking RPC client; tests substitute an in-memory ledger.
#[async_trait]
pub trait TokenLedger: Send + Sync {
    async fn token_account_balance(&self, account: &Pubkey) -> Result<u128, DistributionError>;

    /// Signs with `payer` and submits one transaction. Implementations must
    /// classify on-chain insufficient-funds distinctly from transient
    /// submission errors.
    async fn submit(
        &self,
        instructions: &[Instruction],
        payer: &Keypair,
    ) -> Result<Signature, PayoutFailure>;
}

pub struct RpcLedger {
    rpc: Arc<RpcClient>,
}

impl RpcLedger {
    pub fn new(rpc: Arc<RpcClient>) -> Self {
        RpcLedger { rpc }
    }
}

#[async_trait]
impl TokenLedger for RpcLedger {
    async fn token_account_balance(&self, account: &Pubkey) -> Result<u128, DistributionError> {
        let balance = self
            .rpc
            .get_token_account_balance(account)
            .await
            .map_err(|source| DistributionError::TreasuryUnavailable {
                account: *account,
                source,
            })?;
        balance
            .amount
            .parse::<u128>()
            .map_err(|e| DistributionError::InvalidConfig(format!(
                "unparseable balance for {account}: {e}"
            )))
    }

    async fn submit(
        &self,
        instructions: &[Instruction],
        payer: &Keypair,
    ) -> Result<Signature, PayoutFailure> {
        let blockhash = self
            .rpc
            .get_latest_blockhash()
            .await
            .map_err(|e| PayoutFailure::Submission(e.to_string()))?;
        let tx = Transaction::new_signed_with_payer(
            instructions,
            Some(&payer.pubkey()),
            &[payer],
            blockhash,
        );
        self.rpc
            .send_and_confirm_transaction(&tx)
            .await
            .map_err(|e| {
                // SPL token error code 1 is InsufficientFunds; surfacing it
                // separately lets the executor stop the batch instead of
                // burning fees on transfers that can no longer succeed.
                match e.get_transaction_error() {
                    Some(TransactionError::InstructionError(_, InstructionError::Custom(1))) => {
                        PayoutFailure::InsufficientFunds(e.to_string())
                    }
                    _ => PayoutFailure::Submission(e.to_string()),
                }
            })
    }
}

#[derive(Debug, Clone)]
pub enum PayoutOutcome {
    Sent(Signature),
    Failed(PayoutFailure),
}

#[derive(Debug, Clone)]
pub struct PayoutResult {
    pub recipient: Pubkey,
    pub amount: u128,
    pub outcome: PayoutOutcome,
}

#[derive(Debug, Clone)]
pub struct PayoutParams {
    pub payout_mint: Pubkey,
    pub payout_decimals: u8,
    pub source_account: Pubkey,
}

pub struct PayoutExecutor<L: TokenLedger> {
    ledger: L,
    params: PayoutParams,
    authority: Arc<Keypair>,
}

impl<L: TokenLedger> PayoutExecutor<L> {
    pub fn new(ledger: L, params: PayoutParams, authority: Arc<Keypair>) -> Self {
        PayoutExecutor {
            ledger,
            params,
            authority,
        }
    }

    /// Pays each allocation from the source account, strictly sequentially
    /// (one source account, one signer; concurrent submissions would race on
    /// its balance and blockhash handling).
    ///
    /// The whole batch is aborted before any transfer when the treasury
    /// cannot cover `sum(amount)`. After that, one recipient's failure does
    /// not stop the rest, except on-chain insufficient funds, which stops
    /// further submissions and returns the partial result list.
    pub async fn execute(
        &self,
        allocations: &[Allocation],
    ) -> Result<Vec<PayoutResult>, DistributionError> {
        let required = allocations
            .iter()
            .try_fold(0u128, |acc, a| acc.checked_add(a.amount))
            .ok_or(DistributionError::AmountOverflow)?;
        if required == 0 {
            return Ok(Vec::new());
        }

        let available = self
            .ledger
            .token_account_balance(&self.params.source_account)
            .await?;
        if available < required {
            return Err(DistributionError::InsufficientTreasuryBalance {
                available,
                required,
            });
        }
        info!(required, available, recipients = allocations.len(), "starting payout batch");

        let mut results = Vec::with_capacity(allocations.len());
        for allocation in allocations {
            let outcome = self.pay_one(allocation).await;
            let fatal = matches!(
                &outcome,
                PayoutOutcome::Failed(failure) if failure.is_fatal_for_run()
            );
            results.push(PayoutResult {
                recipient: allocation.recipient,
                amount: allocation.amount,
                outcome,
            });
            if fatal {
                error!(
                    recipient = %allocation.recipient,
                    "treasury out of funds mid-batch; halting further submissions"
                );
                break;
            }
        }
        Ok(results)
    }

    async fn pay_one(&self, allocation: &Allocation) -> PayoutOutcome {
        let instructions = match self.build_transfer(allocation) {
            Ok(instructions) => instructions,
            Err(failure) => {
                warn!(recipient = %allocation.recipient, %failure, "skipping recipient");
                return PayoutOutcome::Failed(failure);
            }
        };
        match self.ledger.submit(&instructions, &self.authority).await {
            Ok(signature) => {
                info!(
                    recipient = %allocation.recipient,
                    amount = allocation.amount,
                    %signature,
                    "reward sent"
                );
                PayoutOutcome::Sent(signature)
            }
            Err(failure) => {
                warn!(recipient = %allocation.recipient, %failure, "transfer failed");
                PayoutOutcome::Failed(failure)
            }
        }
    }

    /// Builds the per-recipient transaction body: an idempotent associated
    /// token account creation (no-op if the account exists by the time the
    /// transaction lands, which covers concurrent batches), then a checked
    /// transfer that asserts the payout mint's decimals.
    fn build_transfer(&self, allocation: &Allocation) -> Result<Vec<Instruction>, PayoutFailure> {
        let amount = u64::try_from(allocation.amount)
            .map_err(|_| PayoutFailure::AmountTooLarge(allocation.amount))?;
        let authority = self.authority.pubkey();
        let recipient_ata = spl_associated_token_account::get_associated_token_address(
            &allocation.recipient,
            &self.params.payout_mint,
        );
        let create_ata =
            spl_associated_token_account::instruction::create_associated_token_account_idempotent(
                &authority,
                &allocation.recipient,
                &self.params.payout_mint,
                &spl_token::id(),
            );
        let transfer = spl_token::instruction::transfer_checked(
            &spl_token::id(),
            &self.params.source_account,
            &self.params.payout_mint,
            &recipient_ata,
            &authority,
            &[],
            amount,
            self.params.payout_decimals,
        )
        .map_err(|e| PayoutFailure::InstructionBuild(e.to_string()))?;
        Ok(vec![create_ata, transfer])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MockLedger {
        balance: u128,
        failures: HashMap<Pubkey, PayoutFailure>,
        submitted: Mutex<Vec<Vec<Instruction>>>,
    }

    impl MockLedger {
        fn new(balance: u128) -> Self {
            MockLedger {
                balance,
                failures: HashMap::new(),
                submitted: Mutex::new(Vec::new()),
            }
        }

        fn failing(mut self, recipient: Pubkey, failure: PayoutFailure) -> Self {
            self.failures.insert(recipient, failure);
            self
        }

        fn submissions(&self) -> usize {
            self.submitted.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl<'a> TokenLedger for &'a MockLedger {
        async fn token_account_balance(
            &self,
            _account: &Pubkey,
        ) -> Result<u128, DistributionError> {
            Ok(self.balance)
        }

        async fn submit(
            &self,
            instructions: &[Instruction],
            _payer: &Keypair,
        ) -> Result<Signature, PayoutFailure> {
            // The transfer instruction names the recipient ATA; key mock
            // failures off the wallet by checking the create-ATA accounts.
            let wallet = instructions[0].accounts[2].pubkey;
            if let Some(failure) = self.failures.get(&wallet) {
                return Err(failure.clone());
            }
            self.submitted.lock().unwrap().push(instructions.to_vec());
            Ok(Signature::new_unique())
        }
    }

    fn params() -> PayoutParams {
        PayoutParams {
            payout_mint: Pubkey::new_unique(),
            payout_decimals: 6,
            source_account: Pubkey::new_unique(),
        }
    }

    fn alloc(amount: u128) -> Allocation {
        Allocation {
            recipient: Pubkey::new_unique(),
            amount,
        }
    }

    #[tokio::test]
    async fn short_treasury_aborts_before_any_transfer() {
        let ledger = MockLedger::new(999);
        let executor = PayoutExecutor::new(&ledger, params(), Arc::new(Keypair::new()));

        let err = executor
            .execute(&[alloc(400), alloc(600)])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DistributionError::InsufficientTreasuryBalance {
                available: 999,
                required: 1000,
            }
        ));
        assert_eq!(ledger.submissions(), 0);
    }

    #[tokio::test]
    async fn pays_every_recipient_and_reports_signatures() {
        let ledger = MockLedger::new(1_000);
        let executor = PayoutExecutor::new(&ledger, params(), Arc::new(Keypair::new()));

        let results = executor.execute(&[alloc(400), alloc(600)]).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results
            .iter()
            .all(|r| matches!(r.outcome, PayoutOutcome::Sent(_))));
        assert_eq!(ledger.submissions(), 2);
    }

    #[tokio::test]
    async fn transient_failure_does_not_stop_the_batch() {
        let allocations = [alloc(100), alloc(200), alloc(300)];
        let ledger = MockLedger::new(1_000).failing(
            allocations[1].recipient,
            PayoutFailure::Submission("connection reset".into()),
        );
        let executor = PayoutExecutor::new(&ledger, params(), Arc::new(Keypair::new()));

        let results = executor.execute(&allocations).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(matches!(results[0].outcome, PayoutOutcome::Sent(_)));
        assert!(matches!(
            results[1].outcome,
            PayoutOutcome::Failed(PayoutFailure::Submission(_))
        ));
        assert!(matches!(results[2].outcome, PayoutOutcome::Sent(_)));
    }

    #[tokio::test]
    async fn onchain_insufficient_funds_halts_remaining_submissions() {
        let allocations = [alloc(100), alloc(200), alloc(300)];
        let ledger = MockLedger::new(1_000).failing(
            allocations[1].recipient,
            PayoutFailure::InsufficientFunds("custom program error: 0x1".into()),
        );
        let executor = PayoutExecutor::new(&ledger, params(), Arc::new(Keypair::new()));

        let results = executor.execute(&allocations).await.unwrap();
        assert_eq!(results.len(), 2, "third recipient must never be attempted");
        assert!(matches!(
            results[1].outcome,
            PayoutOutcome::Failed(PayoutFailure::InsufficientFunds(_))
        ));
        assert_eq!(ledger.submissions(), 1);
    }

    #[tokio::test]
    async fn oversized_amount_fails_only_that_recipient() {
        let allocations = [alloc(u64::MAX as u128 + 1), alloc(10)];
        let ledger = MockLedger::new(u128::MAX);
        let executor = PayoutExecutor::new(&ledger, params(), Arc::new(Keypair::new()));

        let results = executor.execute(&allocations).await.unwrap();
        assert!(matches!(
            results[0].outcome,
            PayoutOutcome::Failed(PayoutFailure::AmountTooLarge(_))
        ));
        assert!(matches!(results[1].outcome, PayoutOutcome::Sent(_)));
        assert_eq!(ledger.submissions(), 1);
    }

    #[tokio::test]
    async fn builds_idempotent_create_then_checked_transfer() {
        let ledger = MockLedger::new(1_000);
        let p = params();
        let executor = PayoutExecutor::new(&ledger, p.clone(), Arc::new(Keypair::new()));

        executor.execute(&[alloc(42)]).await.unwrap();
        let submitted = ledger.submitted.lock().unwrap();
        let instructions = &submitted[0];
        assert_eq!(instructions.len(), 2);
        assert_eq!(instructions[0].program_id, spl_associated_token_account::id());
        assert_eq!(instructions[1].program_id, spl_token::id());
        // TransferChecked account order: source, mint, destination, authority.
        assert_eq!(instructions[1].accounts[0].pubkey, p.source_account);
        assert_eq!(instructions[1].accounts[1].pubkey, p.payout_mint);
    }

    #[tokio::test]
    async fn empty_batch_submits_nothing() {
        let ledger = MockLedger::new(0);
        let executor = PayoutExecutor::new(&ledger, params(), Arc::new(Keypair::new()));
        let results = executor.execute(&[]).await.unwrap();
        assert!(results.is_empty());
        assert_eq!(ledger.submissions(), 0);
    }
}
