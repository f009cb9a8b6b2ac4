// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use promo_core::chain::{ChainFamily, ChainId, EvmNetwork, detect_family};
use promo_core::fee_schedule::FeeSchedule;
use promo_core::money::{AMOUNT_TOLERANCE, Money};
use promo_core::promotion::{PromotionKind, Tier};
use promo_core::records::{ActivatedPromotion, NewPendingPayment, PendingPayment};
use tracing::{error, info, warn};

use super::activation::{Purchase, ledger_record, plan_activation};
use super::error::ReconcileError;
use super::types::{
    AutoDetectRequest, InstructionRequest, PaymentInstructions, Reconciled, ReconciliationResult,
};
use crate::storage::{CommitError, Storage};
use crate::verifier::{TransactionVerifier, VerifiedTransfer};

pub type Clock = Arc<dyn Fn() -> SystemTime + Send + Sync>;

/// Rematch rounds for a blind payment whose chosen intent was taken concurrently.
const MATCH_ATTEMPTS: u32 = 8;

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub pending_ttl: Duration,
    /// Payment address per enabled chain.
    pub recipients: BTreeMap<ChainId, String>,
}

/// Orchestrates verification and crediting. Cheap to clone; clones share the
/// store and adapters.
///
/// Store calls run on the blocking pool and hold the store mutex only for the
/// duration of one synchronous SQLite operation, never across an `.await`.
#[derive(Clone)]
pub struct Reconciler {
    fees: Arc<FeeSchedule>,
    verifier: TransactionVerifier,
    storage: Arc<Mutex<Storage>>,
    config: Arc<ReconcilerConfig>,
    clock: Clock,
}

impl Reconciler {
    pub fn new(
        fees: FeeSchedule,
        verifier: TransactionVerifier,
        storage: Storage,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            fees: Arc::new(fees),
            verifier,
            storage: Arc::new(Mutex::new(storage)),
            config: Arc::new(config),
            clock: Arc::new(SystemTime::now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn fee_schedule(&self) -> &FeeSchedule {
        &self.fees
    }

    /// Chains with both an adapter and a payment address.
    pub fn enabled_chains(&self) -> Vec<ChainId> {
        self.verifier
            .adapters()
            .chains()
            .filter(|chain| self.config.recipients.contains_key(chain))
            .collect()
    }

    /// Creates a pending payment and returns what the user must send. No chain access.
    pub async fn generate_instructions(
        &self,
        request: InstructionRequest,
    ) -> Result<PaymentInstructions, ReconcileError> {
        if request.user_id.trim().is_empty() || request.target.trim().is_empty() {
            return Err(ReconcileError::InvalidOffer(
                "user id and target must not be empty".to_string(),
            ));
        }
        let recipient = self.recipient(request.chain)?.to_string();
        let amount = self
            .fees
            .quote(request.chain, request.kind, request.duration, request.tier)
            .map_err(|err| ReconcileError::InvalidOffer(err.to_string()))?;

        let now = self.now();
        let new = NewPendingPayment {
            user_id: request.user_id,
            chain: request.chain,
            target: request.target,
            kind: request.kind,
            duration: request.duration,
            tier: request.tier,
            expected_amount: amount,
            created_at: now,
            expires_at: now + self.config.pending_ttl,
        };
        let pending = self
            .with_storage(move |storage| storage.create_pending_payment(&new).map_err(internal))
            .await?;

        info!(
            pending_payment_id = pending.id,
            user_id = %pending.user_id,
            chain = %pending.chain,
            kind = %pending.kind,
            duration = %pending.duration,
            amount = %pending.expected_amount,
            "payment instructions issued"
        );
        Ok(PaymentInstructions {
            pending_payment_id: pending.id,
            chain: pending.chain,
            recipient_address: recipient,
            amount: pending.expected_amount,
            human_readable_amount: pending.expected_amount.to_string(),
            expires_at: pending.expires_at,
        })
    }

    /// Blind mode: only a transaction id is known. The observed amount selects the
    /// user's oldest matching open intent on the detected chain.
    pub async fn validate_user_transaction(
        &self,
        user_id: &str,
        tx_id: &str,
    ) -> ReconciliationResult {
        let result = self.validate_inner(user_id, tx_id).await;
        log_outcome("validate", user_id, tx_id, &result);
        result
    }

    /// Directed mode: the caller names the intent being paid.
    pub async fn process_directed_payment(
        &self,
        pending_payment_id: i64,
        tx_id: &str,
    ) -> ReconciliationResult {
        let result = self.directed_inner(pending_payment_id, tx_id).await;
        log_outcome("directed", &pending_payment_id.to_string(), tx_id, &result);
        result
    }

    /// No prior intent: the duration is the unique one whose quote equals the
    /// observed amount exactly.
    pub async fn process_auto_detected_payment(
        &self,
        request: AutoDetectRequest,
    ) -> ReconciliationResult {
        let user_id = request.user_id.clone();
        let tx_id = request.tx_id.clone();
        let result = self.auto_detect_inner(request).await;
        log_outcome("auto_detect", &user_id, &tx_id, &result);
        result
    }

    pub async fn active_promotions(
        &self,
        target: &str,
        kind: Option<PromotionKind>,
    ) -> Result<Vec<ActivatedPromotion>, ReconcileError> {
        let target = target.to_string();
        let now = self.now();
        self.with_storage(move |storage| {
            storage
                .active_promotions(&target, kind, now)
                .map_err(internal)
        })
        .await
    }

    pub async fn pending_payment(&self, id: i64) -> Result<Option<PendingPayment>, ReconcileError> {
        self.with_storage(move |storage| storage.pending_payment(id).map_err(internal))
            .await
    }

    async fn validate_inner(&self, user_id: &str, tx_id: &str) -> ReconciliationResult {
        let transfer = self.observe(tx_id).await?;
        let key = transfer.chain.qualified_tx_id(tx_id);
        self.ensure_not_processed(&key, user_id).await?;

        // Matching runs outside the commit transaction, so a concurrent payment
        // can take the chosen intent first. Each lost race consumed one intent.
        for attempt in 1..=MATCH_ATTEMPTS {
            let owner = user_id.to_string();
            let chain = transfer.chain;
            let amount = transfer.amount.base_units;
            let now = self.now();
            let matched = self
                .with_storage(move |storage| {
                    storage
                        .find_match(&owner, chain, amount, AMOUNT_TOLERANCE, now)
                        .map_err(internal)
                })
                .await?;

            let Some(pending) = matched else {
                // A concurrent duplicate may have consumed the intent since the first check.
                self.ensure_not_processed(&key, user_id).await?;
                return Err(self.diagnose_unmatched(user_id, transfer.amount, now).await?);
            };

            let purchase = purchase_for(&pending);
            match self
                .commit(purchase, transfer.clone(), key.clone(), Some(pending.id))
                .await
            {
                Err(ReconcileError::PendingPaymentAlreadyMatched(id)) => {
                    warn!(
                        tx_key = %key,
                        pending_payment_id = id,
                        attempt,
                        "matched payment request taken concurrently; rematching"
                    );
                }
                outcome => return outcome,
            }
        }

        Err(ReconcileError::Internal(format!(
            "payment requests kept changing while matching {key}"
        )))
    }

    async fn directed_inner(&self, pending_payment_id: i64, tx_id: &str) -> ReconciliationResult {
        let pending = self
            .pending_payment(pending_payment_id)
            .await?
            .ok_or(ReconcileError::UnknownPendingPayment(pending_payment_id))?;

        let family = detect_family(tx_id)?;
        if family != pending.chain.family() {
            return Err(ReconcileError::InvalidTransaction(format!(
                "transaction id is not a {} transaction",
                pending.chain
            )));
        }
        let key = pending.chain.qualified_tx_id(tx_id);

        if let Some(matched) = &pending.matched_tx_id {
            return Err(if *matched == key {
                ReconcileError::AlreadyProcessed {
                    key,
                    credited_to_caller: true,
                }
            } else {
                ReconcileError::PendingPaymentAlreadyMatched(pending.id)
            });
        }
        if !pending.is_open_at(self.now()) {
            return Err(ReconcileError::PendingPaymentExpired(pending.id));
        }
        self.ensure_not_processed(&key, &pending.user_id).await?;

        let expected = self
            .fees
            .quote(pending.chain, pending.kind, pending.duration, pending.tier)
            .map_err(|err| ReconcileError::InvalidOffer(err.to_string()))?;
        let recipient = self.recipient(pending.chain)?;
        let transfer = self
            .verifier
            .verify(pending.chain, tx_id.trim(), recipient, Some(&expected))
            .await?;

        let purchase = purchase_for(&pending);
        self.commit(purchase, transfer, key, Some(pending.id)).await
    }

    async fn auto_detect_inner(&self, request: AutoDetectRequest) -> ReconciliationResult {
        if request.user_id.trim().is_empty() || request.target.trim().is_empty() {
            return Err(ReconcileError::InvalidOffer(
                "user id and target must not be empty".to_string(),
            ));
        }
        let transfer = self.observe(&request.tx_id).await?;
        let chain = transfer.chain;
        let key = chain.qualified_tx_id(&request.tx_id);
        self.ensure_not_processed(&key, &request.user_id).await?;

        let duration = self
            .fees
            .reverse_lookup(chain, request.kind, request.tier, transfer.amount.base_units)
            .ok_or_else(|| ReconcileError::UnknownDuration {
                observed: transfer.amount,
                valid_amounts: self.fees.valid_amounts(chain, request.kind, request.tier),
            })?;

        let purchase = Purchase {
            user_id: request.user_id,
            target: request.target,
            kind: request.kind,
            duration,
            tier: request.tier,
        };
        self.commit(purchase, transfer, key, None).await
    }

    /// Detects the chain, fetches and checks confirmation and recipient. The amount
    /// is reported as observed; matching happens later.
    async fn observe(&self, tx_id: &str) -> Result<VerifiedTransfer, ReconcileError> {
        let family = detect_family(tx_id)?;
        let candidates = self.candidates(family)?;
        let view = self.verifier.locate(&candidates, tx_id.trim()).await?;
        let recipient = self.recipient(view.chain)?;
        Ok(self.verifier.check_view(&view, recipient, None)?)
    }

    /// Mismatch against the oldest open intent, or the chain's valid amounts
    /// when the user has none open.
    async fn diagnose_unmatched(
        &self,
        user_id: &str,
        observed: Money,
        now: SystemTime,
    ) -> Result<ReconcileError, ReconcileError> {
        let owner = user_id.to_string();
        let chain = observed.chain;
        let open = self
            .with_storage(move |storage| {
                storage
                    .open_pending_payments(&owner, chain, now)
                    .map_err(internal)
            })
            .await?;
        Ok(match open.first() {
            Some(oldest) => ReconcileError::AmountMismatch {
                expected: oldest.expected_amount,
                actual: observed,
            },
            None => ReconcileError::NoMatchingIntent {
                observed,
                valid_amounts: self
                    .fees
                    .valid_amounts(chain, PromotionKind::Trending, Tier::Normal),
            },
        })
    }

    /// Advisory fast path. The ledger insert inside `commit` remains the authority.
    async fn ensure_not_processed(&self, key: &str, user_id: &str) -> Result<(), ReconcileError> {
        let lookup = key.to_string();
        let existing = self
            .with_storage(move |storage| storage.processed_transaction(&lookup).map_err(internal))
            .await?;
        match existing {
            Some(record) => Err(ReconcileError::AlreadyProcessed {
                key: key.to_string(),
                credited_to_caller: record.user_id == user_id,
            }),
            None => Ok(()),
        }
    }

    async fn commit(
        &self,
        purchase: Purchase,
        transfer: VerifiedTransfer,
        key: String,
        pending_id: Option<i64>,
    ) -> ReconciliationResult {
        let now = self.now();
        let record = ledger_record(&purchase, &transfer, &key, now);
        let planned = plan_activation(&purchase, transfer.amount, &key, now);
        let user_id = purchase.user_id.clone();

        let promotion = self
            .with_storage(move |storage| {
                match storage.commit_reconciliation(&record, pending_id, &planned) {
                    Ok(promotion) => Ok(promotion),
                    Err(CommitError::AlreadyProcessed { key }) => {
                        let owner = storage.processed_transaction(&key).map_err(internal)?;
                        Err(ReconcileError::AlreadyProcessed {
                            credited_to_caller: owner.is_some_and(|owner| owner.user_id == user_id),
                            key,
                        })
                    }
                    Err(CommitError::PendingAlreadyMatched { id }) => {
                        Err(ReconcileError::PendingPaymentAlreadyMatched(id))
                    }
                    Err(CommitError::UnknownPendingPayment { id }) => {
                        Err(ReconcileError::UnknownPendingPayment(id))
                    }
                    Err(CommitError::Sqlite(err)) => Err(internal(err)),
                }
            })
            .await?;

        Ok(Reconciled {
            chain_qualified_tx_id: key,
            pending_payment_id: pending_id,
            duration: purchase.duration,
            promotion,
        })
    }

    fn candidates(&self, family: ChainFamily) -> Result<Vec<ChainId>, ReconcileError> {
        let (chains, fallback) = match family {
            ChainFamily::Bitcoin => (vec![ChainId::Bitcoin], ChainId::Bitcoin),
            ChainFamily::Solana => (vec![ChainId::Solana], ChainId::Solana),
            ChainFamily::Evm => (
                self.verifier
                    .adapters()
                    .evm_networks()
                    .into_iter()
                    .map(ChainId::Evm)
                    .collect(),
                ChainId::Evm(EvmNetwork::Ethereum),
            ),
        };
        let enabled: Vec<ChainId> = chains
            .into_iter()
            .filter(|chain| self.is_enabled(*chain))
            .collect();
        if enabled.is_empty() {
            return Err(ReconcileError::UnsupportedChain(fallback));
        }
        Ok(enabled)
    }

    fn is_enabled(&self, chain: ChainId) -> bool {
        self.verifier.adapters().get(chain).is_some()
            && self.config.recipients.contains_key(&chain)
    }

    fn recipient(&self, chain: ChainId) -> Result<&str, ReconcileError> {
        if !self.is_enabled(chain) {
            return Err(ReconcileError::UnsupportedChain(chain));
        }
        self.config
            .recipients
            .get(&chain)
            .map(String::as_str)
            .ok_or(ReconcileError::UnsupportedChain(chain))
    }

    fn now(&self) -> SystemTime {
        (self.clock)()
    }

    async fn with_storage<T, F>(&self, op: F) -> Result<T, ReconcileError>
    where
        F: FnOnce(&mut Storage) -> Result<T, ReconcileError> + Send + 'static,
        T: Send + 'static,
    {
        let storage = Arc::clone(&self.storage);
        tokio::task::spawn_blocking(move || {
            let mut guard = storage
                .lock()
                .map_err(|_| ReconcileError::Internal("storage mutex poisoned".to_string()))?;
            op(&mut guard)
        })
        .await
        .map_err(|err| ReconcileError::Internal(format!("storage task failed: {err}")))?
    }
}

fn purchase_for(pending: &PendingPayment) -> Purchase {
    Purchase {
        user_id: pending.user_id.clone(),
        target: pending.target.clone(),
        kind: pending.kind,
        duration: pending.duration,
        tier: pending.tier,
    }
}

fn internal(err: impl std::fmt::Display) -> ReconcileError {
    error!(error = %err, "storage failure during reconciliation");
    ReconcileError::Internal(err.to_string())
}

fn log_outcome(mode: &'static str, subject: &str, tx_id: &str, result: &ReconciliationResult) {
    match result {
        Ok(reconciled) => info!(
            mode,
            subject,
            tx_id,
            key = %reconciled.chain_qualified_tx_id,
            target = %reconciled.promotion.target,
            kind = %reconciled.promotion.kind,
            duration = %reconciled.duration,
            amount = %reconciled.promotion.amount,
            "payment reconciled"
        ),
        Err(err) => warn!(
            mode,
            subject,
            tx_id,
            code = err.code(),
            retryable = err.is_retryable(),
            error = %err,
            "reconciliation rejected"
        ),
    }
}
