//! Payment claim allocation.
//!
//! A claim attributes as much of a payment's amount as the target lead's
//! outstanding balance can absorb. When the lead cannot absorb the full
//! amount, the leftover is split into a fresh `available` payment that
//! re-enters the claimable pool. Across every path the ledger conserves
//! value: `payment.amount == claimed_amount + remainder`.
//!
//! Concurrency: the payment status CAS is the single serialization point
//! for "who claims this payment". The lead decrement is a guarded update;
//! losing that race rolls the payment back and reports a retryable
//! conflict. No cross-document transaction is assumed.

use crate::models::{Lead, Payment, PaymentStatus};
use crate::services::notify::Notifier;
use crate::services::store::CrmStore;
use metrics::counter;
use mongodb::bson::DateTime;
use service_core::error::AppError;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("payment {0} not found")]
    PaymentNotFound(String),

    #[error("lead {0} not found")]
    LeadNotFound(String),

    #[error("payment {0} has already been claimed")]
    AlreadyClaimed(String),

    #[error(
        "lead {lead_id} has {available} paise available, below the {threshold} paise minimum"
    )]
    InsufficientLeadBalance {
        lead_id: String,
        available: i64,
        threshold: i64,
    },

    #[error("lead {0} balance changed during the claim; the claim was rolled back, retry")]
    ConcurrentBalanceConflict(String),

    #[error("storage error: {0}")]
    Persistence(#[source] anyhow::Error),
}

impl From<ClaimError> for AppError {
    fn from(err: ClaimError) -> Self {
        match err {
            ClaimError::PaymentNotFound(_) | ClaimError::LeadNotFound(_) => {
                AppError::NotFound(anyhow::anyhow!(err.to_string()))
            }
            ClaimError::AlreadyClaimed(_) | ClaimError::ConcurrentBalanceConflict(_) => {
                AppError::Conflict(anyhow::anyhow!(err.to_string()))
            }
            ClaimError::InsufficientLeadBalance { .. } => {
                AppError::UnprocessableEntity(anyhow::anyhow!(err.to_string()))
            }
            ClaimError::Persistence(e) => AppError::DatabaseError(e),
        }
    }
}

/// Result of an eligibility check. A balance below the threshold is a
/// normal negative answer, not an error.
#[derive(Debug, Clone)]
pub struct LeadEligibility {
    pub can_claim: bool,
    pub available_amount: i64,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct RemainderInfo {
    pub id: String,
    pub amount: i64,
}

#[derive(Debug, Clone)]
pub struct ClaimOutcome {
    /// The payment after the claim, with claim fields stamped.
    pub payment: Payment,
    /// The lead's balance after the decrement.
    pub lead_remaining: i64,
    /// Present when the lead could not absorb the full amount.
    pub remainder: Option<RemainderInfo>,
}

/// How much of `payment_amount` the lead can absorb, and what is left over.
fn split_amount(payment_amount: i64, lead_balance: i64) -> (i64, i64) {
    let claimable = payment_amount.min(lead_balance);
    (claimable, payment_amount - claimable)
}

#[derive(Clone)]
pub struct ClaimAllocator {
    store: Arc<dyn CrmStore>,
    notifier: Notifier,
    min_lead_balance: i64,
}

impl ClaimAllocator {
    pub fn new(store: Arc<dyn CrmStore>, notifier: Notifier, min_lead_balance: i64) -> Self {
        Self {
            store,
            notifier,
            min_lead_balance,
        }
    }

    /// Read-only check: can this lead absorb a claim right now?
    pub async fn check_lead_eligibility(
        &self,
        lead_id: &str,
    ) -> Result<LeadEligibility, ClaimError> {
        let lead = self.fetch_lead(lead_id).await?;
        Ok(self.eligibility_of(&lead))
    }

    fn eligibility_of(&self, lead: &Lead) -> LeadEligibility {
        let available = lead.available_payment_amount;
        if available >= self.min_lead_balance {
            LeadEligibility {
                can_claim: true,
                available_amount: available,
                message: format!(
                    "lead {} can absorb up to {} paise",
                    lead.id, available
                ),
            }
        } else {
            LeadEligibility {
                can_claim: false,
                available_amount: available,
                message: format!(
                    "lead {} has {} paise available, below the {} paise minimum",
                    lead.id, available, self.min_lead_balance
                ),
            }
        }
    }

    /// Execute one claim attempt for `payment_id` against `lead_id`.
    pub async fn claim_payment(
        &self,
        payment_id: &str,
        lead_id: &str,
        requested_by: &str,
    ) -> Result<ClaimOutcome, ClaimError> {
        // Fresh reads; a cached payment could mask a concurrent claim.
        let payment = self.fetch_payment(payment_id).await?;
        if payment.status != PaymentStatus::Available {
            counter!("claims_total", "outcome" => "already_claimed").increment(1);
            return Err(ClaimError::AlreadyClaimed(payment_id.to_string()));
        }
        let lead = self.fetch_lead(lead_id).await?;

        if lead.available_payment_amount < self.min_lead_balance {
            counter!("claims_total", "outcome" => "ineligible").increment(1);
            return Err(ClaimError::InsufficientLeadBalance {
                lead_id: lead.id,
                available: lead.available_payment_amount,
                threshold: self.min_lead_balance,
            });
        }

        let (claimable, remainder_amount) =
            split_amount(payment.amount, lead.available_payment_amount);

        // Serialization point: whoever flips available -> claimed wins.
        let won = self
            .store
            .claim_payment_cas(payment_id, lead_id, requested_by, claimable)
            .await
            .map_err(ClaimError::Persistence)?;
        if !won {
            counter!("claims_total", "outcome" => "already_claimed").increment(1);
            return Err(ClaimError::AlreadyClaimed(payment_id.to_string()));
        }

        // Guarded decrement. A lost race here means another claim drained
        // the lead between our read and this write; undo the CAS so the
        // payment is not stranded as claimed against an unmodified lead.
        let lead_remaining = match self
            .store
            .try_decrement_lead_balance(lead_id, claimable)
            .await
            .map_err(ClaimError::Persistence)?
        {
            Some(remaining) => remaining,
            None => {
                self.rollback_claim(payment_id).await;
                counter!("claims_total", "outcome" => "balance_conflict").increment(1);
                return Err(ClaimError::ConcurrentBalanceConflict(lead_id.to_string()));
            }
        };

        let remainder = if remainder_amount > 0 {
            let remainder_payment = Payment::new(remainder_amount, payment.source.clone());
            let info = RemainderInfo {
                id: remainder_payment.id.clone(),
                amount: remainder_payment.amount,
            };
            if let Err(e) = self.store.insert_payment(remainder_payment).await {
                // Compensate both earlier writes before surfacing the
                // failure, otherwise value would vanish from the ledger.
                if let Err(credit_err) =
                    self.store.credit_lead_balance(lead_id, claimable).await
                {
                    tracing::error!(
                        lead_id,
                        error = %credit_err,
                        "failed to restore lead balance while compensating"
                    );
                }
                self.rollback_claim(payment_id).await;
                counter!("claims_total", "outcome" => "persistence_error").increment(1);
                return Err(ClaimError::Persistence(e));
            }
            Some(info)
        } else {
            None
        };

        // The claim is committed; build the response from the fields we
        // just wrote rather than re-reading, so a read hiccup here cannot
        // turn an applied claim into an error.
        let mut claimed_payment = payment;
        claimed_payment.status = PaymentStatus::Claimed;
        claimed_payment.claimed_amount = Some(claimable);
        claimed_payment.claimed_by = Some(requested_by.to_string());
        claimed_payment.lead_id = Some(lead_id.to_string());
        claimed_payment.claimed_at = Some(DateTime::now());

        tracing::info!(
            payment_id,
            lead_id,
            requested_by,
            claimed_amount = claimable,
            lead_remaining,
            remainder_amount,
            "payment claimed"
        );
        counter!("claims_total", "outcome" => "claimed").increment(1);
        counter!("claimed_amount_paise_total").increment(claimable as u64);

        self.notifier.dispatch(
            requested_by,
            format!(
                "You claimed {} paise from payment {} for lead {}",
                claimable, payment_id, lead_id
            ),
        );
        if lead.created_by != requested_by {
            self.notifier.dispatch(
                &lead.created_by,
                format!(
                    "{} paise were claimed for lead {} by {}",
                    claimable, lead_id, requested_by
                ),
            );
        }

        Ok(ClaimOutcome {
            payment: claimed_payment,
            lead_remaining,
            remainder,
        })
    }

    /// All payments still in the claimable pool, newest first.
    pub async fn list_available_payments(&self) -> Result<Vec<Payment>, ClaimError> {
        self.store
            .list_available_payments()
            .await
            .map_err(ClaimError::Persistence)
    }

    /// Claims-history projection for one lead.
    pub async fn claims_for_lead(&self, lead_id: &str) -> Result<Vec<Payment>, ClaimError> {
        // Distinguish "unknown lead" from "no claims yet".
        self.fetch_lead(lead_id).await?;
        self.store
            .list_claims_for_lead(lead_id)
            .await
            .map_err(ClaimError::Persistence)
    }

    async fn fetch_lead(&self, lead_id: &str) -> Result<Lead, ClaimError> {
        self.store
            .get_lead(lead_id)
            .await
            .map_err(ClaimError::Persistence)?
            .ok_or_else(|| ClaimError::LeadNotFound(lead_id.to_string()))
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<Payment, ClaimError> {
        self.store
            .get_payment(payment_id)
            .await
            .map_err(ClaimError::Persistence)?
            .ok_or_else(|| ClaimError::PaymentNotFound(payment_id.to_string()))
    }

    async fn rollback_claim(&self, payment_id: &str) {
        if let Err(e) = self.store.revert_payment_to_available(payment_id).await {
            tracing::error!(
                payment_id,
                error = %e,
                "failed to roll payment back to available"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Lead, Notification};
    use crate::services::memory_store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

    fn allocator_with_store() -> (ClaimAllocator, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let trait_store: Arc<dyn CrmStore> = store.clone();
        let notifier = Notifier::new(trait_store.clone());
        (ClaimAllocator::new(trait_store, notifier, 100), store)
    }

    /// Store wrapper that injects failures into individual primitives,
    /// for exercising the rollback and compensation paths.
    struct FaultStore {
        inner: MemoryStore,
        deny_decrement: AtomicBool,
        fail_payment_inserts: AtomicBool,
        payment_reads_left: AtomicI64,
    }

    impl FaultStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                deny_decrement: AtomicBool::new(false),
                fail_payment_inserts: AtomicBool::new(false),
                payment_reads_left: AtomicI64::new(i64::MAX),
            }
        }
    }

    #[async_trait]
    impl CrmStore for FaultStore {
        async fn insert_lead(&self, lead: Lead) -> anyhow::Result<()> {
            self.inner.insert_lead(lead).await
        }

        async fn get_lead(&self, lead_id: &str) -> anyhow::Result<Option<Lead>> {
            self.inner.get_lead(lead_id).await
        }

        async fn list_leads(&self) -> anyhow::Result<Vec<Lead>> {
            self.inner.list_leads().await
        }

        async fn credit_lead_balance(
            &self,
            lead_id: &str,
            amount: i64,
        ) -> anyhow::Result<Option<i64>> {
            self.inner.credit_lead_balance(lead_id, amount).await
        }

        async fn try_decrement_lead_balance(
            &self,
            lead_id: &str,
            amount: i64,
        ) -> anyhow::Result<Option<i64>> {
            if self.deny_decrement.load(Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.try_decrement_lead_balance(lead_id, amount).await
        }

        async fn insert_payment(&self, payment: Payment) -> anyhow::Result<()> {
            if self.fail_payment_inserts.load(Ordering::SeqCst) {
                anyhow::bail!("injected insert failure");
            }
            self.inner.insert_payment(payment).await
        }

        async fn get_payment(&self, payment_id: &str) -> anyhow::Result<Option<Payment>> {
            if self.payment_reads_left.fetch_sub(1, Ordering::SeqCst) <= 0 {
                anyhow::bail!("injected read failure");
            }
            self.inner.get_payment(payment_id).await
        }

        async fn list_available_payments(&self) -> anyhow::Result<Vec<Payment>> {
            self.inner.list_available_payments().await
        }

        async fn list_claims_for_lead(&self, lead_id: &str) -> anyhow::Result<Vec<Payment>> {
            self.inner.list_claims_for_lead(lead_id).await
        }

        async fn claim_payment_cas(
            &self,
            payment_id: &str,
            lead_id: &str,
            claimed_by: &str,
            claimed_amount: i64,
        ) -> anyhow::Result<bool> {
            self.inner
                .claim_payment_cas(payment_id, lead_id, claimed_by, claimed_amount)
                .await
        }

        async fn revert_payment_to_available(&self, payment_id: &str) -> anyhow::Result<()> {
            self.inner.revert_payment_to_available(payment_id).await
        }

        async fn insert_notification(&self, notification: Notification) -> anyhow::Result<()> {
            self.inner.insert_notification(notification).await
        }

        async fn list_notifications(
            &self,
            recipient: &str,
        ) -> anyhow::Result<Vec<Notification>> {
            self.inner.list_notifications(recipient).await
        }
    }

    fn allocator_with_faults() -> (ClaimAllocator, Arc<FaultStore>) {
        let store = Arc::new(FaultStore::new());
        let trait_store: Arc<dyn CrmStore> = store.clone();
        let notifier = Notifier::new(trait_store.clone());
        (ClaimAllocator::new(trait_store, notifier, 100), store)
    }

    fn lead_with_balance(balance: i64) -> Lead {
        Lead::new(
            "Asha Verma".to_string(),
            "9811000000".to_string(),
            None,
            balance,
            "admin-1".to_string(),
        )
    }

    #[test]
    fn split_covers_full_amount_when_lead_can_absorb() {
        assert_eq!(split_amount(500, 1000), (500, 0));
    }

    #[test]
    fn split_caps_at_lead_balance() {
        assert_eq!(split_amount(500, 400), (400, 100));
    }

    #[test]
    fn split_exact_balance_leaves_no_remainder() {
        assert_eq!(split_amount(500, 500), (500, 0));
    }

    #[test]
    fn split_conserves_value() {
        for (amount, balance) in [(1, 1), (7, 3), (1000, 999), (250, 10_000)] {
            let (claimable, remainder) = split_amount(amount, balance);
            assert_eq!(claimable + remainder, amount);
            assert!(claimable <= balance);
        }
    }

    #[tokio::test]
    async fn eligibility_respects_threshold() {
        let (allocator, store) = allocator_with_store();
        let rich = lead_with_balance(100);
        let poor = lead_with_balance(99);
        store.insert_lead(rich.clone()).await.unwrap();
        store.insert_lead(poor.clone()).await.unwrap();

        let eligible = allocator.check_lead_eligibility(&rich.id).await.unwrap();
        assert!(eligible.can_claim);
        assert_eq!(eligible.available_amount, 100);

        let ineligible = allocator.check_lead_eligibility(&poor.id).await.unwrap();
        assert!(!ineligible.can_claim);
        assert_eq!(ineligible.available_amount, 99);
    }

    #[tokio::test]
    async fn eligibility_unknown_lead_is_not_found() {
        let (allocator, _store) = allocator_with_store();
        let err = allocator
            .check_lead_eligibility("no-such-lead")
            .await
            .unwrap_err();
        assert!(matches!(err, ClaimError::LeadNotFound(_)));
    }

    #[tokio::test]
    async fn partial_claim_creates_remainder() {
        let (allocator, store) = allocator_with_store();
        let lead = lead_with_balance(400);
        store.insert_lead(lead.clone()).await.unwrap();
        let payment = Payment::new(500, None);
        store.insert_payment(payment.clone()).await.unwrap();

        let outcome = allocator
            .claim_payment(&payment.id, &lead.id, "emp-1")
            .await
            .unwrap();

        assert_eq!(outcome.payment.claimed_amount, Some(400));
        assert_eq!(outcome.lead_remaining, 0);
        let remainder = outcome.remainder.expect("remainder expected");
        assert_eq!(remainder.amount, 100);

        // Remainder re-enters the pool as an ordinary available payment.
        let pool = store.list_available_payments().await.unwrap();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool[0].id, remainder.id);
        assert_eq!(pool[0].amount, 100);
    }

    #[tokio::test]
    async fn full_claim_has_no_remainder() {
        let (allocator, store) = allocator_with_store();
        let lead = lead_with_balance(1000);
        store.insert_lead(lead.clone()).await.unwrap();
        let payment = Payment::new(500, None);
        store.insert_payment(payment.clone()).await.unwrap();

        let outcome = allocator
            .claim_payment(&payment.id, &lead.id, "emp-1")
            .await
            .unwrap();

        assert_eq!(outcome.payment.claimed_amount, Some(500));
        assert_eq!(outcome.lead_remaining, 500);
        assert!(outcome.remainder.is_none());
        assert!(store.list_available_payments().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_claim_on_same_payment_conflicts() {
        let (allocator, store) = allocator_with_store();
        let lead = lead_with_balance(10_000);
        store.insert_lead(lead.clone()).await.unwrap();
        let payment = Payment::new(500, None);
        store.insert_payment(payment.clone()).await.unwrap();

        allocator
            .claim_payment(&payment.id, &lead.id, "emp-1")
            .await
            .unwrap();
        let err = allocator
            .claim_payment(&payment.id, &lead.id, "emp-2")
            .await
            .unwrap_err();
        assert!(matches!(err, ClaimError::AlreadyClaimed(_)));

        // The losing attempt must not have touched the lead.
        let lead_after = store.get_lead(&lead.id).await.unwrap().unwrap();
        assert_eq!(lead_after.available_payment_amount, 9_500);
    }

    #[tokio::test]
    async fn below_threshold_lead_rejects_claim_without_mutation() {
        let (allocator, store) = allocator_with_store();
        let lead = lead_with_balance(0);
        store.insert_lead(lead.clone()).await.unwrap();
        let payment = Payment::new(500, None);
        store.insert_payment(payment.clone()).await.unwrap();

        let err = allocator
            .claim_payment(&payment.id, &lead.id, "emp-1")
            .await
            .unwrap_err();
        assert!(matches!(err, ClaimError::InsufficientLeadBalance { .. }));

        let payment_after = store.get_payment(&payment.id).await.unwrap().unwrap();
        assert_eq!(payment_after.status, crate::models::PaymentStatus::Available);
    }

    #[tokio::test]
    async fn lost_decrement_race_rolls_payment_back() {
        let (allocator, store) = allocator_with_faults();
        let lead = lead_with_balance(10_000);
        store.insert_lead(lead.clone()).await.unwrap();
        let payment = Payment::new(500, None);
        store.insert_payment(payment.clone()).await.unwrap();

        store.deny_decrement.store(true, Ordering::SeqCst);
        let err = allocator
            .claim_payment(&payment.id, &lead.id, "emp-1")
            .await
            .unwrap_err();
        assert!(matches!(err, ClaimError::ConcurrentBalanceConflict(_)));

        // The CAS was undone: payment is available again with the claim
        // fields cleared, and it is back in the pool.
        let payment_after = store.get_payment(&payment.id).await.unwrap().unwrap();
        assert_eq!(payment_after.status, PaymentStatus::Available);
        assert_eq!(payment_after.claimed_amount, None);
        assert_eq!(payment_after.claimed_by, None);
        assert_eq!(payment_after.lead_id, None);

        let lead_after = store.get_lead(&lead.id).await.unwrap().unwrap();
        assert_eq!(lead_after.available_payment_amount, 10_000);

        // Retry succeeds once the contention clears.
        store.deny_decrement.store(false, Ordering::SeqCst);
        let outcome = allocator
            .claim_payment(&payment.id, &lead.id, "emp-1")
            .await
            .unwrap();
        assert_eq!(outcome.payment.claimed_amount, Some(500));
    }

    #[tokio::test]
    async fn remainder_insert_failure_restores_lead_and_payment() {
        let (allocator, store) = allocator_with_faults();
        let lead = lead_with_balance(400);
        store.insert_lead(lead.clone()).await.unwrap();
        let payment = Payment::new(500, None);
        store.insert_payment(payment.clone()).await.unwrap();

        // Partial claim path; the remainder insert fails.
        store.fail_payment_inserts.store(true, Ordering::SeqCst);
        let err = allocator
            .claim_payment(&payment.id, &lead.id, "emp-1")
            .await
            .unwrap_err();
        assert!(matches!(err, ClaimError::Persistence(_)));

        // Both earlier writes were compensated: the lead balance is
        // restored and the payment is available again.
        let lead_after = store.get_lead(&lead.id).await.unwrap().unwrap();
        assert_eq!(lead_after.available_payment_amount, 400);
        let payment_after = store.get_payment(&payment.id).await.unwrap().unwrap();
        assert_eq!(payment_after.status, PaymentStatus::Available);
        assert_eq!(payment_after.claimed_amount, None);

        // No stray remainder escaped into the pool.
        let pool = store.list_available_payments().await.unwrap();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool[0].id, payment.id);
    }

    #[tokio::test]
    async fn claimed_payment_reported_before_lead_eligibility() {
        let (allocator, store) = allocator_with_store();
        let rich = lead_with_balance(10_000);
        let poor = lead_with_balance(0);
        store.insert_lead(rich.clone()).await.unwrap();
        store.insert_lead(poor.clone()).await.unwrap();
        let payment = Payment::new(500, None);
        store.insert_payment(payment.clone()).await.unwrap();

        allocator
            .claim_payment(&payment.id, &rich.id, "emp-1")
            .await
            .unwrap();

        // Even with an ineligible target lead, the spent payment is the
        // caller's real problem.
        let err = allocator
            .claim_payment(&payment.id, &poor.id, "emp-2")
            .await
            .unwrap_err();
        assert!(matches!(err, ClaimError::AlreadyClaimed(_)));
    }

    #[tokio::test]
    async fn committed_claim_survives_later_read_failure() {
        let (allocator, store) = allocator_with_faults();
        let lead = lead_with_balance(1_000);
        store.insert_lead(lead.clone()).await.unwrap();
        let payment = Payment::new(500, None);
        store.insert_payment(payment.clone()).await.unwrap();

        // Allow exactly the one pre-claim read; any later read errors.
        store.payment_reads_left.store(1, Ordering::SeqCst);
        let outcome = allocator
            .claim_payment(&payment.id, &lead.id, "emp-1")
            .await
            .unwrap();

        assert_eq!(outcome.payment.status, PaymentStatus::Claimed);
        assert_eq!(outcome.payment.claimed_amount, Some(500));
        assert_eq!(outcome.payment.claimed_by.as_deref(), Some("emp-1"));
        assert_eq!(outcome.lead_remaining, 500);
    }

    #[tokio::test]
    async fn concurrent_claims_on_one_payment_yield_one_winner() {
        let (allocator, store) = allocator_with_store();
        let lead = lead_with_balance(100_000);
        store.insert_lead(lead.clone()).await.unwrap();
        let payment = Payment::new(500, None);
        store.insert_payment(payment.clone()).await.unwrap();

        let a = allocator.clone();
        let b = allocator.clone();
        let (pid_a, lid_a) = (payment.id.clone(), lead.id.clone());
        let (pid_b, lid_b) = (payment.id.clone(), lead.id.clone());

        let (first, second) = tokio::join!(
            tokio::spawn(async move { a.claim_payment(&pid_a, &lid_a, "emp-1").await }),
            tokio::spawn(async move { b.claim_payment(&pid_b, &lid_b, "emp-2").await }),
        );
        let results = [first.unwrap(), second.unwrap()];

        let wins = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(ClaimError::AlreadyClaimed(_))))
            .count();
        assert_eq!(wins, 1);
        assert_eq!(conflicts, 1);

        // Exactly one decrement landed.
        let lead_after = store.get_lead(&lead.id).await.unwrap().unwrap();
        assert_eq!(lead_after.available_payment_amount, 99_500);
    }
}
