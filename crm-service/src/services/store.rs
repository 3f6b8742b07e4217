//! Storage seam for the CRM service.
//!
//! The allocator only ever needs single-document atomic primitives: plain
//! inserts/reads plus two guarded updates (the payment status CAS and the
//! conditional lead decrement). Anything built on those two stays correct
//! under concurrent claims without a cross-document transaction.

use crate::models::{Lead, Notification, Payment};
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait CrmStore: Send + Sync {
    async fn insert_lead(&self, lead: Lead) -> Result<()>;
    async fn get_lead(&self, lead_id: &str) -> Result<Option<Lead>>;
    async fn list_leads(&self) -> Result<Vec<Lead>>;

    /// Add `amount` paise to the lead's available balance. Returns the new
    /// balance, or `None` if the lead does not exist.
    async fn credit_lead_balance(&self, lead_id: &str, amount: i64) -> Result<Option<i64>>;

    /// Subtract `amount` paise from the lead's balance, guarded by
    /// `available_payment_amount >= amount`. Returns the new balance on
    /// success, `None` if the guard failed (balance drained concurrently or
    /// lead gone).
    async fn try_decrement_lead_balance(&self, lead_id: &str, amount: i64)
        -> Result<Option<i64>>;

    async fn insert_payment(&self, payment: Payment) -> Result<()>;
    async fn get_payment(&self, payment_id: &str) -> Result<Option<Payment>>;
    async fn list_available_payments(&self) -> Result<Vec<Payment>>;
    async fn list_claims_for_lead(&self, lead_id: &str) -> Result<Vec<Payment>>;

    /// Compare-and-swap the payment from `available` to `claimed`, stamping
    /// the claim fields in the same single-document update. Returns `false`
    /// when the payment was not `available` (lost race or already claimed).
    ///
    /// This is the sole serialization point deciding who claims a payment.
    async fn claim_payment_cas(
        &self,
        payment_id: &str,
        lead_id: &str,
        claimed_by: &str,
        claimed_amount: i64,
    ) -> Result<bool>;

    /// Roll a claimed payment back to `available`, clearing the claim
    /// fields. Used to compensate when the lead-side update loses its race.
    async fn revert_payment_to_available(&self, payment_id: &str) -> Result<()>;

    async fn insert_notification(&self, notification: Notification) -> Result<()>;
    async fn list_notifications(&self, recipient: &str) -> Result<Vec<Notification>>;
}
