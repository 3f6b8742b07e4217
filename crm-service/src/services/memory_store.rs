//! In-memory store used by the integration suite.
//!
//! `DashMap::get_mut` holds the shard lock for the key while the closure
//! runs, which gives the same per-document atomicity the Mongo guarded
//! updates provide. Exported alongside the real store the same way the
//! mock service implementations are.

use crate::models::{Lead, Notification, Payment, PaymentStatus};
use crate::services::store::CrmStore;
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use mongodb::bson::DateTime;

#[derive(Default)]
pub struct MemoryStore {
    leads: DashMap<String, Lead>,
    payments: DashMap<String, Payment>,
    notifications: DashMap<String, Notification>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CrmStore for MemoryStore {
    async fn insert_lead(&self, lead: Lead) -> Result<()> {
        self.leads.insert(lead.id.clone(), lead);
        Ok(())
    }

    async fn get_lead(&self, lead_id: &str) -> Result<Option<Lead>> {
        Ok(self.leads.get(lead_id).map(|entry| entry.value().clone()))
    }

    async fn list_leads(&self) -> Result<Vec<Lead>> {
        let mut leads: Vec<Lead> = self.leads.iter().map(|entry| entry.value().clone()).collect();
        leads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(leads)
    }

    async fn credit_lead_balance(&self, lead_id: &str, amount: i64) -> Result<Option<i64>> {
        match self.leads.get_mut(lead_id) {
            Some(mut lead) => {
                lead.available_payment_amount += amount;
                lead.updated_at = DateTime::now();
                Ok(Some(lead.available_payment_amount))
            }
            None => Ok(None),
        }
    }

    async fn try_decrement_lead_balance(
        &self,
        lead_id: &str,
        amount: i64,
    ) -> Result<Option<i64>> {
        match self.leads.get_mut(lead_id) {
            Some(mut lead) if lead.available_payment_amount >= amount => {
                lead.available_payment_amount -= amount;
                lead.updated_at = DateTime::now();
                Ok(Some(lead.available_payment_amount))
            }
            _ => Ok(None),
        }
    }

    async fn insert_payment(&self, payment: Payment) -> Result<()> {
        self.payments.insert(payment.id.clone(), payment);
        Ok(())
    }

    async fn get_payment(&self, payment_id: &str) -> Result<Option<Payment>> {
        Ok(self.payments.get(payment_id).map(|entry| entry.value().clone()))
    }

    async fn list_available_payments(&self) -> Result<Vec<Payment>> {
        let mut payments: Vec<Payment> = self
            .payments
            .iter()
            .filter(|entry| entry.status == PaymentStatus::Available)
            .map(|entry| entry.value().clone())
            .collect();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payments)
    }

    async fn list_claims_for_lead(&self, lead_id: &str) -> Result<Vec<Payment>> {
        let mut payments: Vec<Payment> = self
            .payments
            .iter()
            .filter(|entry| {
                entry.status == PaymentStatus::Claimed
                    && entry.lead_id.as_deref() == Some(lead_id)
            })
            .map(|entry| entry.value().clone())
            .collect();
        payments.sort_by(|a, b| b.claimed_at.cmp(&a.claimed_at));
        Ok(payments)
    }

    async fn claim_payment_cas(
        &self,
        payment_id: &str,
        lead_id: &str,
        claimed_by: &str,
        claimed_amount: i64,
    ) -> Result<bool> {
        match self.payments.get_mut(payment_id) {
            Some(mut payment) if payment.status == PaymentStatus::Available => {
                payment.status = PaymentStatus::Claimed;
                payment.claimed_amount = Some(claimed_amount);
                payment.claimed_by = Some(claimed_by.to_string());
                payment.lead_id = Some(lead_id.to_string());
                payment.claimed_at = Some(DateTime::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revert_payment_to_available(&self, payment_id: &str) -> Result<()> {
        if let Some(mut payment) = self.payments.get_mut(payment_id) {
            payment.status = PaymentStatus::Available;
            payment.claimed_amount = None;
            payment.claimed_by = None;
            payment.lead_id = None;
            payment.claimed_at = None;
        }
        Ok(())
    }

    async fn insert_notification(&self, notification: Notification) -> Result<()> {
        self.notifications
            .insert(notification.id.clone(), notification);
        Ok(())
    }

    async fn list_notifications(&self, recipient: &str) -> Result<Vec<Notification>> {
        let mut notifications: Vec<Notification> = self
            .notifications
            .iter()
            .filter(|entry| entry.recipient == recipient)
            .map(|entry| entry.value().clone())
            .collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notifications)
    }
}
