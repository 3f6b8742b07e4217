use crate::models::{Lead, Notification, Payment};
use crate::services::store::CrmStore;
use anyhow::Result;
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, DateTime};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument};
use mongodb::{Collection, Database, IndexModel};

#[derive(Clone)]
pub struct MongoStore {
    leads: Collection<Lead>,
    payments: Collection<Payment>,
    notifications: Collection<Notification>,
}

impl MongoStore {
    pub fn new(db: &Database) -> Self {
        Self {
            leads: db.collection("leads"),
            payments: db.collection("payments"),
            notifications: db.collection("notifications"),
        }
    }

    /// Initialize database indexes.
    pub async fn init_indexes(&self) -> Result<()> {
        // Index on status for the claimable-pool listing
        let status_idx = IndexModel::builder()
            .keys(doc! { "status": 1, "created_at": -1 })
            .options(
                IndexOptions::builder()
                    .name("payment_status_idx".to_string())
                    .build(),
            )
            .build();

        // Compound index on (status, lead_id) for the per-lead claims view
        let claims_idx = IndexModel::builder()
            .keys(doc! { "status": 1, "lead_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("payment_lead_claims_idx".to_string())
                    .build(),
            )
            .build();

        self.payments
            .create_indexes([status_idx, claims_idx], None)
            .await?;

        let recipient_idx = IndexModel::builder()
            .keys(doc! { "recipient": 1, "created_at": -1 })
            .options(
                IndexOptions::builder()
                    .name("notification_recipient_idx".to_string())
                    .build(),
            )
            .build();

        self.notifications
            .create_indexes([recipient_idx], None)
            .await?;

        tracing::info!("CRM service indexes initialized");
        Ok(())
    }
}

#[async_trait]
impl CrmStore for MongoStore {
    async fn insert_lead(&self, lead: Lead) -> Result<()> {
        self.leads.insert_one(lead, None).await?;
        Ok(())
    }

    async fn get_lead(&self, lead_id: &str) -> Result<Option<Lead>> {
        let lead = self.leads.find_one(doc! { "_id": lead_id }, None).await?;
        Ok(lead)
    }

    async fn list_leads(&self) -> Result<Vec<Lead>> {
        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .build();
        let cursor = self.leads.find(doc! {}, Some(options)).await?;
        let leads: Vec<Lead> = cursor.try_collect().await?;
        Ok(leads)
    }

    async fn credit_lead_balance(&self, lead_id: &str, amount: i64) -> Result<Option<i64>> {
        let filter = doc! { "_id": lead_id };
        let update = doc! {
            "$inc": { "available_payment_amount": amount },
            "$set": { "updated_at": DateTime::now() }
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        let updated = self
            .leads
            .find_one_and_update(filter, update, options)
            .await?;
        Ok(updated.map(|lead| lead.available_payment_amount))
    }

    async fn try_decrement_lead_balance(
        &self,
        lead_id: &str,
        amount: i64,
    ) -> Result<Option<i64>> {
        // Guard on the current balance so two concurrent claims cannot both
        // draw against a stale read and overdraw the lead.
        let filter = doc! {
            "_id": lead_id,
            "available_payment_amount": { "$gte": amount }
        };
        let update = doc! {
            "$inc": { "available_payment_amount": -amount },
            "$set": { "updated_at": DateTime::now() }
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        let updated = self
            .leads
            .find_one_and_update(filter, update, options)
            .await?;
        Ok(updated.map(|lead| lead.available_payment_amount))
    }

    async fn insert_payment(&self, payment: Payment) -> Result<()> {
        self.payments.insert_one(payment, None).await?;
        Ok(())
    }

    async fn get_payment(&self, payment_id: &str) -> Result<Option<Payment>> {
        let payment = self
            .payments
            .find_one(doc! { "_id": payment_id }, None)
            .await?;
        Ok(payment)
    }

    async fn list_available_payments(&self) -> Result<Vec<Payment>> {
        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .build();
        let cursor = self
            .payments
            .find(doc! { "status": "available" }, Some(options))
            .await?;
        let payments: Vec<Payment> = cursor.try_collect().await?;
        Ok(payments)
    }

    async fn list_claims_for_lead(&self, lead_id: &str) -> Result<Vec<Payment>> {
        let options = FindOptions::builder()
            .sort(doc! { "claimed_at": -1 })
            .build();
        let cursor = self
            .payments
            .find(
                doc! { "status": "claimed", "lead_id": lead_id },
                Some(options),
            )
            .await?;
        let payments: Vec<Payment> = cursor.try_collect().await?;
        Ok(payments)
    }

    async fn claim_payment_cas(
        &self,
        payment_id: &str,
        lead_id: &str,
        claimed_by: &str,
        claimed_amount: i64,
    ) -> Result<bool> {
        // Single-document guarded update: only the request that still sees
        // status == available wins the claim.
        let filter = doc! { "_id": payment_id, "status": "available" };
        let update = doc! {
            "$set": {
                "status": "claimed",
                "claimed_amount": claimed_amount,
                "claimed_by": claimed_by,
                "lead_id": lead_id,
                "claimed_at": DateTime::now(),
            }
        };
        let result = self.payments.update_one(filter, update, None).await?;
        Ok(result.modified_count == 1)
    }

    async fn revert_payment_to_available(&self, payment_id: &str) -> Result<()> {
        let filter = doc! { "_id": payment_id };
        let update = doc! {
            "$set": { "status": "available" },
            "$unset": {
                "claimed_amount": "",
                "claimed_by": "",
                "lead_id": "",
                "claimed_at": "",
            }
        };
        self.payments.update_one(filter, update, None).await?;
        Ok(())
    }

    async fn insert_notification(&self, notification: Notification) -> Result<()> {
        self.notifications.insert_one(notification, None).await?;
        Ok(())
    }

    async fn list_notifications(&self, recipient: &str) -> Result<Vec<Notification>> {
        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .build();
        let cursor = self
            .notifications
            .find(doc! { "recipient": recipient }, Some(options))
            .await?;
        let notifications: Vec<Notification> = cursor.try_collect().await?;
        Ok(notifications)
    }
}
