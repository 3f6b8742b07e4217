//! Persistent document models.
//!
//! All monetary amounts are i64 paise (smallest currency unit). Keeping the
//! whole ledger in integer minor units is what makes the conservation
//! invariant (`amount == claimed_amount + remainder`) exact.

use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A prospective client tracked through the sales pipeline.
///
/// `available_payment_amount` is the unclaimed balance "inside" the lead:
/// it rises when payment entries are recorded against the lead and falls
/// only through a successful claim. It is never negative.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Lead {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub phone: String,
    pub notes: Option<String>,
    pub available_payment_amount: i64,
    pub created_by: String,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Lead {
    pub fn new(
        name: String,
        phone: String,
        notes: Option<String>,
        initial_amount: i64,
        created_by: String,
    ) -> Self {
        let now = DateTime::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            phone,
            notes,
            available_payment_amount: initial_amount,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A record of money received, offered to the claimable pool until an
/// employee attributes it to a lead.
///
/// A payment is claimed at most once. A partial claim never reopens the
/// record; the leftover is split into a fresh sibling payment instead.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Payment {
    #[serde(rename = "_id")]
    pub id: String,
    pub amount: i64,
    pub source: Option<String>,
    pub status: PaymentStatus,
    pub claimed_amount: Option<i64>,
    pub claimed_by: Option<String>,
    pub lead_id: Option<String>,
    pub created_at: DateTime,
    pub claimed_at: Option<DateTime>,
}

impl Payment {
    pub fn new(amount: i64, source: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            amount,
            source,
            status: PaymentStatus::Available,
            claimed_amount: None,
            claimed_by: None,
            lead_id: None,
            created_at: DateTime::now(),
            claimed_at: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Available,
    /// Terminal. A claimed payment never re-enters the pool.
    Claimed,
}

/// Fire-and-forget message recorded on claim events.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Notification {
    #[serde(rename = "_id")]
    pub id: String,
    pub recipient: String,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime,
}

impl Notification {
    pub fn new(recipient: String, message: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            recipient,
            message,
            read: false,
            created_at: DateTime::now(),
        }
    }
}
