//! Request/response shapes for the HTTP surface.
//!
//! Amounts cross the boundary in i64 paise, same as storage.

use crate::models::{Lead, Notification, Payment, PaymentStatus};
use crate::services::allocator::{ClaimOutcome, LeadEligibility};
use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use validator::Validate;

fn rfc3339(dt: DateTime) -> String {
    dt.try_to_rfc3339_string().unwrap_or_default()
}

#[derive(Deserialize, Validate)]
pub struct CreateLeadRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 4, max = 20))]
    pub phone: String,
    pub notes: Option<String>,
    /// Optional opening balance in paise.
    #[validate(range(min = 0))]
    pub available_payment_amount: Option<i64>,
}

#[derive(Deserialize, Validate)]
pub struct PaymentEntryRequest {
    /// Paise credited to the lead's available balance.
    #[validate(range(min = 1))]
    pub amount: i64,
    pub note: Option<String>,
}

#[derive(Deserialize, Validate)]
pub struct CreatePaymentRequest {
    /// Paise offered for claiming.
    #[validate(range(min = 1))]
    pub amount: i64,
    pub source: Option<String>,
}

#[derive(Deserialize, Validate)]
pub struct ClaimRequest {
    #[validate(length(min = 1))]
    pub lead_id: String,
}

#[derive(Serialize)]
pub struct LeadResponse {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub notes: Option<String>,
    pub available_payment_amount: i64,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Lead> for LeadResponse {
    fn from(lead: Lead) -> Self {
        Self {
            id: lead.id,
            name: lead.name,
            phone: lead.phone,
            notes: lead.notes,
            available_payment_amount: lead.available_payment_amount,
            created_by: lead.created_by,
            created_at: rfc3339(lead.created_at),
            updated_at: rfc3339(lead.updated_at),
        }
    }
}

#[derive(Serialize)]
pub struct LeadListResponse {
    pub leads: Vec<LeadResponse>,
}

#[derive(Serialize)]
pub struct PaymentEntryResponse {
    pub lead_id: String,
    pub available_payment_amount: i64,
}

#[derive(Serialize)]
pub struct PaymentResponse {
    pub id: String,
    pub amount: i64,
    pub source: Option<String>,
    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_amount: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_id: Option<String>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<String>,
}

impl From<Payment> for PaymentResponse {
    fn from(payment: Payment) -> Self {
        Self {
            id: payment.id,
            amount: payment.amount,
            source: payment.source,
            status: payment.status,
            claimed_amount: payment.claimed_amount,
            claimed_by: payment.claimed_by,
            lead_id: payment.lead_id,
            created_at: rfc3339(payment.created_at),
            claimed_at: payment.claimed_at.map(rfc3339),
        }
    }
}

#[derive(Serialize)]
pub struct PaymentListResponse {
    pub payments: Vec<PaymentResponse>,
}

#[derive(Serialize)]
pub struct ClaimListResponse {
    pub claims: Vec<PaymentResponse>,
}

#[derive(Serialize)]
pub struct EligibilityResponse {
    pub can_claim: bool,
    pub total_available_payment: i64,
    pub message: String,
}

impl From<LeadEligibility> for EligibilityResponse {
    fn from(e: LeadEligibility) -> Self {
        Self {
            can_claim: e.can_claim,
            total_available_payment: e.available_amount,
            message: e.message,
        }
    }
}

#[derive(Serialize)]
pub struct LeadInfo {
    pub remaining_amount: i64,
}

#[derive(Serialize)]
pub struct RemainingPayment {
    pub id: String,
    pub amount: i64,
}

#[derive(Serialize)]
pub struct ClaimResponse {
    pub payment: PaymentResponse,
    pub lead_info: LeadInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_payment: Option<RemainingPayment>,
}

impl From<ClaimOutcome> for ClaimResponse {
    fn from(outcome: ClaimOutcome) -> Self {
        Self {
            payment: outcome.payment.into(),
            lead_info: LeadInfo {
                remaining_amount: outcome.lead_remaining,
            },
            remaining_payment: outcome.remainder.map(|r| RemainingPayment {
                id: r.id,
                amount: r.amount,
            }),
        }
    }
}

#[derive(Serialize)]
pub struct NotificationResponse {
    pub id: String,
    pub message: String,
    pub read: bool,
    pub created_at: String,
}

impl From<Notification> for NotificationResponse {
    fn from(n: Notification) -> Self {
        Self {
            id: n.id,
            message: n.message,
            read: n.read,
            created_at: rfc3339(n.created_at),
        }
    }
}

#[derive(Serialize)]
pub struct NotificationListResponse {
    pub notifications: Vec<NotificationResponse>,
}
