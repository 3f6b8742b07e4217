//! Payment pool and claim endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use validator::Validate;

use crate::{
    dtos::{
        ClaimRequest, ClaimResponse, CreatePaymentRequest, EligibilityResponse,
        PaymentListResponse, PaymentResponse,
    },
    middleware::RequesterContext,
    models::Payment,
    AppState,
};

pub async fn create_payment(
    State(state): State<AppState>,
    requester: RequesterContext,
    Json(payload): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<PaymentResponse>), AppError> {
    if !requester.can_manage_leads() {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Only admin or operation roles may create payment entries"
        )));
    }
    payload.validate()?;

    let payment = Payment::new(payload.amount, payload.source);

    tracing::info!(
        payment_id = %payment.id,
        amount = payment.amount,
        created_by = %requester.user_id,
        "Creating payment"
    );

    state.store.insert_payment(payment.clone()).await?;

    Ok((StatusCode::CREATED, Json(PaymentResponse::from(payment))))
}

pub async fn list_available_payments(
    State(state): State<AppState>,
    _requester: RequesterContext,
) -> Result<Json<PaymentListResponse>, AppError> {
    let payments = state.allocator.list_available_payments().await?;
    Ok(Json(PaymentListResponse {
        payments: payments.into_iter().map(Into::into).collect(),
    }))
}

/// Read-only check: can this lead absorb a claim right now?
pub async fn check_lead(
    State(state): State<AppState>,
    _requester: RequesterContext,
    Path(lead_id): Path<String>,
) -> Result<Json<EligibilityResponse>, AppError> {
    let eligibility = state.allocator.check_lead_eligibility(&lead_id).await?;
    Ok(Json(eligibility.into()))
}

pub async fn claim_with_lead(
    State(state): State<AppState>,
    requester: RequesterContext,
    Path(payment_id): Path<String>,
    Json(payload): Json<ClaimRequest>,
) -> Result<Json<ClaimResponse>, AppError> {
    if !requester.can_claim() {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Only employees may claim payments"
        )));
    }
    payload.validate()?;

    let outcome = state
        .allocator
        .claim_payment(&payment_id, &payload.lead_id, &requester.user_id)
        .await?;

    Ok(Json(outcome.into()))
}
