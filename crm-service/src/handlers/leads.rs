//! Lead entry and the per-lead claims view.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use validator::Validate;

use crate::{
    dtos::{
        ClaimListResponse, CreateLeadRequest, LeadListResponse, LeadResponse,
        PaymentEntryRequest, PaymentEntryResponse,
    },
    middleware::RequesterContext,
    models::Lead,
    AppState,
};

pub async fn create_lead(
    State(state): State<AppState>,
    requester: RequesterContext,
    Json(payload): Json<CreateLeadRequest>,
) -> Result<(StatusCode, Json<LeadResponse>), AppError> {
    if !requester.can_manage_leads() {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Only admin or operation roles may create leads"
        )));
    }
    payload.validate()?;

    let lead = Lead::new(
        payload.name,
        payload.phone,
        payload.notes,
        payload.available_payment_amount.unwrap_or(0),
        requester.user_id.clone(),
    );

    tracing::info!(
        lead_id = %lead.id,
        created_by = %requester.user_id,
        opening_balance = lead.available_payment_amount,
        "Creating lead"
    );

    state.store.insert_lead(lead.clone()).await?;

    Ok((StatusCode::CREATED, Json(LeadResponse::from(lead))))
}

pub async fn list_leads(
    State(state): State<AppState>,
    _requester: RequesterContext,
) -> Result<Json<LeadListResponse>, AppError> {
    let leads = state.store.list_leads().await?;
    Ok(Json(LeadListResponse {
        leads: leads.into_iter().map(LeadResponse::from).collect(),
    }))
}

pub async fn get_lead(
    State(state): State<AppState>,
    _requester: RequesterContext,
    Path(lead_id): Path<String>,
) -> Result<Json<LeadResponse>, AppError> {
    let lead = state
        .store
        .get_lead(&lead_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Lead {} not found", lead_id)))?;
    Ok(Json(LeadResponse::from(lead)))
}

/// Record a payment entry against a lead, crediting its available balance.
/// This is the only path that increases `available_payment_amount`.
pub async fn record_payment_entry(
    State(state): State<AppState>,
    requester: RequesterContext,
    Path(lead_id): Path<String>,
    Json(payload): Json<PaymentEntryRequest>,
) -> Result<Json<PaymentEntryResponse>, AppError> {
    if !requester.can_manage_leads() {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Only admin or operation roles may record payment entries"
        )));
    }
    payload.validate()?;

    let new_balance = state
        .store
        .credit_lead_balance(&lead_id, payload.amount)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Lead {} not found", lead_id)))?;

    tracing::info!(
        lead_id = %lead_id,
        amount = payload.amount,
        new_balance,
        recorded_by = %requester.user_id,
        "Payment entry recorded"
    );

    Ok(Json(PaymentEntryResponse {
        lead_id,
        available_payment_amount: new_balance,
    }))
}

/// Claims-history projection for a lead.
pub async fn claims_for_lead(
    State(state): State<AppState>,
    _requester: RequesterContext,
    Path(lead_id): Path<String>,
) -> Result<Json<ClaimListResponse>, AppError> {
    let claims = state.allocator.claims_for_lead(&lead_id).await?;
    Ok(Json(ClaimListResponse {
        claims: claims.into_iter().map(Into::into).collect(),
    }))
}
