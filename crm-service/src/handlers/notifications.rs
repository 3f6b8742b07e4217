use axum::{extract::State, Json};
use service_core::error::AppError;

use crate::{
    dtos::NotificationListResponse, middleware::RequesterContext, AppState,
};

/// Notifications addressed to the requester, newest first.
pub async fn list_notifications(
    State(state): State<AppState>,
    requester: RequesterContext,
) -> Result<Json<NotificationListResponse>, AppError> {
    let notifications = state.store.list_notifications(&requester.user_id).await?;
    Ok(Json(NotificationListResponse {
        notifications: notifications.into_iter().map(Into::into).collect(),
    }))
}
