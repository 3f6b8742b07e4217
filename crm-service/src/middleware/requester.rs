//! Request-scoped requester context.
//!
//! The upstream BFF authenticates the user and forwards their identity in
//! `X-User-ID` / `X-User-Role` headers; this service only consumes them.
//! Session mechanics stay upstream.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    SuperAdmin,
    Admin,
    Employee,
    Operation,
    Advocate,
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "super-admin" => Ok(Role::SuperAdmin),
            "admin" => Ok(Role::Admin),
            "employee" => Ok(Role::Employee),
            "operation" => Ok(Role::Operation),
            "advocate" => Ok(Role::Advocate),
            _ => Err(()),
        }
    }
}

/// Identity of the authenticated caller, extracted from trusted headers.
#[derive(Debug, Clone)]
pub struct RequesterContext {
    pub user_id: String,
    pub role: Role,
}

impl RequesterContext {
    /// Lead entry and payment-entry recording are back-office operations.
    pub fn can_manage_leads(&self) -> bool {
        matches!(self.role, Role::SuperAdmin | Role::Admin | Role::Operation)
    }

    /// Only employees claim payments.
    pub fn can_claim(&self) -> bool {
        matches!(self.role, Role::Employee)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequesterContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("X-User-ID")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Unauthorized(anyhow::anyhow!("Missing X-User-ID header"))
            })?;

        let role = parts
            .headers
            .get("X-User-Role")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Unauthorized(anyhow::anyhow!("Missing X-User-Role header"))
            })?;

        let role = Role::from_str(role).map_err(|_| {
            AppError::Unauthorized(anyhow::anyhow!("Unknown role: {}", role))
        })?;

        let span = tracing::Span::current();
        span.record("user_id", user_id);

        Ok(RequesterContext {
            user_id: user_id.to_string(),
            role,
        })
    }
}
