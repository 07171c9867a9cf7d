use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use chrono::Utc;

use super::session::AppState;
use crate::error::AppError;
use crate::models::user::User;
use crate::services::token;

/// The caller behind a verified bearer token.
///
/// Handlers receive this explicitly instead of reading ambient auth state.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user: User,
}

/// An authenticated caller holding the ADMIN role
#[derive(Debug, Clone)]
pub struct AdminSession {
    pub user: User,
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for AuthSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AppError::Unauthorized)?;

        let claims = token::verify_token(&state.token_key, token, Utc::now()).map_err(|e| {
            tracing::debug!(error = %e, "Rejected bearer token");
            AppError::Unauthorized
        })?;

        let user = User::find_by_id(&state.pool, claims.sub)
            .await?
            .ok_or(AppError::Unauthorized)?;

        Ok(AuthSession { user })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthSession { user } = AuthSession::from_request_parts(parts, state).await?;

        if !user.is_admin() {
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }

        Ok(AdminSession { user })
    }
}
