use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::jwt;
use crate::AppState;
use crate::error::AppError;
use upkeep_shared::{User, Vendor};

/// Authenticated user extractor
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

/// Authenticated user with the admin role
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

/// Authenticated vendor with their vendor profile loaded
#[derive(Debug, Clone)]
pub struct AuthVendor {
    pub user: User,
    pub vendor: Vendor,
}

async fn load_bearer_user(parts: &mut Parts, state: &Arc<AppState>) -> Result<User, Response> {
    let auth_header = parts
        .headers
        .get("authorization")
        .and_then(|header| header.to_str().ok())
        .ok_or_else(|| {
            AppError::Unauthorized("Missing authorization header".to_string()).into_response()
        })?;

    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        AppError::Unauthorized("Invalid authorization format".to_string()).into_response()
    })?;

    let token_data = jwt::verify_jwt(token).map_err(|e| AppError::from(e).into_response())?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 AND is_active = true")
        .bind(token_data.claims.sub)
        .fetch_optional(&state.db_pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()).into_response())?
        .ok_or_else(|| {
            AppError::Unauthorized("User not found or inactive".to_string()).into_response()
        })?;

    Ok(user)
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(AuthUser(load_bearer_user(parts, state).await?))
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = load_bearer_user(parts, state).await?;
        if user.role != "admin" {
            return Err(
                AppError::Forbidden("Administrator access required".to_string()).into_response(),
            );
        }
        Ok(AdminUser(user))
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthVendor {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = load_bearer_user(parts, state).await?;
        if user.role != "vendor" {
            return Err(AppError::Forbidden("Vendor access required".to_string()).into_response());
        }

        let vendor = sqlx::query_as::<_, Vendor>("SELECT * FROM vendors WHERE user_id = $1")
            .bind(user.id)
            .fetch_optional(&state.db_pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()).into_response())?
            .ok_or_else(|| {
                AppError::NotFound("Vendor profile".to_string()).into_response()
            })?;

        Ok(AuthVendor { user, vendor })
    }
}
