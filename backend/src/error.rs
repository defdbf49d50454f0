//! Standardized error handling for the Upkeep API.
//!
//! Every error renders through the same response envelope as successful
//! calls: `{ success, message, content?, code? }`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

/// Application error type that can be converted to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    // Authentication / authorization
    Unauthorized(String),
    Forbidden(String),

    // Resource errors
    NotFound(String),
    AssetNotFound,

    // Id-format errors (400, not 404 — the id itself is malformed)
    InvalidId { field: &'static str },
    InvalidVendorId,

    // Contract-submission validation, in fail-fast order
    MissingRequiredFields { fields: Vec<&'static str> },
    InvalidEmail,
    NoServices,
    InvalidCustomService,
    InvalidServices { ids: Vec<Uuid> },

    // Generic input validation
    BadRequest { code: &'static str, message: String },
    ValidationError { details: HashMap<String, Vec<String>> },

    // Server errors
    InternalError(String),
    DatabaseError(String),
    ExternalServiceError { service: String, message: String },
}

impl AppError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) | Self::AssetNotFound => StatusCode::NOT_FOUND,
            Self::InvalidId { .. }
            | Self::InvalidVendorId
            | Self::MissingRequiredFields { .. }
            | Self::InvalidEmail
            | Self::NoServices
            | Self::InvalidCustomService
            | Self::InvalidServices { .. }
            | Self::BadRequest { .. }
            | Self::ValidationError { .. } => StatusCode::BAD_REQUEST,
            Self::InternalError(_) | Self::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ExternalServiceError { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::AssetNotFound => "ASSET_NOT_FOUND",
            Self::InvalidId { .. } => "INVALID_ID",
            Self::InvalidVendorId => "INVALID_VENDOR_ID",
            Self::MissingRequiredFields { .. } => "MISSING_REQUIRED_FIELDS",
            Self::InvalidEmail => "INVALID_EMAIL",
            Self::NoServices => "NO_SERVICES",
            Self::InvalidCustomService => "INVALID_CUSTOM_SERVICE",
            Self::InvalidServices { .. } => "INVALID_SERVICES",
            Self::BadRequest { code, .. } => code,
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::InternalError(_) => "INTERNAL_ERROR",
            Self::DatabaseError(_) => "DATABASE_ERROR",
            Self::ExternalServiceError { .. } => "EXTERNAL_SERVICE_ERROR",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Unauthorized(msg) | Self::Forbidden(msg) => msg.clone(),
            Self::NotFound(resource) => format!("{} not found", resource),
            Self::AssetNotFound => "Asset not found under this contract".to_string(),
            Self::InvalidId { field } => format!("Invalid {} format", field),
            Self::InvalidVendorId => "Invalid vendor id format".to_string(),
            Self::MissingRequiredFields { fields } => {
                format!("Missing required fields: {}", fields.join(", "))
            }
            Self::InvalidEmail => "Invalid email address".to_string(),
            Self::NoServices => "At least one service is required".to_string(),
            Self::InvalidCustomService => "Custom service entries must have a name".to_string(),
            Self::InvalidServices { ids } => {
                format!("Unknown or inactive services: {}", join_ids(ids))
            }
            Self::BadRequest { message, .. } => message.clone(),
            Self::ValidationError { .. } => "Validation failed".to_string(),
            Self::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                "An internal error occurred".to_string()
            }
            Self::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                "A database error occurred".to_string()
            }
            Self::ExternalServiceError { service, message } => {
                tracing::error!("External service error ({}): {}", service, message);
                format!("External service '{}' is unavailable", service)
            }
        }
    }

    /// Structured payload carried in `content` for errors that report more
    /// than a message (offending ids, field-level details).
    fn content(&self) -> Option<serde_json::Value> {
        match self {
            Self::InvalidServices { ids } => Some(json!({ "invalid_service_ids": ids })),
            Self::MissingRequiredFields { fields } => Some(json!({ "missing_fields": fields })),
            Self::ValidationError { details } => Some(json!({ "errors": details })),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<serde_json::Value>,
    code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorEnvelope {
            success: false,
            message: self.message(),
            content: self.content(),
            code: self.error_code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("Resource".to_string()),
            _ => Self::DatabaseError(err.to_string()),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Unauthorized(format!("Invalid token: {}", err))
    }
}

fn join_ids(ids: &[Uuid]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias for handlers.
pub type ApiResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(AppError::NoServices.error_code(), "NO_SERVICES");
        assert_eq!(AppError::InvalidEmail.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::NotFound("Contract".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(AppError::AssetNotFound.error_code(), "ASSET_NOT_FOUND");
    }

    #[test]
    fn test_invalid_services_carries_ids() {
        let id = Uuid::new_v4();
        let err = AppError::InvalidServices { ids: vec![id] };
        let content = err.content().unwrap();
        assert_eq!(content["invalid_service_ids"][0], json!(id.to_string()));
    }
}
