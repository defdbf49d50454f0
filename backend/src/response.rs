//! Success envelope shared by all endpoints: `{ success, message, content? }`.

use axum::{Json, http::StatusCode};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(message: impl Into<String>, content: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            content: Some(content),
        }
    }
}

impl ApiResponse<()> {
    pub fn message_only(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            content: None,
        }
    }
}

/// 200 with content.
pub fn ok<T: Serialize>(message: impl Into<String>, content: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse::new(message, content))
}

/// 201 with content.
pub fn created<T: Serialize>(
    message: impl Into<String>,
    content: T,
) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::CREATED, Json(ApiResponse::new(message, content)))
}

/// 200 with no content.
pub fn ok_message(message: impl Into<String>) -> Json<ApiResponse<()>> {
    Json(ApiResponse::message_only(message))
}
