//! Public contact form, admin marketing broadcast, SMTP connectivity probe.

use axum::{Json, Router, extract::State, routing::post};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::AppState;
use crate::auth::AdminUser;
use crate::error::{ApiResult, AppError};
use crate::response::{ApiResponse, ok, ok_message};
use crate::services::email::{BroadcastSummary, broadcast, templates};
use crate::validation::{is_valid_email, missing_fields};

pub fn email_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/marketing", post(send_marketing))
        .route("/test", post(test_smtp))
}

pub fn contact_routes() -> Router<Arc<AppState>> {
    Router::new().route("/", post(submit_contact_form))
}

#[derive(Debug, Deserialize)]
pub struct ContactFormRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub phone: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// POST /api/contact — forwards the form to the configured admin address.
async fn submit_contact_form(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ContactFormRequest>,
) -> ApiResult<Json<ApiResponse<()>>> {
    let missing = missing_fields(&[
        ("name", &payload.name),
        ("email", &payload.email),
        ("message", &payload.message),
    ]);
    if !missing.is_empty() {
        return Err(AppError::MissingRequiredFields { fields: missing });
    }
    if !is_valid_email(&payload.email) {
        return Err(AppError::InvalidEmail);
    }

    let template = templates::contact_form(
        payload.name.trim(),
        payload.email.trim(),
        payload.phone.as_deref(),
        payload.message.trim(),
    );

    state
        .mailer
        .send(&state.config.admin_email, None, &template)
        .await
        .map_err(|e| AppError::ExternalServiceError {
            service: "smtp".to_string(),
            message: e.to_string(),
        })?;

    Ok(ok_message("Message sent"))
}

#[derive(Debug, Deserialize)]
pub struct MarketingRequest {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body_html: String,
    #[serde(default)]
    pub recipients: Vec<String>,
}

/// POST /api/email/marketing — admin broadcast with per-recipient tally.
/// A failed recipient never aborts the rest of the run.
async fn send_marketing(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Json(payload): Json<MarketingRequest>,
) -> ApiResult<Json<ApiResponse<BroadcastSummary>>> {
    let missing = missing_fields(&[
        ("subject", &payload.subject),
        ("body_html", &payload.body_html),
    ]);
    if !missing.is_empty() {
        return Err(AppError::MissingRequiredFields { fields: missing });
    }
    if payload.recipients.is_empty() {
        return Err(AppError::bad_request(
            "NO_RECIPIENTS",
            "At least one recipient is required",
        ));
    }

    let template = templates::marketing(payload.subject.trim(), &payload.body_html);
    let summary = broadcast(state.mailer.as_ref(), &payload.recipients, &template).await;

    let message = format!(
        "Broadcast finished: {} sent, {} failed",
        summary.total_sent, summary.total_failed
    );
    Ok(ok(message, summary))
}

#[derive(Debug, Serialize)]
pub struct SmtpProbeReport {
    pub configured: bool,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub troubleshooting: Vec<String>,
}

/// POST /api/email/test — probe the SMTP transport without sending mail.
/// Always 200; the probe result is the content.
async fn test_smtp(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> ApiResult<Json<ApiResponse<SmtpProbeReport>>> {
    if !state.config.smtp.is_configured() {
        return Ok(ok(
            "SMTP is not configured",
            SmtpProbeReport {
                configured: false,
                connected: false,
                error: Some("SMTP credentials are missing".to_string()),
                troubleshooting: vec![
                    "Set SMTP_HOST, SMTP_USERNAME and SMTP_PASSWORD".to_string(),
                    "Set SMTP_FROM_EMAIL to a sender your provider accepts".to_string(),
                ],
            },
        ));
    }

    match state.mailer.verify().await {
        Ok(()) => Ok(ok(
            "SMTP connection verified",
            SmtpProbeReport {
                configured: true,
                connected: true,
                error: None,
                troubleshooting: Vec::new(),
            },
        )),
        Err(e) => Ok(ok(
            "SMTP connection failed",
            SmtpProbeReport {
                configured: true,
                connected: false,
                error: Some(e.to_string()),
                troubleshooting: vec![
                    "Check SMTP_HOST and SMTP_PORT are reachable from this server".to_string(),
                    "Check the username/password pair is still valid".to_string(),
                    "Some providers require an app-specific password".to_string(),
                ],
            },
        )),
    }
}
