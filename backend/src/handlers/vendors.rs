//! Vendor availability management (admin-set and self-service) plus vendor
//! profile, KYC and banking updates.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, put},
};
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::AppState;
use crate::auth::{AdminUser, AuthVendor};
use crate::error::{ApiResult, AppError};
use crate::response::{ApiResponse, ok};
use crate::validation::{is_valid_day_of_week, is_valid_phone, is_valid_time, parse_date};
use upkeep_shared::{Vendor, WeeklySlot};

pub fn admin_vendor_routes() -> Router<Arc<AppState>> {
    Router::new().route("/:vendor_id/availability", put(admin_set_availability))
}

pub fn vendor_self_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(my_profile).put(update_my_profile))
        .route("/kyc", put(submit_kyc))
        .route("/banking", put(update_banking))
        .route("/availability", put(set_my_availability))
}

// ==================== Availability validation ====================

#[derive(Debug, Deserialize)]
pub struct AvailabilityUpdate {
    pub weekly_availability: Option<Vec<WeeklySlot>>,
    pub unavailable_dates: Option<Vec<String>>,
}

/// Check every weekly slot: known day, HH:MM times, start before end.
pub fn validate_weekly_slots(slots: &[WeeklySlot]) -> ApiResult<()> {
    for slot in slots {
        if !is_valid_day_of_week(&slot.day) {
            return Err(AppError::bad_request(
                "INVALID_DAY_OF_WEEK",
                format!("Unknown day of week: {}", slot.day),
            ));
        }
        if !is_valid_time(&slot.start_time) || !is_valid_time(&slot.end_time) {
            return Err(AppError::bad_request(
                "INVALID_TIME_FORMAT",
                format!(
                    "Times must be HH:MM 24-hour, got {}-{}",
                    slot.start_time, slot.end_time
                ),
            ));
        }
        if slot.start_time >= slot.end_time {
            return Err(AppError::bad_request(
                "INVALID_TIME_RANGE",
                format!(
                    "Slot start must precede end, got {}-{}",
                    slot.start_time, slot.end_time
                ),
            ));
        }
    }
    Ok(())
}

/// Parse the submitted dates; any unparseable entry fails the whole update.
pub fn parse_unavailable_dates(values: &[String]) -> ApiResult<Vec<NaiveDate>> {
    values
        .iter()
        .map(|v| parse_date(v, "INVALID_DATE"))
        .collect()
}

fn normalized_slots(slots: &[WeeklySlot]) -> Vec<WeeklySlot> {
    slots
        .iter()
        .map(|s| WeeklySlot {
            day: s.day.trim().to_lowercase(),
            start_time: s.start_time.clone(),
            end_time: s.end_time.clone(),
        })
        .collect()
}

/// Overwrite only the supplied fields; an absent field keeps its value.
async fn apply_availability(
    state: &AppState,
    vendor_id: Uuid,
    payload: AvailabilityUpdate,
) -> ApiResult<Vendor> {
    let weekly = match &payload.weekly_availability {
        Some(slots) => {
            validate_weekly_slots(slots)?;
            Some(serde_json::to_value(normalized_slots(slots)).unwrap_or_default())
        }
        None => None,
    };
    let dates = match &payload.unavailable_dates {
        Some(values) => Some(parse_unavailable_dates(values)?),
        None => None,
    };

    let vendor = sqlx::query_as::<_, Vendor>(
        "UPDATE vendors SET
            weekly_availability = COALESCE($2, weekly_availability),
            unavailable_dates = COALESCE($3, unavailable_dates),
            updated_at = NOW()
         WHERE id = $1
         RETURNING *",
    )
    .bind(vendor_id)
    .bind(weekly)
    .bind(dates)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| AppError::not_found("Vendor"))?;

    Ok(vendor)
}

// ==================== Handlers ====================

/// PUT /api/admin/vendor/:vendor_id/availability
async fn admin_set_availability(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(vendor_id): Path<String>,
    Json(payload): Json<AvailabilityUpdate>,
) -> ApiResult<Json<ApiResponse<Vendor>>> {
    let vendor_id = Uuid::parse_str(&vendor_id).map_err(|_| AppError::InvalidVendorId)?;
    let vendor = apply_availability(&state, vendor_id, payload).await?;
    Ok(ok("Vendor availability updated", vendor))
}

/// PUT /api/vendors/me/availability
async fn set_my_availability(
    State(state): State<Arc<AppState>>,
    auth: AuthVendor,
    Json(payload): Json<AvailabilityUpdate>,
) -> ApiResult<Json<ApiResponse<Vendor>>> {
    let vendor = apply_availability(&state, auth.vendor.id, payload).await?;
    Ok(ok("Availability updated", vendor))
}

/// GET /api/vendors/me
async fn my_profile(auth: AuthVendor) -> Json<ApiResponse<Vendor>> {
    ok("Profile retrieved", auth.vendor)
}

#[derive(Debug, Deserialize)]
pub struct VendorProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// PUT /api/vendors/me
async fn update_my_profile(
    State(state): State<Arc<AppState>>,
    auth: AuthVendor,
    Json(payload): Json<VendorProfileUpdate>,
) -> ApiResult<Json<ApiResponse<Vendor>>> {
    if let Some(phone) = &payload.phone {
        if !is_valid_phone(phone) {
            return Err(AppError::bad_request(
                "INVALID_PHONE",
                "Phone must be 7-15 digits with an optional leading +",
            ));
        }
    }
    let name = payload
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string);

    let vendor = sqlx::query_as::<_, Vendor>(
        "UPDATE vendors SET
            name = COALESCE($2, name),
            phone = COALESCE($3, phone),
            address = COALESCE($4, address),
            updated_at = NOW()
         WHERE id = $1
         RETURNING *",
    )
    .bind(auth.vendor.id)
    .bind(name)
    .bind(payload.phone.as_deref().map(str::trim))
    .bind(payload.address.as_deref().map(str::trim))
    .fetch_one(&state.db_pool)
    .await?;

    Ok(ok("Profile updated", vendor))
}

#[derive(Debug, Deserialize)]
pub struct KycSubmission {
    pub documents: serde_json::Value,
}

/// PUT /api/vendors/me/kyc — a new submission always re-enters review.
async fn submit_kyc(
    State(state): State<Arc<AppState>>,
    auth: AuthVendor,
    Json(payload): Json<KycSubmission>,
) -> ApiResult<Json<ApiResponse<Vendor>>> {
    let vendor = sqlx::query_as::<_, Vendor>(
        "UPDATE vendors SET kyc_documents = $2, kyc_status = 'pending', updated_at = NOW()
         WHERE id = $1
         RETURNING *",
    )
    .bind(auth.vendor.id)
    .bind(&payload.documents)
    .fetch_one(&state.db_pool)
    .await?;

    Ok(ok("KYC documents submitted", vendor))
}

#[derive(Debug, Deserialize)]
pub struct BankingUpdate {
    #[serde(default)]
    pub account_name: String,
    #[serde(default)]
    pub account_number: String,
    #[serde(default)]
    pub ifsc: String,
}

/// PUT /api/vendors/me/banking — all three fields travel together.
async fn update_banking(
    State(state): State<Arc<AppState>>,
    auth: AuthVendor,
    Json(payload): Json<BankingUpdate>,
) -> ApiResult<Json<ApiResponse<Vendor>>> {
    let missing = crate::validation::missing_fields(&[
        ("account_name", &payload.account_name),
        ("account_number", &payload.account_number),
        ("ifsc", &payload.ifsc),
    ]);
    if !missing.is_empty() {
        return Err(AppError::MissingRequiredFields { fields: missing });
    }

    let vendor = sqlx::query_as::<_, Vendor>(
        "UPDATE vendors SET
            bank_account_name = $2,
            bank_account_number = $3,
            bank_ifsc = $4,
            updated_at = NOW()
         WHERE id = $1
         RETURNING *",
    )
    .bind(auth.vendor.id)
    .bind(payload.account_name.trim())
    .bind(payload.account_number.trim())
    .bind(payload.ifsc.trim())
    .fetch_one(&state.db_pool)
    .await?;

    Ok(ok("Banking details updated", vendor))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(day: &str, start: &str, end: &str) -> WeeklySlot {
        WeeklySlot {
            day: day.to_string(),
            start_time: start.to_string(),
            end_time: end.to_string(),
        }
    }

    #[test]
    fn valid_schedule_passes() {
        let slots = vec![slot("monday", "09:00", "17:00"), slot("Friday", "08:30", "12:00")];
        assert!(validate_weekly_slots(&slots).is_ok());
    }

    #[test]
    fn unknown_day_rejected() {
        let err = validate_weekly_slots(&[slot("funday", "09:00", "17:00")]).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_DAY_OF_WEEK");
    }

    #[test]
    fn bad_time_rejected() {
        let err = validate_weekly_slots(&[slot("monday", "9:00", "17:00")]).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_TIME_FORMAT");
    }

    #[test]
    fn inverted_range_rejected() {
        let err = validate_weekly_slots(&[slot("monday", "17:00", "09:00")]).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_TIME_RANGE");
    }

    #[test]
    fn dates_parse_or_fail_with_code() {
        let ok = parse_unavailable_dates(&["2024-06-01".to_string()]).unwrap();
        assert_eq!(ok[0], NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());

        let err = parse_unavailable_dates(&["01/06/2024".to_string()]).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_DATE");
    }

    #[test]
    fn days_are_normalised_to_lowercase() {
        let slots = normalized_slots(&[slot(" Monday ", "09:00", "17:00")]);
        assert_eq!(slots[0].day, "monday");
    }
}
