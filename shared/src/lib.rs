use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of an AMC contract. Transitions after creation are admin-only.
pub const CONTRACT_STATUSES: &[&str] = &["draft", "pending", "active", "completed", "cancelled"];

/// Lifecycle of a service request.
pub const REQUEST_STATUSES: &[&str] = &[
    "pending", "quoted", "assigned", "accepted", "in_progress", "completed", "cancelled",
];

/// How a service request is fulfilled.
pub const REQUEST_TYPES: &[&str] = &["quotation", "on_time", "scheduled"];

pub const PAYMENT_STATUSES: &[&str] = &["unpaid", "pending", "paid", "failed", "refunded"];

pub const DAYS_OF_WEEK: &[&str] = &[
    "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday",
];

/// Request statuses that a contract cancellation does not touch.
pub const TERMINAL_REQUEST_STATUSES: &[&str] = &["completed", "cancelled"];

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: String, // customer, admin, vendor
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vendor {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub is_active: bool,
    /// Weekly schedule entries, `[{day, start_time, end_time}]`.
    pub weekly_availability: serde_json::Value,
    /// Specific dates the vendor is unavailable.
    pub unavailable_dates: Vec<NaiveDate>,
    pub kyc_status: String, // unsubmitted, pending, verified, rejected
    pub kyc_documents: serde_json::Value,
    pub bank_account_name: Option<String>,
    pub bank_account_number: Option<String>,
    pub bank_ifsc: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// One entry of a vendor's weekly schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklySlot {
    pub day: String,
    pub start_time: String, // HH:MM
    pub end_time: String,   // HH:MM
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogService {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub images: Vec<String>,
    pub base_price: Option<Decimal>,
    /// Sub-service offerings, `[{name, rate}]`.
    pub sub_services: serde_json::Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A sub-service offering under a catalog service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubService {
    pub name: String,
    pub rate: Decimal,
}

/// A sub-service picked on a request line: catalog rate/name, cart quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedSubService {
    pub name: String,
    pub rate: Decimal,
    pub quantity: i32,
}

/// Free-form question/answer captured with a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionAnswer {
    pub question: String,
    pub answer: String,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmcContract {
    pub id: Uuid,
    /// Human-readable number, `AMC-YYYYMMDD-NNNN`.
    pub contract_number: String,
    pub company_name: String,
    pub contact_person: String,
    pub contact_phone: String,
    pub contact_email: String,
    pub address: String,
    pub user_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: String,
    pub admin_notes: Option<String>,
    pub contract_value: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub id: Uuid,
    pub contract_id: Option<Uuid>,
    pub service_id: Option<Uuid>,
    pub service_name: String,
    pub category_name: String,
    pub requester_name: String,
    pub requester_phone: String,
    pub requester_email: String,
    pub address: String,
    pub request_type: String,
    pub requested_date: Option<NaiveDate>,
    pub status: String,
    pub unit_price: Option<Decimal>,
    pub quantity: Option<i32>,
    pub total_price: Option<Decimal>,
    /// `[{name, rate, quantity}]`.
    pub sub_services: serde_json::Value,
    /// `[{question, answer}]`.
    pub questions: serde_json::Value,
    pub vendor_id: Option<Uuid>,
    pub payment_method: Option<String>,
    pub payment_status: String,
    pub payment_reference: Option<String>,
    pub payment_link_token: Option<String>,
    pub payment_link_expires_at: Option<DateTime<Utc>>,
    pub payment_link_used: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmcAsset {
    pub id: Uuid,
    pub contract_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub location: Option<String>,
    /// `[{url, filename}]`.
    pub images: serde_json::Value,
    /// `[{service_id?, service_name, is_custom, number_of_times, scheduled_dates}]`.
    pub linked_services: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// An image stored for an asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetImage {
    pub url: String,
    pub filename: String,
}

/// One service linked to an asset, with its recurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedService {
    pub service_id: Option<Uuid>,
    pub service_name: String,
    #[serde(default)]
    pub is_custom: bool,
    #[serde(default = "default_number_of_times")]
    pub number_of_times: i32,
    #[serde(default)]
    pub scheduled_dates: Vec<NaiveDate>,
}

fn default_number_of_times() -> i32 {
    1
}

/// One line of a contract-submission cart. Tagged union: a catalog reference
/// or a free-text custom service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CartLine {
    Catalog {
        service_id: Uuid,
        service_name: Option<String>,
        category_name: Option<String>,
        request_type: Option<String>,
        requested_date: Option<NaiveDate>,
        unit_price: Option<Decimal>,
        quantity: Option<i32>,
        #[serde(default)]
        sub_services: Vec<CartSubService>,
        #[serde(default)]
        questions: Vec<QuestionAnswer>,
    },
    Custom {
        service_name: String,
        description: Option<String>,
        requested_date: Option<NaiveDate>,
        #[serde(default)]
        questions: Vec<QuestionAnswer>,
    },
}

/// A sub-service selection as submitted in the cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartSubService {
    pub name: String,
    #[serde(default = "default_sub_quantity")]
    pub quantity: i32,
}

fn default_sub_quantity() -> i32 {
    1
}
