//! AMC contract endpoints: public submission with cart fan-out, customer and
//! admin queries, status transitions, detail patches.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
};
use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::AppState;
use crate::auth::{AdminUser, AuthUser};
use crate::error::{ApiResult, AppError};
use crate::pagination::{Paginated, PaginationParams};
use crate::response::{ApiResponse, created, ok};
use crate::services::email::{notify_detached, templates};
use crate::validation::{is_valid_email, missing_fields, one_of};
use upkeep_shared::{
    AmcContract, CONTRACT_STATUSES, CartLine, CartSubService, CatalogService, REQUEST_TYPES,
    SelectedSubService, SubService,
};

pub fn contract_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(submit_contract).get(list_contracts))
        .route("/my", get(my_contracts))
        .route("/:id", get(get_contract).put(update_contract))
        .route("/:id/status", put(update_contract_status))
}

// ==================== Request / response types ====================

#[derive(Debug, Deserialize)]
pub struct SubmitContractRequest {
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub contact_person: String,
    #[serde(default)]
    pub contact_phone: String,
    #[serde(default)]
    pub contact_email: String,
    #[serde(default)]
    pub address: String,
    pub user_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub services: Vec<CartLine>,
}

/// Summary projection of a request returned with its contract.
#[derive(Debug, Serialize, FromRow)]
pub struct RequestSummary {
    pub id: Uuid,
    pub service_name: String,
    pub category_name: String,
    pub request_type: String,
    pub status: String,
    pub total_price: Option<Decimal>,
    pub requested_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct ContractWithRequests {
    #[serde(flatten)]
    pub contract: AmcContract,
    pub service_requests: Vec<RequestSummary>,
}

/// Request populated with its catalog service and assigned vendor.
#[derive(Debug, Serialize, FromRow)]
pub struct PopulatedRequest {
    pub id: Uuid,
    pub service_id: Option<Uuid>,
    pub service_name: String,
    pub category_name: String,
    pub request_type: String,
    pub requested_date: Option<NaiveDate>,
    pub status: String,
    pub unit_price: Option<Decimal>,
    pub quantity: Option<i32>,
    pub total_price: Option<Decimal>,
    pub sub_services: serde_json::Value,
    pub catalog_service_name: Option<String>,
    pub catalog_service_images: Option<Vec<String>>,
    pub vendor_id: Option<Uuid>,
    pub vendor_name: Option<String>,
    pub vendor_phone: Option<String>,
    pub vendor_email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ContractDetail {
    #[serde(flatten)]
    pub contract: AmcContract,
    pub service_requests: Vec<PopulatedRequest>,
}

// Flattening PaginationParams here trips serde_urlencoded's number
// handling, so the two fields are spelled out.
#[derive(Debug, Deserialize)]
pub struct AdminListParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<String>,
    pub search: Option<String>,
}

impl AdminListParams {
    fn pagination(&self) -> PaginationParams {
        PaginationParams {
            page: self.page.unwrap_or(crate::pagination::DEFAULT_PAGE),
            limit: self.limit.unwrap_or(crate::pagination::DEFAULT_LIMIT),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ContractUpdateRequest {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub admin_notes: Option<String>,
    pub contract_value: Option<Decimal>,
}

// ==================== Pure submission logic ====================

/// Fail-fast validation; the first violated rule decides the error.
pub fn validate_submission(req: &SubmitContractRequest) -> ApiResult<()> {
    let missing = missing_fields(&[
        ("company_name", &req.company_name),
        ("contact_person", &req.contact_person),
        ("contact_phone", &req.contact_phone),
        ("contact_email", &req.contact_email),
        ("address", &req.address),
    ]);
    if !missing.is_empty() {
        return Err(AppError::MissingRequiredFields { fields: missing });
    }

    if !is_valid_email(&req.contact_email) {
        return Err(AppError::InvalidEmail);
    }

    if req.services.is_empty() {
        return Err(AppError::NoServices);
    }

    for line in &req.services {
        if let CartLine::Custom { service_name, .. } = line {
            if service_name.trim().is_empty() {
                return Err(AppError::InvalidCustomService);
            }
        }
    }

    Ok(())
}

/// `end_date` defaults to one calendar year after `start_date`.
pub fn derive_end_date(start: NaiveDate) -> NaiveDate {
    start
        .with_year(start.year() + 1)
        // Feb 29 with no leap target lands on Mar 1
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(start.year() + 1, 3, 1).unwrap_or(start))
}

/// Match cart sub-service selections against the catalog list by
/// case-insensitive trimmed name. Matched entries take the catalog's
/// canonical name and rate; quantity always comes from the cart. Selections
/// with no catalog counterpart are dropped.
pub fn reconcile_sub_services(
    catalog: &[SubService],
    selections: &[CartSubService],
) -> Vec<SelectedSubService> {
    selections
        .iter()
        .filter_map(|selection| {
            let wanted = selection.name.trim().to_lowercase();
            catalog
                .iter()
                .find(|offered| offered.name.trim().to_lowercase() == wanted)
                .map(|offered| SelectedSubService {
                    name: offered.name.clone(),
                    rate: offered.rate,
                    quantity: selection.quantity,
                })
        })
        .collect()
}

/// `AMC-YYYYMMDD-NNNN`.
pub fn format_contract_number(day: NaiveDate, seq: i64) -> String {
    format!("AMC-{}-{:04}", day.format("%Y%m%d"), seq)
}

fn parse_catalog_subs(value: &serde_json::Value) -> Vec<SubService> {
    serde_json::from_value(value.clone()).unwrap_or_default()
}

pub fn parse_uuid(value: &str, field: &'static str) -> ApiResult<Uuid> {
    Uuid::parse_str(value).map_err(|_| AppError::InvalidId { field })
}

/// Atomic per-day sequence: one upsert on the counter row, no
/// count-then-format race between concurrent submissions.
async fn next_contract_number(conn: &mut PgConnection) -> ApiResult<String> {
    let today = Utc::now().date_naive();
    let seq: i64 = sqlx::query_scalar(
        "INSERT INTO contract_counters (day, seq) VALUES ($1, 1)
         ON CONFLICT (day) DO UPDATE SET seq = contract_counters.seq + 1
         RETURNING seq",
    )
    .bind(today)
    .fetch_one(conn)
    .await?;

    Ok(format_contract_number(today, seq))
}

// ==================== Handlers ====================

/// POST /api/amc-contracts — public submission of a contract plus cart.
async fn submit_contract(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SubmitContractRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<ContractWithRequests>>)> {
    validate_submission(&payload)?;

    // Resolve every referenced catalog service up front; reject the whole
    // submission if any id is unknown or inactive.
    let requested_ids: Vec<Uuid> = payload
        .services
        .iter()
        .filter_map(|line| match line {
            CartLine::Catalog { service_id, .. } => Some(*service_id),
            CartLine::Custom { .. } => None,
        })
        .collect();

    let active: Vec<CatalogService> = if requested_ids.is_empty() {
        Vec::new()
    } else {
        sqlx::query_as::<_, CatalogService>(
            "SELECT * FROM catalog_services WHERE id = ANY($1) AND is_active = true",
        )
        .bind(&requested_ids)
        .fetch_all(&state.db_pool)
        .await?
    };
    let catalog: HashMap<Uuid, CatalogService> =
        active.into_iter().map(|s| (s.id, s)).collect();

    let invalid: Vec<Uuid> = requested_ids
        .iter()
        .filter(|id| !catalog.contains_key(id))
        .copied()
        .collect();
    if !invalid.is_empty() {
        return Err(AppError::InvalidServices { ids: invalid });
    }

    let end_date = payload
        .end_date
        .or_else(|| payload.start_date.map(derive_end_date));

    let mut tx = state.db_pool.begin().await?;

    let contract_number = next_contract_number(&mut tx).await?;
    let contract_id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        "INSERT INTO amc_contracts (
            id, contract_number, company_name, contact_person, contact_phone,
            contact_email, address, user_id, start_date, end_date, status, created_at
         ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'pending', $11)",
    )
    .bind(contract_id)
    .bind(&contract_number)
    .bind(payload.company_name.trim())
    .bind(payload.contact_person.trim())
    .bind(payload.contact_phone.trim())
    .bind(payload.contact_email.trim())
    .bind(payload.address.trim())
    .bind(payload.user_id)
    .bind(payload.start_date)
    .bind(end_date)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let mut request_ids = Vec::with_capacity(payload.services.len());

    for line in &payload.services {
        let request_id = Uuid::new_v4();

        let (
            service_id,
            service_name,
            category_name,
            request_type,
            requested_date,
            unit_price,
            quantity,
            sub_services,
            questions,
        ) = match line {
            CartLine::Custom {
                service_name,
                requested_date,
                questions,
                ..
            } => (
                None,
                service_name.trim().to_string(),
                "Custom Service".to_string(),
                "quotation".to_string(),
                *requested_date,
                None,
                None,
                Vec::new(),
                questions.clone(),
            ),
            CartLine::Catalog {
                service_id,
                service_name,
                category_name,
                request_type,
                requested_date,
                unit_price,
                quantity,
                sub_services,
                questions,
            } => {
                // Pre-validated map; a missing entry is skipped, not fatal.
                let Some(service) = catalog.get(service_id) else {
                    tracing::warn!(
                        "Cart line references {} absent from the validated set, skipping",
                        service_id
                    );
                    continue;
                };
                let request_type = match request_type {
                    Some(t) => one_of(t, "request_type", REQUEST_TYPES)?,
                    None => "quotation".to_string(),
                };
                let selected =
                    reconcile_sub_services(&parse_catalog_subs(&service.sub_services), sub_services);
                (
                    Some(service.id),
                    service_name.clone().unwrap_or_else(|| service.name.clone()),
                    category_name
                        .clone()
                        .unwrap_or_else(|| service.category.clone()),
                    request_type,
                    *requested_date,
                    *unit_price,
                    *quantity,
                    selected,
                    questions.clone(),
                )
            }
        };

        let total_price = match (unit_price, quantity) {
            (Some(price), Some(qty)) => Some(price * Decimal::from(qty)),
            _ => None,
        };

        sqlx::query(
            "INSERT INTO service_requests (
                id, contract_id, service_id, service_name, category_name,
                requester_name, requester_phone, requester_email, address,
                request_type, requested_date, status, unit_price, quantity,
                total_price, sub_services, questions, payment_status, created_at
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 'pending',
                       $12, $13, $14, $15, $16, 'unpaid', $17)",
        )
        .bind(request_id)
        .bind(contract_id)
        .bind(service_id)
        .bind(&service_name)
        .bind(&category_name)
        .bind(payload.contact_person.trim())
        .bind(payload.contact_phone.trim())
        .bind(payload.contact_email.trim())
        .bind(payload.address.trim())
        .bind(&request_type)
        .bind(requested_date)
        .bind(unit_price)
        .bind(quantity)
        .bind(total_price)
        .bind(serde_json::to_value(&sub_services).unwrap_or_default())
        .bind(serde_json::to_value(&questions).unwrap_or_default())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        request_ids.push(request_id);
    }

    // Backlink the created request ids onto the contract before committing.
    sqlx::query("UPDATE amc_contracts SET service_request_ids = $2 WHERE id = $1")
        .bind(contract_id)
        .bind(&request_ids)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    // Best-effort admin notification, detached from this request's outcome.
    notify_detached(
        state.mailer.clone(),
        state.config.admin_email.clone(),
        templates::admin_contract_notification(&templates::ContractNotificationData {
            contract_number: contract_number.clone(),
            company_name: payload.company_name.trim().to_string(),
            contact_person: payload.contact_person.trim().to_string(),
            contact_email: payload.contact_email.trim().to_string(),
            contact_phone: payload.contact_phone.trim().to_string(),
            service_count: request_ids.len(),
        }),
    );

    let content = fetch_contract_with_requests(&state, contract_id).await?;
    Ok(created("Contract submitted", content))
}

async fn fetch_contract_with_requests(
    state: &AppState,
    contract_id: Uuid,
) -> ApiResult<ContractWithRequests> {
    let contract =
        sqlx::query_as::<_, AmcContract>("SELECT * FROM amc_contracts WHERE id = $1")
            .bind(contract_id)
            .fetch_optional(&state.db_pool)
            .await?
            .ok_or_else(|| AppError::not_found("Contract"))?;

    let service_requests = sqlx::query_as::<_, RequestSummary>(
        "SELECT id, service_name, category_name, request_type, status, total_price,
                requested_date
         FROM service_requests
         WHERE contract_id = $1
         ORDER BY created_at ASC, id ASC",
    )
    .bind(contract_id)
    .fetch_all(&state.db_pool)
    .await?;

    Ok(ContractWithRequests {
        contract,
        service_requests,
    })
}

/// GET /api/amc-contracts/:id — one contract with populated requests.
async fn get_contract(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<ContractDetail>>> {
    let contract_id = parse_uuid(&id, "contract id")?;

    let contract =
        sqlx::query_as::<_, AmcContract>("SELECT * FROM amc_contracts WHERE id = $1")
            .bind(contract_id)
            .fetch_optional(&state.db_pool)
            .await?
            .ok_or_else(|| AppError::not_found("Contract"))?;

    // Deterministic ordering so repeated reads serialize identically.
    let service_requests = sqlx::query_as::<_, PopulatedRequest>(
        "SELECT
            r.id, r.service_id, r.service_name, r.category_name, r.request_type,
            r.requested_date, r.status, r.unit_price, r.quantity, r.total_price,
            r.sub_services,
            s.name as catalog_service_name, s.images as catalog_service_images,
            r.vendor_id, v.name as vendor_name, v.phone as vendor_phone,
            v.email as vendor_email
         FROM service_requests r
         LEFT JOIN catalog_services s ON r.service_id = s.id
         LEFT JOIN vendors v ON r.vendor_id = v.id
         WHERE r.contract_id = $1
         ORDER BY r.created_at ASC, r.id ASC",
    )
    .bind(contract_id)
    .fetch_all(&state.db_pool)
    .await?;

    Ok(ok(
        "Contract retrieved",
        ContractDetail {
            contract,
            service_requests,
        },
    ))
}

/// GET /api/amc-contracts/my — the caller's contracts, matched by linked
/// user id, contact email, or profile phone.
async fn my_contracts(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Query(params): Query<PaginationParams>,
) -> ApiResult<Json<ApiResponse<Paginated<AmcContract>>>> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM amc_contracts
         WHERE user_id = $1 OR contact_email = $2
            OR ($3::text IS NOT NULL AND contact_phone = $3)",
    )
    .bind(user.id)
    .bind(&user.email)
    .bind(&user.phone)
    .fetch_one(&state.db_pool)
    .await?;

    let contracts = sqlx::query_as::<_, AmcContract>(
        "SELECT * FROM amc_contracts
         WHERE user_id = $1 OR contact_email = $2
            OR ($3::text IS NOT NULL AND contact_phone = $3)
         ORDER BY created_at DESC
         LIMIT $4 OFFSET $5",
    )
    .bind(user.id)
    .bind(&user.email)
    .bind(&user.phone)
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(&state.db_pool)
    .await?;

    Ok(ok(
        "Contracts retrieved",
        Paginated::new(contracts, &params, total),
    ))
}

/// GET /api/amc-contracts — admin listing with status filter and search.
async fn list_contracts(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Query(params): Query<AdminListParams>,
) -> ApiResult<Json<ApiResponse<Paginated<AmcContract>>>> {
    let status = match &params.status {
        Some(s) => Some(one_of(s, "status", CONTRACT_STATUSES)?),
        None => None,
    };
    let pattern = params
        .search
        .as_ref()
        .map(|q| format!("%{}%", q.trim()));
    let pagination = params.pagination();

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM amc_contracts
         WHERE ($1::text IS NULL OR status = $1)
           AND ($2::text IS NULL
                OR company_name ILIKE $2 OR contract_number ILIKE $2
                OR contact_person ILIKE $2 OR contact_email ILIKE $2)",
    )
    .bind(&status)
    .bind(&pattern)
    .fetch_one(&state.db_pool)
    .await?;

    let contracts = sqlx::query_as::<_, AmcContract>(
        "SELECT * FROM amc_contracts
         WHERE ($1::text IS NULL OR status = $1)
           AND ($2::text IS NULL
                OR company_name ILIKE $2 OR contract_number ILIKE $2
                OR contact_person ILIKE $2 OR contact_email ILIKE $2)
         ORDER BY created_at DESC
         LIMIT $3 OFFSET $4",
    )
    .bind(&status)
    .bind(&pattern)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db_pool)
    .await?;

    Ok(ok(
        "Contracts retrieved",
        Paginated::new(contracts, &pagination, total),
    ))
}

/// PUT /api/amc-contracts/:id/status — admin transition; cancelling a
/// contract cascades to every non-terminal child request.
async fn update_contract_status(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<String>,
    Json(payload): Json<StatusUpdateRequest>,
) -> ApiResult<Json<ApiResponse<AmcContract>>> {
    let contract_id = parse_uuid(&id, "contract id")?;
    let status = one_of(&payload.status, "status", CONTRACT_STATUSES)?;

    let contract = sqlx::query_as::<_, AmcContract>(
        "UPDATE amc_contracts SET status = $2, updated_at = NOW()
         WHERE id = $1
         RETURNING *",
    )
    .bind(contract_id)
    .bind(&status)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| AppError::not_found("Contract"))?;

    if status == "cancelled" {
        // Not transactional with the status write; a failed cascade leaves
        // children recoverable by repeating the update.
        let cascaded = sqlx::query(
            "UPDATE service_requests SET status = 'cancelled', updated_at = NOW()
             WHERE contract_id = $1 AND status NOT IN ('completed', 'cancelled')",
        )
        .bind(contract_id)
        .execute(&state.db_pool)
        .await?;
        tracing::info!(
            "Contract {} cancelled, {} child requests cascaded",
            contract.contract_number,
            cascaded.rows_affected()
        );
    }

    Ok(ok("Contract status updated", contract))
}

/// PUT /api/amc-contracts/:id — admin partial patch of dates/notes/value.
async fn update_contract(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<String>,
    Json(payload): Json<ContractUpdateRequest>,
) -> ApiResult<Json<ApiResponse<AmcContract>>> {
    let contract_id = parse_uuid(&id, "contract id")?;

    let mut contract = sqlx::query_as::<_, AmcContract>(
        "UPDATE amc_contracts SET
            start_date = COALESCE($2, start_date),
            end_date = COALESCE($3, end_date),
            admin_notes = COALESCE($4, admin_notes),
            contract_value = COALESCE($5, contract_value),
            updated_at = NOW()
         WHERE id = $1
         RETURNING *",
    )
    .bind(contract_id)
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(payload.admin_notes)
    .bind(payload.contract_value)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| AppError::not_found("Contract"))?;

    // Re-derive the end date when a start date exists without one.
    if let (Some(start), None) = (contract.start_date, contract.end_date) {
        contract = sqlx::query_as::<_, AmcContract>(
            "UPDATE amc_contracts SET end_date = $2 WHERE id = $1 RETURNING *",
        )
        .bind(contract_id)
        .bind(derive_end_date(start))
        .fetch_one(&state.db_pool)
        .await?;
    }

    Ok(ok("Contract updated", contract))
}
