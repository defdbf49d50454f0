//! Asset endpoints nested under a contract: multipart create/update with
//! image uploads, service linking, scoped delete.

use axum::{
    Json, Router,
    extract::{Multipart, Path, State},
    http::StatusCode,
    routing::{get, put},
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::AppState;
use crate::auth::AdminUser;
use crate::error::{ApiResult, AppError};
use crate::handlers::contracts::parse_uuid;
use crate::response::{ApiResponse, created, ok, ok_message};
use upkeep_shared::{AmcAsset, AssetImage, LinkedService};

pub fn asset_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_assets).post(create_asset))
        .route("/:asset_id", put(update_asset).delete(delete_asset))
        .route("/:asset_id/link-services", put(replace_linked_services))
}

// ==================== Multipart decoding ====================

/// Fields collected from a multipart asset form. Image parts are streamed
/// into storage by the caller; everything else lands here as text.
#[derive(Debug, Default)]
struct AssetForm {
    name: Option<String>,
    description: Option<String>,
    location: Option<String>,
    linked_services: Option<serde_json::Value>,
    remove_images: Vec<String>,
    uploads: Vec<(String, Vec<u8>)>,
}

async fn read_asset_form(mut multipart: Multipart) -> ApiResult<AssetForm> {
    let mut form = AssetForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request("INVALID_MULTIPART", e.to_string()))?
    {
        let Some(field_name) = field.name().map(str::to_string) else {
            continue;
        };

        match field_name.as_str() {
            "images" => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| "upload.bin".to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::bad_request("INVALID_MULTIPART", e.to_string()))?;
                form.uploads.push((file_name, bytes.to_vec()));
            }
            "name" => form.name = Some(text_field(field).await?),
            "description" => form.description = Some(text_field(field).await?),
            "location" => form.location = Some(text_field(field).await?),
            "linked_services" => {
                let raw = text_field(field).await?;
                form.linked_services = serde_json::from_str(&raw).ok();
            }
            "remove_images" => {
                let raw = text_field(field).await?;
                form.remove_images = serde_json::from_str(&raw).unwrap_or_default();
            }
            _ => {}
        }
    }

    Ok(form)
}

async fn text_field(field: axum::extract::multipart::Field<'_>) -> ApiResult<String> {
    field
        .text()
        .await
        .map_err(|e| AppError::bad_request("INVALID_MULTIPART", e.to_string()))
}

// ==================== Linked-service normalisation ====================

/// Linked services arrive either as a JSON array or as a JSON string that
/// itself encodes an array (form clients double-encode). Anything that does
/// not parse cleanly becomes an empty list, never an error.
pub fn normalize_linked_services(value: &serde_json::Value) -> Vec<LinkedService> {
    let candidate = match value {
        serde_json::Value::String(inner) => {
            match serde_json::from_str::<serde_json::Value>(inner) {
                Ok(parsed) => parsed,
                Err(_) => return Vec::new(),
            }
        }
        other => other.clone(),
    };
    serde_json::from_value(candidate).unwrap_or_default()
}

/// Keep custom links as-is; catalog links survive only when they reference
/// an active service.
async fn filter_active_links(
    state: &AppState,
    links: Vec<LinkedService>,
) -> ApiResult<Vec<LinkedService>> {
    let catalog_ids: Vec<Uuid> = links
        .iter()
        .filter(|l| !l.is_custom)
        .filter_map(|l| l.service_id)
        .collect();

    let active: Vec<Uuid> = if catalog_ids.is_empty() {
        Vec::new()
    } else {
        sqlx::query_scalar(
            "SELECT id FROM catalog_services WHERE id = ANY($1) AND is_active = true",
        )
        .bind(&catalog_ids)
        .fetch_all(&state.db_pool)
        .await?
    };

    Ok(links
        .into_iter()
        .filter(|l| {
            l.is_custom
                || l.service_id
                    .map(|id| active.contains(&id))
                    .unwrap_or(false)
        })
        .collect())
}

async fn require_contract(state: &AppState, contract_id: Uuid) -> ApiResult<()> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM amc_contracts WHERE id = $1)")
            .bind(contract_id)
            .fetch_one(&state.db_pool)
            .await?;
    if exists {
        Ok(())
    } else {
        Err(AppError::not_found("Contract"))
    }
}

// ==================== Handlers ====================

/// POST /api/amc-contracts/:contract_id/assets — multipart form with
/// optional image files under `images`.
async fn create_asset(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(contract_id): Path<String>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<ApiResponse<AmcAsset>>)> {
    let contract_id = parse_uuid(&contract_id, "contract id")?;
    require_contract(&state, contract_id).await?;

    let form = read_asset_form(multipart).await?;
    let name = form.name.as_deref().unwrap_or("").trim().to_string();
    if name.is_empty() {
        return Err(AppError::MissingRequiredFields {
            fields: vec!["name"],
        });
    }

    let links = match &form.linked_services {
        Some(value) => {
            filter_active_links(&state, normalize_linked_services(value)).await?
        }
        None => Vec::new(),
    };

    // Sequential stores; a failed upload aborts before any row is written.
    let mut images: Vec<AssetImage> = Vec::with_capacity(form.uploads.len());
    for (file_name, bytes) in &form.uploads {
        let stored = state
            .storage
            .store(file_name, bytes)
            .await
            .map_err(|e| AppError::internal(format!("Image store failed: {}", e)))?;
        images.push(stored);
    }

    let asset = sqlx::query_as::<_, AmcAsset>(
        "INSERT INTO amc_assets (id, contract_id, name, description, location,
                                 images, linked_services, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
         RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(contract_id)
    .bind(&name)
    .bind(form.description.as_deref().map(str::trim))
    .bind(form.location.as_deref().map(str::trim))
    .bind(serde_json::to_value(&images).unwrap_or_default())
    .bind(serde_json::to_value(&links).unwrap_or_default())
    .fetch_one(&state.db_pool)
    .await?;

    Ok(created("Asset created", asset))
}

/// GET /api/amc-contracts/:contract_id/assets — newest first.
async fn list_assets(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(contract_id): Path<String>,
) -> ApiResult<Json<ApiResponse<Vec<AmcAsset>>>> {
    let contract_id = parse_uuid(&contract_id, "contract id")?;
    require_contract(&state, contract_id).await?;

    let assets = sqlx::query_as::<_, AmcAsset>(
        "SELECT * FROM amc_assets WHERE contract_id = $1 ORDER BY created_at DESC",
    )
    .bind(contract_id)
    .fetch_all(&state.db_pool)
    .await?;

    Ok(ok("Assets retrieved", assets))
}

/// PUT /api/amc-contracts/:contract_id/assets/:asset_id — multipart patch.
/// `remove_images` drops stored files by URL; new `images` parts append.
async fn update_asset(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path((contract_id, asset_id)): Path<(String, String)>,
    multipart: Multipart,
) -> ApiResult<Json<ApiResponse<AmcAsset>>> {
    let contract_id = parse_uuid(&contract_id, "contract id")?;
    let asset_id = parse_uuid(&asset_id, "asset id")?;

    let asset = sqlx::query_as::<_, AmcAsset>(
        "SELECT * FROM amc_assets WHERE id = $1 AND contract_id = $2",
    )
    .bind(asset_id)
    .bind(contract_id)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or(AppError::AssetNotFound)?;

    let form = read_asset_form(multipart).await?;

    let mut images: Vec<AssetImage> =
        serde_json::from_value(asset.images.clone()).unwrap_or_default();

    for url in &form.remove_images {
        if let Some(pos) = images.iter().position(|img| &img.url == url) {
            images.remove(pos);
            // Stored file removal is tolerant; a vanished file is not an error.
            if let Err(e) = state.storage.remove_by_url(url).await {
                tracing::warn!("Could not remove stored image {}: {}", url, e);
            }
        }
    }

    for (file_name, bytes) in &form.uploads {
        let stored = state
            .storage
            .store(file_name, bytes)
            .await
            .map_err(|e| AppError::internal(format!("Image store failed: {}", e)))?;
        images.push(stored);
    }

    let links = match &form.linked_services {
        Some(value) => Some(
            filter_active_links(&state, normalize_linked_services(value)).await?,
        ),
        None => None,
    };

    let name = form
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string);

    let updated = sqlx::query_as::<_, AmcAsset>(
        "UPDATE amc_assets SET
            name = COALESCE($3, name),
            description = COALESCE($4, description),
            location = COALESCE($5, location),
            images = $6,
            linked_services = COALESCE($7, linked_services),
            updated_at = NOW()
         WHERE id = $1 AND contract_id = $2
         RETURNING *",
    )
    .bind(asset_id)
    .bind(contract_id)
    .bind(name)
    .bind(form.description.as_deref().map(str::trim))
    .bind(form.location.as_deref().map(str::trim))
    .bind(serde_json::to_value(&images).unwrap_or_default())
    .bind(links.map(|l| serde_json::to_value(&l).unwrap_or_default()))
    .fetch_one(&state.db_pool)
    .await?;

    Ok(ok("Asset updated", updated))
}

#[derive(Debug, Deserialize)]
pub struct ReplaceServicesRequest {
    #[serde(default)]
    pub services: serde_json::Value,
}

/// PUT /api/amc-contracts/:contract_id/assets/:asset_id/link-services —
/// replace
/// the full linked-services list.
async fn replace_linked_services(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path((contract_id, asset_id)): Path<(String, String)>,
    Json(payload): Json<ReplaceServicesRequest>,
) -> ApiResult<Json<ApiResponse<AmcAsset>>> {
    let contract_id = parse_uuid(&contract_id, "contract id")?;
    let asset_id = parse_uuid(&asset_id, "asset id")?;

    let links =
        filter_active_links(&state, normalize_linked_services(&payload.services)).await?;

    let asset = sqlx::query_as::<_, AmcAsset>(
        "UPDATE amc_assets SET linked_services = $3, updated_at = NOW()
         WHERE id = $1 AND contract_id = $2
         RETURNING *",
    )
    .bind(asset_id)
    .bind(contract_id)
    .bind(serde_json::to_value(&links).unwrap_or_default())
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or(AppError::AssetNotFound)?;

    Ok(ok("Asset services updated", asset))
}

/// DELETE /api/amc-contracts/:contract_id/assets/:asset_id — scoped to the
/// contract; an asset under a different contract is not found.
async fn delete_asset(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path((contract_id, asset_id)): Path<(String, String)>,
) -> ApiResult<Json<ApiResponse<()>>> {
    let contract_id = parse_uuid(&contract_id, "contract id")?;
    let asset_id = parse_uuid(&asset_id, "asset id")?;

    let asset = sqlx::query_as::<_, AmcAsset>(
        "DELETE FROM amc_assets WHERE id = $1 AND contract_id = $2 RETURNING *",
    )
    .bind(asset_id)
    .bind(contract_id)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or(AppError::AssetNotFound)?;

    // Stored files go after the row; orphans are tolerated over dangling rows.
    let images: Vec<AssetImage> = serde_json::from_value(asset.images).unwrap_or_default();
    for image in &images {
        if let Err(e) = state.storage.remove_by_url(&image.url).await {
            tracing::warn!("Could not remove stored image {}: {}", image.url, e);
        }
    }

    Ok(ok_message("Asset deleted"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_plain_array() {
        let value = json!([
            {"service_id": "550e8400-e29b-41d4-a716-446655440000", "service_name": "HVAC"},
            {"service_name": "Bespoke clean", "is_custom": true, "number_of_times": 4}
        ]);
        let links = normalize_linked_services(&value);
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].service_name, "HVAC");
        assert_eq!(links[0].number_of_times, 1);
        assert!(links[1].is_custom);
        assert_eq!(links[1].number_of_times, 4);
    }

    #[test]
    fn normalizes_double_encoded_string() {
        let value = json!("[{\"service_name\": \"Pest control\", \"is_custom\": true}]");
        let links = normalize_linked_services(&value);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].service_name, "Pest control");
    }

    #[test]
    fn malformed_input_becomes_empty_list() {
        assert!(normalize_linked_services(&json!("not json")).is_empty());
        assert!(normalize_linked_services(&json!({"service_name": "obj not array"})).is_empty());
        assert!(normalize_linked_services(&json!(42)).is_empty());
    }

    #[test]
    fn empty_array_stays_empty() {
        assert!(normalize_linked_services(&json!([])).is_empty());
    }
}
