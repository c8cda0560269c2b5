use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use atelie_inventory::{CreateMaterial, Material, MaterialCommand, MaterialId, RecordMovement};

use crate::app::dto;
use crate::app::errors::{ApiError, ApiResult, parse_id};
use crate::app::services::AppServices;
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_material).get(list_materials))
        .route("/low-stock", get(low_stock))
        .route("/:id", get(get_material))
        .route("/:id/movements", post(record_movement))
}

pub async fn create_material(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::CreateMaterialRequest>,
) -> ApiResult {
    let material_id = MaterialId::generate();
    let committed = services.execute::<Material>(
        tenant.tenant_id(),
        material_id.0,
        MaterialCommand::CreateMaterial(CreateMaterial {
            tenant_id: tenant.tenant_id(),
            material_id,
            name: body.name,
            unit: body.unit,
            initial_quantity: body.initial_quantity,
            minimum_quantity: body.minimum_quantity,
            unit_cost: body.unit_cost,
            occurred_at: Utc::now(),
        }),
    )?;

    Ok((StatusCode::CREATED, Json(dto::committed_to_json(material_id, &committed))).into_response())
}

/// Entry, exit or adjustment (physical count).
pub async fn record_movement(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RecordMovementRequest>,
) -> ApiResult {
    let material_id: MaterialId = parse_id(&id, "material")?;
    let committed = services.execute::<Material>(
        tenant.tenant_id(),
        material_id.0,
        MaterialCommand::RecordMovement(RecordMovement {
            tenant_id: tenant.tenant_id(),
            material_id,
            kind: body.kind,
            quantity: body.quantity,
            reason: body.reason,
            occurred_at: Utc::now(),
        }),
    )?;

    Ok(Json(dto::committed_to_json(material_id, &committed)).into_response())
}

/// Rehydrated from the event store, so it reflects writes immediately.
pub async fn get_material(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let material_id: MaterialId = parse_id(&id, "material")?;
    let material = services
        .fetch::<Material>(tenant.tenant_id(), material_id.0)?
        .ok_or(ApiError::NotFound("material"))?;

    Ok(Json(dto::material_to_json(&material)).into_response())
}

pub async fn list_materials(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> impl IntoResponse {
    let rows = services.materials().list(tenant.tenant_id());
    Json(dto::items_to_json(rows))
}

/// Materials at or below their minimum.
pub async fn low_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> impl IntoResponse {
    let rows = services.materials().low_stock(tenant.tenant_id());
    Json(dto::items_to_json(rows))
}
