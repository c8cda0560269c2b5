use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use chrono::Utc;

use atelie_products::{CreateProduct, Product, ProductCommand, ProductId, ReplaceBillOfMaterials};

use crate::app::dto;
use crate::app::errors::{ApiError, ApiResult, parse_id};
use crate::app::services::AppServices;
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_product))
        .route("/:id", get(get_product))
        .route("/:id/bill", put(replace_bill))
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::CreateProductRequest>,
) -> ApiResult {
    let bill = dto::to_bill(body.bill)?;
    let product_id = ProductId::generate();

    let committed = services.execute::<Product>(
        tenant.tenant_id(),
        product_id.0,
        ProductCommand::CreateProduct(CreateProduct {
            tenant_id: tenant.tenant_id(),
            product_id,
            name: body.name,
            bill,
            labor_minutes: body.labor_minutes,
            profit_margin: body.profit_margin,
            occurred_at: Utc::now(),
        }),
    )?;

    Ok((StatusCode::CREATED, Json(dto::committed_to_json(product_id, &committed))).into_response())
}

/// Replaces the whole bill of materials; an empty bill is allowed.
pub async fn replace_bill(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReplaceBillRequest>,
) -> ApiResult {
    let product_id: ProductId = parse_id(&id, "product")?;
    let bill = dto::to_bill(body.bill)?;

    let committed = services.execute::<Product>(
        tenant.tenant_id(),
        product_id.0,
        ProductCommand::ReplaceBillOfMaterials(ReplaceBillOfMaterials {
            tenant_id: tenant.tenant_id(),
            product_id,
            bill,
            occurred_at: Utc::now(),
        }),
    )?;

    Ok(Json(dto::committed_to_json(product_id, &committed)).into_response())
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let product_id: ProductId = parse_id(&id, "product")?;
    let product = services
        .fetch::<Product>(tenant.tenant_id(), product_id.0)?
        .ok_or(ApiError::NotFound("product"))?;

    Ok(Json(dto::product_to_json(&product)).into_response())
}
