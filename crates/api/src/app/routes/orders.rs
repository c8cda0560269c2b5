use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use atelie_products::{Product, ProductId};
use atelie_sales::{AddItem, CreateOrder, Order, OrderCommand, OrderId, OrderStatus};

use crate::app::dto;
use crate::app::errors::{ApiError, ApiResult, parse_id};
use crate::app::services::AppServices;
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_order))
        .route("/:id", get(get_order))
        .route("/:id/items", post(add_item))
        .route("/:id/stock-availability", get(stock_availability))
        .route("/:id/status", post(change_status))
}

/// New orders start as quotations.
pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::CreateOrderRequest>,
) -> ApiResult {
    let order_id = OrderId::generate();
    let committed = services.execute::<Order>(
        tenant.tenant_id(),
        order_id.0,
        OrderCommand::CreateOrder(CreateOrder {
            tenant_id: tenant.tenant_id(),
            order_id,
            customer_name: body.customer_name,
            occurred_at: Utc::now(),
        }),
    )?;

    let mut json = dto::committed_to_json(order_id, &committed);
    json["status"] = OrderStatus::Quotation.as_str().into();
    Ok((StatusCode::CREATED, Json(json)).into_response())
}

pub async fn add_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AddItemRequest>,
) -> ApiResult {
    let order_id: OrderId = parse_id(&id, "order")?;
    let product_id: ProductId = parse_id(&body.product_id, "product")?;

    // Items must point at an existing product of the same tenant.
    if services.fetch::<Product>(tenant.tenant_id(), product_id.0)?.is_none() {
        return Err(ApiError::NotFound("product"));
    }

    let committed = services.execute::<Order>(
        tenant.tenant_id(),
        order_id.0,
        OrderCommand::AddItem(AddItem {
            tenant_id: tenant.tenant_id(),
            order_id,
            product_id,
            quantity: body.quantity,
            unit_price: body.unit_price,
            occurred_at: Utc::now(),
        }),
    )?;

    Ok(Json(dto::committed_to_json(order_id, &committed)).into_response())
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let order_id: OrderId = parse_id(&id, "order")?;
    let order = services
        .fetch::<Order>(tenant.tenant_id(), order_id.0)?
        .ok_or(ApiError::NotFound("order"))?;

    Ok(Json(dto::order_to_json(&order)).into_response())
}

/// Read-only: what producing this order would consume, and what is missing.
pub async fn stock_availability(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let order_id: OrderId = parse_id(&id, "order")?;
    let report = services
        .fulfillment()
        .check_stock_availability(tenant.tenant_id(), order_id)?;

    Ok(Json(dto::report_to_json(&report)).into_response())
}

/// Guarded transition: entering `producing` checks and deducts stock.
pub async fn change_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ChangeStatusRequest>,
) -> ApiResult {
    let order_id: OrderId = parse_id(&id, "order")?;
    let to: OrderStatus = body
        .status
        .parse()
        .map_err(|e: atelie_core::DomainError| ApiError::bad_request("invalid_status", e.to_string()))?;

    let order = services
        .fulfillment()
        .change_order_status(tenant.tenant_id(), order_id, to, Utc::now())?;

    Ok(Json(dto::order_to_json(&order)).into_response())
}
