use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

use atelie_fulfillment::{AvailabilityReport, Shortfall};
use atelie_infra::event_store::StoredEvent;
use atelie_infra::projections::MaterialStockReadModel;
use atelie_inventory::{Material, MaterialId, MovementKind};
use atelie_products::{BillLine, BillOfMaterials, Product};
use atelie_sales::Order;

use crate::app::errors::{self, ApiResult};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateMaterialRequest {
    pub name: String,
    pub unit: String,
    #[serde(default)]
    pub initial_quantity: Decimal,
    #[serde(default)]
    pub minimum_quantity: Decimal,
    /// Cost per unit in the smallest currency unit.
    #[serde(default)]
    pub unit_cost: u64,
}

#[derive(Debug, Deserialize)]
pub struct RecordMovementRequest {
    pub kind: MovementKind,
    pub quantity: Decimal,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BillLineRequest {
    pub material_id: String,
    pub quantity_per_unit: Decimal,
    pub unit: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    #[serde(default)]
    pub bill: Vec<BillLineRequest>,
    #[serde(default)]
    pub labor_minutes: u32,
    #[serde(default)]
    pub profit_margin: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceBillRequest {
    pub bill: Vec<BillLineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub customer_name: String,
}

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: String,
    pub quantity: i64,
    pub unit_price: u64,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: String,
}

pub fn to_bill(lines: Vec<BillLineRequest>) -> ApiResult<BillOfMaterials> {
    lines
        .into_iter()
        .map(|l| {
            Ok(BillLine {
                material_id: errors::parse_id::<MaterialId>(&l.material_id, "material")?,
                quantity_per_unit: l.quantity_per_unit,
                unit: l.unit,
            })
        })
        .collect()
}

// -------------------------
// JSON mapping helpers
// -------------------------

/// Body for successful writes: the stream id and where it now stands.
pub fn committed_to_json(id: impl std::fmt::Display, committed: &[StoredEvent]) -> JsonValue {
    json!({
        "id": id.to_string(),
        "events_committed": committed.len(),
        "stream_version": committed.last().map(StoredEvent::stream_version).unwrap_or(0),
    })
}

pub fn items_to_json(rows: Vec<MaterialStockReadModel>) -> JsonValue {
    json!({ "items": rows.into_iter().map(material_rm_to_json).collect::<Vec<_>>() })
}

pub fn material_to_json(m: &Material) -> JsonValue {
    json!({
        "id": m.id_typed().to_string(),
        "name": m.name(),
        "unit": m.unit(),
        "quantity": m.quantity(),
        "minimum_quantity": m.minimum_quantity(),
        "unit_cost": m.unit_cost(),
        "low_stock": m.is_low_stock(),
    })
}

pub fn material_rm_to_json(rm: MaterialStockReadModel) -> JsonValue {
    json!({
        "id": rm.material_id.to_string(),
        "low_stock": rm.is_low_stock(),
        "name": rm.name,
        "unit": rm.unit,
        "quantity": rm.quantity,
        "minimum_quantity": rm.minimum_quantity,
        "unit_cost": rm.unit_cost,
    })
}

pub fn product_to_json(p: &Product) -> JsonValue {
    json!({
        "id": p.id_typed().to_string(),
        "name": p.name(),
        "labor_minutes": p.labor_minutes(),
        "profit_margin": p.profit_margin(),
        "bill": p.bill().iter().map(|l| json!({
            "material_id": l.material_id.to_string(),
            "quantity_per_unit": l.quantity_per_unit,
            "unit": l.unit,
        })).collect::<Vec<_>>(),
    })
}

pub fn order_to_json(o: &Order) -> JsonValue {
    json!({
        "id": o.id_typed().to_string(),
        "customer_name": o.customer_name(),
        "status": o.status().as_str(),
        "total": o.total(),
        "items": o.items().iter().map(|i| json!({
            "item_no": i.item_no,
            "product_id": i.product_id.to_string(),
            "quantity": i.quantity,
            "unit_price": i.unit_price,
        })).collect::<Vec<_>>(),
    })
}

pub fn shortfall_to_json(s: &Shortfall) -> JsonValue {
    json!({
        "material_id": s.material_id.to_string(),
        "name": s.name,
        "unit": s.unit,
        "required": s.required,
        "available": s.available,
        "missing": s.missing(),
    })
}

pub fn report_to_json(report: &AvailabilityReport) -> JsonValue {
    json!({
        "available": report.available,
        "shortfalls": report.shortfalls.iter().map(shortfall_to_json).collect::<Vec<_>>(),
    })
}
