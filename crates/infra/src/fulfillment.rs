//! Order fulfillment: stock availability, stock deduction and the guarded move
//! of an order into production.
//!
//! Everything here reads aggregates at a known stream version and appends
//! expecting exactly that version, so a deduction racing another stock change
//! fails as a whole and is retried on fresh state.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use atelie_core::{Aggregate, TenantId};
use atelie_events::{EventBus, EventEnvelope};
use atelie_fulfillment::{
    AvailabilityReport, MaterialRequirements, PlanningError, StockLevel, check_availability,
};
use atelie_inventory::{ConsumeForOrder, Material, MaterialCommand, MaterialId};
use atelie_products::{BillOfMaterials, Product, ProductId};
use atelie_sales::{ChangeStatus, Order, OrderCommand, OrderId, OrderStatus};

use crate::command_dispatcher::{CommandDispatcher, DispatchError, Loaded, load_aggregate, to_uncommitted};
use crate::event_store::{EventStore, EventStoreError, StoredEvent, StreamAppend};

pub const DEFAULT_CONFLICT_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum FulfillmentError {
    #[error("{}", .0.rejection_message())]
    InsufficientStock(AvailabilityReport),

    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("material not found: {0}")]
    MaterialNotFound(MaterialId),

    #[error("required quantity of material {0} is out of range")]
    QuantityOverflow(MaterialId),

    #[error("stock kept changing concurrently; gave up after {attempts} attempts")]
    ConflictRetriesExhausted { attempts: u32 },

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl From<EventStoreError> for FulfillmentError {
    fn from(value: EventStoreError) -> Self {
        FulfillmentError::Dispatch(value.into())
    }
}

impl From<PlanningError> for FulfillmentError {
    fn from(value: PlanningError) -> Self {
        match value {
            PlanningError::UnknownProduct(id) => FulfillmentError::ProductNotFound(id),
            PlanningError::UnknownMaterial(id) => FulfillmentError::MaterialNotFound(id),
            PlanningError::QuantityOverflow(id) => FulfillmentError::QuantityOverflow(id),
        }
    }
}

/// Order, requirements and materials read at known versions.
struct ProductionPlan {
    order: Loaded<Order>,
    requirements: MaterialRequirements,
    materials: BTreeMap<MaterialId, Loaded<Material>>,
    report: AvailabilityReport,
}

/// Fulfillment operations over the event store.
///
/// Shares the dispatcher's store and bus so committed events reach the same
/// projections as ordinary commands.
#[derive(Debug)]
pub struct FulfillmentService<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
    conflict_retries: u32,
}

impl<S, B> FulfillmentService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(dispatcher: Arc<CommandDispatcher<S, B>>) -> Self {
        Self {
            dispatcher,
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
        }
    }

    /// Number of reload-and-retry rounds after a concurrency conflict.
    pub fn with_conflict_retries(mut self, retries: u32) -> Self {
        self.conflict_retries = retries;
        self
    }

    /// Whether the order's items can be produced from current stock.
    ///
    /// Pure read: nothing is written.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, order_id = %order_id), err)]
    pub fn check_stock_availability(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
    ) -> Result<AvailabilityReport, FulfillmentError> {
        let plan = self.plan(tenant_id, order_id)?;
        debug!(
            available = plan.report.available,
            shortfalls = plan.report.shortfalls.len(),
            "stock availability checked"
        );
        Ok(plan.report)
    }

    /// Deduct the order's aggregated requirements from stock in one atomic append.
    ///
    /// Materials the order does not use are untouched. Fails with
    /// `InsufficientStock` instead of driving any material negative.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, order_id = %order_id), err)]
    pub fn deduct_stock(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
        occurred_at: DateTime<Utc>,
    ) -> Result<MaterialRequirements, FulfillmentError> {
        self.with_retries(|| {
            let plan = self.plan(tenant_id, order_id)?;
            if !plan.report.available {
                return Err(FulfillmentError::InsufficientStock(plan.report));
            }

            let batch = consumption_batch(tenant_id, order_id, &plan, occurred_at)?;
            self.commit(batch)?;

            info!(materials = plan.requirements.len(), "stock deducted");
            Ok(plan.requirements)
        })
    }

    /// Change an order's status.
    ///
    /// Moving into `producing` checks stock first and, when enough is on hand,
    /// commits the material consumption and the status change in the same
    /// append. When stock is short the order and every material stay as they
    /// were. Other transitions touch only the order.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, order_id = %order_id, to = %to), err)]
    pub fn change_order_status(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
        to: OrderStatus,
        occurred_at: DateTime<Utc>,
    ) -> Result<Order, FulfillmentError> {
        self.with_retries(|| {
            let command = OrderCommand::ChangeStatus(ChangeStatus {
                tenant_id,
                order_id,
                to,
                occurred_at,
            });

            if to != OrderStatus::Producing {
                let loaded = self.load_order(tenant_id, order_id)?;
                let decided = loaded.aggregate.handle(&command).map_err(DispatchError::from)?;
                let part = StreamAppend::new(
                    loaded.expected_version(),
                    to_uncommitted(tenant_id, order_id.0, atelie_sales::AGGREGATE_TYPE, &decided)?,
                );
                self.commit(vec![part])?;

                let mut order = loaded.aggregate;
                decided.iter().for_each(|ev| order.apply(ev));
                info!(status = %order.status(), "order status changed");
                return Ok(order);
            }

            let plan = self.plan(tenant_id, order_id)?;

            // Transition rules are checked before stock so an order that cannot
            // enter production is not reported as short.
            let decided = plan.order.aggregate.handle(&command).map_err(DispatchError::from)?;

            if !plan.report.available {
                warn!(
                    shortfalls = plan.report.shortfalls.len(),
                    "production refused: insufficient stock"
                );
                return Err(FulfillmentError::InsufficientStock(plan.report));
            }

            let mut batch = consumption_batch(tenant_id, order_id, &plan, occurred_at)?;
            batch.push(StreamAppend::new(
                plan.order.expected_version(),
                to_uncommitted(tenant_id, order_id.0, atelie_sales::AGGREGATE_TYPE, &decided)?,
            ));
            self.commit(batch)?;

            let mut order = plan.order.aggregate;
            decided.iter().for_each(|ev| order.apply(ev));
            info!(
                materials = plan.requirements.len(),
                "order moved into production; stock deducted"
            );
            Ok(order)
        })
    }

    /// Run `op`, reloading and retrying while it fails on a concurrency conflict.
    fn with_retries<T>(
        &self,
        mut op: impl FnMut() -> Result<T, FulfillmentError>,
    ) -> Result<T, FulfillmentError> {
        let attempts = self.conflict_retries + 1;
        for attempt in 1..=attempts {
            match op() {
                Err(FulfillmentError::Dispatch(DispatchError::Concurrency(msg))) => {
                    warn!(attempt, error = %msg, "concurrent stock change; retrying");
                }
                other => return other,
            }
        }
        Err(FulfillmentError::ConflictRetriesExhausted { attempts })
    }

    fn commit(&self, batch: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, FulfillmentError> {
        if batch.is_empty() {
            return Ok(vec![]);
        }
        let committed = self.dispatcher.store().append_streams(batch)?;
        self.dispatcher.publish_committed(&committed);
        Ok(committed)
    }

    fn load_order(&self, tenant_id: TenantId, order_id: OrderId) -> Result<Loaded<Order>, FulfillmentError> {
        let loaded = load_aggregate(self.dispatcher.store(), tenant_id, order_id.0, |_, id| {
            Order::empty(OrderId::new(id))
        })?;
        if !loaded.aggregate.is_created() {
            return Err(FulfillmentError::OrderNotFound(order_id));
        }
        Ok(loaded)
    }

    fn load_bill(&self, tenant_id: TenantId, product_id: ProductId) -> Result<BillOfMaterials, FulfillmentError> {
        let loaded = load_aggregate(self.dispatcher.store(), tenant_id, product_id.0, |_, id| {
            Product::empty(ProductId::new(id))
        })?;
        if !loaded.aggregate.is_created() {
            return Err(FulfillmentError::ProductNotFound(product_id));
        }
        Ok(loaded.aggregate.bill().clone())
    }

    fn load_material(
        &self,
        tenant_id: TenantId,
        material_id: MaterialId,
    ) -> Result<Loaded<Material>, FulfillmentError> {
        let loaded = load_aggregate(self.dispatcher.store(), tenant_id, material_id.0, |_, id| {
            Material::empty(MaterialId::new(id))
        })?;
        if !loaded.aggregate.is_created() {
            return Err(FulfillmentError::MaterialNotFound(material_id));
        }
        Ok(loaded)
    }

    fn plan(&self, tenant_id: TenantId, order_id: OrderId) -> Result<ProductionPlan, FulfillmentError> {
        let order = self.load_order(tenant_id, order_id)?;

        let mut bills = BTreeMap::new();
        for item in order.aggregate.items() {
            if !bills.contains_key(&item.product_id) {
                bills.insert(item.product_id, self.load_bill(tenant_id, item.product_id)?);
            }
        }

        let requirements = MaterialRequirements::from_items(order.aggregate.items(), &bills)?;

        let mut materials = BTreeMap::new();
        let mut stock = BTreeMap::new();
        for material_id in requirements.materials() {
            let loaded = self.load_material(tenant_id, material_id)?;
            stock.insert(material_id, StockLevel::from(&loaded.aggregate));
            materials.insert(material_id, loaded);
        }

        let report = check_availability(&requirements, &stock)?;

        Ok(ProductionPlan {
            order,
            requirements,
            materials,
            report,
        })
    }
}

/// One `ConsumedForOrder` append per required material, each expecting the
/// version the material was read at.
fn consumption_batch(
    tenant_id: TenantId,
    order_id: OrderId,
    plan: &ProductionPlan,
    occurred_at: DateTime<Utc>,
) -> Result<Vec<StreamAppend>, FulfillmentError> {
    let mut batch = Vec::with_capacity(plan.requirements.len() + 1);

    for (material_id, quantity) in plan.requirements.iter() {
        let loaded = plan
            .materials
            .get(&material_id)
            .ok_or(FulfillmentError::MaterialNotFound(material_id))?;

        let decided = loaded
            .aggregate
            .handle(&MaterialCommand::ConsumeForOrder(ConsumeForOrder {
                tenant_id,
                material_id,
                order_id: order_id.0,
                quantity,
                occurred_at,
            }))
            .map_err(DispatchError::from)?;

        batch.push(StreamAppend::new(
            loaded.expected_version(),
            to_uncommitted(tenant_id, material_id.0, atelie_inventory::AGGREGATE_TYPE, &decided)?,
        ));
    }

    Ok(batch)
}
