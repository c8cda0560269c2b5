use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use std::sync::Arc;

use atelie_core::{AggregateId, TenantId};
use atelie_events::{EventEnvelope, InMemoryEventBus};
use atelie_infra::command_dispatcher::CommandDispatcher;
use atelie_infra::event_store::InMemoryEventStore;
use atelie_infra::fulfillment::FulfillmentService;
use atelie_inventory::{CreateMaterial, Material, MaterialCommand, MaterialId};
use atelie_products::{BillLine, CreateProduct, Product, ProductCommand, ProductId};
use atelie_sales::{AddItem, CreateOrder, Order, OrderCommand, OrderId};

type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Bus>;

/// An order of one product whose bill uses `materials` distinct materials.
fn seed(dispatcher: &Dispatcher, tenant_id: TenantId, materials: usize) -> OrderId {
    let bill = (0..materials)
        .map(|i| {
            let material_id = MaterialId::new(AggregateId::new());
            dispatcher
                .dispatch(
                    tenant_id,
                    material_id.0,
                    atelie_inventory::AGGREGATE_TYPE,
                    MaterialCommand::CreateMaterial(CreateMaterial {
                        tenant_id,
                        material_id,
                        name: format!("material-{i}"),
                        unit: "un".to_string(),
                        initial_quantity: Decimal::from(1_000_000_000i64),
                        minimum_quantity: Decimal::ZERO,
                        unit_cost: 100,
                        occurred_at: Utc::now(),
                    }),
                    |_, id| Material::empty(MaterialId::new(id)),
                )
                .unwrap();
            BillLine {
                material_id,
                quantity_per_unit: Decimal::new(25, 1),
                unit: "un".to_string(),
            }
        })
        .collect();

    let product_id = ProductId::new(AggregateId::new());
    dispatcher
        .dispatch(
            tenant_id,
            product_id.0,
            atelie_products::AGGREGATE_TYPE,
            ProductCommand::CreateProduct(CreateProduct {
                tenant_id,
                product_id,
                name: "Quilt".to_string(),
                bill,
                labor_minutes: 240,
                profit_margin: Decimal::from(35),
                occurred_at: Utc::now(),
            }),
            |_, id| Product::empty(ProductId::new(id)),
        )
        .unwrap();

    let order_id = OrderId::new(AggregateId::new());
    for command in [
        OrderCommand::CreateOrder(CreateOrder {
            tenant_id,
            order_id,
            customer_name: "Clara".to_string(),
            occurred_at: Utc::now(),
        }),
        OrderCommand::AddItem(AddItem {
            tenant_id,
            order_id,
            product_id,
            quantity: 2,
            unit_price: 50_000,
            occurred_at: Utc::now(),
        }),
    ] {
        dispatcher
            .dispatch(
                tenant_id,
                order_id.0,
                atelie_sales::AGGREGATE_TYPE,
                command,
                |_, id| Order::empty(OrderId::new(id)),
            )
            .unwrap();
    }
    order_id
}

fn bench_fulfillment(c: &mut Criterion) {
    let mut group = c.benchmark_group("fulfillment");

    for materials in [1usize, 10, 50] {
        let dispatcher = Arc::new(CommandDispatcher::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryEventBus::new()) as Bus,
        ));
        let service = FulfillmentService::new(dispatcher.clone());
        let tenant_id = TenantId::new();
        let order_id = seed(&dispatcher, tenant_id, materials);

        group.bench_with_input(
            BenchmarkId::new("check_stock_availability", materials),
            &materials,
            |b, _| {
                b.iter(|| {
                    black_box(service.check_stock_availability(tenant_id, order_id).unwrap());
                });
            },
        );

        // Each iteration appends one consumption per material, so streams grow.
        group.bench_with_input(BenchmarkId::new("deduct_stock", materials), &materials, |b, _| {
            b.iter(|| {
                black_box(service.deduct_stock(tenant_id, order_id, Utc::now()).unwrap());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fulfillment);
criterion_main!(benches);
