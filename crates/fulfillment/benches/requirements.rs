use std::collections::BTreeMap;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rust_decimal::Decimal;

use atelie_core::AggregateId;
use atelie_fulfillment::{MaterialRequirements, StockLevel, check_availability};
use atelie_inventory::MaterialId;
use atelie_products::{BillLine, BillOfMaterials, ProductId};
use atelie_sales::OrderItem;

/// Order with `items` items, each product using 8 of a shared pool of 32 materials.
fn setup(items: usize) -> (Vec<OrderItem>, BTreeMap<ProductId, BillOfMaterials>, BTreeMap<MaterialId, StockLevel>) {
    let materials: Vec<MaterialId> = (0..32).map(|_| MaterialId::new(AggregateId::new())).collect();

    let stock = materials
        .iter()
        .map(|id| {
            (
                *id,
                StockLevel {
                    material_id: *id,
                    name: "material".to_string(),
                    unit: "m".to_string(),
                    on_hand: Decimal::from(1_000),
                },
            )
        })
        .collect();

    let mut bills = BTreeMap::new();
    let mut order_items = Vec::with_capacity(items);
    for i in 0..items {
        let product_id = ProductId::new(AggregateId::new());
        let bill = (0..8)
            .map(|j| BillLine {
                material_id: materials[(i + j * 3) % materials.len()],
                quantity_per_unit: Decimal::new(125, 2),
                unit: "m".to_string(),
            })
            .collect();
        bills.insert(product_id, bill);
        order_items.push(OrderItem {
            item_no: i as u32 + 1,
            product_id,
            quantity: 3,
            unit_price: 1_000,
        });
    }

    (order_items, bills, stock)
}

fn bench_requirement_aggregation(c: &mut Criterion) {
    let mut group = c.benchmark_group("requirement_aggregation");

    for items in [1usize, 10, 100] {
        let (order_items, bills, stock) = setup(items);
        group.throughput(Throughput::Elements(items as u64));
        group.bench_with_input(BenchmarkId::from_parameter(items), &items, |b, _| {
            b.iter(|| {
                let req = MaterialRequirements::from_items(black_box(&order_items), &bills).unwrap();
                black_box(check_availability(&req, &stock).unwrap())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_requirement_aggregation);
criterion_main!(benches);
