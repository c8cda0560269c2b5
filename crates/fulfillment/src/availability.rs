//! Comparing requirements with on-hand stock.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use atelie_inventory::{Material, MaterialId};

use crate::error::PlanningError;
use crate::requirements::MaterialRequirements;

/// On-hand snapshot of one material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub material_id: MaterialId,
    pub name: String,
    pub unit: String,
    pub on_hand: Decimal,
}

impl From<&Material> for StockLevel {
    fn from(material: &Material) -> Self {
        Self {
            material_id: material.id_typed(),
            name: material.name().to_string(),
            unit: material.unit().to_string(),
            on_hand: material.quantity(),
        }
    }
}

/// A material whose requirement exceeds what is on hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortfall {
    pub material_id: MaterialId,
    pub name: String,
    pub unit: String,
    pub required: Decimal,
    pub available: Decimal,
}

impl Shortfall {
    pub fn missing(&self) -> Decimal {
        self.required - self.available
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityReport {
    pub available: bool,
    pub shortfalls: Vec<Shortfall>,
}

impl AvailabilityReport {
    /// Human-readable rejection naming every short material.
    pub fn rejection_message(&self) -> String {
        let parts: Vec<String> = self
            .shortfalls
            .iter()
            .map(|s| {
                format!(
                    "{} (required {}, available {})",
                    s.name, s.required, s.available
                )
            })
            .collect();
        format!("insufficient stock for: {}", parts.join(", "))
    }
}

/// Compare each requirement with its stock level.
///
/// Every required material must have an entry in `stock`; materials in `stock`
/// that are not required are ignored.
pub fn check_availability(
    requirements: &MaterialRequirements,
    stock: &BTreeMap<MaterialId, StockLevel>,
) -> Result<AvailabilityReport, PlanningError> {
    let mut shortfalls = Vec::new();

    for (material_id, required) in requirements.iter() {
        let level = stock
            .get(&material_id)
            .ok_or(PlanningError::UnknownMaterial(material_id))?;

        if required > level.on_hand {
            shortfalls.push(Shortfall {
                material_id,
                name: level.name.clone(),
                unit: level.unit.clone(),
                required,
                available: level.on_hand,
            });
        }
    }

    Ok(AvailabilityReport {
        available: shortfalls.is_empty(),
        shortfalls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelie_core::AggregateId;
    use atelie_products::{BillLine, BillOfMaterials, ProductId};
    use atelie_sales::OrderItem;

    struct Fixture {
        fabric: MaterialId,
        bag: ProductId,
        bills: BTreeMap<ProductId, BillOfMaterials>,
    }

    fn fixture(per_unit: i64) -> Fixture {
        let fabric = MaterialId::new(AggregateId::new());
        let bag = ProductId::new(AggregateId::new());
        let bills = BTreeMap::from([(
            bag,
            BillOfMaterials::new(vec![BillLine {
                material_id: fabric,
                quantity_per_unit: Decimal::from(per_unit),
                unit: "m".to_string(),
            }]),
        )]);
        Fixture { fabric, bag, bills }
    }

    fn stock(material_id: MaterialId, name: &str, on_hand: i64) -> BTreeMap<MaterialId, StockLevel> {
        BTreeMap::from([(
            material_id,
            StockLevel {
                material_id,
                name: name.to_string(),
                unit: "m".to_string(),
                on_hand: Decimal::from(on_hand),
            },
        )])
    }

    fn two_of(product_id: ProductId) -> Vec<OrderItem> {
        vec![OrderItem {
            item_no: 1,
            product_id,
            quantity: 2,
            unit_price: 5_000,
        }]
    }

    #[test]
    fn enough_stock_is_available() {
        let f = fixture(5);
        let req = MaterialRequirements::from_items(&two_of(f.bag), &f.bills).unwrap();

        let report = check_availability(&req, &stock(f.fabric, "Linen", 20)).unwrap();
        assert!(report.available);
        assert!(report.shortfalls.is_empty());
    }

    #[test]
    fn exact_stock_is_available() {
        let f = fixture(10);
        let req = MaterialRequirements::from_items(&two_of(f.bag), &f.bills).unwrap();

        let report = check_availability(&req, &stock(f.fabric, "Linen", 20)).unwrap();
        assert!(report.available);
    }

    #[test]
    fn short_stock_lists_the_material() {
        let f = fixture(15);
        let req = MaterialRequirements::from_items(&two_of(f.bag), &f.bills).unwrap();

        let report = check_availability(&req, &stock(f.fabric, "Linen", 20)).unwrap();
        assert!(!report.available);
        assert_eq!(report.shortfalls.len(), 1);

        let shortfall = &report.shortfalls[0];
        assert_eq!(shortfall.material_id, f.fabric);
        assert_eq!(shortfall.required, Decimal::from(30));
        assert_eq!(shortfall.available, Decimal::from(20));
        assert_eq!(shortfall.missing(), Decimal::from(10));
        assert_eq!(
            report.rejection_message(),
            "insufficient stock for: Linen (required 30, available 20)"
        );
    }

    #[test]
    fn missing_stock_level_is_an_error() {
        let f = fixture(1);
        let req = MaterialRequirements::from_items(&two_of(f.bag), &f.bills).unwrap();

        let err = check_availability(&req, &BTreeMap::new()).unwrap_err();
        assert_eq!(err, PlanningError::UnknownMaterial(f.fabric));
    }

    #[test]
    fn stock_of_unrelated_materials_is_ignored() {
        let f = fixture(1);
        let req = MaterialRequirements::from_items(&two_of(f.bag), &f.bills).unwrap();
        let mut levels = stock(f.fabric, "Linen", 5);
        let other = MaterialId::new(AggregateId::new());
        levels.extend(stock(other, "Button", 0));

        let report = check_availability(&req, &levels).unwrap();
        assert!(report.available);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn available_iff_requirement_fits(per_unit in 1i64..50, on_hand in 0i64..500) {
                let f = fixture(per_unit);
                let req = MaterialRequirements::from_items(&two_of(f.bag), &f.bills).unwrap();
                let report = check_availability(&req, &stock(f.fabric, "Linen", on_hand)).unwrap();

                let fits = 2 * per_unit <= on_hand;
                prop_assert_eq!(report.available, fits);
                prop_assert_eq!(report.shortfalls.is_empty(), fits);
            }
        }
    }
}
