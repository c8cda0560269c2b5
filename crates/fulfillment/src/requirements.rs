//! Aggregated material requirements for a set of order items.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use atelie_inventory::MaterialId;
use atelie_products::{BillOfMaterials, ProductId};
use atelie_sales::OrderItem;

use crate::error::PlanningError;

/// Total quantity needed per distinct material.
///
/// Keyed by `MaterialId` so iteration (and therefore shortfall reporting and
/// the order of consumption events) is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterialRequirements(BTreeMap<MaterialId, Decimal>);

impl MaterialRequirements {
    /// Sum `item.quantity * line.quantity_per_unit` per material over every
    /// item and every bill line of the item's product.
    ///
    /// Fails with `UnknownProduct` when an item's product has no bill in `bills`,
    /// and with `QuantityOverflow` when a total leaves the `Decimal` range.
    pub fn from_items(
        items: &[OrderItem],
        bills: &BTreeMap<ProductId, BillOfMaterials>,
    ) -> Result<Self, PlanningError> {
        let mut totals: BTreeMap<MaterialId, Decimal> = BTreeMap::new();

        for item in items {
            let bill = bills
                .get(&item.product_id)
                .ok_or(PlanningError::UnknownProduct(item.product_id))?;
            let units = Decimal::from(item.quantity);

            for line in bill.iter() {
                let total = totals.entry(line.material_id).or_insert(Decimal::ZERO);
                *total = units
                    .checked_mul(line.quantity_per_unit)
                    .and_then(|needed| total.checked_add(needed))
                    .ok_or(PlanningError::QuantityOverflow(line.material_id))?;
            }
        }

        for qty in totals.values_mut() {
            *qty = qty.normalize();
        }

        Ok(Self(totals))
    }

    pub fn get(&self, material_id: &MaterialId) -> Option<Decimal> {
        self.0.get(material_id).copied()
    }

    pub fn materials(&self) -> impl Iterator<Item = MaterialId> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MaterialId, Decimal)> + '_ {
        self.0.iter().map(|(id, qty)| (*id, *qty))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelie_core::AggregateId;
    use atelie_products::BillLine;

    fn material() -> MaterialId {
        MaterialId::new(AggregateId::new())
    }

    fn product() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn item(item_no: u32, product_id: ProductId, quantity: i64) -> OrderItem {
        OrderItem {
            item_no,
            product_id,
            quantity,
            unit_price: 1_000,
        }
    }

    fn bill(lines: &[(MaterialId, &str)]) -> BillOfMaterials {
        lines
            .iter()
            .map(|(material_id, qty)| BillLine {
                material_id: *material_id,
                quantity_per_unit: qty.parse().unwrap(),
                unit: "m".to_string(),
            })
            .collect()
    }

    #[test]
    fn multiplies_item_quantity_by_bill_quantity() {
        let fabric = material();
        let bag = product();
        let bills = BTreeMap::from([(bag, bill(&[(fabric, "5")]))]);

        let req = MaterialRequirements::from_items(&[item(1, bag, 2)], &bills).unwrap();
        assert_eq!(req.get(&fabric), Some(Decimal::from(10)));
        assert_eq!(req.len(), 1);
    }

    #[test]
    fn sums_shared_material_across_items() {
        let fabric = material();
        let thread = material();
        let bag = product();
        let pouch = product();
        let bills = BTreeMap::from([
            (bag, bill(&[(fabric, "1.5"), (thread, "10")])),
            (pouch, bill(&[(fabric, "0.25")])),
        ]);

        let req = MaterialRequirements::from_items(
            &[item(1, bag, 2), item(2, pouch, 4)],
            &bills,
        )
        .unwrap();

        assert_eq!(req.get(&fabric), Some(Decimal::from(4)));
        assert_eq!(req.get(&thread), Some(Decimal::from(20)));
    }

    #[test]
    fn repeated_bill_lines_are_summed() {
        let fabric = material();
        let bag = product();
        let bills = BTreeMap::from([(bag, bill(&[(fabric, "1"), (fabric, "0.5")]))]);

        let req = MaterialRequirements::from_items(&[item(1, bag, 2)], &bills).unwrap();
        assert_eq!(req.get(&fabric), Some(Decimal::from(3)));
    }

    #[test]
    fn empty_bill_requires_nothing() {
        let bag = product();
        let bills = BTreeMap::from([(bag, BillOfMaterials::default())]);

        let req = MaterialRequirements::from_items(&[item(1, bag, 3)], &bills).unwrap();
        assert!(req.is_empty());
    }

    #[test]
    fn unknown_product_is_reported() {
        let bag = product();
        let err = MaterialRequirements::from_items(&[item(1, bag, 1)], &BTreeMap::new())
            .unwrap_err();
        assert_eq!(err, PlanningError::UnknownProduct(bag));
    }

    #[test]
    fn oversized_requirement_is_an_error_not_a_panic() {
        let fabric = material();
        let bag = product();
        let bills = BTreeMap::from([(bag, bill(&[(fabric, "10000000000000")]))]);

        let err = MaterialRequirements::from_items(&[item(1, bag, i64::MAX)], &bills)
            .unwrap_err();
        assert_eq!(err, PlanningError::QuantityOverflow(fabric));
    }

    #[test]
    fn overflowing_sum_across_items_is_an_error() {
        let fabric = material();
        let bag = product();
        let huge = Decimal::MAX.to_string();
        let bills = BTreeMap::from([(bag, bill(&[(fabric, huge.as_str())]))]);

        let err = MaterialRequirements::from_items(&[item(1, bag, 1), item(2, bag, 1)], &bills)
            .unwrap_err();
        assert_eq!(err, PlanningError::QuantityOverflow(fabric));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn total_equals_sum_of_products(
                quantities in prop::collection::vec((1i64..50, 1i64..20), 1..10)
            ) {
                let fabric = material();
                let mut bills = BTreeMap::new();
                let mut items = Vec::new();
                let mut expected = Decimal::ZERO;

                for (idx, (qty, per_unit)) in quantities.iter().enumerate() {
                    let p = product();
                    bills.insert(p, bill(&[(fabric, per_unit.to_string().as_str())]));
                    items.push(item(idx as u32 + 1, p, *qty));
                    expected += Decimal::from(*qty) * Decimal::from(*per_unit);
                }

                let req = MaterialRequirements::from_items(&items, &bills).unwrap();
                prop_assert_eq!(req.get(&fabric), Some(expected));
            }
        }
    }
}
