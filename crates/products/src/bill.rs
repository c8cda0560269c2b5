//! Bill of materials: what one unit of a product consumes.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use atelie_core::DomainError;
use atelie_inventory::MaterialId;

/// One bill entry: `quantity_per_unit` of `material_id`, expressed in `unit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillLine {
    pub material_id: MaterialId,
    pub quantity_per_unit: Decimal,
    pub unit: String,
}

/// Ordered list of bill entries.
///
/// The same material may appear more than once (e.g. fabric for the body and
/// fabric for the lining); consumers sum the entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BillOfMaterials(Vec<BillLine>);

impl BillOfMaterials {
    pub fn new(lines: Vec<BillLine>) -> Self {
        Self(lines)
    }

    pub fn lines(&self) -> &[BillLine] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BillLine> {
        self.0.iter()
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        for (idx, line) in self.0.iter().enumerate() {
            if line.quantity_per_unit <= Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "bill line {idx}: quantity_per_unit must be positive"
                )));
            }
            if line.unit.trim().is_empty() {
                return Err(DomainError::validation(format!(
                    "bill line {idx}: unit cannot be empty"
                )));
            }
        }
        Ok(())
    }
}

impl FromIterator<BillLine> for BillOfMaterials {
    fn from_iter<T: IntoIterator<Item = BillLine>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
