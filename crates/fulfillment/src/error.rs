use thiserror::Error;

use atelie_inventory::MaterialId;
use atelie_products::ProductId;

/// Planning failures: the order references data that is not loaded, or its
/// totals do not fit a `Decimal`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanningError {
    #[error("unknown product: {0}")]
    UnknownProduct(ProductId),

    #[error("unknown material: {0}")]
    UnknownMaterial(MaterialId),

    #[error("required quantity of material {0} is out of range")]
    QuantityOverflow(MaterialId),
}
