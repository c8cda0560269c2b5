//! Products domain module (event-sourced).
//!
//! A product is a sellable item described by its bill of materials: how much
//! of each material one unit consumes. Products are read-only from the point
//! of view of stock computation.

pub mod bill;
pub mod product;

pub use bill::{BillLine, BillOfMaterials};
pub use product::{
    AGGREGATE_TYPE, BillOfMaterialsReplaced, CreateProduct, Product, ProductCommand,
    ProductCreated, ProductEvent, ProductId, ReplaceBillOfMaterials,
};
