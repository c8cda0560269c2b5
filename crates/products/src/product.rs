use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use atelie_core::{Aggregate, AggregateRoot, DomainError, TenantId};
use atelie_events::Event;

use crate::bill::BillOfMaterials;

/// Stream type under which product events are stored.
pub const AGGREGATE_TYPE: &str = "products.product";

atelie_core::stream_id!(
    /// A sellable product with a bill of materials.
    ProductId
);

/// Aggregate root: Product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    tenant_id: Option<TenantId>,
    name: String,
    bill: BillOfMaterials,
    labor_minutes: u32,
    /// Percentage applied on top of cost (e.g. 40 = 40%).
    profit_margin: Decimal,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            bill: BillOfMaterials::default(),
            labor_minutes: 0,
            profit_margin: Decimal::ZERO,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bill(&self) -> &BillOfMaterials {
        &self.bill
    }

    pub fn labor_minutes(&self) -> u32 {
        self.labor_minutes
    }

    pub fn profit_margin(&self) -> Decimal {
        self.profit_margin
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub name: String,
    pub bill: BillOfMaterials,
    pub labor_minutes: u32,
    pub profit_margin: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReplaceBillOfMaterials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceBillOfMaterials {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub bill: BillOfMaterials,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    CreateProduct(CreateProduct),
    ReplaceBillOfMaterials(ReplaceBillOfMaterials),
}

/// Event: ProductCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub name: String,
    pub bill: BillOfMaterials,
    pub labor_minutes: u32,
    pub profit_margin: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BillOfMaterialsReplaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillOfMaterialsReplaced {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub bill: BillOfMaterials,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductCreated(ProductCreated),
    BillOfMaterialsReplaced(BillOfMaterialsReplaced),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "products.product.created",
            ProductEvent::BillOfMaterialsReplaced(_) => "products.product.bill_replaced",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductCreated(e) => e.occurred_at,
            ProductEvent::BillOfMaterialsReplaced(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductCreated(e) => {
                self.id = e.product_id;
                self.tenant_id = Some(e.tenant_id);
                self.name = e.name.clone();
                self.bill = e.bill.clone();
                self.labor_minutes = e.labor_minutes;
                self.profit_margin = e.profit_margin;
                self.created = true;
            }
            ProductEvent::BillOfMaterialsReplaced(e) => {
                self.bill = e.bill.clone();
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::CreateProduct(cmd) => self.handle_create(cmd),
            ProductCommand::ReplaceBillOfMaterials(cmd) => self.handle_replace_bill(cmd),
        }
    }
}

impl Product {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_product_id(&self, product_id: ProductId) -> Result<(), DomainError> {
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.profit_margin < Decimal::ZERO {
            return Err(DomainError::validation("profit_margin cannot be negative"));
        }
        cmd.bill.validate()?;

        Ok(vec![ProductEvent::ProductCreated(ProductCreated {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            name: cmd.name.trim().to_string(),
            bill: cmd.bill.clone(),
            labor_minutes: cmd.labor_minutes,
            profit_margin: cmd.profit_margin,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_replace_bill(
        &self,
        cmd: &ReplaceBillOfMaterials,
    ) -> Result<Vec<ProductEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found("product"));
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_product_id(cmd.product_id)?;
        cmd.bill.validate()?;

        Ok(vec![ProductEvent::BillOfMaterialsReplaced(BillOfMaterialsReplaced {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            bill: cmd.bill.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
