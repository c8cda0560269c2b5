use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use atelie_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use atelie_events::Event;

/// Stream type under which material events are stored.
pub const AGGREGATE_TYPE: &str = "inventory.material";

atelie_core::stream_id!(
    /// A raw material tracked in stock.
    MaterialId
);

/// Kind of a manual inventory movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    /// Purchase or return: quantity is added.
    Entry,
    /// Loss, sample, manual usage: quantity is removed.
    Exit,
    /// Physical count: quantity becomes the counted value.
    Adjustment,
}

/// Aggregate root: Material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Material {
    id: MaterialId,
    tenant_id: Option<TenantId>,
    name: String,
    unit: String,
    quantity: Decimal,
    minimum_quantity: Decimal,
    /// Cost per unit in smallest currency unit (e.g., cents).
    unit_cost: u64,
    version: u64,
    created: bool,
}

impl Material {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: MaterialId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            unit: String::new(),
            quantity: Decimal::ZERO,
            minimum_quantity: Decimal::ZERO,
            unit_cost: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> MaterialId {
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

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Quantity on hand.
    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn minimum_quantity(&self) -> Decimal {
        self.minimum_quantity
    }

    pub fn unit_cost(&self) -> u64 {
        self.unit_cost
    }

    /// At or below the minimum threshold.
    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.minimum_quantity
    }
}

impl AggregateRoot for Material {
    type Id = MaterialId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateMaterial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateMaterial {
    pub tenant_id: TenantId,
    pub material_id: MaterialId,
    pub name: String,
    pub unit: String,
    pub initial_quantity: Decimal,
    pub minimum_quantity: Decimal,
    pub unit_cost: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordMovement.
///
/// For `Entry`/`Exit` the quantity is the amount moved; for `Adjustment` it is
/// the counted quantity on hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMovement {
    pub tenant_id: TenantId,
    pub material_id: MaterialId,
    pub kind: MovementKind,
    pub quantity: Decimal,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConsumeForOrder (production consumption of an order).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeForOrder {
    pub tenant_id: TenantId,
    pub material_id: MaterialId,
    pub order_id: AggregateId,
    pub quantity: Decimal,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaterialCommand {
    CreateMaterial(CreateMaterial),
    RecordMovement(RecordMovement),
    ConsumeForOrder(ConsumeForOrder),
}

/// Event: MaterialCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialCreated {
    pub tenant_id: TenantId,
    pub material_id: MaterialId,
    pub name: String,
    pub unit: String,
    pub initial_quantity: Decimal,
    pub minimum_quantity: Decimal,
    pub unit_cost: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockMoved. `delta` is signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMoved {
    pub tenant_id: TenantId,
    pub material_id: MaterialId,
    pub kind: MovementKind,
    pub delta: Decimal,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ConsumedForOrder. `quantity` is positive and is subtracted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumedForOrder {
    pub tenant_id: TenantId,
    pub material_id: MaterialId,
    pub order_id: AggregateId,
    pub quantity: Decimal,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaterialEvent {
    MaterialCreated(MaterialCreated),
    StockMoved(StockMoved),
    ConsumedForOrder(ConsumedForOrder),
}

impl MaterialEvent {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            MaterialEvent::MaterialCreated(e) => e.tenant_id,
            MaterialEvent::StockMoved(e) => e.tenant_id,
            MaterialEvent::ConsumedForOrder(e) => e.tenant_id,
        }
    }

    pub fn material_id(&self) -> MaterialId {
        match self {
            MaterialEvent::MaterialCreated(e) => e.material_id,
            MaterialEvent::StockMoved(e) => e.material_id,
            MaterialEvent::ConsumedForOrder(e) => e.material_id,
        }
    }
}

impl Event for MaterialEvent {
    fn event_type(&self) -> &'static str {
        match self {
            MaterialEvent::MaterialCreated(_) => "inventory.material.created",
            MaterialEvent::StockMoved(_) => "inventory.material.stock_moved",
            MaterialEvent::ConsumedForOrder(_) => "inventory.material.consumed_for_order",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            MaterialEvent::MaterialCreated(e) => e.occurred_at,
            MaterialEvent::StockMoved(e) => e.occurred_at,
            MaterialEvent::ConsumedForOrder(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Material {
    type Command = MaterialCommand;
    type Event = MaterialEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            MaterialEvent::MaterialCreated(e) => {
                self.id = e.material_id;
                self.tenant_id = Some(e.tenant_id);
                self.name = e.name.clone();
                self.unit = e.unit.clone();
                self.quantity = e.initial_quantity;
                self.minimum_quantity = e.minimum_quantity;
                self.unit_cost = e.unit_cost;
                self.created = true;
            }
            MaterialEvent::StockMoved(e) => {
                self.quantity += e.delta;
            }
            MaterialEvent::ConsumedForOrder(e) => {
                self.quantity -= e.quantity;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            MaterialCommand::CreateMaterial(cmd) => self.handle_create(cmd),
            MaterialCommand::RecordMovement(cmd) => self.handle_movement(cmd),
            MaterialCommand::ConsumeForOrder(cmd) => self.handle_consume(cmd),
        }
    }
}

impl Material {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_material_id(&self, material_id: MaterialId) -> Result<(), DomainError> {
        if self.id != material_id {
            return Err(DomainError::invariant("material_id mismatch"));
        }
        Ok(())
    }

    fn ensure_existing(&self, tenant_id: TenantId, material_id: MaterialId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("material"));
        }
        self.ensure_tenant(tenant_id)?;
        self.ensure_material_id(material_id)
    }

    fn handle_create(&self, cmd: &CreateMaterial) -> Result<Vec<MaterialEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("material already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.unit.trim().is_empty() {
            return Err(DomainError::validation("unit cannot be empty"));
        }
        if cmd.initial_quantity < Decimal::ZERO {
            return Err(DomainError::validation("initial_quantity cannot be negative"));
        }
        if cmd.minimum_quantity < Decimal::ZERO {
            return Err(DomainError::validation("minimum_quantity cannot be negative"));
        }

        Ok(vec![MaterialEvent::MaterialCreated(MaterialCreated {
            tenant_id: cmd.tenant_id,
            material_id: cmd.material_id,
            name: cmd.name.trim().to_string(),
            unit: cmd.unit.trim().to_string(),
            initial_quantity: cmd.initial_quantity,
            minimum_quantity: cmd.minimum_quantity,
            unit_cost: cmd.unit_cost,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_movement(&self, cmd: &RecordMovement) -> Result<Vec<MaterialEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.material_id)?;

        if cmd.quantity < Decimal::ZERO {
            return Err(DomainError::validation("quantity cannot be negative"));
        }

        let delta = match cmd.kind {
            MovementKind::Entry => Some(cmd.quantity),
            MovementKind::Exit => Some(-cmd.quantity),
            MovementKind::Adjustment => cmd.quantity.checked_sub(self.quantity),
        }
        .ok_or_else(|| DomainError::validation("movement quantity is out of range"))?;

        if delta.is_zero() {
            return Err(DomainError::validation("movement does not change stock"));
        }

        let resulting = self
            .quantity
            .checked_add(delta)
            .ok_or_else(|| DomainError::validation("resulting stock is out of range"))?;
        if resulting < Decimal::ZERO {
            return Err(DomainError::invariant("stock cannot go negative"));
        }

        Ok(vec![MaterialEvent::StockMoved(StockMoved {
            tenant_id: cmd.tenant_id,
            material_id: cmd.material_id,
            kind: cmd.kind,
            delta,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_consume(&self, cmd: &ConsumeForOrder) -> Result<Vec<MaterialEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.material_id)?;

        if cmd.quantity <= Decimal::ZERO {
            return Err(DomainError::validation("consumed quantity must be positive"));
        }

        if cmd.quantity > self.quantity {
            return Err(DomainError::invariant(format!(
                "insufficient stock of '{}': required {}, available {}",
                self.name, cmd.quantity, self.quantity
            )));
        }

        Ok(vec![MaterialEvent::ConsumedForOrder(ConsumedForOrder {
            tenant_id: cmd.tenant_id,
            material_id: cmd.material_id,
            order_id: cmd.order_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }
}
