use std::collections::HashMap;
use std::sync::RwLock;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use atelie_core::{AggregateId, TenantId};
use atelie_events::EventEnvelope;
use atelie_inventory::{AGGREGATE_TYPE, MaterialEvent, MaterialId};

use crate::read_model::TenantStore;

/// Queryable material read model: current stock per material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialStockReadModel {
    pub material_id: MaterialId,
    pub name: String,
    pub unit: String,
    pub quantity: Decimal,
    pub minimum_quantity: Decimal,
    pub unit_cost: u64,
}

impl MaterialStockReadModel {
    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.minimum_quantity
    }
}

/// Tenant+aggregate cursor to support at-least-once delivery (idempotent projection).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum MaterialProjectionError {
    #[error("failed to deserialize material event: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("projection state unavailable (lock poisoned)")]
    Poisoned,
}

/// Material stock projection.
///
/// Consumes published envelopes and maintains a tenant-isolated stock table.
/// Envelopes of other aggregate types are ignored. The read model is
/// disposable and rebuildable from the event store.
#[derive(Debug)]
pub struct MaterialStockProjection<S>
where
    S: TenantStore<MaterialId, MaterialStockReadModel>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> MaterialStockProjection<S>
where
    S: TenantStore<MaterialId, MaterialStockReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, tenant_id: TenantId, material_id: &MaterialId) -> Option<MaterialStockReadModel> {
        self.store.get(tenant_id, material_id)
    }

    /// All materials of a tenant, sorted by name.
    pub fn list(&self, tenant_id: TenantId) -> Vec<MaterialStockReadModel> {
        let mut all = self.store.list(tenant_id);
        all.sort_by(|a, b| a.name.cmp(&b.name).then(a.material_id.cmp(&b.material_id)));
        all
    }

    /// Materials at or below their minimum threshold, sorted by name.
    pub fn low_stock(&self, tenant_id: TenantId) -> Vec<MaterialStockReadModel> {
        self.list(tenant_id)
            .into_iter()
            .filter(MaterialStockReadModel::is_low_stock)
            .collect()
    }

    /// Apply a published envelope into the projection.
    ///
    /// Replays at or below the stream cursor are ignored; gaps are rejected.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), MaterialProjectionError> {
        if envelope.aggregate_type() != AGGREGATE_TYPE {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let mut cursors = self
            .cursors
            .write()
            .map_err(|_| MaterialProjectionError::Poisoned)?;
        let key = CursorKey { tenant_id, aggregate_id };
        let last = cursors.get(&key).copied().unwrap_or(0);

        if seq == 0 {
            return Err(MaterialProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(());
        }
        if seq != last + 1 {
            return Err(MaterialProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let event: MaterialEvent = serde_json::from_value(envelope.payload().clone()).map_err(|e| {
            MaterialProjectionError::Deserialize(format!("{} #{seq}: {e}", envelope.event_type()))
        })?;

        if event.tenant_id() != tenant_id {
            return Err(MaterialProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }
        if event.material_id().0 != aggregate_id {
            return Err(MaterialProjectionError::TenantIsolation(
                "event material_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match event {
            MaterialEvent::MaterialCreated(e) => {
                self.store.upsert(
                    tenant_id,
                    e.material_id,
                    MaterialStockReadModel {
                        material_id: e.material_id,
                        name: e.name,
                        unit: e.unit,
                        quantity: e.initial_quantity,
                        minimum_quantity: e.minimum_quantity,
                        unit_cost: e.unit_cost,
                    },
                );
            }
            MaterialEvent::StockMoved(e) => {
                self.adjust(tenant_id, e.material_id, e.delta);
            }
            MaterialEvent::ConsumedForOrder(e) => {
                self.adjust(tenant_id, e.material_id, -e.quantity);
            }
        }

        cursors.insert(key, seq);
        Ok(())
    }

    fn adjust(&self, tenant_id: TenantId, material_id: MaterialId, delta: Decimal) {
        if let Some(mut rm) = self.store.get(tenant_id, &material_id) {
            rm.quantity = (rm.quantity + delta).normalize();
            self.store.upsert(tenant_id, material_id, rm);
        }
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), MaterialProjectionError> {
        self.cursors
            .write()
            .map_err(|_| MaterialProjectionError::Poisoned)?
            .clear();

        let mut envs: Vec<_> = envelopes.into_iter().collect();

        let mut tenants: Vec<TenantId> = envs.iter().map(|e| e.tenant_id()).collect();
        tenants.sort();
        tenants.dedup();
        for t in tenants {
            self.store.clear_tenant(t);
        }

        // Deterministic replay order: tenant, aggregate, sequence.
        envs.sort_by_key(|e| (e.tenant_id(), e.aggregate_id(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}
