use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{info, warn};

use atelie_core::{Aggregate, AggregateId, DomainError, TenantId};
use atelie_events::{Event, EventBus, EventEnvelope, InMemoryEventBus};
use atelie_infra::{
    command_dispatcher::{CommandDispatcher, DispatchError},
    event_store::{EventStore, EventStoreError, InMemoryEventStore, PostgresEventStore, StoredEvent},
    fulfillment::FulfillmentService,
    projections::{MaterialProjectionError, MaterialStockProjection, MaterialStockReadModel},
    rate_limit::{InMemoryRateLimiter, RateLimitError, RateLimiter},
    read_model::InMemoryTenantStore,
};
use atelie_inventory::{Material, MaterialId};
use atelie_products::{Product, ProductId};
use atelie_sales::{Order, OrderId};

use crate::config::{AppConfig, RateLimitBackend};

pub type SharedStore = Arc<dyn EventStore>;
pub type SharedBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
pub type Dispatcher = CommandDispatcher<SharedStore, SharedBus>;
pub type Fulfillment = FulfillmentService<SharedStore, SharedBus>;
pub type MaterialProjection =
    MaterialStockProjection<Arc<InMemoryTenantStore<MaterialId, MaterialStockReadModel>>>;

#[derive(Debug, Error)]
pub enum ServicesError {
    #[error("event store unavailable: {0}")]
    Store(#[from] EventStoreError),

    #[error("rate limiter unavailable: {0}")]
    RateLimit(#[from] RateLimitError),

    #[error("material projection rebuild failed: {0}")]
    Projection(#[from] MaterialProjectionError),

    #[error("{0}")]
    Misconfigured(String),
}

/// An aggregate the HTTP layer reads and writes.
pub trait Stream:
    Aggregate<Error = DomainError, Event: Event + Serialize + DeserializeOwned> + Sized
{
    const AGGREGATE_TYPE: &'static str;

    fn blank(id: AggregateId) -> Self;

    fn exists(&self) -> bool;
}

impl Stream for Material {
    const AGGREGATE_TYPE: &'static str = atelie_inventory::AGGREGATE_TYPE;

    fn blank(id: AggregateId) -> Self {
        Material::empty(MaterialId::new(id))
    }

    fn exists(&self) -> bool {
        self.is_created()
    }
}

impl Stream for Product {
    const AGGREGATE_TYPE: &'static str = atelie_products::AGGREGATE_TYPE;

    fn blank(id: AggregateId) -> Self {
        Product::empty(ProductId::new(id))
    }

    fn exists(&self) -> bool {
        self.is_created()
    }
}

impl Stream for Order {
    const AGGREGATE_TYPE: &'static str = atelie_sales::AGGREGATE_TYPE;

    fn blank(id: AggregateId) -> Self {
        Order::empty(OrderId::new(id))
    }

    fn exists(&self) -> bool {
        self.is_created()
    }
}

/// Everything the routes need, shared across requests.
#[derive(Clone)]
pub struct AppServices {
    dispatcher: Arc<Dispatcher>,
    fulfillment: Arc<Fulfillment>,
    materials: Arc<MaterialProjection>,
    rate_limiter: Arc<dyn RateLimiter>,
}

pub async fn build_services(config: &AppConfig) -> Result<AppServices, ServicesError> {
    let rate_limiter = build_rate_limiter(config)?;

    if config.use_persistent_stores {
        let url = config
            .database_url
            .as_deref()
            .ok_or_else(|| ServicesError::Misconfigured("DATABASE_URL is not set".to_string()))?;
        let store = Arc::new(PostgresEventStore::connect(url).await?);
        info!("using postgres event store");
        return AppServices::assemble(store, rate_limiter, config, true);
    }

    info!("using in-memory event store");
    AppServices::assemble(Arc::new(InMemoryEventStore::new()), rate_limiter, config, false)
}

fn build_rate_limiter(config: &AppConfig) -> Result<Arc<dyn RateLimiter>, ServicesError> {
    match config.rate_limit_backend {
        RateLimitBackend::Memory => Ok(Arc::new(InMemoryRateLimiter::new(config.rate_limit))),
        #[cfg(feature = "redis")]
        RateLimitBackend::Redis => Ok(Arc::new(atelie_infra::rate_limit::RedisRateLimiter::new(
            &config.redis_url,
            config.rate_limit,
        )?)),
        #[cfg(not(feature = "redis"))]
        RateLimitBackend::Redis => {
            warn!("RATE_LIMIT_BACKEND=redis but redis feature not enabled, falling back to in-memory");
            Ok(Arc::new(InMemoryRateLimiter::new(config.rate_limit)))
        }
    }
}

impl AppServices {
    /// In-memory wiring (dev/test). Must be called inside a tokio runtime.
    pub fn in_memory(config: &AppConfig) -> Self {
        let store: SharedStore = Arc::new(InMemoryEventStore::new());
        let rate_limiter: Arc<dyn RateLimiter> = Arc::new(InMemoryRateLimiter::new(config.rate_limit));
        let materials = Arc::new(MaterialStockProjection::new(Arc::new(InMemoryTenantStore::new())));
        Self::wire(store, rate_limiter, config, materials)
    }

    fn assemble(
        store: SharedStore,
        rate_limiter: Arc<dyn RateLimiter>,
        config: &AppConfig,
        rebuild: bool,
    ) -> Result<Self, ServicesError> {
        let materials: Arc<MaterialProjection> =
            Arc::new(MaterialStockProjection::new(Arc::new(InMemoryTenantStore::new())));

        // Persistent stores outlive the process; the read model does not.
        if rebuild {
            let history = store.load_all_of_type(atelie_inventory::AGGREGATE_TYPE)?;
            let events = history.len();
            materials.rebuild_from_scratch(history.iter().map(StoredEvent::to_envelope))?;
            info!(events, "material stock read model rebuilt");
        }

        Ok(Self::wire(store, rate_limiter, config, materials))
    }

    fn wire(
        store: SharedStore,
        rate_limiter: Arc<dyn RateLimiter>,
        config: &AppConfig,
        materials: Arc<MaterialProjection>,
    ) -> Self {
        let bus: SharedBus = Arc::new(InMemoryEventBus::new());

        // Background subscriber: bus -> projections
        {
            let sub = bus.subscribe();
            let materials = materials.clone();
            tokio::task::spawn_blocking(move || {
                for env in sub.filter(|env| env.aggregate_type() == atelie_inventory::AGGREGATE_TYPE) {
                    if let Err(e) = materials.apply_envelope(&env) {
                        warn!(
                            aggregate_id = %env.aggregate_id(),
                            sequence_number = env.sequence_number(),
                            event_type = env.event_type(),
                            "projection apply failed: {e}"
                        );
                    }
                }
            });
        }

        let dispatcher = Arc::new(CommandDispatcher::new(store, bus));
        let fulfillment = Arc::new(
            FulfillmentService::new(dispatcher.clone()).with_conflict_retries(config.stock_conflict_retries),
        );

        Self {
            dispatcher,
            fulfillment,
            materials,
            rate_limiter,
        }
    }

    /// Run a command against one stream of `tenant_id`.
    pub fn execute<A: Stream>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        command: A::Command,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        self.dispatcher
            .dispatch(tenant_id, aggregate_id, A::AGGREGATE_TYPE, command, |_, id| A::blank(id))
    }

    /// Current state of a stream, `None` when nothing was ever written to it.
    pub fn fetch<A: Stream>(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> Result<Option<A>, DispatchError> {
        let loaded = self.dispatcher.load(tenant_id, aggregate_id, |_, id| A::blank(id))?;
        Ok(loaded.aggregate.exists().then_some(loaded.aggregate))
    }

    pub fn fulfillment(&self) -> &Fulfillment {
        &self.fulfillment
    }

    pub fn materials(&self) -> &MaterialProjection {
        &self.materials
    }

    pub fn rate_limiter(&self) -> Arc<dyn RateLimiter> {
        self.rate_limiter.clone()
    }
}
