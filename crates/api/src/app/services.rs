use std::{convert::Infallible, sync::Arc, time::Duration};

use anyhow::Context;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};

use stockledger_catalog::{
    InMemoryProductCatalog, InMemoryWarehouseRegistry, NewProduct, NewWarehouse, Product, ProductCatalog,
};
use stockledger_events::{EventBus, EventEnvelope, InMemoryEventBus};
use stockledger_infra::{
    InMemoryLedgerStore, LedgerEngine, LedgerError, LedgerStore, PostgresLedgerStore,
};
use stockledger_ledger::LedgerEvent;

use crate::app::errors;
use crate::config::{AppConfig, StorageBackend};

pub type LedgerBus = Arc<InMemoryEventBus<EventEnvelope<LedgerEvent>>>;
pub type Engine = LedgerEngine<Arc<dyn LedgerStore>, LedgerBus>;

/// Realtime message broadcasted via SSE.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RealtimeMessage {
    pub topic: String,
    pub payload: serde_json::Value,
}

/// Everything a handler needs: the engine plus the master data it reads.
pub struct AppServices {
    pub engine: Engine,
    pub warehouses: Arc<InMemoryWarehouseRegistry>,
    pub products: Arc<InMemoryProductCatalog>,
    realtime_tx: broadcast::Sender<RealtimeMessage>,
}

/// Start-up master data (`seed_file`).
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SeedData {
    pub warehouses: Vec<NewWarehouse>,
    pub products: Vec<NewProduct>,
}

pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let store: Arc<dyn LedgerStore> = match config.storage.backend {
        StorageBackend::Memory => Arc::new(InMemoryLedgerStore::new()),
        StorageBackend::Postgres => {
            let url = config
                .storage
                .database_url
                .as_deref()
                .context("storage.database_url must be set for the postgres backend")?;
            let store = PostgresLedgerStore::connect(url, config.storage.max_connections)
                .await
                .context("failed to connect to Postgres")?;
            store.ensure_schema().await.context("failed to create ledger schema")?;
            Arc::new(store)
        }
    };

    let warehouses = Arc::new(InMemoryWarehouseRegistry::new());
    let products = Arc::new(InMemoryProductCatalog::new());
    if let Some(path) = &config.seed_file {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read seed file {}", path.display()))?;
        let seed: SeedData = serde_json::from_str(&raw).context("invalid seed file")?;
        apply_seed(&warehouses, &products, seed)?;
    }

    let bus: LedgerBus = Arc::new(InMemoryEventBus::new());

    // Realtime channel (SSE): lossy broadcast.
    let (realtime_tx, _realtime_rx) = broadcast::channel::<RealtimeMessage>(256);

    // Background subscriber: bus -> SSE broadcast
    {
        let sub = bus.subscribe();
        let realtime_tx = realtime_tx.clone();
        tokio::task::spawn_blocking(move || {
            while let Ok(env) = sub.recv() {
                let payload = match serde_json::to_value(env.payload()) {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to encode ledger notification");
                        continue;
                    }
                };
                // No receivers is fine.
                let _ = realtime_tx.send(RealtimeMessage {
                    topic: env.event_type().to_string(),
                    payload,
                });
            }
        });
    }

    let engine = LedgerEngine::new(
        store,
        bus,
        warehouses.clone(),
        products.clone(),
        config.ledger.clone(),
    );
    tracing::info!(backend = ?config.storage.backend, "ledger services ready");

    Ok(AppServices {
        engine,
        warehouses,
        products,
        realtime_tx,
    })
}

fn apply_seed(
    warehouses: &InMemoryWarehouseRegistry,
    products: &InMemoryProductCatalog,
    seed: SeedData,
) -> anyhow::Result<()> {
    let (w, p) = (seed.warehouses.len(), seed.products.len());
    for warehouse in seed.warehouses {
        warehouses.create(warehouse).context("invalid seed warehouse")?;
    }
    for product in seed.products {
        products.upsert(product).context("invalid seed product")?;
    }
    tracing::info!(warehouses = w, products = p, "seed data loaded");
    Ok(())
}

impl AppServices {
    /// Run a synchronous ledger call on the blocking pool.
    pub async fn blocking<T, F>(self: &Arc<Self>, f: F) -> Result<T, axum::response::Response>
    where
        F: FnOnce(&AppServices) -> Result<T, LedgerError> + Send + 'static,
        T: Send + 'static,
    {
        let services = self.clone();
        match tokio::task::spawn_blocking(move || f(&services)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(errors::ledger_error_to_response(err)),
            Err(err) => Err(errors::json_error(
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                err.to_string(),
            )),
        }
    }

    /// Create or replace a product; batches pick up a changed unit/category.
    pub fn upsert_product(&self, input: NewProduct) -> Result<(Product, usize), LedgerError> {
        let previous = self.products.get(&input.name);
        let product = self.products.upsert(input).map_err(LedgerError::from)?;
        let resynced = match previous {
            Some(prev) if prev.unit != product.unit || prev.category != product.category => {
                self.engine.resync_product(&product.name)?
            }
            _ => 0,
        };
        Ok((product, resynced))
    }

    pub fn realtime_tx(&self) -> &broadcast::Sender<RealtimeMessage> {
        &self.realtime_tx
    }
}

pub fn ledger_sse_stream(
    services: Arc<AppServices>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = services.realtime_tx().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |msg| match msg {
        Ok(m) => {
            let data = serde_json::to_string(&m.payload).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default().event(m.topic).data(data)))
        }
        _ => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
