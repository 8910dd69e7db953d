//! Administrative operations spanning master data and the ledger.

use tracing::{info, instrument};

use stockledger_catalog::{InMemoryWarehouseRegistry, WarehouseRegistry};
use stockledger_core::WarehouseId;
use stockledger_events::{EventBus, EventEnvelope};
use stockledger_ledger::LedgerEvent;

use crate::engine::LedgerEngine;
use crate::error::LedgerError;
use crate::store::{LedgerStore, PurgeSummary};

/// Delete a warehouse together with its batches, totals and history.
///
/// The ledger is purged before the registry entry goes, so a failure part-way
/// leaves a registered warehouse that can be deleted again rather than
/// orphaned ledger rows.
#[instrument(skip(engine, registry))]
pub fn delete_warehouse_cascade<S, B>(
    engine: &LedgerEngine<S, B>,
    registry: &InMemoryWarehouseRegistry,
    warehouse_id: &WarehouseId,
) -> Result<PurgeSummary, LedgerError>
where
    S: LedgerStore,
    B: EventBus<EventEnvelope<LedgerEvent>>,
{
    registry.require(warehouse_id)?;
    let summary = engine.purge_warehouse(warehouse_id)?;
    registry.delete(warehouse_id)?;
    info!(
        batches = summary.batches,
        transactions = summary.transactions,
        "warehouse deleted"
    );
    Ok(summary)
}
