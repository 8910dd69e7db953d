use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockledger_core::WarehouseId;

use crate::event::Event;

/// Envelope for a change notification, addressed to one warehouse.
///
/// Notes:
/// - `warehouse_id` is the partition the change belongs to; subscribers filter on it.
/// - `sequence_number` is the warehouse transaction-log length right after the
///   change was committed, so subscribers can detect gaps and re-query.
/// - `payload` is the typed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    warehouse_id: WarehouseId,
    event_type: String,

    /// Log position observed after the commit.
    sequence_number: u64,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        warehouse_id: WarehouseId,
        event_type: impl Into<String>,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            warehouse_id,
            event_type: event_type.into(),
            sequence_number,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn warehouse_id(&self) -> &WarehouseId {
        &self.warehouse_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

impl<E: Event> EventEnvelope<E> {
    /// Wrap a typed event, taking the event type from the payload.
    ///
    /// Uses UUIDv7 (time-ordered) for the envelope id.
    pub fn wrap(warehouse_id: WarehouseId, sequence_number: u64, payload: E) -> Self {
        let event_type = payload.event_type();
        Self::new(Uuid::now_v7(), warehouse_id, event_type, sequence_number, payload)
    }
}
