use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pharmastock_core::UnitId;

use crate::Event;

/// Envelope for a published event.
///
/// Notes:
/// - `unit_id` is the site the event concerns; subscribers filter on it.
/// - `sequence_number` increases monotonically per publishing service, in
///   commit order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    unit_id: UnitId,
    event_type: String,
    event_version: u32,
    occurred_at: DateTime<Utc>,
    sequence_number: u64,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn unit_id(&self) -> UnitId {
        self.unit_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn event_version(&self) -> u32 {
        self.event_version
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
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
    /// Wrap a typed event; type name, version and time come from the event.
    pub fn wrap(unit_id: UnitId, sequence_number: u64, payload: E) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            unit_id,
            event_type: payload.event_type().to_string(),
            event_version: payload.version(),
            occurred_at: payload.occurred_at(),
            sequence_number,
            payload,
        }
    }
}
