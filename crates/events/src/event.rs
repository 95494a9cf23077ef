use chrono::{DateTime, Utc};

/// A stock event.
///
/// Events are:
/// - **immutable** (they describe something already committed)
/// - **versioned** (schema evolution)
/// - **unit-scoped** (every stock fact happens at exactly one unit)
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name (e.g. "stock.movement.recorded").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the underlying change was committed.
    fn occurred_at(&self) -> DateTime<Utc>;
}
