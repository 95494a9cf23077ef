//! Entity trait: records that keep their identity while their state changes.

/// Entity marker + minimal interface.
///
/// Units, substances, batches, movements and transfers are all entities: two
/// batches with identical lot codes at different units are still different
/// batches.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
