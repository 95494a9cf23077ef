//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// `Quantity` and `Money` are value objects: `2.50` of a substance is equal to
/// any other `2.50`, and arithmetic always produces a new value instead of
/// mutating an existing one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
