//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have **no identity**: two location keys naming the same
/// cava/aisle/tower/level/page are the same location. They are immutable; to
/// "modify" one, build a new value.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
