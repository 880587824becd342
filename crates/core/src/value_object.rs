//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attributes. In this
/// workspace, transfer lines, invoice numbers and payment allocations are value
/// objects: a transfer line of 4 units of item P is the same line wherever it
/// appears.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct TransferLine { item_id: ItemId, quantity: i64 }
///
/// impl ValueObject for TransferLine {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
