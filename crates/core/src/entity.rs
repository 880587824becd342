//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Stock records, movement entries and payments are entities: two values with
/// the same id are the same record even if a later snapshot differs.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
