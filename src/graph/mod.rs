//! Dependency structure among the member units of a composite entity.

mod order;
mod relationships;

pub use order::{order_units, UnitOrder};
pub use relationships::{derive_relationships, Ambiguity, AmbiguityKind, Relationship, RelationshipGraph};
