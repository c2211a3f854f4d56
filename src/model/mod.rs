// src/model/mod.rs
// =============================================================================
// The family graph's data model.
//
// Submodules:
// - id: compound ids ("profile-123", "union-456") parsed into EntityId
// - entity: Person and Union records and the decoding of raw API objects
// =============================================================================

mod entity;
mod id;

pub use entity::{DateAccuracy, DecodeError, Entity, LifeEvent, Person, Union};
pub use id::{EntityId, EntityKind};
