// src/crawl/expand.rs
// =============================================================================
// Turns one API response into (a) entities to store and (b) ids to fetch next.
//
// The crawl alternates between the two kinds:
//   profile --(its unions)--> union --(its children)--> profile --> ...
//
// Following a union's children from a person's parents' union reaches the
// person's brothers and sisters, and from there their descendants. Following
// the person's own unions reaches their children. So a single seed pulls in
// both its descendants and the descendants of its siblings.
//
// Adopted and foster children are stored on the union but are not followed.
//
// An entity counts as new when the store does not have it yet. This check is
// not atomic with the later insert; if two workers race on the same entity,
// the store's checked insert keeps only one copy.
// =============================================================================

use crate::model::{DecodeError, Entity, EntityId, EntityKind};
use crate::store::EntityStore;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, warn};

/// What a response contributes to the crawl
#[derive(Debug, Default)]
pub struct Expansion {
    /// Entities not yet in the store, in response order
    pub entities: Vec<Entity>,
    /// Ids of the opposite kind referenced by those entities and not yet stored
    pub next: Vec<EntityId>,
    /// Results that could not be decoded
    pub skipped: usize,
}

/// Decodes the results of a `kind` request against the current store
pub fn decode(kind: EntityKind, results: Vec<Value>, store: &EntityStore) -> Expansion {
    let mut expansion = Expansion::default();
    let mut seen_here = HashSet::new();
    let mut queued = HashSet::new();

    for raw in results {
        let entity = match Entity::decode(kind, raw) {
            Ok(entity) => entity,
            Err(DecodeError::MissingId) => {
                warn!("Skipping {} result with no ID", kind);
                expansion.skipped += 1;
                continue;
            }
            Err(e) => {
                warn!("Skipping malformed {} result: {}", kind, e);
                expansion.skipped += 1;
                continue;
            }
        };

        // Known already, or listed twice in this response
        let id = entity.id();
        if store.contains(id) || !seen_here.insert(id) {
            debug!("{} already present", id);
            continue;
        }

        // Only the opposite kind is followed, and each id only once
        for reference in entity.references() {
            if reference.kind == kind.opposite()
                && !store.contains(reference)
                && queued.insert(reference)
            {
                expansion.next.push(reference);
            }
        }

        expansion.entities.push(entity);
    }

    expansion
}
