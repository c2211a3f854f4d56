// src/api/request.rs
// =============================================================================
// A single batch fetch: one entity kind, up to `max_ids` ids, and the fixed
// field list for that kind.
// =============================================================================

use crate::model::{EntityId, EntityKind};
use std::fmt;

/// Default number of ids per request. The API pages results above 50.
pub const DEFAULT_MAX_IDS: usize = 40;

const PROFILE_FIELDS: &[&str] = &[
    // id
    "id", "guid",
    // meta
    "created_at", "updated_at", "public", "deleted", "locked",
    // links
    "url", "profile_url",
    // name
    "display_name", "first_name", "middle_name", "last_name", "maiden_name",
    "name", "names", "nicknames", "suffix",
    // gender
    "gender",
    // birth
    "birth", "birth_order",
    // death
    "death", "is_alive", "living",
    // relations
    "unions",
];

const UNION_FIELDS: &[&str] = &[
    "id",
    // parents, when seen from the children
    "partners",
    // includes adopted and foster children
    "children",
    // subsets of children
    "adopted_children", "foster_children",
];

/// Fields requested for every entity of the given kind
pub fn fields_for(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Person => PROFILE_FIELDS,
        EntityKind::Union => UNION_FIELDS,
    }
}

/// One unit of crawl work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub kind: EntityKind,
    pub ids: Vec<EntityId>,
    /// Whether the fetched entities' references are followed
    pub expand: bool,
}

impl FetchRequest {
    pub fn new(kind: EntityKind, ids: Vec<EntityId>) -> Self {
        Self {
            kind,
            ids,
            expand: true,
        }
    }

    /// A request whose entities are stored but not expanded
    pub fn leaf(kind: EntityKind, ids: Vec<EntityId>) -> Self {
        Self {
            kind,
            ids,
            expand: false,
        }
    }

    /// Splits ids into requests of at most `max_ids` each, keeping order
    ///
    /// 85 ids with max_ids = 40 become three requests of 40, 40 and 5.
    pub fn batches(kind: EntityKind, ids: &[EntityId], max_ids: usize) -> Vec<FetchRequest> {
        ids.chunks(max_ids.max(1))
            .map(|chunk| FetchRequest::new(kind, chunk.to_vec()))
            .collect()
    }

    /// Same as batches(), but every request is a leaf
    pub fn leaf_batches(kind: EntityKind, ids: &[EntityId], max_ids: usize) -> Vec<FetchRequest> {
        ids.chunks(max_ids.max(1))
            .map(|chunk| FetchRequest::leaf(kind, chunk.to_vec()))
            .collect()
    }

    pub fn fields(&self) -> &'static [&'static str] {
        fields_for(self.kind)
    }

    /// Comma-joined ids, as the API expects them
    pub fn joined_ids(&self) -> String {
        self.ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn joined_fields(&self) -> String {
        self.fields().join(",")
    }
}

impl fmt::Display for FetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ids.as_slice() {
            [single] => write!(f, "{} {}", self.kind, single),
            [first, ..] => write!(f, "{} x{} (first {})", self.kind, self.ids.len(), first),
            [] => write!(f, "{} (no ids)", self.kind),
        }
    }
}
