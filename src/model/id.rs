// src/model/id.rs
// =============================================================================
// Compound entity ids.
//
// The API identifies everything with strings like "profile-56847813" or
// "union-6000000012345678901". References inside responses are full URLs
// ("https://www.geni.com/api/union-123") whose last path segment is the id.
//
// We parse these exactly once, when a response is decoded, into an EntityId
// (kind + number). Everything downstream works with the typed pair.
// =============================================================================

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The two kinds of entity in the family graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A person (the API calls these "profiles")
    Person,
    /// A family union: partners plus their children
    Union,
}

impl EntityKind {
    /// The tag used in compound ids and as the endpoint name
    pub fn tag(self) -> &'static str {
        match self {
            EntityKind::Person => "profile",
            EntityKind::Union => "union",
        }
    }

    /// The kind a crawl expands into from this kind
    pub fn opposite(self) -> EntityKind {
        match self {
            EntityKind::Person => EntityKind::Union,
            EntityKind::Union => EntityKind::Person,
        }
    }

    fn from_tag(tag: &str) -> Option<EntityKind> {
        match tag {
            "profile" | "person" => Some(EntityKind::Person),
            "union" => Some(EntityKind::Union),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    #[error("id '{0}' has no '<kind>-<number>' form")]
    Malformed(String),
    #[error("unknown entity kind '{kind}' in id '{raw}'")]
    UnknownKind { kind: String, raw: String },
    #[error("id '{0}' does not end in a number")]
    BadNumber(String),
}

/// A parsed compound id
///
/// The number is also the storage key within the kind's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId {
    pub kind: EntityKind,
    pub num: u64,
}

impl EntityId {
    pub fn new(kind: EntityKind, num: u64) -> Self {
        Self { kind, num }
    }

    pub fn person(num: u64) -> Self {
        Self::new(EntityKind::Person, num)
    }

    pub fn union(num: u64) -> Self {
        Self::new(EntityKind::Union, num)
    }

    /// Parses either a bare compound id or a reference URL ending in one
    pub fn parse_reference(reference: &str) -> Result<Self, IdError> {
        let last = reference
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(reference);
        last.parse()
    }
}

impl FromStr for EntityId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tag, number) = s
            .split_once('-')
            .ok_or_else(|| IdError::Malformed(s.to_string()))?;

        let kind = EntityKind::from_tag(tag).ok_or_else(|| IdError::UnknownKind {
            kind: tag.to_string(),
            raw: s.to_string(),
        })?;

        let num = number
            .parse::<u64>()
            .map_err(|_| IdError::BadNumber(s.to_string()))?;

        Ok(EntityId { kind, num })
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind.tag(), self.num)
    }
}

// Stored records keep ids in their compound string form so the store file
// stays readable next to raw API output.
impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        EntityId::parse_reference(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_profile_id() {
        let id: EntityId = "profile-56847813".parse().unwrap();
        assert_eq!(id, EntityId::person(56847813));
        assert_eq!(id.to_string(), "profile-56847813");
    }

    #[test]
    fn test_person_alias() {
        let id: EntityId = "person-7".parse().unwrap();
        assert_eq!(id, EntityId::person(7));
        // Rendering always uses the API tag
        assert_eq!(id.to_string(), "profile-7");
    }

    #[test]
    fn test_parse_reference_url() {
        let id = EntityId::parse_reference("https://www.geni.com/api/union-6000000001").unwrap();
        assert_eq!(id, EntityId::union(6000000001));
    }

    #[test]
    fn test_reject_unknown_kind() {
        let err = "document-12".parse::<EntityId>().unwrap_err();
        assert!(matches!(err, IdError::UnknownKind { .. }));
    }

    #[test]
    fn test_reject_missing_number() {
        assert!(matches!("profile-abc".parse::<EntityId>(), Err(IdError::BadNumber(_))));
        assert!(matches!("profile".parse::<EntityId>(), Err(IdError::Malformed(_))));
    }

    #[test]
    fn test_serde_uses_compound_form() {
        let json = serde_json::to_string(&EntityId::union(42)).unwrap();
        assert_eq!(json, "\"union-42\"");
        let back: EntityId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EntityId::union(42));
    }
}
