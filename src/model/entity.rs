// src/model/entity.rs
// =============================================================================
// Person and Union records.
//
// API responses are loosely typed JSON objects. We decode them eagerly into
// the two record types below as soon as they arrive, so the rest of the
// crawler never pokes at raw JSON again.
//
// Decoding rules:
// - An entity without a usable "id" is rejected (DecodeError); the caller logs
//   and skips it.
// - Reference lists (unions, partners, children) are parsed into EntityIds;
//   an unparseable reference is dropped with a warning.
// - adopted/foster children that are not also listed in "children" are
//   dropped, so those lists are always subsets of the children.
// =============================================================================

use super::id::{EntityId, EntityKind, IdError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("entity has no id")]
    MissingId,
    #[error(transparent)]
    BadId(#[from] IdError),
    #[error("expected a {expected} but got id {got}")]
    WrongKind { expected: EntityKind, got: EntityId },
    #[error("entity is not a valid {kind} object: {source}")]
    Shape {
        kind: EntityKind,
        #[source]
        source: serde_json::Error,
    },
}

/// How precisely a partial date is known
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateAccuracy {
    Day,
    Month,
    Year,
    Unknown,
}

/// A date where any trailing part may be missing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialDate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day: Option<u32>,
}

impl PartialDate {
    pub fn accuracy(&self) -> DateAccuracy {
        match (self.year, self.month, self.day) {
            (None, _, _) => DateAccuracy::Unknown,
            (Some(_), None, _) => DateAccuracy::Year,
            (Some(_), Some(_), None) => DateAccuracy::Month,
            (Some(_), Some(_), Some(_)) => DateAccuracy::Day,
        }
    }

    /// Resolves to a calendar date, filling missing month/day with 1
    ///
    /// Returns None when the year is unknown or the parts are not a real date
    /// (e.g. 31 February).
    pub fn resolve(&self) -> Option<(NaiveDate, DateAccuracy)> {
        let year = self.year?;
        let accuracy = self.accuracy();
        let date = NaiveDate::from_ymd_opt(year, self.month.unwrap_or(1), self.day.unwrap_or(1))?;
        Some((date, accuracy))
    }
}

/// Birth or death information; only the date is kept
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifeEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<PartialDate>,
}

/// A person ("profile" on the API side)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middle_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maiden_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default)]
    pub birth: LifeEvent,
    #[serde(default)]
    pub death: LifeEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_alive: Option<bool>,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub unions: Vec<EntityId>,
    /// Canonical link to the person's page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
    /// API link; this is the form unions use to reference the person
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A family union
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Union {
    pub id: EntityId,
    #[serde(default)]
    pub partners: Vec<EntityId>,
    #[serde(default)]
    pub children: Vec<EntityId>,
    #[serde(default)]
    pub adopted_children: Vec<EntityId>,
    #[serde(default)]
    pub foster_children: Vec<EntityId>,
}

impl Union {
    /// Whether the child is listed without an adopted or foster flag
    pub fn is_biological_child(&self, child: &EntityId) -> bool {
        self.children.contains(child)
            && !self.adopted_children.contains(child)
            && !self.foster_children.contains(child)
    }

    /// Children minus adopted and foster children, in listed order
    pub fn biological_children(&self) -> impl Iterator<Item = &EntityId> {
        self.children
            .iter()
            .filter(move |child| self.is_biological_child(child))
    }
}

/// Either kind of record, as produced by decoding a response
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Person(Person),
    Union(Union),
}

impl Entity {
    pub fn id(&self) -> EntityId {
        match self {
            Entity::Person(p) => p.id,
            Entity::Union(u) => u.id,
        }
    }

    /// Decodes one raw API object of the given kind
    pub fn decode(kind: EntityKind, raw: Value) -> Result<Entity, DecodeError> {
        match kind {
            EntityKind::Person => Person::decode(raw).map(Entity::Person),
            EntityKind::Union => Union::decode(raw).map(Entity::Union),
        }
    }

    /// Ids of the opposite kind this entity leads the crawl to
    ///
    /// Persons lead to their unions. Unions lead to their biological
    /// children; adopted and foster links are recorded but not followed.
    pub fn references(&self) -> Vec<EntityId> {
        match self {
            Entity::Person(p) => p.unions.clone(),
            Entity::Union(u) => u.biological_children().copied().collect(),
        }
    }
}

// -----------------------------------------------------------------------------
// Raw response shapes
// -----------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPerson {
    id: Option<String>,
    name: Option<String>,
    display_name: Option<String>,
    first_name: Option<String>,
    middle_name: Option<String>,
    last_name: Option<String>,
    maiden_name: Option<String>,
    gender: Option<String>,
    birth: Option<LifeEvent>,
    death: Option<LifeEvent>,
    is_alive: Option<bool>,
    public: Option<bool>,
    deleted: Option<bool>,
    unions: Option<Vec<String>>,
    profile_url: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawUnion {
    id: Option<String>,
    partners: Option<Vec<String>>,
    children: Option<Vec<String>>,
    adopted_children: Option<Vec<String>>,
    foster_children: Option<Vec<String>>,
}

fn parse_own_id(raw: Option<String>, expected: EntityKind) -> Result<EntityId, DecodeError> {
    let raw = raw.filter(|s| !s.is_empty()).ok_or(DecodeError::MissingId)?;
    let id = EntityId::parse_reference(&raw)?;
    if id.kind != expected {
        return Err(DecodeError::WrongKind { expected, got: id });
    }
    Ok(id)
}

fn parse_references(owner: EntityId, refs: Option<Vec<String>>) -> Vec<EntityId> {
    refs.unwrap_or_default()
        .iter()
        .filter_map(|r| match EntityId::parse_reference(r) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Dropping bad reference on {}: {}", owner, e);
                None
            }
        })
        .collect()
}

impl Person {
    pub fn decode(raw: Value) -> Result<Person, DecodeError> {
        let raw: RawPerson = serde_json::from_value(raw).map_err(|source| DecodeError::Shape {
            kind: EntityKind::Person,
            source,
        })?;
        let id = parse_own_id(raw.id, EntityKind::Person)?;

        Ok(Person {
            id,
            name: raw.name,
            display_name: raw.display_name,
            first_name: raw.first_name,
            middle_name: raw.middle_name,
            last_name: raw.last_name,
            maiden_name: raw.maiden_name,
            gender: raw.gender,
            birth: raw.birth.unwrap_or_default(),
            death: raw.death.unwrap_or_default(),
            is_alive: raw.is_alive,
            public: raw.public.unwrap_or(false),
            deleted: raw.deleted.unwrap_or(false),
            unions: parse_references(id, raw.unions),
            profile_url: raw.profile_url,
            url: raw.url,
        })
    }

    /// The name to show in logs
    pub fn label(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.display_name.clone())
            .unwrap_or_else(|| self.id.to_string())
    }
}

impl Union {
    pub fn decode(raw: Value) -> Result<Union, DecodeError> {
        let raw: RawUnion = serde_json::from_value(raw).map_err(|source| DecodeError::Shape {
            kind: EntityKind::Union,
            source,
        })?;
        let id = parse_own_id(raw.id, EntityKind::Union)?;

        let children = parse_references(id, raw.children);
        let keep_listed = |subset: Vec<EntityId>| -> Vec<EntityId> {
            subset
                .into_iter()
                .filter(|c| {
                    let listed = children.contains(c);
                    if !listed {
                        warn!("{} flags {} as adopted/foster but not as a child", id, c);
                    }
                    listed
                })
                .collect()
        };
        let adopted_children = keep_listed(parse_references(id, raw.adopted_children));
        let foster_children = keep_listed(parse_references(id, raw.foster_children));

        Ok(Union {
            id,
            partners: parse_references(id, raw.partners),
            children,
            adopted_children,
            foster_children,
        })
    }
}
