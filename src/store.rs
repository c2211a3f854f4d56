// src/store.rs
// =============================================================================
// The local copy of the crawled graph.
//
// Two tables, "profiles" and "unions", each keyed by the number from the
// entity's compound id. Records are only ever added: a record that is already
// present is left untouched, which makes re-fetching the same entity harmless.
//
// Concurrency:
// - One lock guards both tables
// - insert_if_absent() checks and inserts under that lock, so when two workers
//   discover the same entity only one of them inserts (and logs) it
//
// Durability:
// - Everything lives in memory during the crawl
// - flush() writes the whole store as JSON to a temporary file next to the
//   target and renames it into place, so the file is never half-written
// - open() reads an existing file back, which lets a crawl resume
// =============================================================================

use crate::model::{Entity, EntityId, EntityKind, Person, Union};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Tables {
    #[serde(default)]
    profiles: BTreeMap<u64, Person>,
    #[serde(default)]
    unions: BTreeMap<u64, Union>,
}

impl Tables {
    fn contains(&self, id: EntityId) -> bool {
        match id.kind {
            EntityKind::Person => self.profiles.contains_key(&id.num),
            EntityKind::Union => self.unions.contains_key(&id.num),
        }
    }
}

/// Deduplicated, append-only store of persons and unions
#[derive(Debug)]
pub struct EntityStore {
    tables: Mutex<Tables>,
    path: Option<PathBuf>,
}

impl EntityStore {
    /// Opens the store file at `path`, starting empty if it does not exist
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // A missing or empty file is a fresh crawl; anything else must parse
        let tables = if path.exists() {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read store {}", path.display()))?;
            if text.trim().is_empty() {
                Tables::default()
            } else {
                serde_json::from_str(&text)
                    .with_context(|| format!("Store {} is not valid", path.display()))?
            }
        } else {
            Tables::default()
        };

        info!(
            "Opened store {} ({} profiles, {} unions)",
            path.display(),
            tables.profiles.len(),
            tables.unions.len()
        );

        Ok(Self {
            tables: Mutex::new(tables),
            path: Some(path),
        })
    }

    /// A store with no backing file; flush() does nothing
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            path: None,
        }
    }

    #[cfg(test)]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.tables.lock().contains(id)
    }

    /// Inserts the entity unless its id is already present
    ///
    /// Returns whether it was inserted.
    #[cfg(test)]
    pub fn insert_if_absent(&self, entity: Entity) -> bool {
        self.insert_counted(entity).is_some()
    }

    /// Like insert_if_absent, but returns the new size of the entity's table
    pub fn insert_counted(&self, entity: Entity) -> Option<usize> {
        let mut tables = self.tables.lock();
        if tables.contains(entity.id()) {
            debug!("{} already present", entity.id());
            return None;
        }

        match entity {
            Entity::Person(person) => {
                tables.profiles.insert(person.id.num, person);
                Some(tables.profiles.len())
            }
            Entity::Union(union) => {
                tables.unions.insert(union.id.num, union);
                Some(tables.unions.len())
            }
        }
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        let tables = self.tables.lock();
        match kind {
            EntityKind::Person => tables.profiles.len(),
            EntityKind::Union => tables.unions.len(),
        }
    }

    #[cfg(test)]
    pub fn person(&self, num: u64) -> Option<Person> {
        self.tables.lock().profiles.get(&num).cloned()
    }

    pub fn union(&self, num: u64) -> Option<Union> {
        self.tables.lock().unions.get(&num).cloned()
    }

    /// All persons, ordered by id
    pub fn persons(&self) -> Vec<Person> {
        self.tables.lock().profiles.values().cloned().collect()
    }

    /// All unions, ordered by id
    pub fn unions(&self) -> Vec<Union> {
        self.tables.lock().unions.values().cloned().collect()
    }

    /// Writes the store to its file
    pub fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        // Serialize under the lock, write without it
        let json = {
            let tables = self.tables.lock();
            serde_json::to_string_pretty(&*tables).context("Failed to serialize store")?
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        // Write next to the target, then swap it in with one rename
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("Failed to move store into {}", path.display()))?;

        debug!("Flushed store to {}", path.display());
        Ok(())
    }

    /// Final flush at the end of a run
    pub fn close(&self) -> Result<()> {
        self.flush()?;
        if let Some(path) = &self.path {
            info!(
                "Closed store {} ({} profiles, {} unions)",
                path.display(),
                self.count(EntityKind::Person),
                self.count(EntityKind::Union)
            );
        }
        Ok(())
    }
}
