// src/export.rs
// =============================================================================
// Flattens a crawled store into one row per public person.
//
// Each row carries the person's basics plus the ids of their biological
// parents and children, worked out from the unions they belong to:
// - partner in a union -> that union's children (minus adopted/foster) are
//   their children
// - biological child of a union -> that union's partners are their parents
//
// Row ids are UUIDv5s of the compound id, so they stay the same from one
// export to the next. Referenced parents/children may be absent from the rows
// (private, or outside the crawl).
// =============================================================================

use crate::model::{DateAccuracy, EntityId, LifeEvent, Person};
use crate::store::EntityStore;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub id: Uuid,
    pub name: Option<String>,
    pub short_name: Option<String>,
    pub gender: Option<String>,
    pub birth_date: Option<String>,
    pub birth_accuracy: Option<DateAccuracy>,
    pub death_date: Option<String>,
    pub death_accuracy: Option<DateAccuracy>,
    pub is_alive: Option<bool>,
    pub children_ids: Vec<Uuid>,
    pub parent_ids: Vec<Uuid>,
    pub external_url: Option<String>,
    pub geni_id: String,
}

/// Stable row id for an entity
pub fn row_id(id: EntityId) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_X500, id.to_string().as_bytes())
}

fn date_fields(person: &Person, event: &LifeEvent) -> (Option<String>, Option<DateAccuracy>) {
    let Some(date) = &event.date else {
        return (None, None);
    };
    if date.year.is_none() {
        return (None, None);
    }
    match date.resolve() {
        Some((resolved, accuracy)) => (Some(resolved.to_string()), Some(accuracy)),
        None => {
            warn!("Could not parse date {:?} on {}", date, person.id);
            (None, None)
        }
    }
}

/// Builds the rows for every public person in the store
pub fn to_rows(store: &EntityStore) -> Vec<Row> {
    let persons = store.persons();
    let total = persons.len();
    let mut rows = Vec::new();

    for (i, person) in persons.iter().enumerate() {
        if (i + 1) % 100 == 0 {
            info!("Processing {}/{}", i + 1, total);
        }
        if !person.public {
            continue;
        }

        // Partner of a union -> its children; biological child -> its parents
        let mut children_ids = Vec::new();
        let mut parent_ids = Vec::new();
        for union_id in &person.unions {
            // Unions the crawl never stored are skipped
            let Some(union) = store.union(union_id.num) else {
                continue;
            };

            if union.partners.contains(&person.id) {
                children_ids.extend(union.biological_children().map(|c| row_id(*c)));
            } else if union.is_biological_child(&person.id) {
                parent_ids.extend(union.partners.iter().map(|p| row_id(*p)));
            }
        }

        let (birth_date, birth_accuracy) = date_fields(person, &person.birth);
        let (death_date, death_accuracy) = date_fields(person, &person.death);

        rows.push(Row {
            id: row_id(person.id),
            name: person.name.clone(),
            short_name: person.display_name.clone().or_else(|| person.name.clone()),
            gender: person.gender.clone(),
            birth_date,
            birth_accuracy,
            death_date,
            death_accuracy,
            is_alive: person.is_alive,
            children_ids,
            parent_ids,
            external_url: person.profile_url.clone(),
            geni_id: person.id.to_string(),
        });
    }

    rows
}

/// Writes rows as YAML, or as JSON when `json` is set
pub fn write_rows(rows: &[Row], path: &Path, json: bool) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    if json {
        serde_json::to_writer_pretty(&mut writer, rows)?;
    } else {
        serde_yaml::to_writer(&mut writer, rows)?;
    }
    writer.flush()?;

    info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}
