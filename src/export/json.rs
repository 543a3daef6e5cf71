//! JSON backup of the study collection.
//! Saves every location with its progress and restores them into any store.

use crate::database::{ReviewStore, StorageError};
use crate::models::{CardFilter, Location, NewLocation, ScheduleRecord};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

type Result<T> = std::result::Result<T, StorageError>;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub locations: Vec<Location>,
    #[serde(default)]
    pub progress: Vec<ScheduleRecord>,
}

impl Collection {
    /// Location ids must be unique and each location carries at most one progress record.
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        if let Some(dup) = self.locations.iter().find(|l| !ids.insert(l.id)) {
            return Err(StorageError::InvalidBackup(format!(
                "location {} appears more than once",
                dup.id
            )));
        }

        let mut scheduled = HashSet::new();
        if let Some(dup) = self.progress.iter().find(|p| !scheduled.insert(p.card_id)) {
            return Err(StorageError::InvalidBackup(format!(
                "location {} has more than one progress record",
                dup.card_id
            )));
        }
        Ok(())
    }
}

/// Snapshots every location in the store together with its progress.
pub fn collect<S: ReviewStore>(store: &S) -> Result<Collection> {
    let mut collection = Collection::default();
    for entry in store.list_cards_with_schedules(&CardFilter::all())? {
        collection.locations.push(entry.location);
        collection.progress.extend(entry.schedule);
    }
    Ok(collection)
}

/// Adds every location of the collection to the store. Locations get fresh ids;
/// progress follows its location. Returns how many locations were added.
pub fn restore<S: ReviewStore>(
    store: &mut S,
    collection: &Collection,
    now: DateTime<Utc>,
) -> Result<usize> {
    collection.validate()?;

    let mut new_ids = HashMap::new();
    for location in &collection.locations {
        let added = store.add_location(
            NewLocation {
                country: location.country.clone(),
                meta: location.meta.clone(),
                note: location.note.clone(),
                image_url: location.image_url.clone(),
            },
            now,
        )?;
        new_ids.insert(location.id, added.id);
    }

    for record in &collection.progress {
        match new_ids.get(&record.card_id) {
            Some(&card_id) => store.put_schedule(&ScheduleRecord {
                card_id,
                ..record.clone()
            })?,
            None => warn!("Skipping progress for unknown location {}", record.card_id),
        }
    }

    Ok(new_ids.len())
}

pub fn write_backup(collection: &Collection, path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, collection)?;
    writer.flush()?;
    info!(
        "Backed up {} locations to {}",
        collection.locations.len(),
        path.display()
    );
    Ok(())
}

/// Reads and validates a backup. Unknown card states fail deserialization.
pub fn read_backup(path: &Path) -> Result<Collection> {
    let collection: Collection = serde_json::from_reader(BufReader::new(File::open(path)?))?;
    collection.validate()?;
    info!(
        "Read backup of {} locations from {}",
        collection.locations.len(),
        path.display()
    );
    Ok(collection)
}
