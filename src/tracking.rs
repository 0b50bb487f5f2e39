// 🚚 Tracking Updater - append a location event to the entry for a batch
//
// Lookup is a linear scan in collection order; the FIRST entry whose
// medicine.batch matches wins. Duplicate batches are not prevented upstream.

use crate::error::{LedgerError, Result};
use crate::ledger::{LedgerEntry, TrackingEvent};
use crate::medicine::require_non_empty;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::borrow::{Borrow, BorrowMut};

// ============================================================================
// TRACKING UPDATE
// ============================================================================

/// The fields a tracking append rewrites, persisted as one unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingUpdate {
    pub tracking: Vec<TrackingEvent>,
    pub status: String,

    /// Tracking length observed when the entry was read. A store must refuse
    /// the update if its copy has moved on since.
    pub expected_len: usize,
}

/// Result of a successful append
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatedEntry {
    /// Index of the matched entry in the scanned collection
    pub position: usize,
    pub update: TrackingUpdate,
}

// ============================================================================
// TRACKING UPDATER
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct TrackingUpdater;

impl TrackingUpdater {
    pub fn new() -> Self {
        TrackingUpdater
    }

    /// Append `{location, now}` to the first entry for `batch` and rewrite its status.
    ///
    /// The matched entry is mutated in place; the returned update carries the
    /// full tracking list, the new status and the pre-append length.
    pub fn append_tracking<E>(
        &self,
        entries: &mut [E],
        batch: &str,
        location: &str,
        now: NaiveDateTime,
    ) -> Result<UpdatedEntry>
    where
        E: BorrowMut<LedgerEntry>,
    {
        require_non_empty("batch", batch)?;
        let event = TrackingEvent::new(location, now)?;

        let position = entries
            .iter()
            .position(|entry| Borrow::<LedgerEntry>::borrow(entry).batch() == batch)
            .ok_or_else(|| LedgerError::NotFound(batch.to_string()))?;

        let entry = BorrowMut::<LedgerEntry>::borrow_mut(&mut entries[position]);
        let expected_len = entry.tracking().len();
        let tracking = entry.append(event).to_vec();

        Ok(UpdatedEntry {
            position,
            update: TrackingUpdate {
                tracking,
                status: entry.status().to_string(),
                expected_len,
            },
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
