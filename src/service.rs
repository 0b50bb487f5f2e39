// 🏥 Ledger Service - the operations the API layer calls
//
// Every call re-reads from the store; nothing is cached between calls.
// Tracking updates are read-append-write with an optimistic check on the
// entry's tracking length, retried on conflict so concurrent appends to the
// same batch are never lost. Different batches never contend.

use crate::clock::{Clock, SystemClock};
use crate::error::{LedgerError, Result};
use crate::forecast::{forecast, ForecastResult};
use crate::ledger::{LedgerEntry, LedgerEntryBuilder, TrackingEvent};
use crate::medicine::{require_non_empty, MedicineInput};
use crate::store::{DocumentStore, StoreError};
use crate::tracking::TrackingUpdater;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Default read-append-write attempts for one location update
pub const DEFAULT_MAX_UPDATE_ATTEMPTS: u32 = 5;

/// Response to a successful location update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationUpdate {
    pub tracking: Vec<TrackingEvent>,
    pub status: String,
}

/// Hash check for one stored entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub batch: String,
    pub hash: String,
    pub valid: bool,
}

pub struct LedgerService<S, C = SystemClock> {
    store: S,
    clock: C,
    builder: LedgerEntryBuilder,
    updater: TrackingUpdater,
    max_update_attempts: u32,
}

impl<S: DocumentStore> LedgerService<S, SystemClock> {
    /// Service on the local wall clock
    pub fn with_system_clock(store: S) -> Self {
        Self::new(store, SystemClock)
    }
}

impl<S: DocumentStore, C: Clock> LedgerService<S, C> {
    pub fn new(store: S, clock: C) -> Self {
        LedgerService {
            store,
            clock,
            builder: LedgerEntryBuilder::new(),
            updater: TrackingUpdater::new(),
            max_update_attempts: DEFAULT_MAX_UPDATE_ATTEMPTS,
        }
    }

    /// Retry budget for contended updates (at least one attempt is always made)
    pub fn with_max_update_attempts(mut self, attempts: u32) -> Self {
        self.max_update_attempts = attempts.max(1);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Build a ledger entry for `medicine` and persist it
    pub fn register_medicine(&self, medicine: MedicineInput) -> Result<LedgerEntry> {
        let entry = self.builder.build(medicine, self.clock.now())?;
        let id = self.store.create(&entry)?;

        info!(
            batch = entry.batch(),
            doc_id = %id,
            hash = entry.hash(),
            "medicine registered"
        );
        Ok(entry)
    }

    /// Every entry in store order
    pub fn list_ledger(&self) -> Result<Vec<LedgerEntry>> {
        let docs = self.store.list_all()?;
        debug!(count = docs.len(), "ledger listed");
        Ok(docs.into_iter().map(|doc| doc.entry).collect())
    }

    /// Append `location` to the first entry for `batch`
    pub fn update_location(&self, batch: &str, location: &str) -> Result<LocationUpdate> {
        require_non_empty("batch", batch)?;
        require_non_empty("location", location)?;

        for attempt in 1..=self.max_update_attempts {
            let mut docs = self.store.list_all()?;
            let updated = self
                .updater
                .append_tracking(&mut docs, batch, location, self.clock.now())?;
            let id = &docs[updated.position].id;

            match self.store.update(id, &updated.update) {
                Ok(()) => {
                    info!(
                        batch,
                        location,
                        doc_id = %id,
                        events = updated.update.tracking.len(),
                        "tracking updated"
                    );
                    return Ok(LocationUpdate {
                        tracking: updated.update.tracking,
                        status: updated.update.status,
                    });
                }
                Err(StoreError::Conflict { expected, actual, .. }) => {
                    warn!(
                        batch,
                        attempt,
                        expected,
                        actual,
                        "concurrent tracking update, re-reading"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(LedgerError::Conflict {
            batch: batch.to_string(),
            attempts: self.max_update_attempts,
        })
    }

    /// Forecast next-step stock from a count history
    pub fn predict_stock(&self, history: &[i64]) -> Result<ForecastResult> {
        let result = forecast(history)?;
        debug!(
            readings = history.len(),
            predicted = result.predicted_stock,
            alert = result.alert,
            "stock forecast"
        );
        Ok(result)
    }

    /// Recompute every entry's hash against its medicine
    pub fn verify_ledger(&self) -> Result<Vec<IntegrityReport>> {
        let docs = self.store.list_all()?;

        let reports: Vec<IntegrityReport> = docs
            .iter()
            .map(|doc| {
                let valid = doc.entry.verify();
                if !valid {
                    warn!(batch = doc.entry.batch(), doc_id = %doc.id, "ledger hash mismatch");
                }
                IntegrityReport {
                    batch: doc.entry.batch().to_string(),
                    hash: doc.entry.hash().to_string(),
                    valid,
                }
            })
            .collect();

        Ok(reports)
    }

    /// Close the underlying store
    pub fn close(self) -> Result<()> {
        self.store.close()?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::MemoryStore;
    use crate::tracking::TrackingUpdate;
    use chrono::{Duration, NaiveDate, NaiveDateTime};
    use pretty_assertions::assert_eq;

    fn at(date: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(date, "%Y-%m-%d %H:%M").unwrap()
    }

    fn create_test_service() -> LedgerService<MemoryStore, FixedClock> {
        LedgerService::new(MemoryStore::new(), FixedClock::new(at("2025-01-05 10:30")))
    }

    fn paracetamol() -> MedicineInput {
        MedicineInput::new("Paracetamol 500mg", "BATCH-A1", "2026-01-01")
    }

    #[test]
    fn test_register_persists_entry() {
        let service = create_test_service();
        let entry = service.register_medicine(paracetamol()).unwrap();

        assert_eq!(entry.eta(), NaiveDate::from_ymd_opt(2025, 1, 8).unwrap());
        assert_eq!(service.list_ledger().unwrap(), vec![entry]);
    }

    #[test]
    fn test_register_invalid_touches_nothing() {
        let service = create_test_service();
        let err = service
            .register_medicine(MedicineInput::new("Paracetamol", "BATCH-A1", "01/01/2026"))
            .unwrap_err();

        assert!(matches!(err, LedgerError::Validation(ref e) if e.field == "expiry"));
        assert!(service.list_ledger().unwrap().is_empty());
    }

    #[test]
    fn test_update_location_appends_with_clock_time() {
        let service = create_test_service();
        service.register_medicine(paracetamol()).unwrap();

        service.clock().advance(Duration::hours(5));
        let update = service.update_location("BATCH-A1", "Distributor").unwrap();

        assert_eq!(update.tracking.len(), 2);
        assert_eq!(
            update.tracking[1],
            TrackingEvent::new("Distributor", at("2025-01-05 15:30")).unwrap()
        );
        assert_eq!(update.status, "In Transit at Distributor");

        // Persisted state matches the response, ETA still frozen at creation
        let stored = &service.list_ledger().unwrap()[0];
        assert_eq!(stored.tracking(), update.tracking.as_slice());
        assert_eq!(stored.status(), update.status);
        assert_eq!(stored.eta(), NaiveDate::from_ymd_opt(2025, 1, 8).unwrap());
    }

    #[test]
    fn test_update_unknown_batch_is_not_found() {
        let service = create_test_service();
        service.register_medicine(paracetamol()).unwrap();
        let before = service.list_ledger().unwrap();

        let err = service.update_location("BATCH-Z9", "Hub").unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(ref b) if b == "BATCH-Z9"));
        assert!(!err.is_retryable());
        assert_eq!(service.list_ledger().unwrap(), before);
    }

    #[test]
    fn test_update_rejects_empty_location() {
        let service = create_test_service();
        service.register_medicine(paracetamol()).unwrap();

        let err = service.update_location("BATCH-A1", "").unwrap_err();
        assert!(matches!(err, LedgerError::Validation(ref e) if e.field == "location"));
    }

    #[test]
    fn test_store_failure_is_surfaced_not_swallowed() {
        let service = create_test_service();
        service.register_medicine(paracetamol()).unwrap();
        service.store().close().unwrap();

        let err = service.update_location("BATCH-A1", "Hub").unwrap_err();
        assert!(matches!(err, LedgerError::Store(StoreError::Unavailable(_))));
        assert!(err.is_retryable());

        assert!(service.list_ledger().is_err());
        assert!(service.register_medicine(paracetamol()).is_err());
    }

    /// Store whose entries always move on between read and write
    struct AlwaysContended(MemoryStore);

    impl DocumentStore for AlwaysContended {
        fn create(&self, entry: &LedgerEntry) -> std::result::Result<crate::store::DocumentId, StoreError> {
            self.0.create(entry)
        }

        fn list_all(&self) -> std::result::Result<Vec<crate::store::StoredEntry>, StoreError> {
            self.0.list_all()
        }

        fn update(
            &self,
            id: &crate::store::DocumentId,
            update: &TrackingUpdate,
        ) -> std::result::Result<(), StoreError> {
            Err(StoreError::Conflict {
                id: id.clone(),
                expected: update.expected_len,
                actual: update.expected_len + 1,
            })
        }

        fn close(&self) -> std::result::Result<(), StoreError> {
            self.0.close()
        }
    }

    #[test]
    fn test_conflict_after_retry_budget() {
        let service = LedgerService::new(
            AlwaysContended(MemoryStore::new()),
            FixedClock::new(at("2025-01-05 10:30")),
        )
        .with_max_update_attempts(3);
        service.register_medicine(paracetamol()).unwrap();

        let err = service.update_location("BATCH-A1", "Hub").unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Conflict { ref batch, attempts: 3 } if batch == "BATCH-A1"
        ));
    }

    #[test]
    fn test_predict_stock() {
        let service = create_test_service();
        assert_eq!(service.predict_stock(&[10, 9, 8]).unwrap().predicted_stock, 7);
        assert!(matches!(
            service.predict_stock(&[50, 52]),
            Err(LedgerError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_verify_ledger_reports_every_entry() {
        let service = create_test_service();
        service.register_medicine(paracetamol()).unwrap();
        service
            .register_medicine(MedicineInput::new("Amoxicillin 250mg", "BATCH-B2", "2025-08-15"))
            .unwrap();
        service.update_location("BATCH-B2", "Hub").unwrap();

        let reports = service.verify_ledger().unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.valid));
        assert_eq!(reports[1].batch, "BATCH-B2");
    }
}
