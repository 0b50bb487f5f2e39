// 📒 Ledger Entry - one registered batch and its movement history
//
// Identity: medicine.batch (external lookup key)
// Value:    medicine + hash, fixed at creation
// State:    tracking (append-only) + status, rewritten together on every move

use crate::error::{LedgerError, Result};
use crate::medicine::{date_format, MedicineDescriptor, MedicineInput, ValidationError};
use crate::tracking::TrackingUpdate;
use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Location of the first tracking event on every entry
pub const MANUFACTURER_LOCATION: &str = "Manufacturer";

/// Status of a freshly registered entry
pub const STATUS_IN_TRANSIT: &str = "In Transit";

/// Days from registration to the estimated arrival date
pub const ETA_DAYS: i64 = 3;

/// Tracking timestamps are kept at minute precision
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Drop seconds and sub-seconds
pub fn truncate_to_minute(time: NaiveDateTime) -> NaiveDateTime {
    time.date()
        .and_hms_opt(time.hour(), time.minute(), 0)
        .unwrap_or(time)
}

/// Status after the batch has been seen at `location`
pub fn transit_status(location: &str) -> String {
    format!("{} at {}", STATUS_IN_TRANSIT, location)
}

// ============================================================================
// TRACKING EVENT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TrackingEventRecord")]
pub struct TrackingEvent {
    location: String,
    #[serde(serialize_with = "timestamp_format::serialize")]
    timestamp: NaiveDateTime,
}

/// Wire shape of a tracking event, checked on the way in
#[derive(Deserialize)]
struct TrackingEventRecord {
    location: String,
    #[serde(with = "timestamp_format")]
    timestamp: NaiveDateTime,
}

impl TryFrom<TrackingEventRecord> for TrackingEvent {
    type Error = ValidationError;

    fn try_from(record: TrackingEventRecord) -> std::result::Result<Self, Self::Error> {
        TrackingEvent::new(&record.location, record.timestamp)
    }
}

impl TrackingEvent {
    /// Create an event; the timestamp is truncated to the minute
    pub fn new(location: &str, timestamp: NaiveDateTime) -> std::result::Result<Self, ValidationError> {
        crate::medicine::require_non_empty("location", location)?;
        Ok(TrackingEvent {
            location: location.to_string(),
            timestamp: truncate_to_minute(timestamp),
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }
}

// ============================================================================
// LEDGER ENTRY
// ============================================================================

/// Persisted unit: `{medicine, hash, tracking, eta, status}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    medicine: MedicineDescriptor,
    hash: String,
    tracking: Vec<TrackingEvent>,
    #[serde(with = "date_format")]
    eta: NaiveDate,
    status: String,
}

impl LedgerEntry {
    /// Reassemble an entry read back from a store row
    pub(crate) fn restore(
        medicine: MedicineDescriptor,
        hash: String,
        tracking: Vec<TrackingEvent>,
        eta: NaiveDate,
        status: String,
    ) -> Self {
        LedgerEntry {
            medicine,
            hash,
            tracking,
            eta,
            status,
        }
    }

    pub fn medicine(&self) -> &MedicineDescriptor {
        &self.medicine
    }

    pub fn batch(&self) -> &str {
        self.medicine.batch()
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Movement history, oldest first
    pub fn tracking(&self) -> &[TrackingEvent] {
        &self.tracking
    }

    pub fn eta(&self) -> NaiveDate {
        self.eta
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    /// Recompute the digest of `medicine` and compare with the stored hash
    pub fn verify(&self) -> bool {
        self.medicine
            .integrity_hash()
            .map(|hash| hash == self.hash)
            .unwrap_or(false)
    }

    /// Append one event and derive the status from it. `eta` and `hash` stay put.
    pub fn append(&mut self, event: TrackingEvent) -> &[TrackingEvent] {
        self.status = transit_status(event.location());
        self.tracking.push(event);
        &self.tracking
    }

    /// Overwrite tracking and status together from a stored update
    pub(crate) fn apply(&mut self, update: &TrackingUpdate) {
        self.tracking = update.tracking.clone();
        self.status = update.status.clone();
    }
}

// ============================================================================
// LEDGER ENTRY BUILDER
// ============================================================================

/// Builds new ledger entries. Pure over (medicine, clock reading).
#[derive(Debug, Clone, Copy, Default)]
pub struct LedgerEntryBuilder;

impl LedgerEntryBuilder {
    pub fn new() -> Self {
        LedgerEntryBuilder
    }

    /// Validate raw input, then build
    pub fn build(&self, medicine: MedicineInput, now: NaiveDateTime) -> Result<LedgerEntry> {
        let medicine = medicine.validate()?;
        self.build_from(medicine, now)
    }

    /// Build from an already validated descriptor
    pub fn build_from(&self, medicine: MedicineDescriptor, now: NaiveDateTime) -> Result<LedgerEntry> {
        let hash = medicine.integrity_hash()?;

        let now = truncate_to_minute(now);
        let eta = now
            .checked_add_signed(Duration::days(ETA_DAYS))
            .ok_or_else(|| {
                LedgerError::Validation(ValidationError::new(
                    "timestamp",
                    "Clock reading leaves no room for an ETA",
                ))
            })?
            .date();

        let origin = TrackingEvent::new(MANUFACTURER_LOCATION, now)?;

        Ok(LedgerEntry {
            medicine,
            hash,
            tracking: vec![origin],
            eta,
            status: STATUS_IN_TRANSIT.to_string(),
        })
    }
}

/// `%Y-%m-%d %H:%M` timestamps
pub(crate) mod timestamp_format {
    use super::TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&time.format(TIMESTAMP_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn at(date: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(date, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn amoxicillin() -> MedicineInput {
        MedicineInput::new("Amoxicillin 250mg", "BATCH-B2", "2025-08-15")
    }

    #[test]
    fn test_build_initial_state() {
        let now = at("2025-01-05 10:30:00");
        let entry = LedgerEntryBuilder::new().build(amoxicillin(), now).unwrap();

        assert_eq!(entry.batch(), "BATCH-B2");
        assert_eq!(entry.status(), "In Transit");
        assert_eq!(entry.eta(), NaiveDate::from_ymd_opt(2025, 1, 8).unwrap());
        assert_eq!(
            entry.tracking(),
            &[TrackingEvent::new("Manufacturer", now).unwrap()]
        );
        assert!(entry.verify());
    }

    #[test]
    fn test_build_truncates_seconds() {
        let entry = LedgerEntryBuilder::new()
            .build(amoxicillin(), at("2025-01-05 10:30:59"))
            .unwrap();

        assert_eq!(entry.tracking()[0].timestamp(), at("2025-01-05 10:30:00"));
    }

    #[test]
    fn test_eta_crosses_month_boundary() {
        let entry = LedgerEntryBuilder::new()
            .build(amoxicillin(), at("2024-02-27 23:59:00"))
            .unwrap();

        assert_eq!(entry.eta(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[test]
    fn test_hash_independent_of_clock() {
        let builder = LedgerEntryBuilder::new();
        let first = builder.build(amoxicillin(), at("2025-01-05 10:30:00")).unwrap();
        let second = builder.build(amoxicillin(), at("2025-03-17 08:05:00")).unwrap();

        assert_eq!(first.hash(), second.hash());
        assert_ne!(first.tracking(), second.tracking());
        assert_ne!(first.eta(), second.eta());
    }

    #[test]
    fn test_build_rejects_invalid_input() {
        let err = LedgerEntryBuilder::new()
            .build(MedicineInput::new("Aspirin", "  ", "2026-01-01"), at("2025-01-05 10:30:00"))
            .unwrap_err();

        match err {
            LedgerError::Validation(e) => assert_eq!(e.field, "batch"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_append_updates_status_only() {
        let mut entry = LedgerEntryBuilder::new()
            .build(amoxicillin(), at("2025-01-05 10:30:00"))
            .unwrap();
        let (hash, eta) = (entry.hash().to_string(), entry.eta());

        let event = TrackingEvent::new("Chennai Hub", at("2025-01-06 14:12:00")).unwrap();
        let tracking = entry.append(event.clone());

        assert_eq!(tracking.len(), 2);
        assert_eq!(tracking.last(), Some(&event));
        assert_eq!(entry.status(), "In Transit at Chennai Hub");
        assert_eq!(entry.hash(), hash);
        assert_eq!(entry.eta(), eta);
    }

    #[test]
    fn test_tracking_event_requires_location() {
        let err = TrackingEvent::new("", at("2025-01-05 10:30:00")).unwrap_err();
        assert_eq!(err.field, "location");
    }

    #[test]
    fn test_stored_event_requires_location() {
        let err = serde_json::from_str::<TrackingEvent>(
            r#"{"location": "", "timestamp": "2025-01-05 10:30"}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("location"));

        let event: TrackingEvent = serde_json::from_str(
            r#"{"location": "Pune Depot", "timestamp": "2025-01-05 10:30"}"#,
        )
        .unwrap();
        assert_eq!(event, TrackingEvent::new("Pune Depot", at("2025-01-05 10:30:00")).unwrap());
    }

    #[test]
    fn test_persisted_record_shape() {
        let entry = LedgerEntryBuilder::new()
            .build(amoxicillin(), at("2025-01-05 10:30:00"))
            .unwrap();
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "medicine": {"name": "Amoxicillin 250mg", "batch": "BATCH-B2", "expiry": "2025-08-15"},
                "hash": entry.hash(),
                "tracking": [{"location": "Manufacturer", "timestamp": "2025-01-05 10:30"}],
                "eta": "2025-01-08",
                "status": "In Transit",
            })
        );

        let back: LedgerEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_verify_detects_tampered_medicine() {
        let entry = LedgerEntryBuilder::new()
            .build(amoxicillin(), at("2025-01-05 10:30:00"))
            .unwrap();

        let mut json = serde_json::to_value(&entry).unwrap();
        json["medicine"]["expiry"] = serde_json::json!("2029-08-15");
        let tampered: LedgerEntry = serde_json::from_value(json).unwrap();

        assert!(entry.verify());
        assert!(!tampered.verify());
    }
}
