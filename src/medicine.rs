// 💊 Medicine Descriptor - the immutable value a ledger entry is built from
//
// The integrity hash covers ONLY this value. Its canonical form is a
// key-sorted JSON object written with `", "` / `": "` separators and
// ASCII-only escapes, so records hashed by earlier deployments still verify.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::{self, Write};
use thiserror::Error;

/// Date format for `expiry` (and `eta` on ledger entries)
pub const DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// VALIDATION ERROR
// ============================================================================

/// Malformed input, naming the offending field
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &str, message: &str) -> Self {
        ValidationError {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

/// Reject empty required strings
pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::new(field, "Required field is empty"));
    }
    Ok(())
}

// ============================================================================
// RAW INPUT
// ============================================================================

/// Medicine as supplied by a caller, before validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicineInput {
    pub name: String,
    pub batch: String,
    pub expiry: String,
}

impl MedicineInput {
    pub fn new(name: &str, batch: &str, expiry: &str) -> Self {
        MedicineInput {
            name: name.to_string(),
            batch: batch.to_string(),
            expiry: expiry.to_string(),
        }
    }

    /// Validate into a descriptor. Fields are checked in order name, batch, expiry.
    pub fn validate(self) -> Result<MedicineDescriptor, ValidationError> {
        MedicineDescriptor::try_from(self)
    }
}

// ============================================================================
// MEDICINE DESCRIPTOR
// ============================================================================

/// Validated medicine value. Never mutated once a ledger entry owns it.
///
/// Deserializing goes through the same validation as fresh input, so a stored
/// record with an empty field or a non-canonical expiry is rejected rather
/// than normalised.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "MedicineInput")]
pub struct MedicineDescriptor {
    name: String,
    batch: String,
    #[serde(serialize_with = "date_format::serialize")]
    expiry: NaiveDate,
}

impl TryFrom<MedicineInput> for MedicineDescriptor {
    type Error = ValidationError;

    fn try_from(input: MedicineInput) -> Result<Self, Self::Error> {
        require_non_empty("name", &input.name)?;
        require_non_empty("batch", &input.batch)?;

        let expiry = NaiveDate::parse_from_str(&input.expiry, DATE_FORMAT)
            .ok()
            // "2026-1-1" parses, but would hash differently than it prints
            .filter(|date| date.format(DATE_FORMAT).to_string() == input.expiry)
            .ok_or_else(|| {
                ValidationError::new("expiry", "Must be an ISO 8601 date (YYYY-MM-DD)")
            })?;

        Ok(MedicineDescriptor {
            name: input.name,
            batch: input.batch,
            expiry,
        })
    }
}

impl MedicineDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// External lookup key for tracking updates
    pub fn batch(&self) -> &str {
        &self.batch
    }

    pub fn expiry(&self) -> NaiveDate {
        self.expiry
    }

    /// Key-sorted canonical serialization
    ///
    /// Example: `{"batch": "BATCH-A1", "expiry": "2026-01-01", "name": "Paracetamol 500mg"}`
    pub fn canonical_json(&self) -> serde_json::Result<String> {
        let mut fields = BTreeMap::new();
        fields.insert("name", self.name.clone());
        fields.insert("batch", self.batch.clone());
        fields.insert("expiry", self.expiry.format(DATE_FORMAT).to_string());

        let mut buf = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, CanonicalFormatter);
        fields.serialize(&mut ser)?;

        // CanonicalFormatter only ever writes ASCII
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// SHA-256 of the canonical form, lowercase hex (64 chars)
    pub fn integrity_hash(&self) -> serde_json::Result<String> {
        let canonical = self.canonical_json()?;
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }
}

// ============================================================================
// CANONICAL FORMATTER
// ============================================================================

/// Compact JSON with spaced separators and `\uXXXX` for every non-ASCII char
struct CanonicalFormatter;

impl Formatter for CanonicalFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut units = [0u16; 2];
        for ch in fragment.chars() {
            // DEL is printable to serde_json but escaped in ASCII-only output
            if ch.is_ascii() && ch != '\x7f' {
                writer.write_all(&[ch as u8])?;
            } else {
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

/// `%Y-%m-%d` dates
pub(crate) mod date_format {
    use super::DATE_FORMAT;
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&date.format(DATE_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// TESTS
// ============================================================================
