// 🗃️ SQLite-backed document store (WAL mode)
//
// One row per ledger entry. medicine and tracking are JSON columns;
// tracking_len mirrors the tracking array length and doubles as the
// optimistic-concurrency version for updates.

use crate::ledger::{LedgerEntry, TrackingEvent};
use crate::medicine::{MedicineDescriptor, DATE_FORMAT};
use crate::store::{DocumentId, DocumentStore, StoreError, StoredEntry};
use crate::tracking::TrackingUpdate;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

pub fn setup_database(conn: &Connection) -> rusqlite::Result<()> {
    // Enable WAL mode for crash recovery (in-memory databases report "memory")
    let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    debug!(journal_mode = %mode, "sqlite journal mode set");

    // ==========================================================================
    // Ledger Table
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS ledger (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            doc_id TEXT UNIQUE NOT NULL,
            batch TEXT NOT NULL,
            medicine TEXT NOT NULL,
            hash TEXT NOT NULL,
            tracking TEXT NOT NULL,
            tracking_len INTEGER NOT NULL,
            eta TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_ledger_batch ON ledger(batch)",
        [],
    )?;

    Ok(())
}

/// Ledger entries in a SQLite database
pub struct SqliteStore {
    conn: Mutex<Option<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database file and make sure the schema exists
    pub fn connect(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        setup_database(&conn)?;
        debug!(path = %path.display(), "sqlite store connected");
        Ok(Self::from_connection(conn))
    }

    /// Private in-memory database, mostly for tests
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        SqliteStore {
            conn: Mutex::new(Some(conn)),
        }
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| StoreError::Unavailable("sqlite connection lock poisoned".to_string()))?;
        let conn = guard
            .as_mut()
            .ok_or_else(|| StoreError::Unavailable("sqlite store is closed".to_string()))?;
        f(conn)
    }
}

fn decode_row(
    doc_id: String,
    medicine_json: &str,
    hash: String,
    tracking_json: &str,
    eta: &str,
    status: String,
) -> Result<StoredEntry, StoreError> {
    let medicine: MedicineDescriptor = serde_json::from_str(medicine_json)?;
    let tracking: Vec<TrackingEvent> = serde_json::from_str(tracking_json)?;
    let eta = NaiveDate::parse_from_str(eta, DATE_FORMAT)
        .map_err(|e| StoreError::Corrupt(format!("document {doc_id}: bad eta {eta:?}: {e}")))?;

    Ok(StoredEntry {
        id: DocumentId::from(doc_id),
        entry: LedgerEntry::restore(medicine, hash, tracking, eta, status),
    })
}

impl DocumentStore for SqliteStore {
    fn create(&self, entry: &LedgerEntry) -> Result<DocumentId, StoreError> {
        let id = DocumentId::generate();
        let medicine_json = serde_json::to_string(entry.medicine())?;
        let tracking_json = serde_json::to_string(entry.tracking())?;

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO ledger (
                    doc_id, batch, medicine, hash, tracking, tracking_len, eta, status
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id.as_str(),
                    entry.batch(),
                    medicine_json,
                    entry.hash(),
                    tracking_json,
                    entry.tracking().len() as i64,
                    entry.eta().format(DATE_FORMAT).to_string(),
                    entry.status(),
                ],
            )?;
            Ok(())
        })?;

        Ok(id)
    }

    fn list_all(&self) -> Result<Vec<StoredEntry>, StoreError> {
        type Row = (String, String, String, String, String, String);

        let rows: Vec<Row> = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT doc_id, medicine, hash, tracking, eta, status
                 FROM ledger
                 ORDER BY id ASC",
            )?;
            let rows: Vec<Row> = stmt
                .query_map([], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        rows.into_iter()
            .map(|(doc_id, medicine, hash, tracking, eta, status)| {
                decode_row(doc_id, &medicine, hash, &tracking, &eta, status)
            })
            .collect()
    }

    fn update(&self, id: &DocumentId, update: &TrackingUpdate) -> Result<(), StoreError> {
        let tracking_json = serde_json::to_string(&update.tracking)?;

        self.with_conn(|conn| {
            // Single conditional statement: both fields or neither
            let changed = conn.execute(
                "UPDATE ledger
                 SET tracking = ?1, status = ?2, tracking_len = ?3
                 WHERE doc_id = ?4 AND tracking_len = ?5",
                params![
                    tracking_json,
                    update.status,
                    update.tracking.len() as i64,
                    id.as_str(),
                    update.expected_len as i64,
                ],
            )?;

            if changed == 1 {
                return Ok(());
            }

            let actual: Option<i64> = conn
                .query_row(
                    "SELECT tracking_len FROM ledger WHERE doc_id = ?1",
                    [id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;

            match actual {
                Some(actual) => Err(StoreError::Conflict {
                    id: id.clone(),
                    expected: update.expected_len,
                    actual: actual as usize,
                }),
                None => Err(StoreError::MissingDocument(id.clone())),
            }
        })
    }

    fn close(&self) -> Result<(), StoreError> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| StoreError::Unavailable("sqlite connection lock poisoned".to_string()))?;

        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| StoreError::from(e))?;
            debug!("sqlite store closed");
        }
        Ok(())
    }
}
