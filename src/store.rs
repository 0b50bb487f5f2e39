// 🗄️ Document Store - persistence seam for ledger entries
//
// The core only needs create / list_all / update. Updates carry the tracking
// length the caller read; a store applies tracking + status together, and only
// if nobody appended in between (optimistic concurrency per entry).

use crate::config::{StoreBackend, StoreConfig};
use crate::db::SqliteStore;
use crate::ledger::LedgerEntry;
use crate::tracking::TrackingUpdate;
use serde::{Deserialize, Serialize};
use std::borrow::{Borrow, BorrowMut};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use thiserror::Error;

// ============================================================================
// DOCUMENT IDENTITY
// ============================================================================

/// Store-assigned document id (UUID v4)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn generate() -> Self {
        DocumentId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        DocumentId(value)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A ledger entry together with its document id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub id: DocumentId,
    pub entry: LedgerEntry,
}

impl Borrow<LedgerEntry> for StoredEntry {
    fn borrow(&self) -> &LedgerEntry {
        &self.entry
    }
}

impl BorrowMut<LedgerEntry> for StoredEntry {
    fn borrow_mut(&mut self) -> &mut LedgerEntry {
        &mut self.entry
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend failure or closed store. Retryable by the caller.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Someone appended to the entry since it was read
    #[error("version conflict on document {id}: expected tracking length {expected}, found {actual}")]
    Conflict {
        id: DocumentId,
        expected: usize,
        actual: usize,
    },

    #[error("document not found: {0}")]
    MissingDocument(DocumentId),

    /// A stored record could not be decoded
    #[error("corrupt document: {0}")]
    Corrupt(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

// ============================================================================
// DOCUMENT STORE TRAIT
// ============================================================================

pub trait DocumentStore: Send + Sync {
    /// Persist a new entry and return its id
    fn create(&self, entry: &LedgerEntry) -> Result<DocumentId, StoreError>;

    /// Every entry, in insertion order
    fn list_all(&self) -> Result<Vec<StoredEntry>, StoreError>;

    /// Apply tracking + status atomically if the stored tracking length is
    /// still `update.expected_len`, otherwise `StoreError::Conflict`
    fn update(&self, id: &DocumentId, update: &TrackingUpdate) -> Result<(), StoreError>;

    /// Release the backend. Later calls fail with `StoreError::Unavailable`.
    fn close(&self) -> Result<(), StoreError>;
}

impl<S: DocumentStore + ?Sized> DocumentStore for Arc<S> {
    fn create(&self, entry: &LedgerEntry) -> Result<DocumentId, StoreError> {
        (**self).create(entry)
    }

    fn list_all(&self) -> Result<Vec<StoredEntry>, StoreError> {
        (**self).list_all()
    }

    fn update(&self, id: &DocumentId, update: &TrackingUpdate) -> Result<(), StoreError> {
        (**self).update(id, update)
    }

    fn close(&self) -> Result<(), StoreError> {
        (**self).close()
    }
}

impl<S: DocumentStore + ?Sized> DocumentStore for Box<S> {
    fn create(&self, entry: &LedgerEntry) -> Result<DocumentId, StoreError> {
        (**self).create(entry)
    }

    fn list_all(&self) -> Result<Vec<StoredEntry>, StoreError> {
        (**self).list_all()
    }

    fn update(&self, id: &DocumentId, update: &TrackingUpdate) -> Result<(), StoreError> {
        (**self).update(id, update)
    }

    fn close(&self) -> Result<(), StoreError> {
        (**self).close()
    }
}

// ============================================================================
// MEMORY STORE
// ============================================================================

/// In-process store. Clones share the same documents.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    docs: Arc<RwLock<Vec<StoredEntry>>>,
    open: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            docs: Arc::new(RwLock::new(Vec::new())),
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store is closed".to_string()))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("memory store lock poisoned".to_string())
}

impl DocumentStore for MemoryStore {
    fn create(&self, entry: &LedgerEntry) -> Result<DocumentId, StoreError> {
        self.ensure_open()?;
        let id = DocumentId::generate();
        let mut docs = self.docs.write().map_err(poisoned)?;
        docs.push(StoredEntry {
            id: id.clone(),
            entry: entry.clone(),
        });
        Ok(id)
    }

    fn list_all(&self) -> Result<Vec<StoredEntry>, StoreError> {
        self.ensure_open()?;
        let docs = self.docs.read().map_err(poisoned)?;
        Ok(docs.clone())
    }

    fn update(&self, id: &DocumentId, update: &TrackingUpdate) -> Result<(), StoreError> {
        self.ensure_open()?;
        let mut docs = self.docs.write().map_err(poisoned)?;

        let doc = docs
            .iter_mut()
            .find(|doc| &doc.id == id)
            .ok_or_else(|| StoreError::MissingDocument(id.clone()))?;

        let actual = doc.entry.tracking().len();
        if actual != update.expected_len {
            return Err(StoreError::Conflict {
                id: id.clone(),
                expected: update.expected_len,
                actual,
            });
        }

        doc.entry.apply(update);
        Ok(())
    }

    fn close(&self) -> Result<(), StoreError> {
        self.open.store(false, Ordering::Release);
        Ok(())
    }
}

/// Open the backend named in the config
pub fn open_store(config: &StoreConfig) -> Result<Box<dyn DocumentStore>, StoreError> {
    match config.backend {
        StoreBackend::Memory => Ok(Box::new(MemoryStore::new())),
        StoreBackend::Sqlite => Ok(Box::new(SqliteStore::connect(&config.path)?)),
    }
}

// ============================================================================
// TESTS
// ============================================================================
