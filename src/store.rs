//! The escalation store seen by the pipeline, the poller and the CLI.
//!
//! `SqliteStore` serializes all access through one connection behind a
//! `parking_lot::Mutex`; SQLite's `BEGIN IMMEDIATE` additionally serializes
//! writers across processes sharing the file.

use std::path::Path;

use parking_lot::Mutex;

use crate::db::{EscalationDb, StoreError};
use crate::types::{Escalation, NewEscalation};

/// Append-only record store with point lookups and a single status transition.
pub trait EscalationStore: Send + Sync {
    /// Create a Pending record. Never overwrites.
    fn insert(&self, new: &NewEscalation) -> Result<i64, StoreError>;

    /// Most recent Pending record with this subject.
    fn find_pending_by_subject(&self, subject: &str) -> Result<Option<Escalation>, StoreError>;

    /// Every record, oldest first.
    fn list_all(&self) -> Result<Vec<Escalation>, StoreError>;

    fn get(&self, id: i64) -> Result<Option<Escalation>, StoreError>;

    /// Pending -> Resolved. Returns false when nothing changed.
    fn resolve(&self, id: i64) -> Result<bool, StoreError>;

    fn is_message_ingested(&self, message_id: &str) -> Result<bool, StoreError>;
}

pub struct SqliteStore {
    db: Mutex<EscalationDb>,
}

impl SqliteStore {
    pub fn new(db: EscalationDb) -> Self {
        Self { db: Mutex::new(db) }
    }

    /// Open the configured database file (or the default one) and migrate it.
    pub fn open(path: Option<&Path>) -> Result<Self, StoreError> {
        EscalationDb::open_configured(path).map(Self::new)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        EscalationDb::open_in_memory().map(Self::new)
    }
}

impl EscalationStore for SqliteStore {
    fn insert(&self, new: &NewEscalation) -> Result<i64, StoreError> {
        self.db.lock().insert_escalation(new)
    }

    fn find_pending_by_subject(&self, subject: &str) -> Result<Option<Escalation>, StoreError> {
        self.db.lock().find_pending_by_subject(subject)
    }

    fn list_all(&self) -> Result<Vec<Escalation>, StoreError> {
        self.db.lock().list_escalations()
    }

    fn get(&self, id: i64) -> Result<Option<Escalation>, StoreError> {
        self.db.lock().get_escalation(id)
    }

    fn resolve(&self, id: i64) -> Result<bool, StoreError> {
        self.db.lock().resolve_escalation(id)
    }

    fn is_message_ingested(&self, message_id: &str) -> Result<bool, StoreError> {
        self.db.lock().is_message_ingested(message_id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::types::{EscalationStatus, Urgency};

    #[test]
    fn concurrent_inserts_keep_every_record() {
        let store = Arc::new(SqliteStore::new(crate::db::test_utils::test_db()));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    (0..10)
                        .map(|i| {
                            store
                                .insert(&NewEscalation {
                                    subject: format!("t{t}-{i}"),
                                    body: String::new(),
                                    urgency: Urgency::Normal,
                                    entities: Vec::new(),
                                    source_message_id: None,
                                })
                                .expect("insert")
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids: Vec<i64> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread"))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 80, "ids must be unique");

        let all = store.list_all().unwrap();
        assert_eq!(all.len(), 80);
        assert!(all.iter().all(|e| e.status == EscalationStatus::Pending));
    }

    #[test]
    fn in_memory_store_round_trip() {
        let store = SqliteStore::in_memory().unwrap();
        let id = store
            .insert(&NewEscalation {
                subject: "Manual Entry".into(),
                body: "Please call back".into(),
                urgency: Urgency::Normal,
                entities: Vec::new(),
                source_message_id: None,
            })
            .unwrap();
        assert_eq!(store.get(id).unwrap().unwrap().body, "Please call back");
        assert!(store.resolve(id).unwrap());
        assert!(store.find_pending_by_subject("Manual Entry").unwrap().is_none());
    }
}
