use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;
use rusqlite::{params, OptionalExtension, Row};

use super::*;
use crate::types::{Entity, Escalation, EscalationStatus, NewEscalation, Urgency};

const SELECT_COLUMNS: &str =
    "SELECT id, subject, body, status, urgency, entities, created_at, resolved_at FROM escalations";

impl EscalationDb {
    // =========================================================================
    // Escalations
    // =========================================================================

    /// Append a new Pending escalation and return its id.
    ///
    /// When the escalation came from the mail source, its message id is recorded
    /// in the same transaction so a later poll can skip it.
    pub fn insert_escalation(&self, new: &NewEscalation) -> Result<i64, StoreError> {
        let entities = serde_json::to_string(&new.entities)?;
        let now = Utc::now().to_rfc3339();

        self.with_transaction(|db| {
            db.conn.execute(
                "INSERT INTO escalations (subject, body, status, urgency, entities, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    new.subject,
                    new.body,
                    EscalationStatus::Pending.as_str(),
                    new.urgency.as_str(),
                    entities,
                    now,
                ],
            )?;
            let id = db.conn.last_insert_rowid();

            if let Some(message_id) = &new.source_message_id {
                db.conn
                    .execute(
                        "INSERT INTO ingested_messages (message_id, escalation_id, ingested_at)
                         VALUES (?1, ?2, ?3)",
                        params![message_id, id, now],
                    )
                    .map_err(|e| match e.sqlite_error_code() {
                        Some(rusqlite::ErrorCode::ConstraintViolation) => {
                            StoreError::AlreadyIngested(message_id.clone())
                        }
                        _ => StoreError::Sqlite(e),
                    })?;
            }
            Ok(id)
        })
    }

    /// Get a single escalation by id.
    pub fn get_escalation(&self, id: i64) -> Result<Option<Escalation>, StoreError> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");
        let row = self
            .conn
            .query_row(&sql, params![id], map_escalation_row)
            .optional()?;
        row.map(decode_row).transpose()
    }

    /// The most recent Pending escalation with exactly this subject.
    pub fn find_pending_by_subject(&self, subject: &str) -> Result<Option<Escalation>, StoreError> {
        let sql = format!(
            "{SELECT_COLUMNS} WHERE subject = ?1 AND status = ?2 ORDER BY id DESC LIMIT 1"
        );
        let row = self
            .conn
            .query_row(
                &sql,
                params![subject, EscalationStatus::Pending.as_str()],
                map_escalation_row,
            )
            .optional()?;
        row.map(decode_row).transpose()
    }

    /// All escalations in insertion order.
    pub fn list_escalations(&self) -> Result<Vec<Escalation>, StoreError> {
        let sql = format!("{SELECT_COLUMNS} ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], map_escalation_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(decode_row(row?)?);
        }
        Ok(results)
    }

    /// Move a Pending escalation to Resolved. Returns false if the id is
    /// unknown or already resolved.
    pub fn resolve_escalation(&self, id: i64) -> Result<bool, StoreError> {
        let now = Utc::now().to_rfc3339();
        let rows = self.conn.execute(
            "UPDATE escalations SET status = ?1, resolved_at = ?2
             WHERE id = ?3 AND status = ?4",
            params![
                EscalationStatus::Resolved.as_str(),
                now,
                id,
                EscalationStatus::Pending.as_str(),
            ],
        )?;
        Ok(rows == 1)
    }

    /// Whether a mail-source message has already been logged.
    pub fn is_message_ingested(&self, message_id: &str) -> Result<bool, StoreError> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM ingested_messages WHERE message_id = ?1",
                params![message_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

fn map_escalation_row(row: &Row<'_>) -> rusqlite::Result<EscalationRow> {
    Ok(EscalationRow {
        id: row.get(0)?,
        subject: row.get(1)?,
        body: row.get(2)?,
        status: row.get(3)?,
        urgency: row.get(4)?,
        entities: row.get(5)?,
        created_at: row.get(6)?,
        resolved_at: row.get(7)?,
    })
}

fn decode_row(row: EscalationRow) -> Result<Escalation, StoreError> {
    let corrupt = |reason: String| StoreError::Corrupt { id: row.id, reason };

    let status = row
        .status
        .as_deref()
        .unwrap_or("Pending")
        .parse::<EscalationStatus>()
        .map_err(corrupt)?;
    let urgency = row
        .urgency
        .as_deref()
        .unwrap_or("Normal")
        .parse::<Urgency>()
        .map_err(corrupt)?;
    let entities = parse_entities(row.entities.as_deref().unwrap_or(""))
        .ok_or_else(|| corrupt("entities column is neither JSON nor a tuple list".to_string()))?;

    Ok(Escalation {
        id: row.id,
        subject: row.subject.unwrap_or_default(),
        body: row.body.unwrap_or_default(),
        status,
        urgency,
        entities,
        created_at: row.created_at,
        resolved_at: row.resolved_at,
    })
}

fn re_legacy_entity() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\(\s*['"](.*?)['"]\s*,\s*['"]([A-Z_]+)['"]\s*\)"#).unwrap())
}

/// Decode the entities column: JSON from this crate, or the `[('text', 'LABEL')]`
/// tuple list written by the legacy logging script.
pub(crate) fn parse_entities(raw: &str) -> Option<Vec<Entity>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "[]" {
        return Some(Vec::new());
    }
    if let Ok(entities) = serde_json::from_str::<Vec<Entity>>(trimmed) {
        return Some(entities);
    }
    if trimmed.starts_with('[') && trimmed.contains('(') {
        let entities: Vec<Entity> = re_legacy_entity()
            .captures_iter(trimmed)
            .map(|caps| Entity::new(&caps[1], &caps[2]))
            .collect();
        if !entities.is_empty() {
            return Some(entities);
        }
    }
    None
}
