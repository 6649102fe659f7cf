//! Revision log.
//!
//! Append-only ledger of revisions. Ids come from the revisions table's
//! `AUTOINCREMENT` key, so they are strictly increasing among committed
//! revisions. An id allocated by a rolled-back flush is handed out again.

use std::sync::Arc;

use annal_core::entities::Revision;
use annal_core::ids::RevisionId;
use chrono::Utc;
use serde_json::Value;

use crate::AnnalDb;
use crate::config::AuditConfiguration;
use crate::error::AuditError;
use crate::helpers::{get_opt_string, parse_datetime, parse_optional_json, quote_ident};

/// Allocates at most one revision per flush.
#[derive(Debug)]
pub struct RevisionLog {
    config: Arc<AuditConfiguration>,
    current: Option<RevisionId>,
}

impl RevisionLog {
    #[must_use]
    pub const fn new(config: Arc<AuditConfiguration>) -> Self {
        Self {
            config,
            current: None,
        }
    }

    /// Allocate the revision for the current flush, or return the one already open.
    ///
    /// Locks the audit configuration and resolves the actor. Must run inside
    /// the flush transaction so the revision row commits or rolls back with it.
    ///
    /// # Errors
    ///
    /// Returns `AuditError` if the insert fails.
    pub async fn begin_revision(
        &mut self,
        db: &AnnalDb,
        metadata: Option<&Value>,
    ) -> Result<RevisionId, AuditError> {
        if let Some(id) = self.current {
            return Ok(id);
        }

        self.config.lock();
        let actor = self.config.resolve_actor();
        let timestamp = Utc::now();
        let sql = format!(
            "INSERT INTO {} (timestamp, actor, metadata) VALUES (?1, ?2, ?3)",
            quote_ident(&self.config.revision_table())
        );
        db.execute(
            &sql,
            vec![
                libsql::Value::Text(timestamp.to_rfc3339()),
                actor
                    .clone()
                    .map_or(libsql::Value::Null, libsql::Value::Text),
                metadata.map_or(libsql::Value::Null, |m| libsql::Value::Text(m.to_string())),
            ],
        )
        .await?;

        let id = RevisionId(db.last_insert_rowid());
        tracing::debug!(revision = %id, actor = ?actor, "allocated revision");
        self.current = Some(id);
        Ok(id)
    }

    /// The in-flight revision, if one is open.
    #[must_use]
    pub const fn current_revision(&self) -> Option<RevisionId> {
        self.current
    }

    /// End the in-flight revision after commit or rollback.
    pub fn close(&mut self) -> Option<RevisionId> {
        self.current.take()
    }
}

fn select_revisions(table: &str) -> String {
    format!(
        "SELECT id, timestamp, actor, metadata FROM {}",
        quote_ident(table)
    )
}

/// Decode a row selected as `id, timestamp, actor, metadata`.
pub(crate) fn row_to_revision(row: &libsql::Row) -> Result<Revision, AuditError> {
    let metadata = get_opt_string(row, 3)?;
    Ok(Revision {
        id: RevisionId(row.get::<i64>(0)?),
        timestamp: parse_datetime(&row.get::<String>(1)?)?,
        actor: get_opt_string(row, 2)?,
        metadata: parse_optional_json(metadata.as_deref())?,
    })
}

/// Read a single revision.
pub(crate) async fn find_revision(
    db: &AnnalDb,
    table: &str,
    id: RevisionId,
) -> Result<Option<Revision>, AuditError> {
    let sql = format!("{} WHERE id = ?1", select_revisions(table));
    let mut rows = db.query(&sql, vec![libsql::Value::Integer(id.get())]).await?;
    match rows.next().await? {
        Some(row) => Ok(Some(row_to_revision(&row)?)),
        None => Ok(None),
    }
}

/// Newest revisions first.
pub(crate) async fn revision_history(
    db: &AnnalDb,
    table: &str,
    limit: u32,
    offset: u32,
) -> Result<Vec<Revision>, AuditError> {
    let sql = format!("{} ORDER BY id DESC LIMIT ?1 OFFSET ?2", select_revisions(table));
    let mut rows = db
        .query(
            &sql,
            vec![
                libsql::Value::Integer(i64::from(limit)),
                libsql::Value::Integer(i64::from(offset)),
            ],
        )
        .await?;
    let mut revisions = Vec::new();
    while let Some(row) = rows.next().await? {
        revisions.push(row_to_revision(&row)?);
    }
    Ok(revisions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn setup() -> (AnnalDb, Arc<AuditConfiguration>) {
        let db = AnnalDb::open_local(":memory:").await.unwrap();
        db.run_migrations("revisions").await.unwrap();
        let config = Arc::new(AuditConfiguration::default());
        config
            .set_actor_resolver(|| Some("beberlei".to_string()))
            .unwrap();
        (db, config)
    }

    #[tokio::test]
    async fn begin_revision_is_idempotent_while_open() {
        let (db, config) = setup().await;
        let mut log = RevisionLog::new(config);

        let first = log.begin_revision(&db, None).await.unwrap();
        let again = log.begin_revision(&db, None).await.unwrap();
        assert_eq!(first, again);
        assert_eq!(log.current_revision(), Some(first));

        assert_eq!(log.close(), Some(first));
        assert_eq!(log.current_revision(), None);

        let second = log.begin_revision(&db, None).await.unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn rolled_back_revision_id_is_allocated_again() {
        let (db, config) = setup().await;
        let mut log = RevisionLog::new(config);

        let committed = log.begin_revision(&db, None).await.unwrap();
        log.close();

        db.begin().await.unwrap();
        let discarded = log.begin_revision(&db, None).await.unwrap();
        db.rollback().await.unwrap();
        log.close();

        let next = log.begin_revision(&db, None).await.unwrap();
        assert!(next > committed);
        assert_eq!(next, discarded);
        let ids: Vec<RevisionId> = revision_history(&db, "revisions", 10, 0)
            .await
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, [next, committed]);
    }

    #[tokio::test]
    async fn begin_revision_locks_config_and_records_actor() {
        let (db, config) = setup().await;
        let mut log = RevisionLog::new(Arc::clone(&config));
        assert!(!config.is_locked());

        let id = log
            .begin_revision(&db, Some(&json!({"reason": "import"})))
            .await
            .unwrap();
        assert!(config.is_locked());

        let revision = find_revision(&db, "revisions", id).await.unwrap().unwrap();
        assert_eq!(revision.actor.as_deref(), Some("beberlei"));
        assert_eq!(revision.metadata, Some(json!({"reason": "import"})));
        assert!(revision.timestamp <= Utc::now());
    }

    #[tokio::test]
    async fn history_is_newest_first() {
        let (db, config) = setup().await;
        let mut log = RevisionLog::new(config);
        for _ in 0..3 {
            log.begin_revision(&db, None).await.unwrap();
            log.close();
        }

        let history = revision_history(&db, "revisions", 2, 0).await.unwrap();
        let ids: Vec<i64> = history.iter().map(|r| r.id.get()).collect();
        assert_eq!(ids, [3, 2]);
        let rest = revision_history(&db, "revisions", 10, 2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert!(find_revision(&db, "revisions", RevisionId(99)).await.unwrap().is_none());
    }
}
