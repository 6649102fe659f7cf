//! Change capture.
//!
//! `ChangeCapture` is a [`LifecycleListener`]. During a flush it stages one
//! audit row per changed audited entity; right before commit it allocates a
//! single revision and writes the staged rows in the flush transaction.
//!
//! ```text
//! Idle -> Collecting -> Committing -> Idle
//!                           |
//!                           v
//!                         Failed -> Idle (after_rollback)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use annal_core::enums::ChangeKind;
use annal_core::ids::{EntityId, RevisionId};
use annal_core::snapshot::{Snapshot, changed_fields};
use async_trait::async_trait;

use crate::AnnalDb;
use crate::config::AuditConfiguration;
use crate::error::AuditError;
use crate::lifecycle::{EntityChange, FlushContext, LifecycleListener};
use crate::revision::RevisionLog;
use crate::schema::{SchemaMapper, ShadowLayout};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Collecting,
    Committing,
    Failed,
}

#[derive(Debug)]
struct StagedRow {
    layout: Arc<ShadowLayout>,
    id: EntityId,
    kind: ChangeKind,
    snapshot: Snapshot,
}

pub struct ChangeCapture {
    config: Arc<AuditConfiguration>,
    mapper: Arc<SchemaMapper>,
    revisions: RevisionLog,
    state: CaptureState,
    staged: Vec<Option<StagedRow>>,
    index: HashMap<(String, String), usize>,
}

impl ChangeCapture {
    #[must_use]
    pub fn new(config: Arc<AuditConfiguration>, mapper: Arc<SchemaMapper>) -> Self {
        Self {
            revisions: RevisionLog::new(Arc::clone(&config)),
            config,
            mapper,
            state: CaptureState::Idle,
            staged: Vec::new(),
            index: HashMap::new(),
        }
    }

    #[must_use]
    pub const fn state(&self) -> CaptureState {
        self.state
    }

    /// Rows that would be written by the next `before_commit`.
    #[must_use]
    pub fn staged_len(&self) -> usize {
        self.staged.iter().flatten().count()
    }

    #[must_use]
    pub const fn current_revision(&self) -> Option<RevisionId> {
        self.revisions.current_revision()
    }

    fn reset(&mut self) {
        self.revisions.close();
        self.staged.clear();
        self.index.clear();
        self.state = CaptureState::Idle;
    }

    fn write_failed(
        layout: &ShadowLayout,
        id: &EntityId,
        revision: Option<RevisionId>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> AuditError {
        AuditError::AuditWriteFailed {
            entity: layout.entity.clone(),
            id: id.to_string(),
            revision,
            source: source.into(),
        }
    }

    fn stage(&mut self, layout: Arc<ShadowLayout>, id: EntityId, kind: ChangeKind, snapshot: Snapshot) {
        let key = (layout.entity.clone(), id.key());
        if let Some(&slot) = self.index.get(&key) {
            let merged = self.staged[slot]
                .as_ref()
                .and_then(|existing| existing.kind.merge(kind));
            match merged {
                Some(kind) => {
                    self.staged[slot] = Some(StagedRow {
                        layout,
                        id,
                        kind,
                        snapshot,
                    });
                }
                None => {
                    // Inserted and deleted in the same flush: nothing to record.
                    self.staged[slot] = None;
                    self.index.remove(&key);
                }
            }
            return;
        }
        self.index.insert(key, self.staged.len());
        self.staged.push(Some(StagedRow {
            layout,
            id,
            kind,
            snapshot,
        }));
    }
}

#[async_trait]
impl LifecycleListener for ChangeCapture {
    async fn on_before_flush(&mut self, change: &EntityChange) -> Result<(), AuditError> {
        match self.state {
            CaptureState::Idle => self.state = CaptureState::Collecting,
            CaptureState::Collecting => {}
            CaptureState::Committing | CaptureState::Failed => {
                return Err(AuditError::InvalidState(format!(
                    "change capture cannot collect while {:?}",
                    self.state
                )));
            }
        }

        if !self.config.is_audited(&change.entity) {
            return Ok(());
        }
        let layout = self.mapper.derive_shadow_layout(&change.entity)?;
        if layout.fully_ignored {
            tracing::trace!(entity = %change.entity, "every audited field is ignored; skipping");
            return Ok(());
        }

        let source = match change.kind {
            ChangeKind::Insert | ChangeKind::Update => change.current.as_ref(),
            ChangeKind::Delete => change.previous.as_ref(),
        };
        let Some(source) = source else {
            return Err(AuditError::InvalidState(format!(
                "{} change to {}#{} carries no state",
                change.kind, change.entity, change.id
            )));
        };
        let snapshot = layout.project(source);

        if change.kind == ChangeKind::Update {
            if let Some(previous) = &change.previous {
                let changed = changed_fields(&layout.project(previous), &snapshot);
                if changed.is_empty() {
                    tracing::trace!(
                        entity = %change.entity,
                        id = %change.id,
                        "update touches only ignored fields; skipping"
                    );
                    return Ok(());
                }
                tracing::trace!(
                    entity = %change.entity,
                    id = %change.id,
                    fields = ?changed,
                    "audited update"
                );
            }
        }

        // Serialize now so a bad value fails before a revision is allocated.
        layout
            .row_params(&snapshot, RevisionId(0), change.kind)
            .map_err(|(field, reason)| {
                self.state = CaptureState::Failed;
                Self::write_failed(&layout, &change.id, None, format!("{field}: {reason}"))
            })?;

        self.stage(layout, change.id.clone(), change.kind, snapshot);
        Ok(())
    }

    async fn before_commit(
        &mut self,
        db: &AnnalDb,
        context: &mut FlushContext,
    ) -> Result<(), AuditError> {
        self.state = CaptureState::Committing;
        let rows: Vec<StagedRow> = self.staged.drain(..).flatten().collect();
        self.index.clear();
        if rows.is_empty() {
            return Ok(());
        }

        let revision = match self
            .revisions
            .begin_revision(db, context.revision_metadata.as_ref())
            .await
        {
            Ok(revision) => revision,
            Err(e) => {
                self.state = CaptureState::Failed;
                return Err(e);
            }
        };
        context.revision = Some(revision);

        for row in &rows {
            let params = row
                .layout
                .row_params(&row.snapshot, revision, row.kind)
                .map_err(|(field, reason)| {
                    Self::write_failed(&row.layout, &row.id, Some(revision), format!("{field}: {reason}"))
                });
            let result = match params {
                Ok(params) => db
                    .execute(&row.layout.insert_sql(), params)
                    .await
                    .map_err(|e| Self::write_failed(&row.layout, &row.id, Some(revision), e)),
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                self.state = CaptureState::Failed;
                return Err(e);
            }
            tracing::debug!(
                entity = %row.layout.entity,
                id = %row.id,
                revision = %revision,
                kind = %row.kind,
                "wrote audit row"
            );
        }
        Ok(())
    }

    async fn after_commit(&mut self) {
        self.reset();
    }

    async fn after_rollback(&mut self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fixture_config, fixture_metadata, snapshot};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn capture() -> ChangeCapture {
        let config = fixture_config();
        let mapper = Arc::new(SchemaMapper::new(Arc::clone(&config), fixture_metadata()));
        ChangeCapture::new(config, mapper)
    }

    fn insert(entity: &str, id: i64, fields: Snapshot) -> EntityChange {
        EntityChange {
            entity: entity.into(),
            id: EntityId::from(id),
            kind: ChangeKind::Insert,
            previous: None,
            current: Some(fields),
        }
    }

    #[tokio::test]
    async fn non_audited_entities_are_not_staged() {
        let mut capture = capture();
        capture
            .on_before_flush(&insert(
                "Unaudited",
                1,
                snapshot(&[("id", json!(1)), ("name", json!("x"))]),
            ))
            .await
            .unwrap();
        assert_eq!(capture.staged_len(), 0);
        assert_eq!(capture.state(), CaptureState::Collecting);
    }

    #[tokio::test]
    async fn insert_then_delete_cancels_out() {
        let mut capture = capture();
        let fields = snapshot(&[("id", json!(1)), ("name", json!("beberlei"))]);
        capture
            .on_before_flush(&insert("Author", 1, fields.clone()))
            .await
            .unwrap();
        capture
            .on_before_flush(&EntityChange {
                entity: "Author".into(),
                id: EntityId::from(1),
                kind: ChangeKind::Delete,
                previous: Some(fields),
                current: None,
            })
            .await
            .unwrap();
        assert_eq!(capture.staged_len(), 0);
    }

    #[tokio::test]
    async fn insert_then_update_stays_insert_with_latest_state() {
        let mut capture = capture();
        let first = snapshot(&[("id", json!(1)), ("name", json!("a"))]);
        let second = snapshot(&[("id", json!(1)), ("name", json!("b"))]);
        capture
            .on_before_flush(&insert("Author", 1, first.clone()))
            .await
            .unwrap();
        capture
            .on_before_flush(&EntityChange {
                entity: "Author".into(),
                id: EntityId::from(1),
                kind: ChangeKind::Update,
                previous: Some(first),
                current: Some(second.clone()),
            })
            .await
            .unwrap();

        assert_eq!(capture.staged_len(), 1);
        let row = capture.staged.iter().flatten().next().unwrap();
        assert_eq!(row.kind, ChangeKind::Insert);
        assert_eq!(row.snapshot, second);
    }

    #[tokio::test]
    async fn update_of_ignored_field_only_is_skipped() {
        let mut capture = capture();
        let before = snapshot(&[
            ("id", json!(1)),
            ("biography", json!("bio")),
            ("ignoreProperty", json!("a")),
            ("ignoreMe", json!("x")),
        ]);
        let mut after = before.clone();
        after.insert("ignoreProperty".into(), json!("b"));
        after.insert("ignoreMe".into(), json!("y"));

        capture
            .on_before_flush(&EntityChange {
                entity: "ProfileAudit".into(),
                id: EntityId::from(1),
                kind: ChangeKind::Update,
                previous: Some(before),
                current: Some(after),
            })
            .await
            .unwrap();
        assert_eq!(capture.staged_len(), 0);
    }

    #[tokio::test]
    async fn update_with_audited_change_is_staged() {
        let mut capture = capture();
        let before = snapshot(&[
            ("id", json!(1)),
            ("biography", json!("bio")),
            ("ignoreProperty", json!("a")),
        ]);
        let mut after = before.clone();
        after.insert("biography".into(), json!("bio v2"));
        after.insert("ignoreProperty".into(), json!("b"));

        capture
            .on_before_flush(&EntityChange {
                entity: "ProfileAudit".into(),
                id: EntityId::from(1),
                kind: ChangeKind::Update,
                previous: Some(before),
                current: Some(after),
            })
            .await
            .unwrap();

        assert_eq!(capture.staged_len(), 1);
        let row = capture.staged.iter().flatten().next().unwrap();
        assert_eq!(row.kind, ChangeKind::Update);
        assert_eq!(
            row.snapshot,
            snapshot(&[("id", json!(1)), ("biography", json!("bio v2"))])
        );
    }

    #[tokio::test]
    async fn bad_value_fails_with_audit_write_failed() {
        let mut capture = capture();
        let err = capture
            .on_before_flush(&insert(
                "Author",
                1,
                snapshot(&[("id", json!(1)), ("name", json!(42))]),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::AuditWriteFailed { revision: None, .. }));
        assert_eq!(capture.state(), CaptureState::Failed);

        capture.after_rollback().await;
        assert_eq!(capture.state(), CaptureState::Idle);
    }
}
