//! Unit-of-work lifecycle callbacks.
//!
//! A flush calls, in order: `on_before_flush` once per applied change,
//! `before_commit` once inside the open transaction, then exactly one of
//! `after_commit` or `after_rollback`.

use annal_core::enums::ChangeKind;
use annal_core::ids::{EntityId, RevisionId};
use annal_core::snapshot::Snapshot;
use async_trait::async_trait;
use serde_json::Value;

use crate::AnnalDb;
use crate::error::AuditError;

/// One applied primary write.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityChange {
    pub entity: String,
    pub id: EntityId,
    pub kind: ChangeKind,
    /// Stored state before the write. `None` for inserts.
    pub previous: Option<Snapshot>,
    /// State after the write. `None` for deletes.
    pub current: Option<Snapshot>,
}

/// State shared with listeners during one flush.
#[derive(Debug, Clone, Default)]
pub struct FlushContext {
    /// Stored on the revision allocated for this flush.
    pub revision_metadata: Option<Value>,
    /// Set by the listener that allocated a revision.
    pub revision: Option<RevisionId>,
}

#[async_trait]
pub trait LifecycleListener: Send {
    /// Called after each primary write, inside the transaction.
    ///
    /// # Errors
    ///
    /// An error aborts and rolls back the flush.
    async fn on_before_flush(&mut self, change: &EntityChange) -> Result<(), AuditError>;

    /// Called once before COMMIT.
    ///
    /// # Errors
    ///
    /// An error aborts and rolls back the flush.
    async fn before_commit(
        &mut self,
        db: &AnnalDb,
        context: &mut FlushContext,
    ) -> Result<(), AuditError>;

    async fn after_commit(&mut self) {}

    async fn after_rollback(&mut self) {}
}
