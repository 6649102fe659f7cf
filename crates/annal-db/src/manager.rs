//! Audit manager.
//!
//! Owns the shared configuration, metadata provider and schema mapper, and
//! hands out the per-use pieces: a change capture listener per unit of work
//! and readers over a database handle.

use std::sync::Arc;

use crate::AnnalDb;
use crate::capture::ChangeCapture;
use crate::config::AuditConfiguration;
use crate::error::AuditError;
use crate::metadata::MetadataProvider;
use crate::reader::AuditReader;
use crate::schema::SchemaMapper;
use crate::unit_of_work::UnitOfWork;

pub struct AuditManager {
    config: Arc<AuditConfiguration>,
    metadata: Arc<dyn MetadataProvider>,
    mapper: Arc<SchemaMapper>,
}

impl AuditManager {
    #[must_use]
    pub fn new(config: Arc<AuditConfiguration>, metadata: Arc<dyn MetadataProvider>) -> Self {
        let mapper = Arc::new(SchemaMapper::new(
            Arc::clone(&config),
            Arc::clone(&metadata),
        ));
        Self {
            config,
            metadata,
            mapper,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &Arc<AuditConfiguration> {
        &self.config
    }

    #[must_use]
    pub fn metadata(&self) -> &Arc<dyn MetadataProvider> {
        &self.metadata
    }

    #[must_use]
    pub const fn mapper(&self) -> &Arc<SchemaMapper> {
        &self.mapper
    }

    /// A fresh change capture listener.
    #[must_use]
    pub fn change_capture(&self) -> ChangeCapture {
        ChangeCapture::new(Arc::clone(&self.config), Arc::clone(&self.mapper))
    }

    /// Subscribe change capture to a unit of work.
    pub fn register_events(&self, uow: &mut UnitOfWork<'_>) {
        uow.register_listener(Box::new(self.change_capture()));
    }

    /// A unit of work with change capture already registered.
    #[must_use]
    pub fn unit_of_work<'a>(&self, db: &'a AnnalDb) -> UnitOfWork<'a> {
        let mut uow = UnitOfWork::new(db, Arc::clone(&self.metadata));
        self.register_events(&mut uow);
        uow
    }

    #[must_use]
    pub fn reader<'a>(&self, db: &'a AnnalDb) -> AuditReader<'a> {
        AuditReader::new(db, Arc::clone(&self.mapper))
    }

    /// Create the revision table and one shadow table per audited entity.
    ///
    /// Idempotent. Does not lock the configuration.
    ///
    /// # Errors
    ///
    /// Returns `UnknownEntity` if an audited type has no metadata, or any
    /// layout or SQL error.
    pub async fn create_schema(&self, db: &AnnalDb) -> Result<(), AuditError> {
        db.run_migrations(&self.config.revision_table()).await?;
        for entity in self.config.audited_entities() {
            let layout = self.mapper.derive_shadow_layout(&entity)?;
            db.execute_batch(&layout.create_table_sql()).await?;
            tracing::debug!(entity = %entity, table = %layout.table, "shadow table ready");
        }
        Ok(())
    }
}
