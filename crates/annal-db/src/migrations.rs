//! Database migration runner.
//!
//! Embeds the SQL migration files at compile time. All statements use
//! `IF NOT EXISTS` for idempotent re-running. Shadow tables are not
//! migrations: they are derived per entity by the schema mapper.

use crate::AnnalDb;
use crate::error::AuditError;

/// Revision log table and its timestamp index.
const MIGRATION_001: &str = include_str!("../migrations/001_revisions.sql");

impl AnnalDb {
    /// Run all embedded migrations, naming the revision table `revision_table`.
    pub(crate) async fn run_migrations(&self, revision_table: &str) -> Result<(), AuditError> {
        let escaped = revision_table.replace('"', "\"\"");
        self.conn
            .execute_batch(&MIGRATION_001.replace("{revisions}", &escaped))
            .await
            .map_err(|e| AuditError::Migration(format!("001_revisions: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::AnnalDb;

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let db = AnnalDb::open_local(":memory:").await.unwrap();
        db.run_migrations("revisions").await.unwrap();
        db.run_migrations("revisions").await.unwrap();
        assert!(db.table_exists("revisions").await.unwrap());
    }

    #[tokio::test]
    async fn revision_table_name_is_configurable() {
        let db = AnnalDb::open_local(":memory:").await.unwrap();
        db.run_migrations("audit_revisions").await.unwrap();
        assert!(db.table_exists("audit_revisions").await.unwrap());
        assert!(!db.table_exists("revisions").await.unwrap());
    }
}
