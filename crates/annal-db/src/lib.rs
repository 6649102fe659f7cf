//! # annal-db
//!
//! libSQL audit engine for annal.
//!
//! Records historical versions of entity rows in per-entity shadow tables
//! whenever a unit of work flushes, and reconstructs entities (and their
//! associations) as they existed at any past revision.
//!
//! - [`schema`]: shadow-table layouts derived from entity metadata
//! - [`revision`]: the revision log
//! - [`capture`]: change capture listener
//! - [`reader`]: point-in-time reconstruction, revision listing, diff
//! - [`config`]: runtime audit policy
//! - [`manager`]: wires the pieces together
//!
//! The `metadata`, `lifecycle` and `unit_of_work` modules are the narrow host
//! interfaces the engine consumes: a metadata provider, listener callbacks and
//! a transactional flush.

pub mod capture;
pub mod config;
pub mod error;
pub mod helpers;
pub mod lifecycle;
pub mod manager;
pub mod metadata;
mod migrations;
pub mod reader;
pub mod revision;
pub mod schema;
pub mod unit_of_work;

#[cfg(test)]
mod test_support;

use annal_config::DatabaseConfig;
use error::AuditError;
use libsql::Builder;

/// Central database handle.
///
/// Wraps a libSQL database and a single connection. Every transaction the
/// engine takes part in runs on this connection.
pub struct AnnalDb {
    #[allow(dead_code)]
    db: libsql::Database,
    conn: libsql::Connection,
}

impl AnnalDb {
    /// Open a local database at the given path (`":memory:"` for tests).
    ///
    /// # Errors
    ///
    /// Returns `AuditError` if the database cannot be opened.
    pub async fn open_local(path: &str) -> Result<Self, AuditError> {
        let db = Builder::new_local(path).build().await?;
        let conn = db.connect()?;

        // Enable foreign keys (must be per-connection in SQLite)
        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(|e| AuditError::Migration(format!("PRAGMA foreign_keys: {e}")))?;

        Ok(Self { db, conn })
    }

    /// Open the database described by the loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns `AuditError` if the database cannot be opened.
    pub async fn open(config: &DatabaseConfig) -> Result<Self, AuditError> {
        Self::open_local(&config.path).await
    }

    /// Access the underlying libSQL connection for direct queries.
    #[must_use]
    pub const fn conn(&self) -> &libsql::Connection {
        &self.conn
    }

    /// Execute a statement and return the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::LibSql` if the statement fails.
    pub async fn execute(&self, sql: &str, params: Vec<libsql::Value>) -> Result<u64, AuditError> {
        tracing::trace!(sql, "execute");
        Ok(self.conn.execute(sql, params).await?)
    }

    /// Run a query and return its rows.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::LibSql` if the query fails.
    pub async fn query(
        &self,
        sql: &str,
        params: Vec<libsql::Value>,
    ) -> Result<libsql::Rows, AuditError> {
        tracing::trace!(sql, "query");
        Ok(self.conn.query(sql, params).await?)
    }

    /// Execute several `;`-separated statements (DDL).
    ///
    /// # Errors
    ///
    /// Returns `AuditError::LibSql` if any statement fails.
    pub async fn execute_batch(&self, sql: &str) -> Result<(), AuditError> {
        tracing::trace!(sql, "execute_batch");
        self.conn.execute_batch(sql).await?;
        Ok(())
    }

    /// Open a write transaction.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::LibSql` if a transaction is already open.
    pub async fn begin(&self) -> Result<(), AuditError> {
        self.conn.execute("BEGIN IMMEDIATE", ()).await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `AuditError::LibSql` if the commit fails.
    pub async fn commit(&self) -> Result<(), AuditError> {
        self.conn.execute("COMMIT", ()).await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `AuditError::LibSql` if no transaction is open.
    pub async fn rollback(&self) -> Result<(), AuditError> {
        self.conn.execute("ROLLBACK", ()).await?;
        Ok(())
    }

    /// Whether the connection is outside any explicit transaction.
    #[must_use]
    pub fn is_autocommit(&self) -> bool {
        self.conn.is_autocommit()
    }

    /// Rowid of the most recent successful INSERT on this connection.
    #[must_use]
    pub fn last_insert_rowid(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    /// Whether a table with the given name exists.
    ///
    /// # Errors
    ///
    /// Returns `AuditError` if the catalog query fails.
    pub async fn table_exists(&self, table: &str) -> Result<bool, AuditError> {
        let mut rows = self
            .query(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                vec![libsql::Value::Text(table.to_string())],
            )
            .await?;
        Ok(rows.next().await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> AnnalDb {
        AnnalDb::open_local(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn open_local_enables_foreign_keys() {
        let db = test_db().await;
        let mut rows = db.query("PRAGMA foreign_keys", Vec::new()).await.unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i64>(0).unwrap(), 1);
    }

    #[tokio::test]
    async fn rollback_discards_writes() {
        let db = test_db().await;
        db.execute("CREATE TABLE t (x INTEGER)", Vec::new())
            .await
            .unwrap();

        db.begin().await.unwrap();
        assert!(!db.is_autocommit());
        db.execute("INSERT INTO t (x) VALUES (1)", Vec::new())
            .await
            .unwrap();
        db.rollback().await.unwrap();
        assert!(db.is_autocommit());

        let mut rows = db.query("SELECT COUNT(*) FROM t", Vec::new()).await.unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i64>(0).unwrap(), 0);
    }

    #[tokio::test]
    async fn commit_keeps_writes() {
        let db = test_db().await;
        db.execute("CREATE TABLE t (x INTEGER)", Vec::new())
            .await
            .unwrap();

        db.begin().await.unwrap();
        db.execute("INSERT INTO t (x) VALUES (7)", Vec::new())
            .await
            .unwrap();
        db.commit().await.unwrap();

        assert!(db.table_exists("t").await.unwrap());
        assert!(!db.table_exists("missing").await.unwrap());
        let mut rows = db.query("SELECT x FROM t", Vec::new()).await.unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i64>(0).unwrap(), 7);
    }
}
