//! Database connection management

use crate::error::Result;
use libsql::params::Params;
use libsql::{Builder, Connection, Database as LibSqlDatabase, Value};
use std::path::Path;

use super::migrations;

/// A single write statement with positional parameters.
///
/// Repositories build these so several writes can be committed as one unit.
#[derive(Debug, Clone)]
pub struct Statement {
    sql: &'static str,
    params: Vec<Value>,
}

impl Statement {
    pub const fn new(sql: &'static str, params: Vec<Value>) -> Self {
        Self { sql, params }
    }

    pub async fn execute(&self, conn: &Connection) -> Result<u64> {
        Ok(conn
            .execute(self.sql, Params::Positional(self.params.clone()))
            .await?)
    }
}

/// Database wrapper for a local libSQL connection
pub struct Database {
    _db: LibSqlDatabase,
    conn: Connection,
}

impl Database {
    /// Open a local database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let db = Builder::new_local(&path_str).build().await?;
        let conn = db.connect()?;

        let database = Self { _db: db, conn };
        database.configure().await?;
        database.migrate().await?;
        Ok(database)
    }

    /// Open an in-memory database (useful for testing)
    pub async fn open_in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        let conn = db.connect()?;

        let database = Self { _db: db, conn };
        database.configure().await?;
        database.migrate().await?;
        Ok(database)
    }

    /// Configure `SQLite` for durable local writes
    async fn configure(&self) -> Result<()> {
        // WAL is unavailable for in-memory databases
        self.conn
            .execute("PRAGMA journal_mode = WAL;", ())
            .await
            .ok();
        self.conn
            .execute("PRAGMA synchronous = NORMAL;", ())
            .await
            .ok();
        self.conn.execute("PRAGMA foreign_keys = ON;", ()).await?;
        Ok(())
    }

    /// Run database migrations
    async fn migrate(&self) -> Result<()> {
        migrations::run(&self.conn).await
    }

    /// Apply every statement or none of them.
    pub async fn execute_atomic(&self, statements: &[Statement]) -> Result<u64> {
        self.conn.execute("BEGIN TRANSACTION", ()).await?;

        let mut affected = 0;
        for statement in statements {
            match statement.execute(&self.conn).await {
                Ok(rows) => affected += rows,
                Err(error) => {
                    self.conn.execute("ROLLBACK", ()).await.ok();
                    return Err(error);
                }
            }
        }

        if let Err(error) = self.conn.execute("COMMIT", ()).await {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(error.into());
        }

        Ok(affected)
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn count_settings(db: &Database) -> i64 {
        let mut rows = db
            .connection()
            .query("SELECT COUNT(*) FROM settings", ())
            .await
            .unwrap();
        rows.next().await.unwrap().unwrap().get::<i64>(0).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_in_memory() {
        let db = Database::open_in_memory().await.unwrap();
        assert_eq!(count_settings(&db).await, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_on_disk_persists() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nestlog.db");

        {
            let db = Database::open(&path).await.unwrap();
            db.execute_atomic(&[Statement::new(
                "INSERT INTO settings (key, value) VALUES (?, ?)",
                vec![Value::Text("theme".into()), Value::Text("\"dark\"".into())],
            )])
            .await
            .unwrap();
        }

        let reopened = Database::open(&path).await.unwrap();
        assert_eq!(count_settings(&reopened).await, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_execute_atomic_rolls_back_on_error() {
        let db = Database::open_in_memory().await.unwrap();

        let result = db
            .execute_atomic(&[
                Statement::new(
                    "INSERT INTO settings (key, value) VALUES (?, ?)",
                    vec![Value::Text("a".into()), Value::Text("1".into())],
                ),
                Statement::new("INSERT INTO missing_table (x) VALUES (?)", vec![Value::Integer(1)]),
            ])
            .await;

        assert!(result.is_err());
        assert_eq!(count_settings(&db).await, 0);
    }
}
