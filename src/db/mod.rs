/// Database layer for the IPAM admin service
///
/// Manages the SQLite connection pool and embedded migrations. All domain
/// managers share one pool.

pub mod pagination;

pub use pagination::{Page, PageRequest};

use crate::error::{IpamError, IpamResult};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Database connection options
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub max_connections: u32,
    pub enable_wal: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            enable_wal: true,
        }
    }
}

/// Create a SQLite connection pool
pub async fn create_pool(path: &Path, options: DatabaseOptions) -> IpamResult<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                IpamError::Internal(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
    }

    let connect_options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(if options.enable_wal {
            SqliteJournalMode::Wal
        } else {
            SqliteJournalMode::Delete
        })
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(options.max_connections)
        .connect_with(connect_options)
        .await?;

    Ok(pool)
}

/// Single-connection in-memory pool with migrations applied
///
/// The connection is never recycled, otherwise the database would vanish
/// with it.
pub async fn memory_pool() -> IpamResult<SqlitePool> {
    let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(connect_options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run migrations
/// Migrations are embedded at compile time from ./migrations directory
pub async fn run_migrations(pool: &SqlitePool) -> IpamResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| IpamError::Internal(format!("Migration failed: {}", e)))?;

    Ok(())
}

/// Test database connection
pub async fn test_connection(pool: &SqlitePool) -> IpamResult<()> {
    sqlx::query("SELECT 1").execute(pool).await?;

    Ok(())
}

/// True when the error is a UNIQUE constraint violation
pub fn is_unique_violation(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

/// Escape `%` and `_` for a LIKE pattern used with `ESCAPE '\'`
pub fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;

    #[tokio::test]
    async fn test_memory_pool_seeds_access_tables() {
        let pool = memory_pool().await.unwrap();
        test_connection(&pool).await.unwrap();

        let roles: i64 = sqlx::query("SELECT COUNT(*) AS n FROM roles")
            .fetch_one(&pool)
            .await
            .unwrap()
            .get("n");
        assert_eq!(roles, 3);

        let permissions: i64 = sqlx::query("SELECT COUNT(*) AS n FROM permissions")
            .fetch_one(&pool)
            .await
            .unwrap()
            .get("n");
        assert_eq!(permissions, 9);
    }

    #[tokio::test]
    async fn test_file_pool_creates_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ipam.sqlite");

        let pool = create_pool(&path, DatabaseOptions::default()).await.unwrap();
        run_migrations(&pool).await.unwrap();
        test_connection(&pool).await.unwrap();

        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_audit_rows_cannot_be_changed() {
        let pool = memory_pool().await.unwrap();

        sqlx::query(
            "INSERT INTO audit_logs (event, description, created_at) VALUES ('logout', 'bye', '2026-01-01T00:00:00+00:00')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let update = sqlx::query("UPDATE audit_logs SET description = 'edited'")
            .execute(&pool)
            .await;
        assert!(update.is_err());

        let delete = sqlx::query("DELETE FROM audit_logs").execute(&pool).await;
        assert!(delete.is_err());
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("10.0"), "%10.0%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
