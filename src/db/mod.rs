//! Database module: connection setup, migrations and per-table repositories.
//!
//! Repositories are plain async functions over a [`Pool`] that map rows into
//! the records in [`crate::model`]. Staffing counters on `sessions` are kept
//! by triggers in the schema; nothing here writes them.
//!
//! External modules should import from `rangeops::db`; every repository
//! function is re-exported here.

pub mod applications;
pub mod clients;
pub mod costs;
pub mod documents;
pub mod model;
pub mod operators;
pub mod sessions;

pub use applications::*;
pub use clients::*;
pub use costs::*;
pub use documents::*;
pub use operators::*;
pub use sessions::*;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let in_memory = database_url.starts_with("sqlite::memory");
    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("invalid database url {}", database_url))?
        .create_if_missing(true)
        .foreign_keys(true);

    // An in-memory database lives and dies with its connection.
    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        create_parent_dir(&options.clone().get_filename())?;
        SqlitePoolOptions::new().max_connections(5)
    };
    let pool = pool_options
        .connect_with(options)
        .await
        .context("failed to open database")?;

    if !in_memory {
        sqlx::query("PRAGMA journal_mode=WAL;").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous=FULL;").execute(&pool).await?;
    }
    info!(url = %database_url, "database pool ready");
    Ok(pool)
}

/// `create_if_missing` makes the file but not its directory.
fn create_parent_dir(db_file: &Path) -> Result<()> {
    match db_file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create database directory {}", dir.display())),
        _ => Ok(()),
    }
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("failed to run migrations")?;
    Ok(())
}

/// Fresh migrated in-memory database, for tests and dry runs.
pub async fn memory_pool() -> Result<Pool> {
    let pool = init_pool("sqlite::memory:").await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_database_directory_is_created() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("nested").join("ops.db");
        let pool = init_pool(&format!("sqlite://{}", path.display())).await.unwrap();
        sqlx::query("SELECT 1").execute(&pool).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn memory_pool_keeps_its_schema() {
        let pool = memory_pool().await.unwrap();
        for _ in 0..3 {
            let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
                .fetch_one(&pool)
                .await
                .unwrap();
            assert_eq!(n, 0);
        }
    }

    #[tokio::test]
    async fn file_database_opens_and_migrates() {
        let td = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}/ops.db", td.path().display());
        let pool = init_pool(&url).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'sessions'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(tables, 1);
    }
}
