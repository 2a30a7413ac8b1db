pub mod db_pool;
pub mod db_utils;
pub mod schema;

use duckdb::Connection;
use thiserror::Error;

pub use db_pool::DbPool;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("failed to acquire database connection: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("database error: {0}")]
    Query(#[from] duckdb::Error),
    #[error("database task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Runs `f` against a pooled connection on the blocking thread pool.
///
/// The connection is checked out for the duration of `f` only and goes back
/// to the pool when the guard drops, on success and on error alike.
pub async fn with_connection<T, F>(pool: &DbPool, f: F) -> Result<T, DbError>
where
    F: FnOnce(&Connection) -> Result<T, DbError> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let conn = pool.get()?;
        f(&conn)
    })
    .await?
}
