use duckdb::Connection;
use r2d2::{ManageConnection, Pool};
use std::sync::{Mutex, PoisonError};
use tracing::info;

use crate::config::DatabaseConfig;
use crate::db::DbError;

pub type DbPool = Pool<DuckDBConnectionManager>;

/// Hands out connections to a single DuckDB database.
///
/// The database is opened once; every pooled connection is a clone of that
/// handle, so all of them (including `:memory:` ones) see the same data.
pub struct DuckDBConnectionManager {
    base: Mutex<Connection>,
}

impl DuckDBConnectionManager {
    pub fn open(path: &str) -> Result<Self, duckdb::Error> {
        let base = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        Ok(Self {
            base: Mutex::new(base),
        })
    }
}

impl ManageConnection for DuckDBConnectionManager {
    type Connection = Connection;
    type Error = duckdb::Error;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let base = self.base.lock().unwrap_or_else(PoisonError::into_inner);
        base.try_clone()
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.execute("SELECT 1", [])?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

pub fn build_pool(config: &DatabaseConfig) -> Result<DbPool, DbError> {
    info!(path = %config.path, pool_size = config.pool_size, "Opening DuckDB database");
    let manager = DuckDBConnectionManager::open(&config.path)?;
    let pool = Pool::builder().max_size(config.pool_size).build(manager)?;
    Ok(pool)
}
