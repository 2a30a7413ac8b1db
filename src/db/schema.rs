use duckdb::Connection;
use tracing::debug;

use crate::db::DbError;

pub const CALLS_TABLE: &str = "km_processed_data";
pub const KEY_PHRASES_TABLE: &str = "processed_data_key_phrases";

const SCHEMA_DDL: &str = "
CREATE TABLE IF NOT EXISTS km_processed_data (
    ConversationId VARCHAR NOT NULL,
    EndTime TIMESTAMP,
    StartTime TIMESTAMP,
    Content VARCHAR,
    summary VARCHAR,
    satisfied VARCHAR,
    sentiment VARCHAR,
    topic VARCHAR,
    keyphrases VARCHAR,
    complaint VARCHAR
);

CREATE TABLE IF NOT EXISTS processed_data_key_phrases (
    ConversationId VARCHAR NOT NULL,
    key_phrase VARCHAR,
    sentiment VARCHAR
);
";

/// Creates the call tables when they are missing. Existing data is untouched.
pub fn ensure_schema(conn: &Connection) -> Result<(), DbError> {
    debug!("Ensuring {} and {} exist", CALLS_TABLE, KEY_PHRASES_TABLE);
    conn.execute_batch(SCHEMA_DDL)?;
    Ok(())
}
