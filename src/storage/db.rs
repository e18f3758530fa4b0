use std::path::Path;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::storage::{error::StorageError, schema};

pub type SecondsSinceUnix = i64;

pub const DATABASE_FILE_NAME: &str = "ubwavex.db";

fn prepare(conn: Connection) -> Result<Connection, StorageError> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    schema::init(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection, StorageError> {
    prepare(Connection::open_in_memory()?)
}

/// Opens (creating if needed) the database file and its parent directory.
pub fn open(path: &Path) -> Result<Connection, StorageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    prepare(Connection::open(path)?)
}

/// converts number of seconds since unix epoch to utc date time
pub fn i64_seconds_to_utc(since_unix: SecondsSinceUnix) -> Result<DateTime<Utc>, StorageError> {
    DateTime::from_timestamp(since_unix, 0).ok_or_else(|| {
        StorageError::Internal(anyhow!(
            "failed to convert {since_unix} s timestamp to datetime"
        ))
    })
}
