use std::{path::Path, time::Duration};

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, TransactionBehavior, params};

use crate::{
    domain::track::{DownloadRecord, Track, TrackFields, TrackId},
    storage::{
        db::{self, SecondsSinceUnix},
        error::StorageError,
        schema::{columns, tables},
    },
};

use columns::*;
use tables::*;

/// Main structure that implements all storage logic
pub struct Storage {
    pub(crate) db: rusqlite::Connection,
}

impl Storage {
    /// opens a database file connection, initializing the schema
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        Ok(Self::from_existing_conn(db::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Ok(Self::from_existing_conn(db::open_in_memory()?))
    }

    pub fn from_existing_conn(db: rusqlite::Connection) -> Self {
        Self { db }
    }

    /// Returns the id of the artist called `name`, creating the row if needed.
    pub fn upsert_artist(
        &mut self,
        name: &str,
        catalog_id: Option<&str>,
    ) -> Result<i64, StorageError> {
        let tx = self
            .db
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<i64> = tx
            .query_row(
                &format!("SELECT {ID} FROM {ARTISTS} WHERE {NAME} = ?1"),
                params![name],
                |row| row.get(0),
            )
            .optional()?;

        let id = match existing {
            Some(id) => id,
            None => {
                tx.execute(
                    &format!("INSERT INTO {ARTISTS} ({NAME}, {CATALOG_ID}) VALUES (?1, ?2)"),
                    params![name, catalog_id],
                )?;
                tx.last_insert_rowid()
            }
        };

        tx.commit()?;
        Ok(id)
    }

    /// Returns the id of the album keyed by (title, artist), creating the row if needed.
    pub fn upsert_album(
        &mut self,
        title: &str,
        artist_id: i64,
        release_date: Option<&str>,
        catalog_id: Option<&str>,
    ) -> Result<i64, StorageError> {
        let tx = self
            .db
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<i64> = tx
            .query_row(
                &format!("SELECT {ID} FROM {ALBUMS} WHERE {TITLE} = ?1 AND {ARTIST_ID} = ?2"),
                params![title, artist_id],
                |row| row.get(0),
            )
            .optional()?;

        let id = match existing {
            Some(id) => id,
            None => {
                tx.execute(
                    &format!(
                        "INSERT INTO {ALBUMS} ({TITLE}, {ARTIST_ID}, {RELEASE_DATE}, {CATALOG_ID})
                         VALUES (?1, ?2, ?3, ?4)"
                    ),
                    params![title, artist_id, release_date, catalog_id],
                )?;
                tx.last_insert_rowid()
            }
        };

        tx.commit()?;
        Ok(id)
    }

    /// Creates the track or, if the external id is known, updates its artist name only.
    ///
    /// The first stored title and duration are kept on update.
    pub fn upsert_track(
        &mut self,
        external_id: &str,
        fields: &TrackFields,
    ) -> Result<TrackId, StorageError> {
        self.upsert_track_at(external_id, fields, Utc::now())
    }

    fn upsert_track_at(
        &mut self,
        external_id: &str,
        fields: &TrackFields,
        now: DateTime<Utc>,
    ) -> Result<TrackId, StorageError> {
        let tx = self
            .db
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<i64> = tx
            .query_row(
                &format!("SELECT {ID} FROM {TRACKS} WHERE {EXTERNAL_ID} = ?1"),
                params![external_id],
                |row| row.get(0),
            )
            .optional()?;

        let id = match existing {
            Some(id) => {
                tx.execute(
                    &format!("UPDATE {TRACKS} SET {ARTIST_NAME} = ?1 WHERE {ID} = ?2"),
                    params![fields.artist, id],
                )?;
                id
            }
            None => {
                Self::insert_track(&tx, external_id, fields, now.timestamp())?;
                tx.last_insert_rowid()
            }
        };

        tx.commit()?;
        Ok(TrackId(id))
    }

    /// Inserts the track unless one with the same external id exists.
    ///
    /// Returns whether a row was created.
    pub fn ensure_track_exists(
        &mut self,
        external_id: &str,
        fields: &TrackFields,
    ) -> Result<bool, StorageError> {
        let tx = self
            .db
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let exists: bool = tx.query_row(
            &format!("SELECT EXISTS(SELECT 1 FROM {TRACKS} WHERE {EXTERNAL_ID} = ?1)"),
            params![external_id],
            |row| row.get(0),
        )?;

        if !exists {
            Self::insert_track(&tx, external_id, fields, Utc::now().timestamp())?;
        }

        tx.commit()?;
        Ok(!exists)
    }

    fn insert_track(
        tx: &rusqlite::Transaction,
        external_id: &str,
        fields: &TrackFields,
        created_at: SecondsSinceUnix,
    ) -> Result<(), StorageError> {
        tx.execute(
            &format!(
                "INSERT INTO {TRACKS} ({TITLE}, {ARTIST_NAME}, {DURATION}, {EXTERNAL_ID}, {CREATED_AT})
                 VALUES (?1, ?2, ?3, ?4, ?5)"
            ),
            params![
                fields.title,
                fields.artist,
                fields.duration_secs,
                external_id,
                created_at
            ],
        )?;
        Ok(())
    }

    pub fn find_track(&self, external_id: &str) -> Result<Option<Track>, StorageError> {
        let row = self
            .db
            .query_row(
                &format!(
                    "SELECT {ID}, {TITLE}, {ARTIST_NAME}, {DURATION}, {CREATED_AT}
                     FROM {TRACKS} WHERE {EXTERNAL_ID} = ?1"
                ),
                params![external_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, u32>(3)?,
                        row.get::<_, SecondsSinceUnix>(4)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(id, title, artist_name, duration_secs, created_at)| {
            Ok(Track {
                id: TrackId(id),
                external_id: external_id.to_string(),
                title,
                artist_name,
                duration_secs,
                created_at: db::i64_seconds_to_utc(created_at)?,
            })
        })
        .transpose()
    }

    /// Records a finished download, superseding any earlier download of the track.
    pub fn record_download(
        &mut self,
        track_id: TrackId,
        file_path: &Path,
        file_size: u64,
        quality: &str,
    ) -> Result<(), StorageError> {
        let tx = self
            .db
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let known: bool = tx.query_row(
            &format!("SELECT EXISTS(SELECT 1 FROM {TRACKS} WHERE {ID} = ?1)"),
            params![track_id.0],
            |row| row.get(0),
        )?;
        if !known {
            return Err(StorageError::TrackNotFound(track_id.to_string()));
        }

        let file_size = i64::try_from(file_size).unwrap_or(i64::MAX);
        tx.execute(
            &format!(
                "INSERT OR REPLACE INTO {DOWNLOADS}
                 ({TRACK_ID}, {FILE_PATH}, {FILE_SIZE}, {QUALITY}, {DOWNLOADED_AT})
                 VALUES (?1, ?2, ?3, ?4, ?5)"
            ),
            params![
                track_id.0,
                file_path.to_string_lossy(),
                file_size,
                quality,
                Utc::now().timestamp()
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    pub fn find_download(&self, track_id: TrackId) -> Result<Option<DownloadRecord>, StorageError> {
        Ok(self
            .db
            .query_row(
                &format!(
                    "SELECT {FILE_PATH}, {FILE_SIZE}, {QUALITY} FROM {DOWNLOADS} WHERE {TRACK_ID} = ?1"
                ),
                params![track_id.0],
                |row| {
                    Ok(DownloadRecord {
                        track_id,
                        file_path: row.get::<_, String>(0)?.into(),
                        file_size: row.get::<_, i64>(1)?.max(0) as u64,
                        quality: row.get(2)?,
                    })
                },
            )
            .optional()?)
    }

    /// Reads a cache payload, ignoring rows whose expiry has passed.
    pub fn cache_get(&self, key: &str, kind: &str) -> Result<Option<String>, StorageError> {
        self.cache_get_at(key, kind, Utc::now())
    }

    pub fn cache_get_at(
        &self,
        key: &str,
        kind: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, StorageError> {
        Ok(self
            .db
            .query_row(
                &format!(
                    "SELECT {CACHE_DATA} FROM {CACHE}
                     WHERE {CACHE_KEY} = ?1 AND {CACHE_TYPE} = ?2
                     AND ({EXPIRES_AT} IS NULL OR {EXPIRES_AT} > ?3)"
                ),
                params![key, kind, now.timestamp()],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Writes a cache payload, replacing any previous row; no `ttl` means no expiry.
    pub fn cache_put(
        &mut self,
        key: &str,
        kind: &str,
        payload: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError> {
        self.cache_put_at(key, kind, payload, ttl, Utc::now())
    }

    pub fn cache_put_at(
        &mut self,
        key: &str,
        kind: &str,
        payload: &str,
        ttl: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let expires_at: Option<SecondsSinceUnix> = ttl.map(|ttl| {
            now.timestamp()
                .saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX))
        });

        self.db.execute(
            &format!(
                "INSERT OR REPLACE INTO {CACHE} ({CACHE_KEY}, {CACHE_TYPE}, {CACHE_DATA}, {EXPIRES_AT})
                 VALUES (?1, ?2, ?3, ?4)"
            ),
            params![key, kind, payload, expires_at],
        )?;
        Ok(())
    }
}
