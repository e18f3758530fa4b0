use rusqlite::Connection;

pub mod tables {
    pub const ARTISTS: &str = "artists";
    pub const ALBUMS: &str = "albums";
    pub const TRACKS: &str = "tracks";
    pub const DOWNLOADS: &str = "downloads";
    pub const CACHE: &str = "cache";

    pub const ALL_TABLES: &[&str] = &[ARTISTS, ALBUMS, TRACKS, DOWNLOADS, CACHE];
}

pub mod columns {
    pub const ID: &str = "id";
    pub const NAME: &str = "name";
    pub const CATALOG_ID: &str = "musicbrainz_id";
    pub const TITLE: &str = "title";
    pub const ARTIST_ID: &str = "artist_id";
    pub const RELEASE_DATE: &str = "release_date";
    pub const ARTIST_NAME: &str = "artist_name";
    pub const DURATION: &str = "duration";
    pub const EXTERNAL_ID: &str = "youtube_id";
    pub const CREATED_AT: &str = "created_at";
    pub const TRACK_ID: &str = "track_id";
    pub const FILE_PATH: &str = "file_path";
    pub const FILE_SIZE: &str = "file_size";
    pub const QUALITY: &str = "quality";
    pub const DOWNLOADED_AT: &str = "downloaded_at";
    pub const CACHE_KEY: &str = "cache_key";
    pub const CACHE_TYPE: &str = "cache_type";
    pub const CACHE_DATA: &str = "cache_data";
    pub const EXPIRES_AT: &str = "expires_at";
}

pub use columns::*;
pub use tables::*;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS artists (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    musicbrainz_id TEXT
);

CREATE TABLE IF NOT EXISTS albums (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    artist_id INTEGER NOT NULL REFERENCES artists(id),
    release_date TEXT,
    musicbrainz_id TEXT,
    UNIQUE (title, artist_id)
);

CREATE TABLE IF NOT EXISTS tracks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    artist_name TEXT NOT NULL,
    duration INTEGER NOT NULL DEFAULT 0,
    youtube_id TEXT NOT NULL UNIQUE,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS downloads (
    track_id INTEGER PRIMARY KEY REFERENCES tracks(id),
    file_path TEXT NOT NULL,
    file_size INTEGER NOT NULL DEFAULT 0,
    quality TEXT NOT NULL,
    downloaded_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS cache (
    cache_key TEXT NOT NULL,
    cache_type TEXT NOT NULL,
    cache_data TEXT NOT NULL,
    expires_at INTEGER,
    PRIMARY KEY (cache_key, cache_type)
);
"#;

pub fn init(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA)
}
