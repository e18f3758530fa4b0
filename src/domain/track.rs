use std::{fmt::Display, path::PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_TITLE: &str = "Unknown";

/// Internal row id of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub i64);

impl Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Represent a stored music track
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: TrackId,
    /// id of the track on the media backend
    pub external_id: String,
    pub title: String,
    pub artist_name: String,
    pub duration_secs: u32,
    pub created_at: DateTime<Utc>,
}

/// Fields written when a track row is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackFields {
    pub title: String,
    pub artist: String,
    pub duration_secs: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRecord {
    pub track_id: TrackId,
    pub file_path: PathBuf,
    pub file_size: u64,
    pub quality: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub youtube_id: String,
    pub title: String,
    pub duration: u32,
    pub uploader: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub url: String,
    pub title: String,
    pub duration: u32,
    pub artist: String,
    pub thumbnail: Option<String>,
}

/// Minimal description of a track as the host knows it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TrackDescriptor {
    #[serde(default)]
    pub title: String,
    pub artist: Option<String>,
    pub uploader: Option<String>,
    pub thumbnail: Option<String>,
}

impl TrackDescriptor {
    pub fn artist_name(&self) -> &str {
        self.artist
            .as_deref()
            .or(self.uploader.as_deref())
            .unwrap_or(UNKNOWN_ARTIST)
    }
}

/// Metadata record merged from the media backend and the catalog services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedMetadata {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub release_date: Option<String>,
    pub cover_art_url: Option<String>,
    #[serde(rename = "musicbrainz_artist_id")]
    pub catalog_artist_id: Option<String>,
    #[serde(rename = "musicbrainz_album_id")]
    pub catalog_album_id: Option<String>,
}

impl ResolvedMetadata {
    pub fn seed(descriptor: &TrackDescriptor) -> Self {
        Self {
            title: descriptor.title.clone(),
            artist: descriptor.artist_name().to_string(),
            album: None,
            release_date: None,
            cover_art_url: descriptor.thumbnail.clone(),
            catalog_artist_id: None,
            catalog_album_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadOutcome {
    pub track_id: TrackId,
    pub file_path: PathBuf,
    pub title: String,
    pub artist: String,
}

/// Backends report durations as fractional seconds; negative or missing become 0.
pub fn duration_secs(duration: Option<f64>) -> u32 {
    match duration {
        Some(d) if d.is_finite() && d > 0.0 => d.round().min(u32::MAX as f64) as u32,
        _ => 0,
    }
}
