//! TTL-keyed JSON cache on top of the `cache` table

use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};

use crate::{
    domain::{hash::ContentHash, quality::StreamQuality},
    storage::{error::StorageError, operations::Storage},
};

/// Stream URLs handed out by the media backend are time limited.
pub const STREAM_URL_TTL: Duration = Duration::from_secs(6 * 60 * 60);
/// Catalog data rarely changes.
pub const METADATA_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    StreamUrl,
    Metadata,
}

impl CacheKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::StreamUrl => "stream_url",
            CacheKind::Metadata => "metadata",
        }
    }
}

/// Different qualities are different payloads, so both parts go into the key.
pub fn stream_key(external_id: &str, quality: StreamQuality) -> String {
    format!("stream_{external_id}_{}", quality.as_str())
}

pub fn metadata_key(title: &str, artist: &str) -> String {
    ContentHash::of_track(title, artist).to_hex()
}

impl Storage {
    /// Returns the cached value, treating an undecodable payload as a miss.
    pub fn cache_get_json<T: DeserializeOwned>(
        &self,
        key: &str,
        kind: CacheKind,
    ) -> Result<Option<T>, StorageError> {
        let Some(payload) = self.cache_get(key, kind.as_str())? else {
            log::debug!("cache miss {}/{key}", kind.as_str());
            return Ok(None);
        };

        match serde_json::from_str(&payload) {
            Ok(value) => {
                log::debug!("cache hit {}/{key}", kind.as_str());
                Ok(Some(value))
            }
            Err(e) => {
                log::warn!("ignoring undecodable cache entry {}/{key}: {e}", kind.as_str());
                Ok(None)
            }
        }
    }

    pub fn cache_put_json<T: Serialize>(
        &mut self,
        key: &str,
        kind: CacheKind,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError> {
        let payload = serde_json::to_string(value)?;
        self.cache_put(key, kind.as_str(), &payload, ttl)
    }
}
