//! Best-effort metadata enrichment from the catalog services
//!
//! A resolved record starts from what the media backend knows about a track
//! (title, uploader, thumbnail) and is overridden field by field with whatever
//! the recording service and the cover-art service return. Remote failures never
//! fail the resolution, they only leave the seeded fields in place.

use std::time::Duration;

use thiserror::Error;

use crate::{
    domain::track::{ResolvedMetadata, TrackDescriptor},
    storage::{
        self, SharedStorage,
        cache::{self, CacheKind, METADATA_TTL},
        error::StorageError,
        operations::Storage,
    },
};

pub mod coverart;
pub mod musicbrainz;

#[derive(Debug, Error)]
pub enum RemoteServiceError {
    #[error("request to {service} failed: {message}")]
    Transport {
        service: &'static str,
        message: String,
    },

    #[error("{service} answered with status {status}")]
    Status { service: &'static str, status: u16 },

    #[error("malformed response from {service}: {source}")]
    Malformed {
        service: &'static str,
        source: std::io::Error,
    },

    #[error("{service} sent more than {limit} bytes")]
    TooLarge { service: &'static str, limit: u64 },
}

impl RemoteServiceError {
    pub fn from_ureq(service: &'static str, error: ureq::Error) -> Self {
        match error {
            ureq::Error::Status(status, _) => Self::Status { service, status },
            ureq::Error::Transport(transport) => Self::Transport {
                service,
                message: transport.to_string(),
            },
        }
    }
}

/// Builds the HTTP agent shared by both catalog clients.
pub fn http_agent(user_agent: &str, timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogArtist {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogRelease {
    pub id: Option<String>,
    pub title: Option<String>,
    pub date: Option<String>,
}

/// Best recording match for a (title, artist) query.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingMatch {
    pub artist: Option<CatalogArtist>,
    pub release: Option<CatalogRelease>,
}

pub trait RecordingLookup: Send + Sync {
    fn find_recording(
        &self,
        title: &str,
        artist: &str,
    ) -> Result<Option<RecordingMatch>, RemoteServiceError>;
}

pub trait CoverArtService: Send + Sync {
    fn front_cover(&self, release_id: &str) -> Result<Option<String>, RemoteServiceError>;

    fn fetch_image(&self, url: &str) -> Result<Vec<u8>, RemoteServiceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Enrichment {
    Matched,
    NoMatch,
    Failed,
}

pub struct MetadataResolver<'a> {
    recordings: &'a dyn RecordingLookup,
    covers: &'a dyn CoverArtService,
    failed_lookup_ttl: Duration,
}

impl<'a> MetadataResolver<'a> {
    pub fn new(
        recordings: &'a dyn RecordingLookup,
        covers: &'a dyn CoverArtService,
        failed_lookup_ttl: Duration,
    ) -> Self {
        Self {
            recordings,
            covers,
            failed_lookup_ttl,
        }
    }

    pub fn resolve(
        &self,
        storage: &SharedStorage,
        descriptor: &TrackDescriptor,
    ) -> Result<ResolvedMetadata, StorageError> {
        let key = cache::metadata_key(&descriptor.title, descriptor.artist_name());

        if let Some(cached) =
            storage::lock(storage)?.cache_get_json::<ResolvedMetadata>(&key, CacheKind::Metadata)?
        {
            return Ok(cached);
        }

        let mut metadata = ResolvedMetadata::seed(descriptor);
        let enrichment = match self.enrich(&mut metadata) {
            Ok(true) => Enrichment::Matched,
            Ok(false) => Enrichment::NoMatch,
            Err(e) => {
                log::warn!(
                    "metadata lookup for '{}' by '{}' failed: {e}",
                    metadata.title,
                    metadata.artist
                );
                Enrichment::Failed
            }
        };

        // a failed lookup expires sooner so a transient outage is retried
        let ttl = match enrichment {
            Enrichment::Failed => self.failed_lookup_ttl,
            Enrichment::Matched | Enrichment::NoMatch => METADATA_TTL,
        };

        let mut storage = storage::lock(storage)?;
        if enrichment == Enrichment::Matched {
            remember_catalog_entries(&mut storage, &metadata)?;
        }
        storage.cache_put_json(&key, CacheKind::Metadata, &metadata, Some(ttl))?;

        Ok(metadata)
    }

    /// Applies the recording match and its cover onto `metadata`.
    ///
    /// Returns whether a recording matched. Nothing is applied when the recording lookup fails.
    fn enrich(&self, metadata: &mut ResolvedMetadata) -> Result<bool, RemoteServiceError> {
        let Some(found) = self
            .recordings
            .find_recording(&metadata.title, &metadata.artist)?
        else {
            return Ok(false);
        };

        if let Some(artist) = found.artist {
            metadata.artist = artist.name;
            metadata.catalog_artist_id = Some(artist.id);
        }

        if let Some(release) = found.release {
            metadata.album = release.title;
            metadata.release_date = release.date;
            metadata.catalog_album_id = release.id;
        }

        if let Some(release_id) = metadata.catalog_album_id.as_deref() {
            match self.covers.front_cover(release_id) {
                Ok(Some(url)) => metadata.cover_art_url = Some(url),
                Ok(None) => {}
                Err(e) => log::warn!("cover art lookup for release {release_id} failed: {e}"),
            }
        }

        Ok(true)
    }
}

fn remember_catalog_entries(
    storage: &mut Storage,
    metadata: &ResolvedMetadata,
) -> Result<(), StorageError> {
    let Some(artist_catalog_id) = metadata.catalog_artist_id.as_deref() else {
        return Ok(());
    };

    let artist_id = storage.upsert_artist(&metadata.artist, Some(artist_catalog_id))?;
    if let Some(album) = metadata.album.as_deref() {
        storage.upsert_album(
            album,
            artist_id,
            metadata.release_date.as_deref(),
            metadata.catalog_album_id.as_deref(),
        )?;
    }
    Ok(())
}
