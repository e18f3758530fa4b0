//! Cover lookups against the Cover Art Archive

use std::io::Read;

use serde::Deserialize;

use crate::metadata::{CoverArtService, RemoteServiceError};

pub const COVER_ART_ARCHIVE_BASE: &str = "https://coverartarchive.org";
const SERVICE: &str = "Cover Art Archive";
const IMAGE_HOST: &str = "cover image host";
const MAX_IMAGE_BYTES: u64 = 20 * 1024 * 1024;

pub struct CoverArtArchiveClient {
    agent: ureq::Agent,
    base_url: String,
}

#[derive(Deserialize)]
struct CoverListing {
    #[serde(default)]
    images: Vec<CoverImage>,
}

#[derive(Deserialize)]
struct CoverImage {
    image: String,
    #[serde(default)]
    front: bool,
}

impl CoverArtArchiveClient {
    pub fn new(agent: ureq::Agent) -> Self {
        Self::with_base_url(agent, COVER_ART_ARCHIVE_BASE)
    }

    pub fn with_base_url(agent: ureq::Agent, base_url: &str) -> Self {
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Reads the whole body, failing once it grows past `limit` bytes.
fn read_capped(reader: impl Read, limit: u64) -> Result<Vec<u8>, RemoteServiceError> {
    let mut bytes = Vec::new();
    reader
        .take(limit + 1)
        .read_to_end(&mut bytes)
        .map_err(|source| RemoteServiceError::Malformed {
            service: IMAGE_HOST,
            source,
        })?;
    if bytes.len() as u64 > limit {
        return Err(RemoteServiceError::TooLarge {
            service: IMAGE_HOST,
            limit,
        });
    }
    Ok(bytes)
}

/// The image flagged as front cover, else the first one.
fn pick_cover(images: Vec<CoverImage>) -> Option<String> {
    let front = images.iter().position(|image| image.front).unwrap_or(0);
    images.into_iter().nth(front).map(|image| image.image)
}

impl CoverArtService for CoverArtArchiveClient {
    fn front_cover(&self, release_id: &str) -> Result<Option<String>, RemoteServiceError> {
        let url = format!(
            "{}/release/{}",
            self.base_url,
            urlencoding::encode(release_id)
        );

        let response = match self.agent.get(&url).set("Accept", "application/json").call() {
            Ok(response) => response,
            // releases without artwork answer 404
            Err(ureq::Error::Status(404, _)) => return Ok(None),
            Err(e) => return Err(RemoteServiceError::from_ureq(SERVICE, e)),
        };

        let listing: CoverListing =
            response
                .into_json()
                .map_err(|source| RemoteServiceError::Malformed {
                    service: SERVICE,
                    source,
                })?;

        Ok(pick_cover(listing.images))
    }

    fn fetch_image(&self, url: &str) -> Result<Vec<u8>, RemoteServiceError> {
        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| RemoteServiceError::from_ureq(IMAGE_HOST, e))?;

        read_capped(response.into_reader(), MAX_IMAGE_BYTES)
    }
}
