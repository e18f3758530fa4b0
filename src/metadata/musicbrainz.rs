//! Recording lookups against the MusicBrainz web service

use serde::Deserialize;

use crate::metadata::{
    CatalogArtist, CatalogRelease, RecordingLookup, RecordingMatch, RemoteServiceError,
};

pub const MUSICBRAINZ_API_BASE: &str = "https://musicbrainz.org/ws/2";
const SERVICE: &str = "MusicBrainz";

pub struct MusicBrainzClient {
    agent: ureq::Agent,
    base_url: String,
}

#[derive(Deserialize)]
struct RecordingSearchResponse {
    #[serde(default)]
    recordings: Vec<MbRecording>,
}

#[derive(Deserialize)]
struct MbRecording {
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<MbArtistCredit>,
    #[serde(default)]
    releases: Vec<MbRelease>,
}

#[derive(Deserialize)]
struct MbArtistCredit {
    artist: Option<MbArtist>,
}

#[derive(Deserialize)]
struct MbArtist {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct MbRelease {
    id: Option<String>,
    title: Option<String>,
    date: Option<String>,
}

impl MusicBrainzClient {
    pub fn new(agent: ureq::Agent) -> Self {
        Self::with_base_url(agent, MUSICBRAINZ_API_BASE)
    }

    pub fn with_base_url(agent: ureq::Agent, base_url: &str) -> Self {
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Exact-phrase match on both fields.
fn recording_query(title: &str, artist: &str) -> String {
    fn phrase(value: &str) -> String {
        value.replace('\\', "\\\\").replace('"', "\\\"")
    }
    format!(
        "recording:\"{}\" AND artist:\"{}\"",
        phrase(title),
        phrase(artist)
    )
}

impl RecordingSearchResponse {
    fn into_first_match(self) -> Option<RecordingMatch> {
        let recording = self.recordings.into_iter().next()?;

        let artist = recording
            .artist_credit
            .into_iter()
            .next()
            .and_then(|credit| credit.artist)
            .map(|artist| CatalogArtist {
                id: artist.id,
                name: artist.name,
            });

        let release = recording.releases.into_iter().next().map(|release| CatalogRelease {
            id: release.id,
            title: release.title,
            date: release.date,
        });

        Some(RecordingMatch { artist, release })
    }
}

impl RecordingLookup for MusicBrainzClient {
    fn find_recording(
        &self,
        title: &str,
        artist: &str,
    ) -> Result<Option<RecordingMatch>, RemoteServiceError> {
        let url = format!("{}/recording/", self.base_url);

        let response = self
            .agent
            .get(&url)
            .query("query", &recording_query(title, artist))
            .query("fmt", "json")
            .query("limit", "1")
            .set("Accept", "application/json")
            .call()
            .map_err(|e| RemoteServiceError::from_ureq(SERVICE, e))?;

        let body: RecordingSearchResponse = response
            .into_json()
            .map_err(|source| RemoteServiceError::Malformed {
                service: SERVICE,
                source,
            })?;

        Ok(body.into_first_match())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_quotes_both_fields() {
        assert_eq!(
            recording_query("Example Song", "Example Artist"),
            r#"recording:"Example Song" AND artist:"Example Artist""#
        );
        assert_eq!(
            recording_query(r#"Say "Hi""#, "A"),
            r#"recording:"Say \"Hi\"" AND artist:"A""#
        );
    }

    #[test]
    fn first_recording_credit_and_release_are_taken() -> anyhow::Result<()> {
        let body: RecordingSearchResponse = serde_json::from_str(
            r#"{
                "recordings": [{
                    "id": "rec-1",
                    "artist-credit": [
                        {"name": "Real Artist", "artist": {"id": "art-1", "name": "Real Artist"}},
                        {"name": "Guest", "artist": {"id": "art-2", "name": "Guest"}}
                    ],
                    "releases": [
                        {"id": "rel-1", "title": "The Album", "date": "1999-03-01"},
                        {"id": "rel-2", "title": "Compilation"}
                    ]
                }]
            }"#,
        )?;

        let found = body.into_first_match().unwrap();

        let artist = found.artist.unwrap();
        assert_eq!(artist.id, "art-1");
        assert_eq!(artist.name, "Real Artist");

        let release = found.release.unwrap();
        assert_eq!(release.id.as_deref(), Some("rel-1"));
        assert_eq!(release.title.as_deref(), Some("The Album"));
        assert_eq!(release.date.as_deref(), Some("1999-03-01"));
        Ok(())
    }

    #[test]
    fn no_recordings_is_no_match() -> anyhow::Result<()> {
        let body: RecordingSearchResponse =
            serde_json::from_str(r#"{"count": 0, "recordings": []}"#)?;
        assert!(body.into_first_match().is_none());

        let body: RecordingSearchResponse = serde_json::from_str(r#"{}"#)?;
        assert!(body.into_first_match().is_none());
        Ok(())
    }

    #[test]
    fn recording_without_credit_or_release() -> anyhow::Result<()> {
        let body: RecordingSearchResponse =
            serde_json::from_str(r#"{"recordings": [{"id": "rec-1"}]}"#)?;

        let found = body.into_first_match().unwrap();
        assert!(found.artist.is_none());
        assert!(found.release.is_none());
        Ok(())
    }
}
