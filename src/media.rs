//! Search and stream resolution on top of the media backend

use crate::{
    backend::MediaBackend,
    domain::{
        quality::StreamQuality,
        track::{SearchResult, StreamInfo, TrackFields, UNKNOWN_ARTIST, UNKNOWN_TITLE, duration_secs},
    },
    error::CoreError,
    storage::{
        self, SharedStorage,
        cache::{self, CacheKind, STREAM_URL_TTL},
    },
};

pub const DEFAULT_SEARCH_LIMIT: usize = 20;

/// Flat search; hits without an id are dropped and at most `limit` are returned.
pub fn search(
    backend: &dyn MediaBackend,
    query: &str,
    limit: usize,
) -> Result<Vec<SearchResult>, CoreError> {
    if limit == 0 {
        return Ok(vec![]);
    }
    let entries = backend.search(query, limit)?;

    Ok(entries
        .into_iter()
        .filter_map(|entry| {
            let youtube_id = entry.id.filter(|id| !id.is_empty())?;
            Some(SearchResult {
                youtube_id,
                title: entry.title.unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
                duration: duration_secs(entry.duration),
                uploader: entry.uploader.unwrap_or_else(|| UNKNOWN_ARTIST.to_string()),
            })
        })
        .take(limit)
        .collect())
}

/// Returns a playable URL for `external_id`, served from the cache while it is fresh.
///
/// A resolved stream also makes sure the track is known to the library.
pub fn get_stream_url(
    backend: &dyn MediaBackend,
    storage: &SharedStorage,
    external_id: &str,
    quality: StreamQuality,
) -> Result<StreamInfo, CoreError> {
    let key = cache::stream_key(external_id, quality);

    if let Some(cached) =
        storage::lock(storage)?.cache_get_json::<StreamInfo>(&key, CacheKind::StreamUrl)?
    {
        return Ok(cached);
    }

    let resolved = backend.resolve_stream(external_id, quality.format_selector())?;
    let info = StreamInfo {
        url: resolved.url,
        title: resolved.title.unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
        duration: duration_secs(resolved.duration),
        artist: resolved
            .artist
            .or(resolved.uploader)
            .unwrap_or_else(|| UNKNOWN_ARTIST.to_string()),
        thumbnail: resolved.thumbnail,
    };

    let mut storage = storage::lock(storage)?;
    storage.cache_put_json(&key, CacheKind::StreamUrl, &info, Some(STREAM_URL_TTL))?;

    let fields = TrackFields {
        title: info.title.clone(),
        artist: info.artist.clone(),
        duration_secs: info.duration,
    };
    if let Err(e) = storage.ensure_track_exists(external_id, &fields) {
        log::warn!("could not register streamed track {external_id}: {e}");
    }

    Ok(info)
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;
    use crate::{
        backend::{DownloadRequest, DownloadedMedia, ExtractionError, ResolvedStream, SearchEntry},
        storage::operations::Storage,
    };

    #[derive(Default)]
    struct FakeStreams {
        entries: Vec<SearchEntry>,
        fail: bool,
        selectors: Mutex<Vec<String>>,
        calls: AtomicUsize,
        searches: AtomicUsize,
    }

    impl MediaBackend for FakeStreams {
        fn search(&self, _query: &str, _limit: usize) -> Result<Vec<SearchEntry>, ExtractionError> {
            self.searches.fetch_add(1, Ordering::SeqCst);
            Ok(self.entries.clone())
        }

        fn resolve_stream(
            &self,
            external_id: &str,
            format_selector: &str,
        ) -> Result<ResolvedStream, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.selectors.lock().unwrap().push(format_selector.to_string());
            if self.fail {
                return Err(ExtractionError::Failed {
                    status: "exit status: 1".into(),
                    stderr: "ERROR: private video".into(),
                });
            }
            Ok(ResolvedStream {
                url: format!("https://media/{external_id}"),
                title: Some("Song".into()),
                duration: Some(199.7),
                artist: None,
                uploader: Some("Channel".into()),
                thumbnail: Some("https://img/1.jpg".into()),
            })
        }

        fn download(&self, _request: &DownloadRequest) -> Result<DownloadedMedia, ExtractionError> {
            Err(ExtractionError::MissingField("filename"))
        }
    }

    fn entry(id: Option<&str>) -> SearchEntry {
        SearchEntry {
            id: id.map(str::to_string),
            title: Some("Title".into()),
            duration: None,
            uploader: None,
        }
    }

    fn shared() -> SharedStorage {
        storage::shared(Storage::open_in_memory().unwrap())
    }

    #[test]
    fn search_drops_entries_without_id_and_respects_limit() -> anyhow::Result<()> {
        let backend = FakeStreams {
            entries: vec![
                entry(Some("a")),
                entry(None),
                entry(Some("")),
                entry(Some("b")),
                entry(Some("c")),
            ],
            ..Default::default()
        };

        let results = search(&backend, "query", 2)?;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].youtube_id, "a");
        assert_eq!(results[1].youtube_id, "b");
        assert_eq!(results[0].uploader, UNKNOWN_ARTIST);
        assert_eq!(results[0].duration, 0);
        Ok(())
    }

    #[test]
    fn zero_limit_search_skips_the_backend() -> anyhow::Result<()> {
        let backend = FakeStreams {
            entries: vec![entry(Some("a"))],
            ..Default::default()
        };

        assert!(search(&backend, "query", 0)?.is_empty());
        assert_eq!(backend.searches.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[test]
    fn second_resolution_is_served_from_cache() -> anyhow::Result<()> {
        let backend = FakeStreams::default();
        let storage = shared();

        let first = get_stream_url(&backend, &storage, "vid1", StreamQuality::High)?;
        let second = get_stream_url(&backend, &storage, "vid1", StreamQuality::High)?;

        assert_eq!(first, second);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.artist, "Channel");
        assert_eq!(first.duration, 200);
        Ok(())
    }

    #[test]
    fn qualities_are_cached_separately() -> anyhow::Result<()> {
        let backend = FakeStreams::default();
        let storage = shared();

        get_stream_url(&backend, &storage, "vid1", StreamQuality::Low)?;
        get_stream_url(&backend, &storage, "vid1", StreamQuality::Best)?;

        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            *backend.selectors.lock().unwrap(),
            vec!["worstaudio/worst".to_string(), "bestaudio/best".to_string()]
        );
        Ok(())
    }

    #[test]
    fn resolved_stream_registers_the_track() -> anyhow::Result<()> {
        let backend = FakeStreams::default();
        let storage = shared();

        get_stream_url(&backend, &storage, "vid1", StreamQuality::default())?;

        let track = storage::lock(&storage)?.find_track("vid1")?.unwrap();
        assert_eq!(track.title, "Song");
        assert_eq!(track.artist_name, "Channel");
        Ok(())
    }

    #[test]
    fn failures_are_not_cached() -> anyhow::Result<()> {
        let backend = FakeStreams {
            fail: true,
            ..Default::default()
        };
        let storage = shared();

        assert!(get_stream_url(&backend, &storage, "vid1", StreamQuality::High).is_err());
        assert!(get_stream_url(&backend, &storage, "vid1", StreamQuality::High).is_err());

        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        assert!(storage::lock(&storage)?.find_track("vid1")?.is_none());
        Ok(())
    }
}
