//! Process-wide state built once at startup and handed to every handler

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;

use crate::{
    backend::{MediaBackend, transcoder, ytdlp::YtDlp},
    config::{AppPaths, Config, DownloadSettings, DownloadSettingsUpdate},
    domain::track::{DownloadOutcome, ResolvedMetadata, TrackDescriptor},
    download::{DownloadJob, DownloadManager},
    error::CoreError,
    metadata::{
        self, CoverArtService, MetadataResolver, RecordingLookup, coverart::CoverArtArchiveClient,
        musicbrainz::MusicBrainzClient,
    },
    storage::{self, SharedStorage, db::DATABASE_FILE_NAME, fs, operations::Storage},
};

pub struct AppContext {
    pub storage: SharedStorage,
    pub backend: Arc<dyn MediaBackend>,
    recordings: Arc<dyn RecordingLookup>,
    covers: Arc<dyn CoverArtService>,
    paths: AppPaths,
    settings: DownloadSettings,
    downloads: DownloadManager,
    failed_lookup_ttl: Duration,
}

/// Remote collaborators of the context, swapped for fakes in tests.
pub struct Collaborators {
    pub backend: Arc<dyn MediaBackend>,
    pub recordings: Arc<dyn RecordingLookup>,
    pub covers: Arc<dyn CoverArtService>,
}

impl AppContext {
    /// Opens the store and wires the real backend and catalog clients.
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let paths = cfg.paths.resolve();

        std::fs::create_dir_all(&paths.download_dir).with_context(|| {
            format!(
                "Failed to create download directory {}",
                paths.download_dir.to_string_lossy()
            )
        })?;
        std::fs::create_dir_all(paths.cache_dir.join(fs::COVERS_DIR)).with_context(|| {
            format!(
                "Failed to create cache directory {}",
                paths.cache_dir.to_string_lossy()
            )
        })?;

        let store = Storage::open(&paths.db_path).with_context(|| {
            format!("Failed to open database {}", paths.db_path.to_string_lossy())
        })?;

        let ffmpeg = transcoder::locate_ffmpeg(cfg.backend.ffmpeg_path.as_deref());
        log::info!("using transcoder at {}", ffmpeg.to_string_lossy());

        let agent = metadata::http_agent(&cfg.metadata.user_agent, cfg.metadata.timeout());
        let collaborators = Collaborators {
            backend: Arc::new(YtDlp::new(cfg.backend.ytdlp_program(), ffmpeg)),
            recordings: Arc::new(MusicBrainzClient::new(agent.clone())),
            covers: Arc::new(CoverArtArchiveClient::new(agent)),
        };

        Ok(Self::new(
            paths,
            cfg.downloads,
            storage::shared(store),
            collaborators,
            cfg.metadata.failed_lookup_ttl(),
        ))
    }

    pub fn new(
        paths: AppPaths,
        settings: DownloadSettings,
        storage: SharedStorage,
        collaborators: Collaborators,
        failed_lookup_ttl: Duration,
    ) -> Self {
        Self {
            storage,
            backend: collaborators.backend,
            recordings: collaborators.recordings,
            covers: collaborators.covers,
            downloads: DownloadManager::new(settings.concurrent_downloads),
            paths,
            settings,
            failed_lookup_ttl,
        }
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn settings(&self) -> DownloadSettings {
        self.settings
    }

    pub fn downloads_in_flight(&self) -> usize {
        self.downloads.in_flight()
    }

    pub fn resolve_metadata(
        &self,
        descriptor: &TrackDescriptor,
    ) -> Result<ResolvedMetadata, CoreError> {
        let resolver = MetadataResolver::new(
            self.recordings.as_ref(),
            self.covers.as_ref(),
            self.failed_lookup_ttl,
        );
        Ok(resolver.resolve(&self.storage, descriptor)?)
    }

    /// Returns the locally cached cover of `external_id`, downloading `url` on first use.
    pub fn download_cover(&self, url: &str, external_id: &str) -> Result<PathBuf, CoreError> {
        fs::cache_cover_image(&self.paths.cache_dir, external_id, || {
            Ok(self.covers.fetch_image(url)?)
        })
    }

    /// Starts a download on a worker; `on_done` receives its outcome.
    pub fn submit_download<F>(&self, job: DownloadJob, on_done: F) -> Result<(), CoreError>
    where
        F: FnOnce(Result<DownloadOutcome, CoreError>) + Send + 'static,
    {
        self.downloads.submit(
            self.settings.concurrent_downloads,
            Arc::clone(&self.backend),
            Arc::clone(&self.storage),
            job,
            on_done,
        )
    }

    /// Moves downloads and/or the database to new directories.
    ///
    /// The new database is opened before the old connection is dropped, so a failed
    /// relocation keeps the current one.
    pub fn update_directories(
        &mut self,
        download_dir: Option<&Path>,
        database_dir: Option<&Path>,
    ) -> Result<(), CoreError> {
        if let Some(dir) = download_dir {
            std::fs::create_dir_all(dir).map_err(storage::error::StorageError::Fs)?;
            self.paths.download_dir = dir.to_path_buf();
            log::info!("download directory set to {}", dir.to_string_lossy());
        }

        if let Some(dir) = database_dir {
            let db_path = dir.join(DATABASE_FILE_NAME);
            let relocated = Storage::open(&db_path)?;
            *storage::lock(&self.storage)? = relocated;
            self.paths.db_path = db_path;
            log::info!("database moved to {}", self.paths.db_path.to_string_lossy());
        }

        Ok(())
    }

    pub fn update_download_settings(
        &mut self,
        update: &DownloadSettingsUpdate,
    ) -> Result<DownloadSettings, CoreError> {
        self.settings.apply(update)?;
        self.downloads.resize(self.settings.concurrent_downloads);
        log::info!("download settings updated: {:?}", self.settings);
        Ok(self.settings)
    }

    pub fn clear_cache(&self) -> usize {
        let removed = fs::clear_dir(&self.paths.cache_dir);
        log::info!(
            "removed {removed} entries from {}",
            self.paths.cache_dir.to_string_lossy()
        );
        removed
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;
    use crate::{
        download::tests::FakeDownloads,
        metadata::tests::{FakeCovers, FakeRecordings},
    };

    pub(crate) fn test_context(tmp: &TempDir) -> AppContext {
        test_context_with(tmp, Arc::new(FakeDownloads::new(tmp.path().join("music"))))
    }

    pub(crate) fn test_context_with(tmp: &TempDir, backend: Arc<FakeDownloads>) -> AppContext {
        let data_dir = tmp.path().join("data");
        let paths = AppPaths {
            db_path: data_dir.join(DATABASE_FILE_NAME),
            cache_dir: data_dir.join("cache"),
            download_dir: tmp.path().join("music"),
        };
        std::fs::create_dir_all(&paths.download_dir).unwrap();
        let store = Storage::open(&paths.db_path).unwrap();

        AppContext::new(
            paths,
            DownloadSettings::default(),
            storage::shared(store),
            Collaborators {
                backend,
                recordings: Arc::new(FakeRecordings::default()),
                covers: Arc::new(FakeCovers::default()),
            },
            Duration::from_secs(60),
        )
    }

    #[test]
    fn relocating_the_database_switches_connection() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let mut ctx = test_context(&tmp);
        let new_dir = tmp.path().join("elsewhere");

        ctx.update_directories(None, Some(&new_dir))?;

        assert_eq!(ctx.paths().db_path, new_dir.join(DATABASE_FILE_NAME));
        assert!(ctx.paths().db_path.is_file());

        storage::lock(&ctx.storage)?.ensure_track_exists(
            "vid1",
            &crate::domain::track::TrackFields {
                title: "T".into(),
                artist: "A".into(),
                duration_secs: 1,
            },
        )?;
        let reopened = Storage::open(&new_dir.join(DATABASE_FILE_NAME))?;
        assert!(reopened.find_track("vid1")?.is_some());
        Ok(())
    }

    #[test]
    fn download_directory_is_created() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let mut ctx = test_context(&tmp);
        let music = tmp.path().join("new/music");

        ctx.update_directories(Some(&music), None)?;

        assert!(music.is_dir());
        assert_eq!(ctx.paths().download_dir, music);
        Ok(())
    }

    #[test]
    fn invalid_settings_update_keeps_previous_settings() {
        let tmp = TempDir::new().unwrap();
        let mut ctx = test_context(&tmp);

        let err = ctx.update_download_settings(&DownloadSettingsUpdate {
            concurrent_downloads: Some(0),
            ..Default::default()
        });

        assert!(err.is_err());
        assert_eq!(ctx.settings(), DownloadSettings::default());
    }

    #[test]
    fn clear_cache_empties_cache_dir() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let ctx = test_context(&tmp);
        let cover = ctx.download_cover("https://img/1.jpg", "vid1")?;
        assert!(cover.is_file());

        assert_eq!(ctx.clear_cache(), 1);
        assert!(!cover.exists());
        Ok(())
    }
}
