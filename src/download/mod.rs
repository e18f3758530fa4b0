use std::{
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
};

use crate::{
    backend::{DownloadRequest, MediaBackend},
    domain::{
        quality::DownloadQuality,
        track::{DownloadOutcome, TrackFields, UNKNOWN_ARTIST, UNKNOWN_TITLE, duration_secs},
    },
    download::pool::{PoolError, WorkerPool},
    error::CoreError,
    storage::{
        self, SharedStorage,
        fs::{file_size_or_zero, with_codec_extension},
    },
};

pub mod pool;

/// Counts in-flight downloads and refuses new ones at the limit.
#[derive(Debug, Default)]
pub struct AdmissionGate {
    in_flight: Mutex<usize>,
}

/// One admitted download; releases its slot when dropped.
#[derive(Debug)]
pub struct DownloadPermit {
    gate: Arc<AdmissionGate>,
}

impl AdmissionGate {
    pub fn try_acquire(self: &Arc<Self>, limit: usize) -> Result<DownloadPermit, CoreError> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if *in_flight >= limit {
            return Err(CoreError::ConcurrencyLimit);
        }
        *in_flight += 1;
        Ok(DownloadPermit {
            gate: Arc::clone(self),
        })
    }

    pub fn in_flight(&self) -> usize {
        *self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for DownloadPermit {
    fn drop(&mut self) {
        let mut in_flight = self
            .gate
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *in_flight = in_flight.saturating_sub(1);
    }
}

/// Everything a worker needs to run one download, captured at admission time.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadJob {
    pub external_id: String,
    pub quality: DownloadQuality,
    pub embed_metadata: bool,
    pub output_dir: PathBuf,
    /// what the host already knows, used where the backend reports nothing
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub duration: Option<f64>,
}

pub struct DownloadManager {
    gate: Arc<AdmissionGate>,
    pool: WorkerPool,
}

impl DownloadManager {
    pub fn new(concurrent_downloads: usize) -> Self {
        Self {
            gate: Arc::new(AdmissionGate::default()),
            pool: WorkerPool::new(concurrent_downloads),
        }
    }

    /// Makes sure there is one worker per allowed concurrent download.
    pub fn resize(&self, concurrent_downloads: usize) {
        self.pool.ensure_workers(concurrent_downloads);
        log::debug!("{} download workers available", self.pool.worker_count());
    }

    pub fn in_flight(&self) -> usize {
        self.gate.in_flight()
    }

    /// Admits the download and queues it on a worker, or rejects it right away.
    ///
    /// `on_done` runs on the worker once the admission slot has been released.
    pub fn submit<F>(
        &self,
        limit: usize,
        backend: Arc<dyn MediaBackend>,
        storage: SharedStorage,
        job: DownloadJob,
        on_done: F,
    ) -> Result<(), CoreError>
    where
        F: FnOnce(Result<DownloadOutcome, CoreError>) + Send + 'static,
    {
        let permit = self.gate.try_acquire(limit)?;
        log::info!(
            "download of {} admitted ({} in flight)",
            job.external_id,
            self.gate.in_flight()
        );

        self.pool
            .execute(move || {
                let result = perform(backend.as_ref(), &storage, &job);
                drop(permit);
                match &result {
                    Ok(outcome) => log::info!(
                        "downloaded {} to {}",
                        job.external_id,
                        outcome.file_path.to_string_lossy()
                    ),
                    Err(e) => log::error!("download of {} failed: {e}", job.external_id),
                }
                on_done(result);
            })
            .map_err(|e| match e {
                PoolError::Saturated => CoreError::ConcurrencyLimit,
                PoolError::ShutDown => CoreError::WorkersUnavailable,
            })
    }
}

/// Downloads and transcodes one track, then records it.
pub fn perform(
    backend: &dyn MediaBackend,
    storage: &SharedStorage,
    job: &DownloadJob,
) -> Result<DownloadOutcome, CoreError> {
    let codec = job.quality.codec();
    let media = backend.download(&DownloadRequest {
        external_id: job.external_id.clone(),
        output_dir: job.output_dir.clone(),
        quality: job.quality,
        embed_metadata: job.embed_metadata,
    })?;

    let file_path = with_codec_extension(&media.file_path, codec.extension());
    let fields = TrackFields {
        title: media
            .title
            .or_else(|| job.title.clone())
            .unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
        artist: media
            .uploader
            .or_else(|| job.uploader.clone())
            .unwrap_or_else(|| UNKNOWN_ARTIST.to_string()),
        duration_secs: duration_secs(media.duration.or(job.duration)),
    };

    let mut storage = storage::lock(storage)?;
    let track_id = storage.upsert_track(&job.external_id, &fields)?;
    storage.record_download(
        track_id,
        &file_path,
        file_size_or_zero(&file_path),
        &job.quality.label(),
    )?;

    Ok(DownloadOutcome {
        track_id,
        file_path,
        title: fields.title,
        artist: fields.artist,
    })
}
