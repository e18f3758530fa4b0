//! Contract of the media-extraction backend

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::quality::DownloadQuality;

pub mod transcoder;
pub mod ytdlp;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to run extraction backend: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("extraction backend failed ({status}): {stderr}")]
    Failed { status: String, stderr: String },

    #[error("invalid extraction backend output: {0}")]
    InvalidOutput(#[from] serde_json::Error),

    #[error("extraction backend output is missing '{0}'")]
    MissingField(&'static str),
}

/// A flat search hit, as reported by the backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchEntry {
    pub id: Option<String>,
    pub title: Option<String>,
    pub duration: Option<f64>,
    pub uploader: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedStream {
    pub url: String,
    pub title: Option<String>,
    pub duration: Option<f64>,
    pub artist: Option<String>,
    pub uploader: Option<String>,
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    pub external_id: String,
    pub output_dir: PathBuf,
    pub quality: DownloadQuality,
    /// fetch the thumbnail and embed metadata and artwork into the output file
    pub embed_metadata: bool,
}

/// What the backend reports after downloading and transcoding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadedMedia {
    pub file_path: PathBuf,
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub duration: Option<f64>,
}

/// Turns queries and media ids into search hits, stream URLs and local files.
///
/// Every call blocks until the backend is done.
pub trait MediaBackend: Send + Sync {
    fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchEntry>, ExtractionError>;

    fn resolve_stream(
        &self,
        external_id: &str,
        format_selector: &str,
    ) -> Result<ResolvedStream, ExtractionError>;

    fn download(&self, request: &DownloadRequest) -> Result<DownloadedMedia, ExtractionError>;
}
