//! Extraction backend implemented by shelling out to `yt-dlp`

use std::{
    ffi::OsString,
    path::PathBuf,
    process::{Command, Stdio},
};

use serde::Deserialize;

use crate::backend::{
    DownloadRequest, DownloadedMedia, ExtractionError, MediaBackend, ResolvedStream, SearchEntry,
};

const WATCH_URL: &str = "https://www.youtube.com/watch?v=";
const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

pub struct YtDlp {
    program: PathBuf,
    ffmpeg: PathBuf,
}

#[derive(Deserialize)]
struct FlatPlaylist {
    #[serde(default)]
    entries: Vec<Option<FlatEntry>>,
}

#[derive(Deserialize)]
struct FlatEntry {
    id: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
}

#[derive(Deserialize)]
struct InfoDict {
    url: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    artist: Option<String>,
    uploader: Option<String>,
    thumbnail: Option<String>,
    filename: Option<String>,
    #[serde(rename = "_filename")]
    legacy_filename: Option<String>,
    #[serde(default)]
    requested_downloads: Vec<RequestedDownload>,
}

#[derive(Deserialize)]
struct RequestedDownload {
    filepath: Option<String>,
}

impl YtDlp {
    pub fn new(program: impl Into<PathBuf>, ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ffmpeg: ffmpeg.into(),
        }
    }

    fn watch_url(external_id: &str) -> String {
        format!("{WATCH_URL}{external_id}")
    }

    fn base_args(&self) -> Vec<OsString> {
        vec![
            "--dump-single-json".into(),
            "--quiet".into(),
            "--no-warnings".into(),
            "--no-progress".into(),
            "--ffmpeg-location".into(),
            self.ffmpeg.clone().into_os_string(),
        ]
    }

    fn search_args(&self, query: &str, limit: usize) -> Vec<OsString> {
        let mut args = self.base_args();
        args.push("--flat-playlist".into());
        args.push(format!("ytsearch{limit}:{query}").into());
        args
    }

    fn stream_args(&self, external_id: &str, format_selector: &str) -> Vec<OsString> {
        let mut args = self.base_args();
        args.extend([
            "--skip-download".into(),
            "--format".into(),
            format_selector.into(),
            Self::watch_url(external_id).into(),
        ]);
        args
    }

    fn download_args(&self, request: &DownloadRequest) -> Vec<OsString> {
        let codec = request.quality.codec();
        let mut args = self.base_args();
        args.extend([
            "--no-simulate".into(),
            "--format".into(),
            "bestaudio/best".into(),
            "--extract-audio".into(),
            "--audio-format".into(),
            codec.extension().into(),
            "--audio-quality".into(),
            request.quality.transcoder_quality().into(),
            "--output".into(),
            request.output_dir.join(OUTPUT_TEMPLATE).into_os_string(),
        ]);
        if request.embed_metadata {
            args.extend([
                "--write-thumbnail".into(),
                "--embed-thumbnail".into(),
                "--embed-metadata".into(),
            ]);
        }
        args.push(Self::watch_url(&request.external_id).into());
        args
    }

    fn run(&self, args: Vec<OsString>) -> Result<Vec<u8>, ExtractionError> {
        log::debug!("running {} {:?}", self.program.to_string_lossy(), args);

        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()?;

        if !output.status.success() {
            return Err(ExtractionError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

fn parse_search(json: &[u8]) -> Result<Vec<SearchEntry>, ExtractionError> {
    let playlist: FlatPlaylist = serde_json::from_slice(json)?;
    Ok(playlist
        .entries
        .into_iter()
        .flatten()
        .map(|entry| SearchEntry {
            id: entry.id,
            title: entry.title,
            duration: entry.duration,
            uploader: entry.uploader,
        })
        .collect())
}

fn parse_stream(json: &[u8]) -> Result<ResolvedStream, ExtractionError> {
    let info: InfoDict = serde_json::from_slice(json)?;
    Ok(ResolvedStream {
        url: info.url.ok_or(ExtractionError::MissingField("url"))?,
        title: info.title,
        duration: info.duration,
        artist: info.artist,
        uploader: info.uploader,
        thumbnail: info.thumbnail,
    })
}

/// The reported path may still carry the pre-conversion extension.
fn parse_download(json: &[u8]) -> Result<DownloadedMedia, ExtractionError> {
    let info: InfoDict = serde_json::from_slice(json)?;
    let reported = info
        .requested_downloads
        .into_iter()
        .find_map(|download| download.filepath)
        .or(info.filename)
        .or(info.legacy_filename)
        .ok_or(ExtractionError::MissingField("filename"))?;

    Ok(DownloadedMedia {
        file_path: PathBuf::from(reported),
        title: info.title,
        uploader: info.uploader,
        duration: info.duration,
    })
}

impl MediaBackend for YtDlp {
    fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchEntry>, ExtractionError> {
        parse_search(&self.run(self.search_args(query, limit))?)
    }

    fn resolve_stream(
        &self,
        external_id: &str,
        format_selector: &str,
    ) -> Result<ResolvedStream, ExtractionError> {
        parse_stream(&self.run(self.stream_args(external_id, format_selector))?)
    }

    fn download(&self, request: &DownloadRequest) -> Result<DownloadedMedia, ExtractionError> {
        let stdout = self.run(self.download_args(request))?;
        parse_download(&stdout)
    }
}
