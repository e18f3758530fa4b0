//! Routes decoded lines to the core operations
//!
//! Requests are handled one at a time in input order. Only downloads leave the
//! loop: they are answered from a worker once they finish.

use std::{
    io::BufRead,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    config::DownloadSettingsUpdate,
    context::AppContext,
    domain::{
        quality::{DownloadQuality, StreamQuality},
        track::TrackDescriptor,
    },
    download::DownloadJob,
    error::CoreError,
    ipc::{
        protocol::{self, Command, Incoming, Request, Response, decode_params},
        sink::ResponseSink,
    },
    media::{self, DEFAULT_SEARCH_LIMIT},
};

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    query: String,
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct StreamParams {
    video_id: String,
    quality: Option<String>,
}

#[derive(Deserialize)]
struct DownloadParams {
    video_id: String,
    /// `"flac"`, a bitrate as string or number
    #[serde(default)]
    quality: Value,
    /// overrides the `embedMetadata` setting for this download
    #[serde(rename = "embedMetadata", alias = "embed_metadata")]
    embed_metadata: Option<bool>,
    title: Option<String>,
    uploader: Option<String>,
    duration: Option<f64>,
}

#[derive(Deserialize)]
struct DirectoriesParams {
    download_directory: Option<PathBuf>,
    database_directory: Option<PathBuf>,
}

#[derive(Deserialize)]
struct SettingsParams {
    #[serde(default)]
    settings: DownloadSettingsUpdate,
}

#[derive(Deserialize)]
struct CoverParams {
    url: String,
    video_id: String,
}

fn download_quality(token: &Value) -> Result<DownloadQuality, CoreError> {
    match token {
        Value::Null => Ok(DownloadQuality::default()),
        Value::String(s) => DownloadQuality::parse(s),
        Value::Number(n) => DownloadQuality::parse(&n.to_string()),
        other => Err(CoreError::InvalidRequest(format!(
            "unsupported download quality {other}"
        ))),
    }
}

/// Empty strings from the host mean "unchanged".
fn non_empty(path: Option<&PathBuf>) -> Option<&Path> {
    path.filter(|p| !p.as_os_str().is_empty())
        .map(PathBuf::as_path)
}

pub struct Dispatcher {
    ctx: AppContext,
    sink: ResponseSink,
}

impl Dispatcher {
    pub fn new(ctx: AppContext, sink: ResponseSink) -> Self {
        Self { ctx, sink }
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    /// Serves lines from `input` until it is closed.
    ///
    /// Undecodable lines are skipped; only a failing read ends the loop early.
    pub fn run(&mut self, mut input: impl BufRead) -> std::io::Result<()> {
        let mut line = Vec::new();
        loop {
            line.clear();
            if input.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            self.handle_bytes(&line);
        }
        log::info!("input closed, shutting down");
        Ok(())
    }

    pub fn handle_line(&mut self, line: &str) {
        self.handle_bytes(line.as_bytes());
    }

    fn handle_bytes(&mut self, line: &[u8]) {
        let line = line.trim_ascii();
        if line.is_empty() {
            return;
        }

        match protocol::parse_bytes(line) {
            Ok(Incoming::Request(request)) => self.handle_request(request),
            Ok(Incoming::Command(command)) => self.handle_command(command),
            Err(e) => log::debug!("skipping input line: {e}"),
        }
    }

    fn handle_request(&mut self, request: Request) {
        let action = request.action_name();
        let Request {
            request_id, params, ..
        } = request;
        log::debug!("request {request_id}: {action}");

        let result = match action.as_str() {
            "search" => self.search(params),
            "get_stream_url" => self.get_stream_url(params),
            "download_track" => match self.download_track(&request_id, params) {
                // answered by the worker
                Ok(()) => return,
                Err(e) => Err(e),
            },
            "resolve_metadata" => self.resolve_metadata(params),
            "update_directories" => self.update_directories(params),
            "update_download_settings" => self.update_download_settings(params),
            "download_cover" => self.download_cover(params),
            other => Err(CoreError::UnknownAction(other.to_string())),
        };

        if let Err(e) = &result {
            log::error!("{action} failed: {e}");
        }
        self.sink.send(&Response::from_result(request_id, result));
    }

    fn handle_command(&mut self, command: Command) {
        log::debug!("command: {}", command.name);

        let result = match command.name.as_str() {
            "update_directories" => self.update_directories(command.body).map(|_| ()),
            "update_download_settings" => self.update_download_settings(command.body).map(|_| ()),
            "clear_cache" => {
                self.ctx.clear_cache();
                Ok(())
            }
            other => Err(CoreError::UnknownAction(other.to_string())),
        };

        if let Err(e) = result {
            log::error!("command {} failed: {e}", command.name);
        }
    }

    fn search(&self, params: Value) -> Result<Value, CoreError> {
        let params: SearchParams = decode_params(params)?;
        let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
        let results = media::search(self.ctx.backend.as_ref(), &params.query, limit)?;
        Ok(json!(results))
    }

    fn get_stream_url(&self, params: Value) -> Result<Value, CoreError> {
        let params: StreamParams = decode_params(params)?;
        let quality = params
            .quality
            .as_deref()
            .map(StreamQuality::parse)
            .unwrap_or_default();
        let info = media::get_stream_url(
            self.ctx.backend.as_ref(),
            &self.ctx.storage,
            &params.video_id,
            quality,
        )?;
        Ok(json!(info))
    }

    fn download_track(&self, request_id: &Value, params: Value) -> Result<(), CoreError> {
        let params: DownloadParams = decode_params(params)?;
        let settings = self.ctx.settings();
        let job = DownloadJob {
            quality: download_quality(&params.quality)?,
            external_id: params.video_id,
            embed_metadata: params.embed_metadata.unwrap_or(settings.embed_metadata),
            output_dir: self.ctx.paths().download_dir.clone(),
            title: params.title,
            uploader: params.uploader,
            duration: params.duration,
        };

        let sink = self.sink.clone();
        let request_id = request_id.clone();
        self.ctx.submit_download(job, move |result| {
            sink.send(&Response::from_result(request_id, result));
        })
    }

    fn resolve_metadata(&self, params: Value) -> Result<Value, CoreError> {
        let descriptor: TrackDescriptor = decode_params(params)?;
        Ok(json!(self.ctx.resolve_metadata(&descriptor)?))
    }

    fn update_directories(&mut self, params: Value) -> Result<Value, CoreError> {
        let params: DirectoriesParams = decode_params(params)?;
        self.ctx.update_directories(
            non_empty(params.download_directory.as_ref()),
            non_empty(params.database_directory.as_ref()),
        )?;

        let paths = self.ctx.paths();
        Ok(json!({
            "download_dir": paths.download_dir,
            "db_path": paths.db_path,
        }))
    }

    fn update_download_settings(&mut self, params: Value) -> Result<Value, CoreError> {
        let params: SettingsParams = decode_params(params)?;
        let settings = self.ctx.update_download_settings(&params.settings)?;
        Ok(json!({ "settings": settings }))
    }

    fn download_cover(&self, params: Value) -> Result<Value, CoreError> {
        let params: CoverParams = decode_params(params)?;
        let path = self.ctx.download_cover(&params.url, &params.video_id)?;
        Ok(json!({ "path": path }))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Arc,
        thread,
        time::{Duration, Instant},
    };

    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::{
        context::tests::{test_context, test_context_with},
        download::tests::FakeDownloads,
        ipc::sink::SharedBuffer,
        storage::{self, db::DATABASE_FILE_NAME},
    };

    fn dispatcher(ctx: AppContext) -> (Dispatcher, SharedBuffer) {
        let buffer = SharedBuffer::default();
        let dispatcher = Dispatcher::new(ctx, ResponseSink::new(buffer.clone()));
        (dispatcher, buffer)
    }

    fn wait_for_lines(buffer: &SharedBuffer, count: usize) -> Vec<Value> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let lines = buffer.lines();
            if lines.len() >= count || Instant::now() > deadline {
                return lines;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn unknown_action_is_answered_with_error() {
        let tmp = TempDir::new().unwrap();
        let (mut dispatcher, buffer) = dispatcher(test_context(&tmp));

        dispatcher.handle_line(r#"{"request_id": 3, "action": "dance", "params": {}}"#);

        assert_eq!(
            buffer.lines(),
            vec![json!({"request_id": 3, "status": "error", "error": "Unknown action: dance"})]
        );
    }

    #[test]
    fn non_string_action_is_answered_with_error() {
        let tmp = TempDir::new().unwrap();
        let (mut dispatcher, buffer) = dispatcher(test_context(&tmp));

        dispatcher.handle_line(r#"{"request_id": 7, "action": 5, "params": {}}"#);
        dispatcher.handle_line(r#"{"request_id": 8, "params": {}}"#);

        let lines = buffer.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            json!({"request_id": 7, "status": "error", "error": "Unknown action: 5"})
        );
        assert_eq!(lines[1]["request_id"], 8);
        assert_eq!(lines[1]["status"], "error");
    }

    #[test]
    fn invalid_utf8_line_does_not_stop_the_loop() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let (mut dispatcher, buffer) = dispatcher(test_context(&tmp));
        let mut input = b"\xff\xfe garbage\n".to_vec();
        input.extend_from_slice(
            br#"{"request_id": 1, "action": "search", "params": {"query": "x"}}"#,
        );
        input.push(b'\n');

        dispatcher.run(input.as_slice())?;

        let lines = buffer.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["request_id"], 1);
        assert_eq!(lines[0]["status"], "success");
        Ok(())
    }

    #[test]
    fn download_request_can_override_embedding() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let backend = Arc::new(FakeDownloads::new(tmp.path().join("music")));
        let (mut dispatcher, buffer) =
            dispatcher(test_context_with(&tmp, Arc::clone(&backend)));

        dispatcher.handle_line(
            r#"{"request_id": 1, "action": "download_track", "params": {"video_id": "vid1", "embedMetadata": false}}"#,
        );
        wait_for_lines(&buffer, 1);
        dispatcher.handle_line(
            r#"{"request_id": 2, "action": "download_track", "params": {"video_id": "vid2"}}"#,
        );
        let lines = wait_for_lines(&buffer, 2);
        assert_eq!(lines.len(), 2);

        let requests = backend.requests.lock().unwrap();
        let embedded: Vec<_> = requests
            .iter()
            .map(|r| (r.external_id.as_str(), r.embed_metadata))
            .collect();
        assert_eq!(embedded, vec![("vid1", false), ("vid2", true)]);
        Ok(())
    }

    #[test]
    fn malformed_lines_and_commands_get_no_response() {
        let tmp = TempDir::new().unwrap();
        let (mut dispatcher, buffer) = dispatcher(test_context(&tmp));

        dispatcher.handle_line("{oops");
        dispatcher.handle_line("");
        dispatcher.handle_line(r#"{"command": "clear_cache"}"#);
        dispatcher.handle_line(r#"{"command": "reboot"}"#);

        assert!(buffer.lines().is_empty());
    }

    #[test]
    fn requests_are_answered_in_order() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let (mut dispatcher, buffer) = dispatcher(test_context(&tmp));
        let input = [
            r#"{"request_id": 1, "action": "search", "params": {"query": "x"}}"#,
            r#"{"request_id": 2, "action": "resolve_metadata", "params": {"title": "Song", "uploader": "Chan"}}"#,
            r#"{"request_id": 3, "action": "get_stream_url", "params": {}}"#,
        ]
        .join("\n");

        dispatcher.run(input.as_bytes())?;

        let lines = buffer.lines();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["request_id"], 1);
        assert_eq!(lines[0]["data"], json!([]));
        assert_eq!(lines[1]["data"]["artist"], "Chan");
        assert_eq!(lines[1]["data"]["album"], Value::Null);
        assert_eq!(lines[2]["status"], "error");
        Ok(())
    }

    #[test]
    fn download_is_answered_from_the_worker() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let (mut dispatcher, buffer) = dispatcher(test_context(&tmp));

        dispatcher.handle_line(
            r#"{"request_id": 9, "action": "download_track", "params": {"video_id": "vid1", "quality": "FLAC"}}"#,
        );

        let lines = wait_for_lines(&buffer, 1);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["request_id"], 9);
        assert_eq!(lines[0]["status"], "success");
        assert!(lines[0]["data"]["file_path"].as_str().unwrap().ends_with(".flac"));
        assert_eq!(lines[0]["data"]["title"], "Backend Title vid1");

        let deadline = Instant::now() + Duration::from_secs(5);
        while dispatcher.context().downloads_in_flight() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(dispatcher.context().downloads_in_flight(), 0);
        Ok(())
    }

    #[test]
    fn numeric_bitrate_and_bad_quality() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let backend = Arc::new(FakeDownloads::new(tmp.path().join("music")));
        let (mut dispatcher, buffer) = dispatcher(test_context_with(&tmp, backend));

        dispatcher.handle_line(
            r#"{"request_id": 1, "action": "download_track", "params": {"video_id": "vid1", "quality": "loud"}}"#,
        );
        let lines = buffer.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["status"], "error");

        dispatcher.handle_line(
            r#"{"request_id": 2, "action": "download_track", "params": {"video_id": "vid2", "quality": 128}}"#,
        );
        let lines = wait_for_lines(&buffer, 2);
        assert_eq!(lines[1]["request_id"], 2);
        assert!(lines[1]["data"]["file_path"].as_str().unwrap().ends_with(".mp3"));

        let track_id = lines[1]["data"]["track_id"].as_i64().unwrap();
        let download = storage::lock(&dispatcher.context().storage)?
            .find_download(crate::domain::track::TrackId(track_id))?
            .unwrap();
        assert_eq!(download.quality, "128kbps");
        Ok(())
    }

    #[test]
    fn download_over_the_limit_is_rejected_immediately() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let (release_tx, release_rx) = crossbeam_channel::unbounded();
        let mut backend = FakeDownloads::new(tmp.path().join("music"));
        backend.release = Some(release_rx);
        let (mut dispatcher, buffer) = dispatcher(test_context_with(&tmp, Arc::new(backend)));

        dispatcher.handle_line(
            r#"{"command": "update_download_settings", "settings": {"concurrentDownloads": 1}}"#,
        );
        dispatcher.handle_line(
            r#"{"request_id": 1, "action": "download_track", "params": {"video_id": "vid1"}}"#,
        );
        dispatcher.handle_line(
            r#"{"request_id": 2, "action": "download_track", "params": {"video_id": "vid2"}}"#,
        );

        let lines = buffer.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["request_id"], 2);
        assert_eq!(
            lines[0]["error"],
            "Concurrent download limit reached. Please wait for active downloads to complete."
        );

        release_tx.send(())?;
        let lines = wait_for_lines(&buffer, 2);
        assert_eq!(lines[1]["request_id"], 1);
        assert_eq!(lines[1]["status"], "success");
        Ok(())
    }

    #[test]
    fn settings_update_returns_merged_settings() {
        let tmp = TempDir::new().unwrap();
        let (mut dispatcher, buffer) = dispatcher(test_context(&tmp));

        dispatcher.handle_line(
            r#"{"request_id": 1, "action": "update_download_settings", "params": {"settings": {"embedMetadata": false}}}"#,
        );
        dispatcher.handle_line(
            r#"{"request_id": 2, "action": "update_download_settings", "params": {"settings": {"concurrentDownloads": 11}}}"#,
        );

        let lines = buffer.lines();
        assert_eq!(
            lines[0]["data"]["settings"],
            json!({"autoDownload": false, "concurrentDownloads": 3, "embedMetadata": false})
        );
        assert_eq!(lines[1]["status"], "error");
        assert!(!dispatcher.context().settings().embed_metadata);
        assert_eq!(dispatcher.context().settings().concurrent_downloads, 3);
    }

    #[test]
    fn directories_update_reports_new_paths() {
        let tmp = TempDir::new().unwrap();
        let (mut dispatcher, buffer) = dispatcher(test_context(&tmp));
        let music = tmp.path().join("new-music");
        let db_dir = tmp.path().join("new-db");

        let request = json!({
            "request_id": 5,
            "action": "update_directories",
            "params": {"download_directory": music, "database_directory": db_dir},
        });
        dispatcher.handle_line(&request.to_string());

        let lines = buffer.lines();
        assert_eq!(lines[0]["data"]["download_dir"], json!(music));
        assert_eq!(lines[0]["data"]["db_path"], json!(db_dir.join(DATABASE_FILE_NAME)));
        assert!(music.is_dir());
    }

    #[test]
    fn directories_command_is_applied_silently() {
        let tmp = TempDir::new().unwrap();
        let (mut dispatcher, buffer) = dispatcher(test_context(&tmp));
        let music = tmp.path().join("cmd-music");

        let command = json!({"command": "update_directories", "download_directory": music});
        dispatcher.handle_line(&command.to_string());

        assert!(buffer.lines().is_empty());
        assert_eq!(dispatcher.context().paths().download_dir, music);
    }

    #[test]
    fn cover_is_cached_under_the_cache_dir() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let (mut dispatcher, buffer) = dispatcher(test_context(&tmp));

        dispatcher.handle_line(
            r#"{"request_id": 4, "action": "download_cover", "params": {"url": "https://img/x.jpg", "video_id": "vid1"}}"#,
        );

        let lines = buffer.lines();
        let path = PathBuf::from(lines[0]["data"]["path"].as_str().unwrap());
        assert!(path.ends_with("covers/vid1.jpg"));
        assert_eq!(std::fs::read(path)?, b"jpeg");
        Ok(())
    }

    #[test]
    fn failing_download_still_answers_and_releases() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let (mut dispatcher, buffer) = dispatcher(test_context(&tmp));

        dispatcher.handle_line(
            r#"{"request_id": 1, "action": "download_track", "params": {"video_id": "fail1"}}"#,
        );

        let lines = wait_for_lines(&buffer, 1);
        assert_eq!(lines[0]["status"], "error");
        assert!(lines[0]["error"].as_str().unwrap().contains("video unavailable"));

        let deadline = Instant::now() + Duration::from_secs(5);
        while dispatcher.context().downloads_in_flight() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(dispatcher.context().downloads_in_flight(), 0);
        Ok(())
    }
}
