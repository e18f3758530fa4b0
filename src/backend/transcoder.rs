//! Locating the bundled transcoder binary

use std::path::{Path, PathBuf};

#[cfg(target_os = "windows")]
const FFMPEG_BINARY: &str = "ffmpeg.exe";
#[cfg(not(target_os = "windows"))]
const FFMPEG_BINARY: &str = "ffmpeg";

/// Picks the transcoder the extraction backend should use.
///
/// Order: configured path, `<exe dir>/../executables`, `<exe dir>`, then whatever is on PATH.
pub fn locate_ffmpeg(configured: Option<&Path>) -> PathBuf {
    if let Some(path) = configured {
        return path.to_path_buf();
    }

    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));

    match exe_dir {
        Some(dir) => locate_near(&dir),
        None => PathBuf::from(FFMPEG_BINARY),
    }
}

fn locate_near(exe_dir: &Path) -> PathBuf {
    let mut candidates = Vec::new();
    if let Some(parent) = exe_dir.parent() {
        candidates.push(parent.join("executables").join(FFMPEG_BINARY));
    }
    candidates.push(exe_dir.join(FFMPEG_BINARY));

    candidates
        .into_iter()
        .find(|candidate| candidate.is_file())
        .unwrap_or_else(|| PathBuf::from(FFMPEG_BINARY))
}
