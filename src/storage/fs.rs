//! On-disk side of the store: cached cover images and the cache directory

use walkdir::WalkDir;

use std::path::{Path, PathBuf};

use crate::{error::CoreError, storage::error::StorageError};

pub const COVERS_DIR: &str = "covers";

/// Size of the file at `path`, or 0 when it is missing or unreadable.
pub fn file_size_or_zero(path: &Path) -> u64 {
    std::fs::metadata(path)
        .map(|meta| if meta.is_file() { meta.len() } else { 0 })
        .unwrap_or(0)
}

/// Replaces the extension of a backend-reported output path with the codec's one.
pub fn with_codec_extension(path: &Path, extension: &str) -> PathBuf {
    path.with_extension(extension)
}

/// Path of the cached cover of `external_id`, which must be a plain file name stem.
pub fn cover_path(cache_dir: &Path, external_id: &str) -> Result<PathBuf, CoreError> {
    let plain = !external_id.is_empty()
        && !external_id.contains("..")
        && !external_id.contains(['/', '\\', '\0']);
    if !plain {
        return Err(CoreError::InvalidRequest(format!(
            "invalid video id for a cover: {external_id:?}"
        )));
    }
    Ok(cache_dir.join(COVERS_DIR).join(format!("{external_id}.jpg")))
}

/// Returns the cached cover of `external_id`, fetching it first if it is not on disk yet.
pub fn cache_cover_image<F>(
    cache_dir: &Path,
    external_id: &str,
    fetch: F,
) -> Result<PathBuf, CoreError>
where
    F: FnOnce() -> Result<Vec<u8>, CoreError>,
{
    let path = cover_path(cache_dir, external_id)?;
    if path.is_file() {
        log::debug!("cover for {external_id} already cached");
        return Ok(path);
    }

    let bytes = fetch()?;

    let write = || -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // a half-written file must never look like a cached cover
        let partial = path.with_extension("jpg.part");
        std::fs::write(&partial, &bytes)?;
        std::fs::rename(&partial, &path)
    };
    write().map_err(StorageError::Fs)?;

    Ok(path)
}

/// Deletes everything below `dir`, best effort per entry.
///
/// Returns the number of top-level entries removed.
pub fn clear_dir(dir: &Path) -> usize {
    if !dir.is_dir() {
        return 0;
    }

    let dir_str = dir.to_string_lossy();
    let entries = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| match e {
            Ok(e) => Some(e),
            Err(err) => {
                log::warn!("error while listing {dir_str}, skipping an entry: {err}");
                None
            }
        })
        .collect::<Vec<_>>();

    let mut removed = 0;
    for entry in entries {
        let path = entry.path();
        let result = if entry.file_type().is_dir() {
            std::fs::remove_dir_all(path)
        } else {
            std::fs::remove_file(path)
        };
        match result {
            Ok(()) => removed += 1,
            Err(err) => {
                log::warn!("failed to delete cache item {}: {err}", path.to_string_lossy())
            }
        }
    }
    removed
}
