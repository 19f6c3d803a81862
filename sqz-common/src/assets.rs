//! Asset file listing and naming helpers
//!
//! Sounds and images are paired by base name: `cat.mp3` belongs to `cat.webp`.

use crate::{Error, Result};
use std::path::Path;
use tracing::debug;

/// File names that are never treated as assets
const IGNORED_FILES: &[&str] = &[".DS_Store", ".keep"];

/// Whether a directory entry is a listable asset with the given extension.
///
/// Hidden files and known placeholder files are excluded.
pub fn is_listable(file_name: &str, extension: &str) -> bool {
    if file_name.starts_with('.') || IGNORED_FILES.contains(&file_name) {
        return false;
    }
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

/// Base name of an asset reference, without directories or extension.
///
/// `"/sound/cat.mp3"` → `"cat"`
pub fn base_name(asset_ref: &str) -> &str {
    let file = asset_ref.rsplit('/').next().unwrap_or(asset_ref);
    match file.rfind('.') {
        Some(0) | None => file,
        Some(dot) => &file[..dot],
    }
}

/// List asset file names in `dir` with the given extension, sorted.
pub async fn list_assets(dir: &Path, extension: &str) -> Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound(format!("asset directory {}", dir.display()))
        } else {
            Error::Io(e)
        }
    })?;

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if is_listable(&name, extension) {
            files.push(name);
        }
    }
    files.sort();

    debug!("Listed {} .{} assets in {}", files.len(), extension, dir.display());
    Ok(files)
}
