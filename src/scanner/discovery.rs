use anyhow::Result;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Recursively find image files under `root` by extension. Sidecar files
/// are never picked up here: their `.json` suffix keeps them outside any
/// sensible extension list.
pub fn discover_images(root: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let wanted: Vec<String> = extensions.iter().map(|e| e.to_lowercase()).collect();
    let mut images = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(ext) = path.extension() else {
            continue;
        };
        let ext = ext.to_string_lossy().to_lowercase();
        if wanted.iter().any(|w| *w == ext) {
            images.push(path.to_path_buf());
        }
    }

    // Sort by path for consistent ordering
    images.sort();

    Ok(images)
}
