//! Bulk loading of the image store.
//!
//! The store has no incremental path: every run drops the tables and
//! reloads from the filesystem, then stamps the schema version. Queries go
//! through [`ensure_index`], which rebuilds a missing or stale store once
//! before the search runs.

use anyhow::{bail, Result};
use std::path::PathBuf;

use crate::config::Config;
use crate::db::{Database, SCHEMA_VERSION};
use crate::scanner::Scanner;

#[derive(Debug, Clone, Copy, Default)]
pub struct IndexReport {
    pub roots: usize,
    pub indexed: usize,
}

/// Destroy and rebuild the whole store from the given roots.
pub fn rebuild_index(config: &Config, roots: &[PathBuf]) -> Result<IndexReport> {
    let mut db = Database::open(&config.database.path)?;
    db.rebuild()?;

    let scanner = Scanner::new(config.clone());
    let mut report = IndexReport {
        roots: roots.len(),
        ..Default::default()
    };

    for root in roots {
        let rows = scanner.collect(root)?;
        let inserted = db.insert_images(&rows)?;
        report.indexed += inserted;
        tracing::info!(root = %root.display(), rows = inserted, "Indexed root");
    }

    Ok(report)
}

/// Open the store for querying. A missing file or a version stamp that
/// does not match the current schema triggers one rebuild from the
/// configured roots; the caller's query then proceeds against the fresh
/// store.
pub fn ensure_index(config: &Config) -> Result<Database> {
    let path = &config.database.path;

    if path.exists() {
        let db = Database::open(path)?;
        if db.schema_version() == Some(SCHEMA_VERSION) {
            return Ok(db);
        }
        tracing::warn!(path = %path.display(), "Index version stamp mismatch, rebuilding");
    } else {
        tracing::info!(path = %path.display(), "No index found, building");
    }

    if config.scanner.roots.is_empty() {
        bail!(
            "no usable index at {} and no scanner.roots configured to build one",
            path.display()
        );
    }
    rebuild_index(config, &config.scanner.roots)?;
    Database::open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config_with_library(db_dir: &std::path::Path, library: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.database.path = db_dir.join("index.db");
        config.scanner.roots = vec![library.to_path_buf()];
        config
    }

    #[test]
    fn test_rebuild_index_loads_all_roots() {
        let dir = tempdir().unwrap();
        let library = dir.path().join("library");
        std::fs::create_dir(&library).unwrap();
        std::fs::write(library.join("a.jpg"), b"a").unwrap();
        std::fs::write(library.join("b.png"), b"b").unwrap();

        let config = config_with_library(dir.path(), &library);
        let report = rebuild_index(&config, &config.scanner.roots).unwrap();

        assert_eq!(report.roots, 1);
        assert_eq!(report.indexed, 2);

        let db = Database::open(&config.database.path).unwrap();
        assert_eq!(db.count_images().unwrap(), 2);
    }

    #[test]
    fn test_rebuild_replaces_previous_contents() {
        let dir = tempdir().unwrap();
        let library = dir.path().join("library");
        std::fs::create_dir(&library).unwrap();
        std::fs::write(library.join("a.jpg"), b"a").unwrap();

        let config = config_with_library(dir.path(), &library);
        rebuild_index(&config, &config.scanner.roots).unwrap();

        std::fs::remove_file(library.join("a.jpg")).unwrap();
        std::fs::write(library.join("b.jpg"), b"b").unwrap();
        rebuild_index(&config, &config.scanner.roots).unwrap();

        let db = Database::open(&config.database.path).unwrap();
        assert_eq!(db.count_images().unwrap(), 1);
        assert!(db.get_image(library.join("a.jpg").to_str().unwrap()).unwrap().is_none());
    }

    #[test]
    fn test_ensure_index_builds_when_missing() {
        let dir = tempdir().unwrap();
        let library = dir.path().join("library");
        std::fs::create_dir(&library).unwrap();
        std::fs::write(library.join("a.jpg"), b"a").unwrap();

        let config = config_with_library(dir.path(), &library);
        let db = ensure_index(&config).unwrap();
        assert_eq!(db.count_images().unwrap(), 1);
    }

    #[test]
    fn test_ensure_index_rebuilds_on_version_mismatch() {
        let dir = tempdir().unwrap();
        let library = dir.path().join("library");
        std::fs::create_dir(&library).unwrap();
        std::fs::write(library.join("a.jpg"), b"a").unwrap();

        let config = config_with_library(dir.path(), &library);
        rebuild_index(&config, &config.scanner.roots).unwrap();

        // Tamper with the stamp the way an old binary would have left it
        {
            let db = Database::open(&config.database.path).unwrap();
            db.conn()
                .execute("UPDATE image_schema_version SET version = version + 1", [])
                .unwrap();
        }

        let db = ensure_index(&config).unwrap();
        assert_eq!(db.schema_version(), Some(SCHEMA_VERSION));
        assert_eq!(db.count_images().unwrap(), 1);
    }

    #[test]
    fn test_ensure_index_fails_without_roots() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.database.path = dir.path().join("index.db");
        config.scanner.roots.clear();

        assert!(ensure_index(&config).is_err());
    }
}
