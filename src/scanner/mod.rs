pub mod discovery;
pub mod metadata;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::Config;
use crate::db::{NewImage, ObjectTag, PersonTag, SceneTag};
use crate::sidecar::{self, DetectedObject};

pub use discovery::discover_images;
pub use metadata::{extract_metadata, ImageMetadata};

/// Walks a library root and assembles insert-ready rows from each file's
/// metadata and sidecar annotations.
pub struct Scanner {
    config: Config,
}

impl Scanner {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn collect(&self, root: &Path) -> Result<Vec<NewImage>> {
        let paths = discover_images(root, &self.config.scanner.image_extensions)?;
        tracing::info!(root = %root.display(), found = paths.len(), "Collecting image metadata");

        let rows: Vec<NewImage> = paths
            .par_iter()
            .filter_map(|path| match self.collect_single(path) {
                Ok(row) => Some(row),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable file");
                    None
                }
            })
            .collect();

        Ok(rows)
    }

    fn collect_single(&self, path: &Path) -> Result<NewImage> {
        let file_meta = std::fs::metadata(path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let directory = path
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default();
        let modified_at = file_meta
            .modified()
            .ok()
            .map(|t| DateTime::<Utc>::from(t).to_rfc3339());

        let metadata = extract_metadata(path).ok();

        let description = sidecar::load_description(path);
        let keywords = description
            .as_ref()
            .map(|d| d.keywords.clone())
            .unwrap_or_default();
        let people = sidecar::load_people(path)
            .map(|p| {
                p.faces
                    .into_iter()
                    .map(|face| PersonTag {
                        name: face.name,
                        confidence: Some(face.confidence),
                    })
                    .collect()
            })
            .unwrap_or_default();
        let objects = sidecar::load_objects(path)
            .map(|o| tally_objects(o.objects))
            .unwrap_or_default();
        let scenes = sidecar::load_scene(path)
            .filter(|s| !s.scene.is_empty())
            .map(|s| {
                vec![SceneTag {
                    scene: s.scene,
                    confidence: s.confidence,
                }]
            })
            .unwrap_or_default();

        let image_data = if self.config.scanner.embed_images {
            std::fs::read(path).ok()
        } else {
            None
        };

        Ok(NewImage {
            path: path.to_string_lossy().to_string(),
            filename,
            directory,
            size_bytes: file_meta.len() as i64,
            modified_at,
            image_data,
            metadata,
            description,
            keywords,
            people,
            objects,
            scenes,
        })
    }
}

/// Collapse raw detections into one row per label, keeping the detection
/// count and the highest confidence seen for that label.
fn tally_objects(detections: Vec<DetectedObject>) -> Vec<ObjectTag> {
    let mut tally: BTreeMap<String, (i64, f64)> = BTreeMap::new();
    for detection in detections {
        let entry = tally.entry(detection.label).or_insert((0, 0.0));
        entry.0 += 1;
        if detection.confidence > entry.1 {
            entry.1 = detection.confidence;
        }
    }
    tally
        .into_iter()
        .map(|(label, (count, confidence))| ObjectTag {
            label,
            count,
            confidence: Some(confidence),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sidecar::{ImageDescription, ObjectsSidecar, PeopleSidecar, RecognizedFace};
    use tempfile::tempdir;

    fn test_config(dir: &Path) -> Config {
        let mut config = Config::default();
        config.database.path = dir.join("index.db");
        config
    }

    #[test]
    fn test_tally_objects_groups_by_label() {
        let detections = vec![
            DetectedObject {
                label: "dog".to_string(),
                confidence: 0.6,
            },
            DetectedObject {
                label: "dog".to_string(),
                confidence: 0.9,
            },
            DetectedObject {
                label: "ball".to_string(),
                confidence: 0.5,
            },
        ];
        let tags = tally_objects(detections);
        assert_eq!(tags.len(), 2);

        let dog = tags.iter().find(|t| t.label == "dog").unwrap();
        assert_eq!(dog.count, 2);
        assert_eq!(dog.confidence, Some(0.9));
    }

    #[test]
    fn test_collect_folds_in_sidecars() {
        let dir = tempdir().unwrap();
        let image = dir.path().join("dog.jpg");
        std::fs::write(&image, b"fake image bytes").unwrap();

        sidecar::store_description(
            &image,
            &ImageDescription {
                short_description: Some("A dog in a park".to_string()),
                keywords: vec!["dog".to_string(), "park".to_string()],
                ..Default::default()
            },
        )
        .unwrap();
        sidecar::store_people(
            &image,
            &PeopleSidecar {
                count: 1,
                faces: vec![RecognizedFace {
                    name: "Carol".to_string(),
                    confidence: 0.88,
                }],
            },
        )
        .unwrap();
        sidecar::store_objects(
            &image,
            &ObjectsSidecar {
                count: 1,
                objects: vec![DetectedObject {
                    label: "dog".to_string(),
                    confidence: 0.95,
                }],
            },
        )
        .unwrap();

        let scanner = Scanner::new(test_config(dir.path()));
        let rows = scanner.collect(dir.path()).unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.filename, "dog.jpg");
        assert_eq!(row.keywords, vec!["dog", "park"]);
        assert_eq!(row.people[0].name, "Carol");
        assert_eq!(row.objects[0].label, "dog");
        assert!(row.scenes.is_empty());
        assert!(row.image_data.is_none());
    }

    #[test]
    fn test_collect_embeds_bytes_when_configured() {
        let dir = tempdir().unwrap();
        let image = dir.path().join("tiny.png");
        std::fs::write(&image, b"png bytes").unwrap();

        let mut config = test_config(dir.path());
        config.scanner.embed_images = true;

        let scanner = Scanner::new(config);
        let rows = scanner.collect(dir.path()).unwrap();

        assert_eq!(rows[0].image_data.as_deref(), Some(&b"png bytes"[..]));
    }

    #[test]
    fn test_collect_without_sidecars_yields_bare_row() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("bare.jpg"), b"x").unwrap();

        let scanner = Scanner::new(test_config(dir.path()));
        let rows = scanner.collect(dir.path()).unwrap();

        assert_eq!(rows.len(), 1);
        assert!(rows[0].description.is_none());
        assert!(rows[0].keywords.is_empty());
        assert!(rows[0].people.is_empty());
    }
}
