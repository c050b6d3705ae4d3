//! Writes AI sidecar files for a library directory.
//!
//! Each image gets up to four sidecars (description, people, objects,
//! scenes). Existing sidecars are kept unless `force` is set. A failure on
//! one file never aborts the run; an unreachable service stops further
//! calls to that service but the other one keeps going.

use anyhow::Result;
use std::path::Path;

use crate::ai::{DetectorClient, ServiceError, VisionClient};
use crate::config::Config;
use crate::scanner::discover_images;
use crate::sidecar::{self, SidecarKind};

#[derive(Debug, Clone, Copy, Default)]
pub struct AnnotateResult {
    pub images: usize,
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct Annotator {
    vision: VisionClient,
    detector: DetectorClient,
    extensions: Vec<String>,
}

impl Annotator {
    pub fn new(config: &Config) -> Self {
        Self {
            vision: VisionClient::from_config(&config.llm),
            detector: DetectorClient::from_config(&config.detector),
            extensions: config.scanner.image_extensions.clone(),
        }
    }

    pub fn annotate_directory(&self, root: &Path, force: bool) -> Result<AnnotateResult> {
        let images = discover_images(root, &self.extensions)?;
        let mut result = AnnotateResult {
            images: images.len(),
            ..Default::default()
        };

        let mut vision_down = false;
        let mut detector_down = false;

        for (index, image) in images.iter().enumerate() {
            tracing::debug!(
                current = index + 1,
                total = images.len(),
                path = %image.display(),
                "Annotating"
            );

            if !vision_down {
                vision_down = self.write_description(image, force, &mut result);
            }
            if !detector_down {
                detector_down = self.write_detections(image, force, &mut result);
            }
            if vision_down && detector_down {
                tracing::error!("All annotation services unreachable, stopping");
                break;
            }
        }

        Ok(result)
    }

    /// Returns true when the vision endpoint turned out to be unreachable.
    fn write_description(&self, image: &Path, force: bool, result: &mut AnnotateResult) -> bool {
        if !force && sidecar::has_sidecar(image, SidecarKind::Description) {
            result.skipped += 1;
            return false;
        }
        match self.vision.describe_image(image) {
            Ok(description) => match sidecar::store_description(image, &description) {
                Ok(()) => result.written += 1,
                Err(e) => {
                    result.failed += 1;
                    tracing::error!(path = %image.display(), error = %e, "Failed to write sidecar");
                }
            },
            Err(ServiceError::Unreachable { endpoint, source }) => {
                tracing::error!(endpoint = %endpoint, error = %source, "Vision service unreachable");
                result.failed += 1;
                return true;
            }
            Err(e) => {
                result.failed += 1;
                tracing::error!(path = %image.display(), error = %e, "Description failed");
            }
        }
        false
    }

    /// Returns true when the detector endpoint turned out to be unreachable.
    fn write_detections(&self, image: &Path, force: bool, result: &mut AnnotateResult) -> bool {
        if self.detect_one(image, force, SidecarKind::People, result) {
            return true;
        }
        if self.detect_one(image, force, SidecarKind::Objects, result) {
            return true;
        }
        self.detect_one(image, force, SidecarKind::Scenes, result)
    }

    fn detect_one(
        &self,
        image: &Path,
        force: bool,
        kind: SidecarKind,
        result: &mut AnnotateResult,
    ) -> bool {
        if !force && sidecar::has_sidecar(image, kind) {
            result.skipped += 1;
            return false;
        }

        let outcome = match kind {
            SidecarKind::People => self
                .detector
                .recognize_faces(image)
                .and_then(|people| store(sidecar::store_people(image, &people))),
            SidecarKind::Objects => self
                .detector
                .detect_objects(image)
                .and_then(|objects| store(sidecar::store_objects(image, &objects))),
            SidecarKind::Scenes => self
                .detector
                .classify_scene(image)
                .and_then(|scene| store(sidecar::store_scene(image, &scene))),
            SidecarKind::Description => return false,
        };

        match outcome {
            Ok(()) => result.written += 1,
            Err(ServiceError::Unreachable { endpoint, source }) => {
                tracing::error!(endpoint = %endpoint, error = %source, "Detector unreachable");
                result.failed += 1;
                return true;
            }
            Err(e) => {
                result.failed += 1;
                tracing::error!(path = %image.display(), kind = kind.suffix(), error = %e, "Detection failed");
            }
        }
        false
    }
}

fn store(result: Result<()>) -> std::result::Result<(), ServiceError> {
    result.map_err(|e| ServiceError::BadPayload(format!("sidecar write failed: {}", e)))
}
