//! Per-image JSON companion files holding AI-derived annotations.
//!
//! A sidecar lives next to its source file and is named
//! `<image>:<kind>.json`, e.g. `beach.jpg:people.json`. The annotate
//! pipeline writes them; the bulk loader folds them into the index. A
//! sidecar that fails to parse is treated as absent so one corrupt file
//! never aborts an index run.

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidecarKind {
    Description,
    People,
    Objects,
    Scenes,
}

impl SidecarKind {
    pub fn suffix(&self) -> &'static str {
        match self {
            SidecarKind::Description => "description",
            SidecarKind::People => "people",
            SidecarKind::Objects => "objects",
            SidecarKind::Scenes => "scenes",
        }
    }
}

/// LLM-derived description of an image. Missing fields deserialize to their
/// defaults so older sidecars keep loading after the shape grows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageDescription {
    pub short_description: Option<String>,
    pub long_description: Option<String>,
    pub keywords: Vec<String>,
    pub picture_type: Option<String>,
    pub mood: Option<String>,
    pub style: Option<String>,
    pub has_nudity: bool,
    pub has_explicit_content: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizedFace {
    pub name: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PeopleSidecar {
    pub count: usize,
    pub faces: Vec<RecognizedFace>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedObject {
    pub label: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectsSidecar {
    pub count: usize,
    pub objects: Vec<DetectedObject>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneSidecar {
    pub scene: String,
    pub confidence: Option<f64>,
}

/// Companion path for an image's sidecar of the given kind.
pub fn sidecar_path(image_path: &Path, kind: SidecarKind) -> PathBuf {
    let mut name: OsString = image_path.as_os_str().to_os_string();
    name.push(format!(":{}.json", kind.suffix()));
    PathBuf::from(name)
}

pub fn has_sidecar(image_path: &Path, kind: SidecarKind) -> bool {
    sidecar_path(image_path, kind).exists()
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read sidecar");
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Unparseable sidecar, ignoring");
            None
        }
    }
}

fn store_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}

pub fn load_description(image_path: &Path) -> Option<ImageDescription> {
    load_json(&sidecar_path(image_path, SidecarKind::Description))
}

pub fn store_description(image_path: &Path, description: &ImageDescription) -> Result<()> {
    store_json(&sidecar_path(image_path, SidecarKind::Description), description)
}

pub fn load_people(image_path: &Path) -> Option<PeopleSidecar> {
    load_json(&sidecar_path(image_path, SidecarKind::People))
}

pub fn store_people(image_path: &Path, people: &PeopleSidecar) -> Result<()> {
    store_json(&sidecar_path(image_path, SidecarKind::People), people)
}

pub fn load_objects(image_path: &Path) -> Option<ObjectsSidecar> {
    load_json(&sidecar_path(image_path, SidecarKind::Objects))
}

pub fn store_objects(image_path: &Path, objects: &ObjectsSidecar) -> Result<()> {
    store_json(&sidecar_path(image_path, SidecarKind::Objects), objects)
}

pub fn load_scene(image_path: &Path) -> Option<SceneSidecar> {
    load_json(&sidecar_path(image_path, SidecarKind::Scenes))
}

pub fn store_scene(image_path: &Path, scene: &SceneSidecar) -> Result<()> {
    store_json(&sidecar_path(image_path, SidecarKind::Scenes), scene)
}
