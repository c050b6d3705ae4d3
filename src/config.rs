use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub scanner: ScannerConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub detector: DetectorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lumidex")
        .join("index.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Library roots indexed when no directory is given on the command line.
    #[serde(default)]
    pub roots: Vec<PathBuf>,

    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,

    /// Store a copy of each file's bytes in the images table.
    #[serde(default)]
    pub embed_images: bool,
}

fn default_image_extensions() -> Vec<String> {
    vec![
        "jpg".to_string(),
        "jpeg".to_string(),
        "png".to_string(),
        "gif".to_string(),
        "webp".to_string(),
        "bmp".to_string(),
        "tiff".to_string(),
    ]
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            image_extensions: default_image_extensions(),
            embed_images: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_llm_endpoint() -> String {
    "http://127.0.0.1:1234/v1".to_string()
}

fn default_llm_model() -> String {
    "gemma-3-4b".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            model: default_llm_model(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    #[serde(default = "default_detector_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

fn default_detector_endpoint() -> String {
    "http://127.0.0.1:32168".to_string()
}

fn default_min_confidence() -> f64 {
    0.4
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            endpoint: default_detector_endpoint(),
            min_confidence: default_min_confidence(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            // Create default config
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lumidex")
    }

    fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.scanner.image_extensions.contains(&"jpg".to_string()));
        assert!(!config.scanner.embed_images);
        assert_eq!(config.detector.min_confidence, 0.4);
        assert!(config.llm.endpoint.starts_with("http://"));
    }

    #[test]
    fn test_partial_toml_fills_in_defaults() {
        let config: Config = toml::from_str(
            r#"
            [scanner]
            roots = ["/photos"]
            embed_images = true
            "#,
        )
        .unwrap();
        assert_eq!(config.scanner.roots, vec![PathBuf::from("/photos")]);
        assert!(config.scanner.embed_images);
        assert_eq!(config.llm.model, default_llm_model());
    }

    #[test]
    fn test_load_from_creates_default_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.detector.min_confidence, 0.4);

        // Second load parses what the first wrote
        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.llm.endpoint, config.llm.endpoint);
    }
}
