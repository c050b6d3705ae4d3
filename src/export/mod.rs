use anyhow::Result;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::db::search::search;
use crate::db::{Database, ImageFilter, ImageRecord};

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "json" => Some(ExportFormat::Json),
            "csv" => Some(ExportFormat::Csv),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExportFormat::Json => "JSON",
            ExportFormat::Csv => "CSV",
        }
    }
}

/// Flattened image row for export
#[derive(Debug, Serialize)]
pub struct ExportedImage {
    pub path: String,
    pub filename: String,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub size_bytes: i64,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub taken_at: Option<String>,
    pub gps_latitude: Option<f64>,
    pub gps_longitude: Option<f64>,
    pub gps_altitude: Option<f64>,
    pub short_description: Option<String>,
    pub picture_type: Option<String>,
    pub mood: Option<String>,
    pub style: Option<String>,
    pub has_nudity: bool,
    pub has_explicit_content: bool,
    pub keywords: String,
    pub people: String,
    pub objects: String,
    pub scenes: String,
    pub indexed_at: Option<String>,
}

impl From<&ImageRecord> for ExportedImage {
    fn from(record: &ImageRecord) -> Self {
        Self {
            path: record.path.clone(),
            filename: record.filename.clone(),
            width: record.width,
            height: record.height,
            size_bytes: record.size_bytes,
            camera_make: record.camera_make.clone(),
            camera_model: record.camera_model.clone(),
            taken_at: record.taken_at.clone(),
            gps_latitude: record.gps_latitude,
            gps_longitude: record.gps_longitude,
            gps_altitude: record.gps_altitude,
            short_description: record.short_description.clone(),
            picture_type: record.picture_type.clone(),
            mood: record.mood.clone(),
            style: record.style.clone(),
            has_nudity: record.has_nudity,
            has_explicit_content: record.has_explicit_content,
            keywords: record.keywords().join("; "),
            people: record
                .people()
                .iter()
                .map(|p| p.name.clone())
                .collect::<Vec<_>>()
                .join("; "),
            objects: record
                .objects()
                .iter()
                .map(|o| o.label.clone())
                .collect::<Vec<_>>()
                .join("; "),
            scenes: record
                .scenes()
                .iter()
                .map(|s| s.scene.clone())
                .collect::<Vec<_>>()
                .join("; "),
            indexed_at: record.indexed_at.clone(),
        }
    }
}

/// Export matching images to a file. An empty filter exports the whole
/// index.
pub fn export_images(
    db: &Database,
    filter: &ImageFilter,
    output_path: &Path,
    format: ExportFormat,
) -> Result<usize> {
    if filter.is_empty() {
        tracing::debug!("No filters given, exporting the entire index");
    }
    let records = search(db, filter)?;
    let rows: Vec<ExportedImage> = records.iter().map(ExportedImage::from).collect();

    match format {
        ExportFormat::Json => export_json(&rows, output_path)?,
        ExportFormat::Csv => export_csv(&rows, output_path)?,
    }

    Ok(rows.len())
}

fn export_json(rows: &[ExportedImage], output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(rows)?;
    let mut file = File::create(output_path)?;
    file.write_all(json.as_bytes())?;
    Ok(())
}

fn export_csv(rows: &[ExportedImage], output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewImage, PersonTag};
    use tempfile::tempdir;

    fn test_db() -> Database {
        let mut db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        let row = NewImage {
            path: "/photos/pier.jpg".to_string(),
            filename: "pier.jpg".to_string(),
            directory: "/photos".to_string(),
            size_bytes: 42,
            keywords: vec!["pier".to_string(), "sea".to_string()],
            people: vec![PersonTag {
                name: "Dana".to_string(),
                confidence: Some(0.8),
            }],
            ..Default::default()
        };
        db.insert_images(&[row]).unwrap();
        db
    }

    #[test]
    fn test_format_from_name() {
        assert_eq!(ExportFormat::from_name("json"), Some(ExportFormat::Json));
        assert_eq!(ExportFormat::from_name("CSV"), Some(ExportFormat::Csv));
        assert_eq!(ExportFormat::from_name("xml"), None);
    }

    #[test]
    fn test_export_json() {
        let db = test_db();
        let dir = tempdir().unwrap();
        let out = dir.path().join("index.json");

        let count =
            export_images(&db, &ImageFilter::default(), &out, ExportFormat::Json).unwrap();
        assert_eq!(count, 1);

        let content = std::fs::read_to_string(&out).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed[0]["filename"], "pier.jpg");
        assert_eq!(parsed[0]["keywords"], "pier; sea");
    }

    #[test]
    fn test_export_csv_has_header_and_row() {
        let db = test_db();
        let dir = tempdir().unwrap();
        let out = dir.path().join("index.csv");

        let count = export_images(&db, &ImageFilter::default(), &out, ExportFormat::Csv).unwrap();
        assert_eq!(count, 1);

        let content = std::fs::read_to_string(&out).unwrap();
        let mut lines = content.lines();
        assert!(lines.next().unwrap().starts_with("path,filename"));
        assert!(lines.next().unwrap().contains("Dana"));
    }

    #[test]
    fn test_export_respects_filter() {
        let db = test_db();
        let dir = tempdir().unwrap();
        let out = dir.path().join("none.json");

        let filter = ImageFilter {
            keywords: vec!["mountain".to_string()],
            ..Default::default()
        };
        let count = export_images(&db, &filter, &out, ExportFormat::Json).unwrap();
        assert_eq!(count, 0);
    }
}
