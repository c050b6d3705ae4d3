pub mod schema;
pub mod search;

use anyhow::Result;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::scanner::ImageMetadata;
use crate::sidecar::ImageDescription;

pub use schema::{DROP_TABLES, SCHEMA, SCHEMA_VERSION};
pub use search::ImageFilter;

/// A person recognized in an image, as stored in `image_people` and the
/// denormalized `people_json` column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonTag {
    pub name: String,
    pub confidence: Option<f64>,
}

/// An object label with how many detections of it the image had.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectTag {
    pub label: String,
    pub count: i64,
    pub confidence: Option<f64>,
}

/// A scene classification for an image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneTag {
    pub scene: String,
    pub confidence: Option<f64>,
}

/// One image ready for insertion, assembled by the scanner from the file,
/// its EXIF data, and its sidecar annotations.
#[derive(Debug, Clone, Default)]
pub struct NewImage {
    pub path: String,
    pub filename: String,
    pub directory: String,
    pub size_bytes: i64,
    pub modified_at: Option<String>,
    pub image_data: Option<Vec<u8>>,
    pub metadata: Option<ImageMetadata>,
    pub description: Option<ImageDescription>,
    pub keywords: Vec<String>,
    pub people: Vec<PersonTag>,
    pub objects: Vec<ObjectTag>,
    pub scenes: Vec<SceneTag>,
}

/// Full image row as returned by lookups and searches.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImageRecord {
    pub id: i64,
    pub path: String,
    pub filename: String,
    pub directory: String,
    pub size_bytes: i64,
    pub modified_at: Option<String>,
    pub indexed_at: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub focal_length: Option<f64>,
    pub f_number: Option<f64>,
    pub exposure_time: Option<String>,
    pub iso: Option<i64>,
    pub taken_at: Option<String>,
    pub gps_latitude: Option<f64>,
    pub gps_longitude: Option<f64>,
    pub gps_altitude: Option<f64>,
    pub short_description: Option<String>,
    pub long_description: Option<String>,
    pub picture_type: Option<String>,
    pub mood: Option<String>,
    pub style: Option<String>,
    pub has_nudity: bool,
    pub has_explicit_content: bool,
    pub keywords_json: Option<String>,
    pub people_json: Option<String>,
    pub objects_json: Option<String>,
    pub scenes_json: Option<String>,
}

impl ImageRecord {
    /// Keywords parsed back out of the denormalized column.
    pub fn keywords(&self) -> Vec<String> {
        self.keywords_json
            .as_deref()
            .and_then(|json| serde_json::from_str(json).ok())
            .unwrap_or_default()
    }

    pub fn people(&self) -> Vec<PersonTag> {
        self.people_json
            .as_deref()
            .and_then(|json| serde_json::from_str(json).ok())
            .unwrap_or_default()
    }

    pub fn objects(&self) -> Vec<ObjectTag> {
        self.objects_json
            .as_deref()
            .and_then(|json| serde_json::from_str(json).ok())
            .unwrap_or_default()
    }

    pub fn scenes(&self) -> Vec<SceneTag> {
        self.scenes_json
            .as_deref()
            .and_then(|json| serde_json::from_str(json).ok())
            .unwrap_or_default()
    }
}

/// Row counts for the whole store.
#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    pub images: i64,
    pub keywords: i64,
    pub people: i64,
    pub objects: i64,
    pub scenes: i64,
    pub schema_version: Option<i64>,
}

const IMAGE_COLUMNS: &str = "id, path, filename, directory, size_bytes, modified_at, indexed_at, \
     width, height, camera_make, camera_model, focal_length, f_number, exposure_time, iso, \
     taken_at, gps_latitude, gps_longitude, gps_altitude, \
     short_description, long_description, picture_type, mood, style, \
     has_nudity, has_explicit_content, \
     keywords_json, people_json, objects_json, scenes_json";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", true)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        self.stamp_version()?;
        Ok(())
    }

    /// Drop and recreate every table. The store has no incremental update
    /// path; each index run starts from nothing.
    pub fn rebuild(&self) -> Result<()> {
        for table in DROP_TABLES {
            self.conn
                .execute_batch(&format!("DROP TABLE IF EXISTS {};", table))?;
        }
        self.initialize()
    }

    fn stamp_version(&self) -> Result<()> {
        self.conn.execute("DELETE FROM image_schema_version", [])?;
        self.conn.execute(
            "INSERT INTO image_schema_version (version) VALUES (?)",
            [SCHEMA_VERSION],
        )?;
        Ok(())
    }

    /// Version stamp of an existing store. A missing table or missing row
    /// reads as unversioned, which callers treat as "needs rebuild".
    pub fn schema_version(&self) -> Option<i64> {
        self.conn
            .query_row("SELECT version FROM image_schema_version", [], |row| {
                row.get(0)
            })
            .ok()
    }

    /// Insert a batch of images in one transaction. The normalized child
    /// rows and the denormalized JSON columns are derived from the same
    /// in-memory data, so the two views cannot drift apart.
    pub fn insert_images(&mut self, rows: &[NewImage]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        for row in rows {
            insert_one(&tx, row)?;
        }
        tx.commit()?;
        Ok(rows.len())
    }

    pub fn get_image(&self, path: &str) -> Result<Option<ImageRecord>> {
        let sql = format!("SELECT {} FROM images WHERE path = ?", IMAGE_COLUMNS);
        let result = self
            .conn
            .query_row(&sql, [path], |row| row_to_record(row));
        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn count_images(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn stats(&self) -> Result<IndexStats> {
        let count = |table: &str| -> Result<i64> {
            let n = self.conn.query_row(
                &format!("SELECT COUNT(*) FROM {}", table),
                [],
                |row| row.get(0),
            )?;
            Ok(n)
        };
        Ok(IndexStats {
            images: count("images")?,
            keywords: count("image_keywords")?,
            people: count("image_people")?,
            objects: count("image_objects")?,
            scenes: count("image_scenes")?,
            schema_version: self.schema_version(),
        })
    }
}

fn insert_one(tx: &rusqlite::Transaction<'_>, row: &NewImage) -> Result<()> {
    let meta = row.metadata.clone().unwrap_or_default();
    let desc = row.description.clone().unwrap_or_default();

    let keywords_json = to_json_column(&row.keywords)?;
    let people_json = to_json_column(&row.people)?;
    let objects_json = to_json_column(&row.objects)?;
    let scenes_json = to_json_column(&row.scenes)?;

    tx.execute(
        r#"
        INSERT INTO images (
            path, filename, directory, size_bytes, modified_at, image_data,
            width, height,
            camera_make, camera_model, focal_length, f_number, exposure_time, iso,
            taken_at, gps_latitude, gps_longitude, gps_altitude,
            short_description, long_description, picture_type, mood, style,
            has_nudity, has_explicit_content,
            keywords_json, people_json, objects_json, scenes_json
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        rusqlite::params![
            row.path,
            row.filename,
            row.directory,
            row.size_bytes,
            row.modified_at,
            row.image_data,
            meta.width,
            meta.height,
            meta.camera_make,
            meta.camera_model,
            meta.focal_length,
            meta.f_number,
            meta.exposure_time,
            meta.iso,
            meta.taken_at,
            meta.gps_latitude,
            meta.gps_longitude,
            meta.gps_altitude,
            desc.short_description,
            desc.long_description,
            desc.picture_type,
            desc.mood,
            desc.style,
            desc.has_nudity,
            desc.has_explicit_content,
            keywords_json,
            people_json,
            objects_json,
            scenes_json,
        ],
    )?;

    let image_id = tx.last_insert_rowid();

    for keyword in &row.keywords {
        tx.execute(
            "INSERT INTO image_keywords (image_id, keyword) VALUES (?, ?)",
            rusqlite::params![image_id, keyword],
        )?;
    }
    for person in &row.people {
        tx.execute(
            "INSERT INTO image_people (image_id, person, confidence) VALUES (?, ?, ?)",
            rusqlite::params![image_id, person.name, person.confidence],
        )?;
    }
    for object in &row.objects {
        tx.execute(
            "INSERT INTO image_objects (image_id, label, count, confidence) VALUES (?, ?, ?, ?)",
            rusqlite::params![image_id, object.label, object.count, object.confidence],
        )?;
    }
    for scene in &row.scenes {
        tx.execute(
            "INSERT INTO image_scenes (image_id, scene, confidence) VALUES (?, ?, ?)",
            rusqlite::params![image_id, scene.scene, scene.confidence],
        )?;
    }

    Ok(())
}

fn to_json_column<T: Serialize>(values: &[T]) -> Result<Option<String>> {
    if values.is_empty() {
        Ok(None)
    } else {
        Ok(Some(serde_json::to_string(values)?))
    }
}

pub(crate) fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ImageRecord> {
    Ok(ImageRecord {
        id: row.get(0)?,
        path: row.get(1)?,
        filename: row.get(2)?,
        directory: row.get(3)?,
        size_bytes: row.get(4)?,
        modified_at: row.get(5)?,
        indexed_at: row.get(6)?,
        width: row.get(7)?,
        height: row.get(8)?,
        camera_make: row.get(9)?,
        camera_model: row.get(10)?,
        focal_length: row.get(11)?,
        f_number: row.get(12)?,
        exposure_time: row.get(13)?,
        iso: row.get(14)?,
        taken_at: row.get(15)?,
        gps_latitude: row.get(16)?,
        gps_longitude: row.get(17)?,
        gps_altitude: row.get(18)?,
        short_description: row.get(19)?,
        long_description: row.get(20)?,
        picture_type: row.get(21)?,
        mood: row.get(22)?,
        style: row.get(23)?,
        has_nudity: row.get::<_, i64>(24)? != 0,
        has_explicit_content: row.get::<_, i64>(25)? != 0,
        keywords_json: row.get(26)?,
        people_json: row.get(27)?,
        objects_json: row.get(28)?,
        scenes_json: row.get(29)?,
    })
}
