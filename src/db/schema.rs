/// Bumped whenever the DDL below changes shape. The stamp row written at
/// initialization is compared against this on open; a mismatch forces a
/// rebuild of the whole store.
pub const SCHEMA_VERSION: i64 = 1;

pub const SCHEMA: &str = r#"
-- Images table: one row per indexed file
CREATE TABLE IF NOT EXISTS images (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,
    filename TEXT NOT NULL,
    directory TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    modified_at TEXT,
    indexed_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,

    -- Optional embedded copy of the file itself
    image_data BLOB,

    -- Dimensions
    width INTEGER,
    height INTEGER,

    -- EXIF data
    camera_make TEXT,
    camera_model TEXT,
    focal_length REAL,
    f_number REAL,
    exposure_time TEXT,
    iso INTEGER,
    taken_at TEXT,
    gps_latitude REAL,
    gps_longitude REAL,
    gps_altitude REAL,

    -- AI-derived content
    short_description TEXT,
    long_description TEXT,
    picture_type TEXT,
    mood TEXT,
    style TEXT,
    has_nudity INTEGER NOT NULL DEFAULT 0,
    has_explicit_content INTEGER NOT NULL DEFAULT 0,

    -- Denormalized copies of the child tables for fast redisplay
    keywords_json TEXT,
    people_json TEXT,
    objects_json TEXT,
    scenes_json TEXT
);

CREATE INDEX IF NOT EXISTS idx_images_directory ON images(directory);
CREATE INDEX IF NOT EXISTS idx_images_taken_at ON images(taken_at);
CREATE INDEX IF NOT EXISTS idx_images_mood ON images(mood);
CREATE INDEX IF NOT EXISTS idx_images_style ON images(style);
CREATE INDEX IF NOT EXISTS idx_images_picture_type ON images(picture_type);

-- Keywords: normalized rows for indexed search, one keyword per row
CREATE TABLE IF NOT EXISTS image_keywords (
    image_id INTEGER NOT NULL,
    keyword TEXT NOT NULL,
    FOREIGN KEY (image_id) REFERENCES images(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_image_keywords_keyword ON image_keywords(keyword);
CREATE INDEX IF NOT EXISTS idx_image_keywords_image ON image_keywords(image_id);

-- People recognized in the image
CREATE TABLE IF NOT EXISTS image_people (
    image_id INTEGER NOT NULL,
    person TEXT NOT NULL,
    confidence REAL,
    FOREIGN KEY (image_id) REFERENCES images(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_image_people_person ON image_people(person);
CREATE INDEX IF NOT EXISTS idx_image_people_image ON image_people(image_id);

-- Detected objects, one row per label with detection count
CREATE TABLE IF NOT EXISTS image_objects (
    image_id INTEGER NOT NULL,
    label TEXT NOT NULL,
    count INTEGER NOT NULL DEFAULT 1,
    confidence REAL,
    FOREIGN KEY (image_id) REFERENCES images(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_image_objects_label ON image_objects(label);
CREATE INDEX IF NOT EXISTS idx_image_objects_image ON image_objects(image_id);

-- Scene classifications
CREATE TABLE IF NOT EXISTS image_scenes (
    image_id INTEGER NOT NULL,
    scene TEXT NOT NULL,
    confidence REAL,
    FOREIGN KEY (image_id) REFERENCES images(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_image_scenes_scene ON image_scenes(scene);
CREATE INDEX IF NOT EXISTS idx_image_scenes_image ON image_scenes(image_id);

-- Single-row version stamp, rewritten on every rebuild
CREATE TABLE IF NOT EXISTS image_schema_version (
    version INTEGER NOT NULL
);
"#;

/// Tables dropped when the store is rebuilt. Children first so the drop
/// also works with foreign key enforcement on.
pub const DROP_TABLES: &[&str] = &[
    "image_keywords",
    "image_people",
    "image_objects",
    "image_scenes",
    "image_schema_version",
    "images",
];
