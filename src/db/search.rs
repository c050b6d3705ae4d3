//! Translation of named filter predicates into a single parameterized
//! SELECT over the image store.
//!
//! Patterns use shell-style wildcards: `*` matches any run of characters,
//! `?` matches a single character. Within a predicate list the patterns are
//! OR-ed (any match includes the image); across predicates the clauses are
//! AND-ed. Child-table predicates go through EXISTS subqueries so the
//! normalized rows are what gets searched, not the denormalized JSON.

use anyhow::Result;
use rusqlite::ToSql;

use super::{row_to_record, Database, ImageRecord};

/// Search predicates. Every field is optional; the default filter matches
/// every image in the store.
#[derive(Debug, Clone, Default)]
pub struct ImageFilter {
    pub keywords: Vec<String>,
    pub people: Vec<String>,
    pub objects: Vec<String>,
    pub scenes: Vec<String>,
    pub path_patterns: Vec<String>,
    pub picture_type: Option<String>,
    pub mood: Option<String>,
    pub style: Option<String>,
    pub description: Option<String>,
    pub has_nudity: Option<bool>,
    pub has_explicit: Option<bool>,
    pub min_width: Option<i64>,
    pub min_height: Option<i64>,
    pub taken_after: Option<String>,
    pub taken_before: Option<String>,
    pub limit: Option<usize>,
}

impl ImageFilter {
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
            && self.people.is_empty()
            && self.objects.is_empty()
            && self.scenes.is_empty()
            && self.path_patterns.is_empty()
            && self.picture_type.is_none()
            && self.mood.is_none()
            && self.style.is_none()
            && self.description.is_none()
            && self.has_nudity.is_none()
            && self.has_explicit.is_none()
            && self.min_width.is_none()
            && self.min_height.is_none()
            && self.taken_after.is_none()
            && self.taken_before.is_none()
    }
}

/// Convert a shell-style wildcard pattern to a SQL LIKE pattern. Literal
/// `%`, `_` and `\` in the input are escaped so they only match themselves;
/// queries built here always carry `ESCAPE '\'`.
pub fn wildcard_to_like(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for ch in pattern.chars() {
        match ch {
            '*' => out.push('%'),
            '?' => out.push('_'),
            '%' | '_' | '\\' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Accumulates WHERE clauses and their bound values. Parameter names are
/// generated from a counter so no two bindings can collide, no matter how
/// many patterns a predicate list carries.
struct QueryBuilder {
    clauses: Vec<String>,
    params: Vec<(String, Box<dyn ToSql>)>,
    counter: usize,
}

impl QueryBuilder {
    fn new() -> Self {
        Self {
            clauses: Vec::new(),
            params: Vec::new(),
            counter: 0,
        }
    }

    fn bind<T: ToSql + 'static>(&mut self, value: T) -> String {
        self.counter += 1;
        let name = format!(":p{}", self.counter);
        self.params.push((name.clone(), Box::new(value)));
        name
    }

    /// AND-ed clause matching when any pattern hits a child-table row for
    /// this image.
    fn any_child_match(&mut self, table: &str, column: &str, patterns: &[String]) {
        if patterns.is_empty() {
            return;
        }
        let alternatives: Vec<String> = patterns
            .iter()
            .map(|pattern| {
                let name = self.bind(wildcard_to_like(pattern));
                format!(
                    "EXISTS (SELECT 1 FROM {table} WHERE {table}.image_id = images.id \
                     AND {table}.{column} LIKE {name} ESCAPE '\\')",
                    table = table,
                    column = column,
                    name = name,
                )
            })
            .collect();
        self.clauses.push(format!("({})", alternatives.join(" OR ")));
    }

    /// AND-ed clause matching when any pattern hits a scalar column.
    fn any_column_match(&mut self, column: &str, patterns: &[String]) {
        if patterns.is_empty() {
            return;
        }
        let alternatives: Vec<String> = patterns
            .iter()
            .map(|pattern| {
                let name = self.bind(wildcard_to_like(pattern));
                format!("{} LIKE {} ESCAPE '\\'", column, name)
            })
            .collect();
        self.clauses.push(format!("({})", alternatives.join(" OR ")));
    }

    fn column_match(&mut self, column: &str, pattern: &str) {
        let name = self.bind(wildcard_to_like(pattern));
        self.clauses
            .push(format!("{} LIKE {} ESCAPE '\\'", column, name));
    }

    fn flag(&mut self, column: &str, value: bool) {
        self.clauses
            .push(format!("{} = {}", column, if value { 1 } else { 0 }));
    }

    fn compare<T: ToSql + 'static>(&mut self, column: &str, op: &str, value: T) {
        let name = self.bind(value);
        self.clauses.push(format!("{} {} {}", column, op, name));
    }

    fn into_query(mut self, filter: &ImageFilter) -> (String, Vec<(String, Box<dyn ToSql>)>) {
        let mut sql = format!("SELECT {} FROM images", super::IMAGE_COLUMNS);
        if !self.clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY path");
        if let Some(limit) = filter.limit {
            let name = self.bind(limit as i64);
            sql.push_str(&format!(" LIMIT {}", name));
        }
        (sql, self.params)
    }
}

fn build_query(filter: &ImageFilter) -> (String, Vec<(String, Box<dyn ToSql>)>) {
    let mut builder = QueryBuilder::new();

    builder.any_child_match("image_keywords", "keyword", &filter.keywords);
    builder.any_child_match("image_people", "person", &filter.people);
    builder.any_child_match("image_objects", "label", &filter.objects);
    builder.any_child_match("image_scenes", "scene", &filter.scenes);
    builder.any_column_match("path", &filter.path_patterns);

    if let Some(ref pattern) = filter.picture_type {
        builder.column_match("picture_type", pattern);
    }
    if let Some(ref pattern) = filter.mood {
        builder.column_match("mood", pattern);
    }
    if let Some(ref pattern) = filter.style {
        builder.column_match("style", pattern);
    }
    if let Some(ref pattern) = filter.description {
        let like = wildcard_to_like(pattern);
        let short = builder.bind(like.clone());
        let long = builder.bind(like);
        builder.clauses.push(format!(
            "(short_description LIKE {} ESCAPE '\\' OR long_description LIKE {} ESCAPE '\\')",
            short, long
        ));
    }

    if let Some(value) = filter.has_nudity {
        builder.flag("has_nudity", value);
    }
    if let Some(value) = filter.has_explicit {
        builder.flag("has_explicit_content", value);
    }

    if let Some(width) = filter.min_width {
        builder.compare("width", ">=", width);
    }
    if let Some(height) = filter.min_height {
        builder.compare("height", ">=", height);
    }
    if let Some(ref after) = filter.taken_after {
        builder.compare("taken_at", ">=", after.clone());
    }
    if let Some(ref before) = filter.taken_before {
        builder.compare("taken_at", "<=", before.clone());
    }

    builder.into_query(filter)
}

pub fn search(db: &Database, filter: &ImageFilter) -> Result<Vec<ImageRecord>> {
    let (sql, params) = build_query(filter);
    tracing::debug!(sql = %sql, params = params.len(), "Running image search");

    let param_refs: Vec<(&str, &dyn ToSql)> = params
        .iter()
        .map(|(name, value)| (name.as_str(), value.as_ref()))
        .collect();

    let mut stmt = db.conn().prepare(&sql)?;
    let records = stmt
        .query_map(&param_refs[..], row_to_record)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewImage, ObjectTag, PersonTag, SceneTag};
    use crate::sidecar::ImageDescription;

    fn image(path: &str) -> NewImage {
        NewImage {
            path: path.to_string(),
            filename: path.rsplit('/').next().unwrap_or(path).to_string(),
            directory: "/photos".to_string(),
            size_bytes: 1,
            ..Default::default()
        }
    }

    fn test_db() -> Database {
        let mut db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();

        let mut beach = image("/photos/beach.jpg");
        beach.keywords = vec!["sunset".to_string(), "ocean".to_string()];
        beach.people = vec![PersonTag {
            name: "Alice".to_string(),
            confidence: Some(0.9),
        }];
        beach.objects = vec![ObjectTag {
            label: "palm tree".to_string(),
            count: 3,
            confidence: Some(0.8),
        }];
        beach.scenes = vec![SceneTag {
            scene: "beach".to_string(),
            confidence: Some(0.7),
        }];
        beach.description = Some(ImageDescription {
            short_description: Some("Sunset over the ocean".to_string()),
            long_description: Some("A golden sunset over a calm ocean".to_string()),
            mood: Some("calm".to_string()),
            style: Some("landscape".to_string()),
            picture_type: Some("photo".to_string()),
            ..Default::default()
        });
        beach.metadata = Some(crate::scanner::ImageMetadata {
            width: Some(4000),
            height: Some(3000),
            taken_at: Some("2024-06-01T19:30:00".to_string()),
            ..Default::default()
        });

        let mut city = image("/photos/city.jpg");
        city.keywords = vec!["street".to_string(), "night".to_string()];
        city.people = vec![PersonTag {
            name: "Bob".to_string(),
            confidence: Some(0.85),
        }];
        city.description = Some(ImageDescription {
            mood: Some("energetic".to_string()),
            has_nudity: true,
            ..Default::default()
        });
        city.metadata = Some(crate::scanner::ImageMetadata {
            width: Some(1024),
            height: Some(768),
            taken_at: Some("2023-01-15T22:00:00".to_string()),
            ..Default::default()
        });

        db.insert_images(&[beach, city]).unwrap();
        db
    }

    #[test]
    fn test_wildcard_translation() {
        assert_eq!(wildcard_to_like("*sun?et*"), "%sun_et%");
        assert_eq!(wildcard_to_like("plain"), "plain");
    }

    #[test]
    fn test_wildcard_escapes_sql_wildcards() {
        assert_eq!(wildcard_to_like("100%"), "100\\%");
        assert_eq!(wildcard_to_like("a_b"), "a\\_b");
        assert_eq!(wildcard_to_like("c\\d"), "c\\\\d");
    }

    #[test]
    fn test_parameter_names_are_unique() {
        let filter = ImageFilter {
            keywords: vec!["a".to_string(), "b".to_string()],
            people: vec!["c".to_string()],
            description: Some("d".to_string()),
            min_width: Some(100),
            limit: Some(5),
            ..Default::default()
        };
        let (sql, params) = build_query(&filter);
        assert_eq!(params.len(), 7);
        for (i, (name, _)) in params.iter().enumerate() {
            assert_eq!(name, &format!(":p{}", i + 1));
            assert!(sql.contains(name.as_str()));
        }
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let db = test_db();
        let results = search(&db, &ImageFilter::default()).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_keyword_patterns_are_ored() {
        let db = test_db();
        let filter = ImageFilter {
            keywords: vec!["sun*".to_string(), "street".to_string()],
            ..Default::default()
        };
        let results = search(&db, &filter).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_predicates_are_anded() {
        let db = test_db();
        let filter = ImageFilter {
            keywords: vec!["sun*".to_string()],
            people: vec!["bob".to_string()],
            ..Default::default()
        };
        let results = search(&db, &filter).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_person_match_is_case_insensitive() {
        let db = test_db();
        let filter = ImageFilter {
            people: vec!["alice".to_string()],
            ..Default::default()
        };
        let results = search(&db, &filter).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "/photos/beach.jpg");
    }

    #[test]
    fn test_object_wildcard_match() {
        let db = test_db();
        let filter = ImageFilter {
            objects: vec!["palm*".to_string()],
            ..Default::default()
        };
        let results = search(&db, &filter).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_nudity_flag_is_ternary() {
        let db = test_db();

        let flagged = search(
            &db,
            &ImageFilter {
                has_nudity: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].path, "/photos/city.jpg");

        let unflagged = search(
            &db,
            &ImageFilter {
                has_nudity: Some(false),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(unflagged.len(), 1);
        assert_eq!(unflagged[0].path, "/photos/beach.jpg");
    }

    #[test]
    fn test_description_matches_either_column() {
        let db = test_db();
        let filter = ImageFilter {
            description: Some("*golden*".to_string()),
            ..Default::default()
        };
        let results = search(&db, &filter).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "/photos/beach.jpg");
    }

    #[test]
    fn test_dimension_and_date_ranges() {
        let db = test_db();

        let wide = search(
            &db,
            &ImageFilter {
                min_width: Some(2000),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(wide.len(), 1);
        assert_eq!(wide[0].path, "/photos/beach.jpg");

        let recent = search(
            &db,
            &ImageFilter {
                taken_after: Some("2024-01-01".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(recent.len(), 1);
    }

    #[test]
    fn test_literal_underscore_does_not_act_as_wildcard() {
        let mut db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        let mut a = image("/photos/a.jpg");
        a.keywords = vec!["snow_man".to_string()];
        let mut b = image("/photos/b.jpg");
        b.keywords = vec!["snowman".to_string()];
        db.insert_images(&[a, b]).unwrap();

        let filter = ImageFilter {
            keywords: vec!["snow_man".to_string()],
            ..Default::default()
        };
        let results = search(&db, &filter).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "/photos/a.jpg");
    }

    #[test]
    fn test_limit_caps_results() {
        let db = test_db();
        let filter = ImageFilter {
            limit: Some(1),
            ..Default::default()
        };
        let results = search(&db, &filter).unwrap();
        assert_eq!(results.len(), 1);
    }
}
