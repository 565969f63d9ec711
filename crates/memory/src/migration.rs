//! Versioned lesson document and the pure migration from older formats.
//!
//! The on-disk document is `{"version": 1, "lessons": [...]}`. Two legacy
//! shapes are accepted and upgraded:
//!
//! - a flat array whose items are strings or `{content, tags}` objects
//! - an object with a `lessons` array and no `version`
//!
//! Legacy lessons become GENERAL with no role; tags and timestamps are
//! preserved. Duplicate or empty content is dropped (first occurrence wins).

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use taskwright_core::{Lesson, LessonScope, NewLesson};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// The persisted lesson document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonDocument {
    pub version: u32,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
}

impl LessonDocument {
    pub fn empty() -> Self {
        Self {
            version: CURRENT_VERSION,
            lessons: Vec::new(),
        }
    }
}

impl Default for LessonDocument {
    fn default() -> Self {
        Self::empty()
    }
}

/// Result of loading a document.
#[derive(Debug)]
pub struct Migrated {
    pub document: LessonDocument,
    /// The version found in the input (0 for legacy formats).
    pub from_version: u32,
}

impl Migrated {
    pub fn upgraded(&self) -> bool {
        self.from_version != CURRENT_VERSION
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("unsupported lesson schema version {0}")]
    UnsupportedVersion(u64),

    #[error("unrecognised lesson document: {0}")]
    UnrecognisedShape(String),

    #[error("invalid lesson record: {0}")]
    InvalidRecord(#[from] serde_json::Error),
}

/// Bring any known lesson document shape to the current version.
pub fn migrate(raw: Value) -> Result<Migrated, MigrationError> {
    match raw {
        Value::Array(items) => Ok(Migrated {
            document: from_legacy_items(items),
            from_version: 0,
        }),
        Value::Object(mut map) => match map.get("version").and_then(Value::as_u64) {
            Some(v) if v == CURRENT_VERSION as u64 => {
                let document: LessonDocument = serde_json::from_value(Value::Object(map))?;
                Ok(Migrated {
                    document,
                    from_version: CURRENT_VERSION,
                })
            }
            Some(v) => Err(MigrationError::UnsupportedVersion(v)),
            None => match map.remove("lessons") {
                Some(Value::Array(items)) => Ok(Migrated {
                    document: from_legacy_items(items),
                    from_version: 0,
                }),
                _ => Err(MigrationError::UnrecognisedShape(
                    "object without 'version' or 'lessons'".into(),
                )),
            },
        },
        other => Err(MigrationError::UnrecognisedShape(format!(
            "expected array or object, got {other}"
        ))),
    }
}

fn from_legacy_items(items: Vec<Value>) -> LessonDocument {
    let mut seen = HashSet::new();
    let mut lessons = Vec::new();

    for item in items {
        let Some(lesson) = legacy_lesson(item) else {
            continue;
        };
        if seen.insert(lesson.content.clone()) {
            lessons.push(lesson);
        }
    }

    LessonDocument {
        version: CURRENT_VERSION,
        lessons,
    }
}

fn legacy_lesson(item: Value) -> Option<Lesson> {
    let (content, tags, timestamp) = match item {
        Value::String(s) => (s, Vec::new(), None),
        Value::Object(map) => {
            let content = map.get("content")?.as_str()?.to_string();
            let tags = match map.get("tags") {
                Some(Value::Array(tags)) => tags
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
                // Comma-joined tags were also written by older versions.
                Some(Value::String(joined)) => joined.split(',').map(str::to_string).collect(),
                _ => Vec::new(),
            };
            let timestamp = map
                .get("timestamp")
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<DateTime<Utc>>().ok());
            (content, tags, timestamp)
        }
        _ => return None,
    };

    if content.trim().is_empty() {
        return None;
    }

    let mut lesson = NewLesson::new(content, LessonScope::General)
        .with_tags(tags)
        .into_lesson(None);
    if let Some(ts) = timestamp {
        lesson.created_at = ts;
    }
    Some(lesson)
}
