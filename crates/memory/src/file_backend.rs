//! File-based lesson backend: a single versioned JSON document.
//!
//! Storage location: `~/.taskwright/lessons.v1.json` by default.
//!
//! The whole document is loaded on open and rewritten on every mutation.
//! Writes go to a sibling temp file which is then renamed over the target,
//! so an interrupted write never leaves a half-written store behind.
//! Older formats are upgraded in place on first open.

use async_trait::async_trait;
use taskwright_core::error::MemoryError;
use taskwright_core::{Lesson, LessonBackend, LessonScope};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::in_memory::newest_first;
use crate::migration::{self, LessonDocument};

/// A file-backed lesson store.
pub struct FileBackend {
    path: PathBuf,
    lessons: Arc<RwLock<Vec<Lesson>>>,
}

impl FileBackend {
    /// Open (or create on first write) the document at `path`.
    ///
    /// A legacy document is migrated and written back immediately.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, MemoryError> {
        let path = path.into();
        let lessons = match read_document(&path)? {
            Some(migrated) => {
                let upgraded = migrated.upgraded();
                let lessons = migrated.document.lessons;
                if upgraded {
                    info!(
                        path = %path.display(),
                        from = migrated.from_version,
                        count = lessons.len(),
                        "Upgrading lesson document"
                    );
                    write_document(&path, &lessons)?;
                }
                lessons
            }
            None => Vec::new(),
        };

        debug!(path = %path.display(), count = lessons.len(), "File lesson backend loaded");
        Ok(Self {
            path,
            lessons: Arc::new(RwLock::new(lessons)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, lessons: &[Lesson]) -> Result<(), MemoryError> {
        write_document(&self.path, lessons)
    }
}

/// Read and migrate a lesson document. `Ok(None)` when the file is absent.
pub fn read_document(path: &Path) -> Result<Option<migration::Migrated>, MemoryError> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(MemoryError::Storage(format!(
                "Failed to read {}: {e}",
                path.display()
            )));
        }
    };

    if content.trim().is_empty() {
        return Ok(None);
    }

    let raw: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
        MemoryError::MigrationFailed(format!("{} is not valid JSON: {e}", path.display()))
    })?;

    migration::migrate(raw)
        .map(Some)
        .map_err(|e| MemoryError::MigrationFailed(format!("{}: {e}", path.display())))
}

/// Atomically replace the document at `path`.
fn write_document(path: &Path, lessons: &[Lesson]) -> Result<(), MemoryError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            MemoryError::Storage(format!("Failed to create lesson directory: {e}"))
        })?;
    }

    let document = LessonDocument {
        version: migration::CURRENT_VERSION,
        lessons: lessons.to_vec(),
    };
    let content = serde_json::to_string_pretty(&document)
        .map_err(|e| MemoryError::Storage(format!("Failed to serialize lessons: {e}")))?;

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    std::fs::write(&tmp, content)
        .map_err(|e| MemoryError::Storage(format!("Failed to write lesson file: {e}")))?;
    std::fs::rename(&tmp, path)
        .map_err(|e| MemoryError::Storage(format!("Failed to replace lesson file: {e}")))?;

    Ok(())
}

#[async_trait]
impl LessonBackend for FileBackend {
    fn name(&self) -> &str {
        "file"
    }

    async fn insert(&self, lesson: Lesson) -> Result<bool, MemoryError> {
        let mut lessons = self.lessons.write().await;
        if lessons.iter().any(|l| l.content == lesson.content) {
            return Ok(false);
        }
        lessons.push(lesson);
        if let Err(e) = self.flush(&lessons).await {
            lessons.pop();
            return Err(e);
        }
        Ok(true)
    }

    async fn contains(&self, content: &str) -> Result<bool, MemoryError> {
        Ok(self.lessons.read().await.iter().any(|l| l.content == content))
    }

    async fn list(&self, scope: Option<LessonScope>) -> Result<Vec<Lesson>, MemoryError> {
        Ok(newest_first(&self.lessons.read().await, scope))
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(self.lessons.read().await.len())
    }

    async fn set_embedding(&self, id: &str, embedding: Vec<f32>) -> Result<(), MemoryError> {
        let mut lessons = self.lessons.write().await;
        let idx = lessons
            .iter()
            .position(|l| l.id == id)
            .ok_or_else(|| MemoryError::QueryFailed(format!("no lesson with id {id}")))?;
        let previous = lessons[idx].embedding.replace(embedding);
        if let Err(e) = self.flush(&lessons).await {
            lessons[idx].embedding = previous;
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskwright_core::NewLesson;

    fn lesson(content: &str, scope: LessonScope) -> Lesson {
        NewLesson::new(content, scope).into_lesson(None)
    }

    #[tokio::test]
    async fn insert_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lessons.v1.json");

        let store = FileBackend::open(&path).unwrap();
        assert!(store.insert(lesson("Prefers metric units", LessonScope::User)).await.unwrap());

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"version\": 1"));
        assert!(content.contains("Prefers metric units"));

        let reopened = FileBackend::open(&path).unwrap();
        let users = reopened.list(Some(LessonScope::User)).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].content, "Prefers metric units");
    }

    #[tokio::test]
    async fn duplicate_insert_leaves_size_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBackend::open(dir.path().join("l.json")).unwrap();
        assert!(store.insert(lesson("same", LessonScope::User)).await.unwrap());
        assert!(!store.insert(lesson("same", LessonScope::User)).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBackend::open(dir.path().join("nested/none.json")).unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        // Nested directory is created on first write
        store.insert(lesson("x", LessonScope::General)).await.unwrap();
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn legacy_file_upgraded_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lessons.json");
        std::fs::write(&path, r#"["Always verify links", {"content": "Check dates", "tags": ["time"]}]"#)
            .unwrap();

        let store = FileBackend::open(&path).unwrap();
        let general = store.list(Some(LessonScope::General)).await.unwrap();
        assert_eq!(general.len(), 2);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["version"], 1);
        assert_eq!(raw["lessons"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn corrupt_file_is_migration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lessons.json");
        std::fs::write(&path, "this is not json").unwrap();
        assert!(matches!(
            FileBackend::open(&path),
            Err(MemoryError::MigrationFailed(_))
        ));
    }

    #[tokio::test]
    async fn no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lessons.v1.json");
        let store = FileBackend::open(&path).unwrap();
        store.insert(lesson("atomic", LessonScope::General)).await.unwrap();
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn set_embedding_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("l.json");
        let store = FileBackend::open(&path).unwrap();
        let l = lesson("embed", LessonScope::General);
        let id = l.id.clone();
        store.insert(l).await.unwrap();
        store.set_embedding(&id, vec![1.0, 2.0]).await.unwrap();

        let reopened = FileBackend::open(&path).unwrap();
        let all = reopened.list(None).await.unwrap();
        assert_eq!(all[0].embedding.as_deref(), Some(&[1.0, 2.0][..]));
    }
}
