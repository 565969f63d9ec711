//! In-memory backend: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use taskwright_core::error::MemoryError;
use taskwright_core::{Lesson, LessonBackend, LessonScope};
use std::sync::Arc;
use tokio::sync::RwLock;

/// An in-memory backend that stores lessons in a Vec (insertion order).
/// Useful for testing and sessions where persistence isn't needed.
pub struct InMemoryBackend {
    lessons: Arc<RwLock<Vec<Lesson>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            lessons: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Lessons of `scope` (or all), newest first; later insertions win ties.
pub(crate) fn newest_first(lessons: &[Lesson], scope: Option<LessonScope>) -> Vec<Lesson> {
    let mut out: Vec<Lesson> = lessons
        .iter()
        .rev()
        .filter(|l| scope.is_none_or(|s| l.scope == s))
        .cloned()
        .collect();
    out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    out
}

#[async_trait]
impl LessonBackend for InMemoryBackend {
    fn name(&self) -> &str { "in_memory" }

    async fn insert(&self, lesson: Lesson) -> Result<bool, MemoryError> {
        let mut lessons = self.lessons.write().await;
        if lessons.iter().any(|l| l.content == lesson.content) {
            return Ok(false);
        }
        lessons.push(lesson);
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
        let lesson = lessons
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| MemoryError::QueryFailed(format!("no lesson with id {id}")))?;
        lesson.embedding = Some(embedding);
        Ok(())
    }
}
