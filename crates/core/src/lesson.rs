//! Lesson domain types: durable knowledge carried across sessions.
//!
//! A lesson is an immutable fact, preference or guideline. Lessons are tiered
//! by [`LessonScope`]: USER lessons are always injected, ROLE lessons only
//! for the active role, GENERAL lessons only when relevant to the query.
//! Content is the natural key; two lessons never share identical content.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MemoryError;

/// Role value stored when a lesson is not bound to a role.
pub const NO_ROLE: &str = "none";

/// Which tier a lesson belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LessonScope {
    /// Preferences about the user; always active.
    User,
    /// Guidelines for a specific agent role.
    Role,
    /// Facts relevant only when the query matches.
    General,
}

impl LessonScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Role => "ROLE",
            Self::General => "GENERAL",
        }
    }
}

impl std::fmt::Display for LessonScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LessonScope {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USER" => Ok(Self::User),
            "ROLE" => Ok(Self::Role),
            "GENERAL" => Ok(Self::General),
            other => Err(MemoryError::InvalidLesson(format!("unknown scope '{other}'"))),
        }
    }
}

/// A persisted lesson.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    /// Unique ID
    pub id: String,

    /// The lesson text (natural key)
    pub content: String,

    /// Tags, sorted and de-duplicated
    #[serde(default)]
    pub tags: Vec<String>,

    /// Tier
    pub scope: LessonScope,

    /// Lowercased role name, or [`NO_ROLE`]
    #[serde(default = "default_role")]
    pub role: String,

    /// When the lesson was learned
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,

    /// Optional embedding vector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

fn default_role() -> String {
    NO_ROLE.to_string()
}

impl Lesson {
    /// Whether the lesson is bound to the given role (case-insensitive).
    pub fn has_role(&self, role: &str) -> bool {
        self.role == normalize_role(Some(role))
    }
}

/// Normalise a role name: trimmed, lowercased, [`NO_ROLE`] when absent.
pub fn normalize_role(role: Option<&str>) -> String {
    match role.map(str::trim) {
        Some(r) if !r.is_empty() => r.to_lowercase(),
        _ => NO_ROLE.to_string(),
    }
}

/// Normalise tags: trimmed, non-empty, sorted, unique.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = tags
        .into_iter()
        .map(|t| t.as_ref().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

/// A lesson about to be saved.
#[derive(Debug, Clone)]
pub struct NewLesson {
    pub content: String,
    pub scope: LessonScope,
    pub role: Option<String>,
    pub tags: Vec<String>,
}

impl NewLesson {
    pub fn new(content: impl Into<String>, scope: LessonScope) -> Self {
        Self {
            content: content.into(),
            scope,
            role: None,
            tags: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags = normalize_tags(tags);
        self
    }

    /// Check the lesson can be stored.
    pub fn validate(&self) -> Result<(), MemoryError> {
        if self.content.trim().is_empty() {
            return Err(MemoryError::InvalidLesson("content is empty".into()));
        }
        if self.scope == LessonScope::Role && normalize_role(self.role.as_deref()) == NO_ROLE {
            return Err(MemoryError::InvalidLesson(
                "ROLE lessons need a role".into(),
            ));
        }
        Ok(())
    }

    /// Build the persisted form.
    pub fn into_lesson(self, embedding: Option<Vec<f32>>) -> Lesson {
        Lesson {
            id: Uuid::new_v4().to_string(),
            content: self.content.trim().to_string(),
            tags: normalize_tags(&self.tags),
            scope: self.scope,
            role: normalize_role(self.role.as_deref()),
            created_at: Utc::now(),
            embedding,
        }
    }
}

/// Storage for lessons.
///
/// Implementations must be safe for concurrent readers; the lesson store
/// serialises writers itself.
#[async_trait]
pub trait LessonBackend: Send + Sync {
    /// Backend name (e.g., "file", "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Persist a lesson. Returns `false` when identical content already exists.
    async fn insert(&self, lesson: Lesson) -> Result<bool, MemoryError>;

    /// Whether a lesson with exactly this content exists.
    async fn contains(&self, content: &str) -> Result<bool, MemoryError>;

    /// Lessons of one scope (or all), newest first.
    async fn list(&self, scope: Option<LessonScope>) -> Result<Vec<Lesson>, MemoryError>;

    /// Total number of lessons.
    async fn count(&self) -> Result<usize, MemoryError>;

    /// Attach an embedding to an existing lesson (backfill after the
    /// embedding model becomes available). Content is never changed.
    async fn set_embedding(&self, id: &str, embedding: Vec<f32>) -> Result<(), MemoryError>;
}

/// Turns text into embedding vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    /// One vector per input, in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MemoryError>;
}
