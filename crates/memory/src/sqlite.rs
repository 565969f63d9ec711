//! SQLite lesson backend.
//!
//! One table, `lessons`, with a UNIQUE constraint on `content` so the
//! duplicate check also holds at the storage level. Each insert is its own
//! transaction; an interrupted process never leaves a partial lesson.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use taskwright_core::error::MemoryError;
use taskwright_core::{Lesson, LessonBackend, LessonScope};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// A SQLite lesson backend.
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Open (creating if missing) the database file at `path`.
    pub async fn open(path: &Path) -> Result<Self, MemoryError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                MemoryError::Storage(format!("Failed to create lesson directory: {e}"))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let backend = Self { pool };
        backend.run_migrations().await?;
        info!("SQLite lesson backend initialized at {}", path.display());
        Ok(backend)
    }

    /// An ephemeral in-process database (single connection).
    pub async fn in_memory() -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| MemoryError::Storage(format!("Invalid SQLite options: {e}")))?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let backend = Self { pool };
        backend.run_migrations().await?;
        Ok(backend)
    }

    /// Create tables and indexes.
    async fn run_migrations(&self) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS lessons (
                iid         INTEGER PRIMARY KEY AUTOINCREMENT,
                id          TEXT UNIQUE NOT NULL,
                content     TEXT UNIQUE NOT NULL,
                tags        TEXT NOT NULL DEFAULT '[]',
                scope       TEXT NOT NULL,
                role        TEXT NOT NULL DEFAULT 'none',
                created_at  TEXT NOT NULL,
                embedding   BLOB
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("lessons table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_lessons_scope ON lessons(scope, role)")
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::MigrationFailed(format!("scope index: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_lessons_created_at ON lessons(created_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("created_at index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Parse a `Lesson` from a SQLite row.
    fn row_to_lesson(row: &sqlx::sqlite::SqliteRow) -> Result<Lesson, MemoryError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| MemoryError::QueryFailed(format!("id column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| MemoryError::QueryFailed(format!("content column: {e}")))?;
        let tags_json: String = row
            .try_get("tags")
            .map_err(|e| MemoryError::QueryFailed(format!("tags column: {e}")))?;
        let scope: String = row
            .try_get("scope")
            .map_err(|e| MemoryError::QueryFailed(format!("scope column: {e}")))?;
        let role: String = row
            .try_get("role")
            .map_err(|e| MemoryError::QueryFailed(format!("role column: {e}")))?;
        let created_at_str: String = row
            .try_get("created_at")
            .map_err(|e| MemoryError::QueryFailed(format!("created_at column: {e}")))?;

        let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();
        let scope = LessonScope::from_str(&scope)?;

        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        let embedding: Option<Vec<u8>> = row.try_get("embedding").ok().flatten();
        let embedding = embedding.map(|blob| {
            blob.chunks_exact(4)
                .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect()
        });

        Ok(Lesson {
            id,
            content,
            tags,
            scope,
            role,
            created_at,
            embedding,
        })
    }

    /// Serialize an embedding vector to bytes.
    fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }
}

#[async_trait]
impl LessonBackend for SqliteBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn insert(&self, lesson: Lesson) -> Result<bool, MemoryError> {
        let tags_json = serde_json::to_string(&lesson.tags)
            .map_err(|e| MemoryError::Storage(format!("Tags serialization: {e}")))?;
        // Fixed-width timestamps keep lexical order chronological.
        let created_at = lesson.created_at.to_rfc3339_opts(SecondsFormat::Micros, true);
        let embedding_blob: Option<Vec<u8>> =
            lesson.embedding.as_deref().map(Self::embedding_to_blob);

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO lessons (id, content, tags, scope, role, created_at, embedding)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&lesson.id)
        .bind(&lesson.content)
        .bind(&tags_json)
        .bind(lesson.scope.as_str())
        .bind(&lesson.role)
        .bind(&created_at)
        .bind(embedding_blob.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("INSERT failed: {e}")))?;

        let inserted = result.rows_affected() == 1;
        debug!(id = %lesson.id, inserted, "Stored lesson");
        Ok(inserted)
    }

    async fn contains(&self, content: &str) -> Result<bool, MemoryError> {
        let row = sqlx::query("SELECT 1 FROM lessons WHERE content = ?1 LIMIT 1")
            .bind(content)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("contains: {e}")))?;
        Ok(row.is_some())
    }

    async fn list(&self, scope: Option<LessonScope>) -> Result<Vec<Lesson>, MemoryError> {
        let rows = match scope {
            Some(scope) => {
                sqlx::query(
                    "SELECT * FROM lessons WHERE scope = ?1 ORDER BY created_at DESC, iid DESC",
                )
                .bind(scope.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query("SELECT * FROM lessons ORDER BY created_at DESC, iid DESC")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(|e| MemoryError::QueryFailed(format!("list: {e}")))?;

        rows.iter().map(Self::row_to_lesson).collect()
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM lessons")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("COUNT failed: {e}")))?;
        let count: i64 = row
            .try_get("cnt")
            .map_err(|e| MemoryError::QueryFailed(format!("count column: {e}")))?;
        Ok(count as usize)
    }

    async fn set_embedding(&self, id: &str, embedding: Vec<f32>) -> Result<(), MemoryError> {
        let blob = Self::embedding_to_blob(&embedding);
        let result = sqlx::query("UPDATE lessons SET embedding = ?1 WHERE id = ?2")
            .bind(blob)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("UPDATE failed: {e}")))?;
        if result.rows_affected() == 0 {
            return Err(MemoryError::QueryFailed(format!("no lesson with id {id}")));
        }
        Ok(())
    }
}
