//! Lesson storage for Taskwright.
//!
//! Three backends share the `LessonBackend` contract: a versioned JSON
//! document (default), SQLite, and an in-memory store for tests.
//! [`LessonStore`] layers duplicate suppression and tiered retrieval on top.

pub mod embedder;
pub mod file_backend;
pub mod in_memory;
pub mod keyword;
pub mod migration;
pub mod store;
pub mod vector;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use embedder::ProviderEmbedder;
pub use file_backend::FileBackend;
pub use in_memory::InMemoryBackend;
pub use keyword::KeywordWeights;
pub use store::{LessonStore, RetrievalPolicy, RetrievedLessons, SaveOutcome};
pub use vector::cosine_similarity;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;

use std::sync::Arc;

use taskwright_config::LessonsConfig;
use taskwright_core::error::MemoryError;
use taskwright_core::{Embedder, LessonBackend};
use tracing::{info, warn};

impl From<&LessonsConfig> for RetrievalPolicy {
    fn from(config: &LessonsConfig) -> Self {
        Self {
            user_cap: config.user_cap,
            top_k: config.top_k,
            keyword: KeywordWeights {
                content_weight: config.keyword.content_weight,
                tag_weight: config.keyword.tag_weight,
                min_word_len: config.keyword.min_word_len,
            },
        }
    }
}

/// Open the configured backend.
pub async fn open_backend(config: &LessonsConfig) -> Result<Arc<dyn LessonBackend>, MemoryError> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryBackend::new())),
        "file" => Ok(Arc::new(FileBackend::open(config.resolved_path())?)),
        #[cfg(feature = "sqlite")]
        "sqlite" => Ok(Arc::new(SqliteBackend::open(&config.resolved_path()).await?)),
        other => Err(MemoryError::Storage(format!(
            "Unsupported lesson backend: {other}"
        ))),
    }
}

/// Build a [`LessonStore`] from configuration, importing legacy lessons if present.
pub async fn build_from_config(
    config: &LessonsConfig,
    embedder: Option<Arc<dyn Embedder>>,
) -> Result<LessonStore, MemoryError> {
    let backend = open_backend(config).await?;
    let mut store = LessonStore::new(backend).with_policy(RetrievalPolicy::from(config));
    if let Some(embedder) = embedder {
        store = store.with_embedder(embedder);
    }

    if let Some(legacy) = &config.legacy_path {
        match store.import_legacy(legacy).await {
            Ok(0) => {}
            Ok(n) => info!(count = n, "Legacy lessons imported"),
            Err(e) => warn!(error = %e, path = %legacy.display(), "Legacy lesson import failed"),
        }
    }

    info!(backend = store.backend_name(), "Lesson store ready");
    Ok(store)
}
