//! The tiered lesson store: duplicate-suppressed writes and scoped retrieval.
//!
//! `retrieve` concatenates, in order:
//! 1. USER lessons, newest first, capped at `user_cap`, regardless of query
//! 2. ROLE lessons for the active role, top-k by relevance
//! 3. GENERAL lessons, top-k by relevance, only for a non-empty query
//!
//! Relevance is cosine similarity when every candidate has a usable
//! embedding and the query could be embedded; otherwise keyword scoring.

use std::path::Path;
use std::sync::Arc;

use taskwright_core::error::MemoryError;
use taskwright_core::lesson::{NO_ROLE, normalize_role};
use taskwright_core::{Embedder, Lesson, LessonBackend, LessonScope, NewLesson};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::file_backend::read_document;
use crate::keyword::{self, KeywordWeights};
use crate::vector;

/// Query used to rank ROLE lessons when the task text is empty.
pub const ROLE_FALLBACK_QUERY: &str = "general guidelines";

/// Caps and ranking knobs for retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalPolicy {
    pub user_cap: usize,
    pub top_k: usize,
    pub keyword: KeywordWeights,
}

impl Default for RetrievalPolicy {
    fn default() -> Self {
        Self {
            user_cap: 20,
            top_k: 5,
            keyword: KeywordWeights::default(),
        }
    }
}

/// What happened to a save request.
#[derive(Debug, Clone)]
pub enum SaveOutcome {
    Saved(Lesson),
    Duplicate,
}

impl SaveOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved(_))
    }
}

/// Lessons selected for one prompt, grouped by tier.
#[derive(Debug, Clone, Default)]
pub struct RetrievedLessons {
    pub user: Vec<Lesson>,
    pub role: Option<(String, Vec<Lesson>)>,
    pub general: Vec<Lesson>,
}

impl RetrievedLessons {
    pub fn is_empty(&self) -> bool {
        self.user.is_empty()
            && self.role.as_ref().is_none_or(|(_, l)| l.is_empty())
            && self.general.is_empty()
    }

    /// Render the text block injected into the system prompt.
    ///
    /// Empty when nothing was retrieved.
    pub fn render(&self) -> String {
        let mut sections = Vec::new();

        if !self.user.is_empty() {
            sections.push(section("## User Preferences (always active)", &self.user));
        }
        if let Some((role, lessons)) = &self.role {
            if !lessons.is_empty() {
                sections.push(section(&format!("## Role Guidelines ({role})"), lessons));
            }
        }
        if !self.general.is_empty() {
            sections.push(section("## Relevant Knowledge", &self.general));
        }

        sections.join("\n\n")
    }
}

fn section(header: &str, lessons: &[Lesson]) -> String {
    let mut out = String::from(header);
    for lesson in lessons {
        out.push_str("\n- ");
        out.push_str(&lesson.content);
    }
    out
}

/// The lesson store.
pub struct LessonStore {
    backend: Arc<dyn LessonBackend>,
    embedder: Option<Arc<dyn Embedder>>,
    policy: RetrievalPolicy,
    write_lock: Mutex<()>,
}

impl LessonStore {
    pub fn new(backend: Arc<dyn LessonBackend>) -> Self {
        Self {
            backend,
            embedder: None,
            policy: RetrievalPolicy::default(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_policy(mut self, policy: RetrievalPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn policy(&self) -> &RetrievalPolicy {
        &self.policy
    }

    /// Persist a lesson unless identical content already exists.
    ///
    /// A failed embedding does not fail the save; the lesson is stored
    /// without one and ranked by keywords until backfilled.
    pub async fn save(&self, new: NewLesson) -> Result<SaveOutcome, MemoryError> {
        new.validate()?;
        let content = new.content.trim().to_string();

        let _writer = self.write_lock.lock().await;

        if self.backend.contains(&content).await? {
            debug!(content = %preview(&content), "Lesson already exists");
            return Ok(SaveOutcome::Duplicate);
        }

        let embedding = self.embed_one(&content).await;
        let lesson = new.into_lesson(embedding);

        if !self.backend.insert(lesson.clone()).await? {
            return Ok(SaveOutcome::Duplicate);
        }

        info!(scope = %lesson.scope, role = %lesson.role, content = %preview(&lesson.content), "Lesson saved");
        Ok(SaveOutcome::Saved(lesson))
    }

    /// The lesson block for `query` under `role`; empty when nothing applies.
    pub async fn retrieve(&self, query: &str, role: Option<&str>) -> Result<String, MemoryError> {
        Ok(self.retrieve_sections(query, role).await?.render())
    }

    /// Retrieval grouped by tier.
    pub async fn retrieve_sections(&self, query: &str, role: Option<&str>) -> Result<RetrievedLessons, MemoryError> {
        let query = query.trim();
        let k = self.policy.top_k;

        let mut user = self.backend.list(Some(LessonScope::User)).await?;
        user.truncate(self.policy.user_cap);

        let role = Some(normalize_role(role)).filter(|r| r != NO_ROLE);
        let role_candidates: Vec<Lesson> = match &role {
            Some(r) => self
                .backend
                .list(Some(LessonScope::Role))
                .await?
                .into_iter()
                .filter(|l| &l.role == r)
                .collect(),
            None => Vec::new(),
        };

        let general_candidates = if query.is_empty() {
            Vec::new()
        } else {
            self.backend.list(Some(LessonScope::General)).await?
        };

        let role_query = if query.is_empty() { ROLE_FALLBACK_QUERY } else { query };
        let (role_emb, general_emb) = self
            .query_embeddings(
                (!role_candidates.is_empty()).then_some(role_query),
                (!general_candidates.is_empty()).then_some(query),
            )
            .await;

        let role_lessons = self.rank(role_candidates, role_query, role_emb.as_deref(), k);
        let general = self.rank(general_candidates, query, general_emb.as_deref(), k);

        debug!(
            user = user.len(),
            role = role_lessons.len(),
            general = general.len(),
            "Lessons retrieved"
        );

        Ok(RetrievedLessons {
            user,
            role: role.map(|r| (r, role_lessons)),
            general,
        })
    }

    fn rank(&self, candidates: Vec<Lesson>, query: &str, query_embedding: Option<&[f32]>, k: usize) -> Vec<Lesson> {
        if candidates.is_empty() {
            return candidates;
        }
        if let Some(ranked) = query_embedding.and_then(|q| vector::rank_by_embedding(&candidates, q, k)) {
            return ranked;
        }
        keyword::rank(candidates, query, k, &self.policy.keyword)
    }

    /// Embed the ROLE and GENERAL queries in one call when both are needed.
    async fn query_embeddings(
        &self,
        role_query: Option<&str>,
        general_query: Option<&str>,
    ) -> (Option<Vec<f32>>, Option<Vec<f32>>) {
        let Some(embedder) = &self.embedder else {
            return (None, None);
        };

        let mut texts: Vec<String> = Vec::new();
        for q in [role_query, general_query].into_iter().flatten() {
            if !texts.iter().any(|t| t == q) {
                texts.push(q.to_string());
            }
        }
        if texts.is_empty() {
            return (None, None);
        }

        match embedder.embed(&texts).await {
            Ok(vectors) => {
                let lookup = |q: Option<&str>| {
                    q.and_then(|q| texts.iter().position(|t| t == q))
                        .and_then(|i| vectors.get(i).cloned())
                };
                (lookup(role_query), lookup(general_query))
            }
            Err(e) => {
                warn!(error = %e, "Query embedding failed, using keyword ranking");
                (None, None)
            }
        }
    }

    async fn embed_one(&self, content: &str) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;
        match embedder.embed(&[content.to_string()]).await {
            Ok(mut vectors) => vectors.pop(),
            Err(e) => {
                warn!(error = %e, "Lesson embedding failed, storing without one");
                None
            }
        }
    }

    /// Embed every lesson that lacks an embedding. Returns how many were updated.
    pub async fn backfill_embeddings(&self) -> Result<usize, MemoryError> {
        let Some(embedder) = &self.embedder else {
            return Ok(0);
        };

        let _writer = self.write_lock.lock().await;
        let missing: Vec<Lesson> = self
            .backend
            .list(None)
            .await?
            .into_iter()
            .filter(|l| l.embedding.is_none())
            .collect();
        if missing.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = missing.iter().map(|l| l.content.clone()).collect();
        let vectors = embedder.embed(&texts).await?;
        for (lesson, vector) in missing.iter().zip(vectors) {
            self.backend.set_embedding(&lesson.id, vector).await?;
        }

        info!(count = missing.len(), "Backfilled lesson embeddings");
        Ok(missing.len())
    }

    /// Import a legacy flat lesson file into an empty store.
    ///
    /// Does nothing when the store already has lessons or the file is absent.
    pub async fn import_legacy(&self, path: &Path) -> Result<usize, MemoryError> {
        if self.backend.count().await? > 0 {
            return Ok(0);
        }
        let Some(migrated) = read_document(path)? else {
            return Ok(0);
        };

        let _writer = self.write_lock.lock().await;
        let mut imported = 0;
        for mut lesson in migrated.document.lessons {
            if lesson.embedding.is_none() {
                lesson.embedding = self.embed_one(&lesson.content).await;
            }
            if self.backend.insert(lesson).await? {
                imported += 1;
            }
        }

        info!(path = %path.display(), imported, "Imported legacy lessons");
        Ok(imported)
    }

    /// Lessons of one scope (or all), newest first.
    pub async fn list(&self, scope: Option<LessonScope>) -> Result<Vec<Lesson>, MemoryError> {
        self.backend.list(scope).await
    }

    pub async fn count(&self) -> Result<usize, MemoryError> {
        self.backend.count().await
    }
}

fn preview(content: &str) -> String {
    const MAX: usize = 50;
    if content.chars().count() <= MAX {
        content.to_string()
    } else {
        let head: String = content.chars().take(MAX).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::InMemoryBackend;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn store() -> LessonStore {
        LessonStore::new(Arc::new(InMemoryBackend::new()))
    }

    /// Embeds by counting a few marker words, so similarity is predictable.
    struct MarkerEmbedder {
        fail: AtomicBool,
    }

    impl MarkerEmbedder {
        fn new() -> Self {
            Self { fail: AtomicBool::new(false) }
        }
    }

    #[async_trait]
    impl Embedder for MarkerEmbedder {
        fn name(&self) -> &str {
            "marker"
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MemoryError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(MemoryError::EmbeddingFailed("offline".into()));
            }
            Ok(texts
                .iter()
                .map(|t| {
                    let t = t.to_lowercase();
                    vec![
                        t.matches("cat").count() as f32 + 0.01,
                        t.matches("dog").count() as f32 + 0.01,
                        t.matches("car").count() as f32 + 0.01,
                    ]
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn saving_twice_keeps_one_lesson() {
        let store = store();
        let first = store
            .save(NewLesson::new("User prefers metric units", LessonScope::User))
            .await
            .unwrap();
        let second = store
            .save(NewLesson::new("User prefers metric units", LessonScope::User))
            .await
            .unwrap();
        assert!(first.is_saved());
        assert!(matches!(second, SaveOutcome::Duplicate));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn duplicate_check_ignores_surrounding_whitespace() {
        let store = store();
        store.save(NewLesson::new("Use UTC", LessonScope::General)).await.unwrap();
        let again = store.save(NewLesson::new("  Use UTC \n", LessonScope::General)).await.unwrap();
        assert!(!again.is_saved());
    }

    #[tokio::test]
    async fn concurrent_duplicate_saves_store_once() {
        let store = Arc::new(store());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let s = store.clone();
            handles.push(tokio::spawn(async move {
                s.save(NewLesson::new("only once", LessonScope::User)).await.unwrap()
            }));
        }
        let mut saved = 0;
        for h in handles {
            if h.await.unwrap().is_saved() {
                saved += 1;
            }
        }
        assert_eq!(saved, 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn empty_store_gives_empty_block() {
        let block = store().retrieve("anything", Some("researcher")).await.unwrap();
        assert_eq!(block, "");
    }

    #[tokio::test]
    async fn user_lessons_always_present() {
        let store = store();
        store.save(NewLesson::new("Answer in English", LessonScope::User)).await.unwrap();
        for query in ["", "cats", "completely unrelated"] {
            let block = store.retrieve(query, None).await.unwrap();
            assert!(block.contains("## User Preferences (always active)"));
            assert!(block.contains("- Answer in English"));
        }
    }

    #[tokio::test]
    async fn general_lessons_never_for_empty_query() {
        let store = store();
        store.save(NewLesson::new("Cats sleep a lot", LessonScope::General)).await.unwrap();
        assert_eq!(store.retrieve("", None).await.unwrap(), "");
        assert_eq!(store.retrieve("   ", Some("writer")).await.unwrap(), "");
        assert!(store.retrieve("cats", None).await.unwrap().contains("Cats sleep a lot"));
    }

    #[tokio::test]
    async fn role_lessons_only_for_matching_role() {
        let store = store();
        store
            .save(NewLesson::new("Cite sources", LessonScope::Role).with_role("Researcher"))
            .await
            .unwrap();

        assert_eq!(store.retrieve("task", None).await.unwrap(), "");
        assert_eq!(store.retrieve("task", Some("writer")).await.unwrap(), "");

        let block = store.retrieve("", Some("RESEARCHER")).await.unwrap();
        assert!(block.contains("## Role Guidelines (researcher)"));
        assert!(block.contains("- Cite sources"));
    }

    #[tokio::test]
    async fn sections_render_in_tier_order() {
        let store = store();
        store.save(NewLesson::new("Prefers short answers", LessonScope::General)).await.unwrap();
        store.save(NewLesson::new("Lives in Berlin", LessonScope::User)).await.unwrap();
        store
            .save(NewLesson::new("Use answers with tables", LessonScope::Role).with_role("analyst"))
            .await
            .unwrap();

        let block = store.retrieve("short answers", Some("analyst")).await.unwrap();
        let user = block.find("## User Preferences").unwrap();
        let role = block.find("## Role Guidelines").unwrap();
        let general = block.find("## Relevant Knowledge").unwrap();
        assert!(user < role && role < general);
    }

    #[tokio::test]
    async fn user_tier_is_capped_newest_first() {
        let store = store().with_policy(RetrievalPolicy {
            user_cap: 2,
            ..RetrievalPolicy::default()
        });
        for i in 0..4 {
            store.save(NewLesson::new(format!("pref {i}"), LessonScope::User)).await.unwrap();
        }
        let sections = store.retrieve_sections("", None).await.unwrap();
        let contents: Vec<_> = sections.user.iter().map(|l| l.content.as_str()).collect();
        assert_eq!(contents, vec!["pref 3", "pref 2"]);
    }

    #[tokio::test]
    async fn general_tier_limited_to_top_k_by_keyword() {
        let store = store().with_policy(RetrievalPolicy {
            top_k: 1,
            ..RetrievalPolicy::default()
        });
        store.save(NewLesson::new("Dogs bark", LessonScope::General)).await.unwrap();
        store
            .save(NewLesson::new("Cats purr", LessonScope::General).with_tags(["cats"]))
            .await
            .unwrap();
        store.save(NewLesson::new("Trains run late", LessonScope::General)).await.unwrap();

        let sections = store.retrieve_sections("tell me about cats", None).await.unwrap();
        assert_eq!(sections.general.len(), 1);
        assert_eq!(sections.general[0].content, "Cats purr");
    }

    #[tokio::test]
    async fn embeddings_drive_ranking_when_available() {
        let store = store()
            .with_embedder(Arc::new(MarkerEmbedder::new()))
            .with_policy(RetrievalPolicy {
                top_k: 1,
                ..RetrievalPolicy::default()
            });
        store.save(NewLesson::new("cat cat cat", LessonScope::General)).await.unwrap();
        store.save(NewLesson::new("dog dog dog", LessonScope::General)).await.unwrap();

        // No keyword overlap, so keyword ranking would fall back to the newest ("dog").
        let sections = store.retrieve_sections("concatenation", None).await.unwrap();
        assert_eq!(sections.general[0].content, "cat cat cat");
    }

    #[tokio::test]
    async fn embedding_failure_is_non_fatal() {
        let embedder = Arc::new(MarkerEmbedder::new());
        embedder.fail.store(true, Ordering::SeqCst);
        let store = store().with_embedder(embedder.clone());

        let outcome = store.save(NewLesson::new("cats nap", LessonScope::General)).await.unwrap();
        match outcome {
            SaveOutcome::Saved(lesson) => assert!(lesson.embedding.is_none()),
            SaveOutcome::Duplicate => panic!("expected save"),
        }
        assert!(store.retrieve("cats", None).await.unwrap().contains("cats nap"));

        embedder.fail.store(false, Ordering::SeqCst);
        assert_eq!(store.backfill_embeddings().await.unwrap(), 1);
        assert_eq!(store.backfill_embeddings().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn import_legacy_into_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("lessons.json");
        std::fs::write(&legacy, r#"["Check the date", {"content": "Prefer HTTPS", "tags": ["web"]}]"#).unwrap();

        let store = store();
        assert_eq!(store.import_legacy(&legacy).await.unwrap(), 2);
        let general = store.list(Some(LessonScope::General)).await.unwrap();
        assert_eq!(general.len(), 2);

        // Second import is a no-op because the store is no longer empty.
        assert_eq!(store.import_legacy(&legacy).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn import_legacy_missing_file() {
        let store = store();
        let n = store.import_legacy(Path::new("/nonexistent/lessons.json")).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn invalid_lesson_rejected() {
        let err = store().save(NewLesson::new("   ", LessonScope::User)).await.unwrap_err();
        assert!(matches!(err, MemoryError::InvalidLesson(_)));
    }
}
