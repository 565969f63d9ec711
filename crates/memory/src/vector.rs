//! Vector similarity ranking.
//!
//! Pure-Rust cosine similarity and a top-k ranker over lessons that carry
//! embeddings.

use taskwright_core::Lesson;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if the lengths differ or either vector is empty or zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Rank lessons by cosine similarity to a query embedding and keep the top `k`.
///
/// Returns `None` when the index cannot be used: some candidate lacks an
/// embedding or has a different dimension than the query. Candidates are
/// expected newest-first; equal scores keep that order.
pub fn rank_by_embedding(candidates: &[Lesson], query_embedding: &[f32], k: usize) -> Option<Vec<Lesson>> {
    if query_embedding.is_empty() {
        return None;
    }

    let mut scored = Vec::with_capacity(candidates.len());
    for lesson in candidates {
        let embedding = lesson.embedding.as_deref()?;
        if embedding.len() != query_embedding.len() {
            return None;
        }
        scored.push((cosine_similarity(embedding, query_embedding), lesson));
    }

    // Stable sort keeps recency order on ties.
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    Some(scored.into_iter().take(k).map(|(_, l)| l.clone()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskwright_core::{LessonScope, NewLesson};

    fn lesson(content: &str, embedding: Option<Vec<f32>>) -> Lesson {
        NewLesson::new(content, LessonScope::General).into_lesson(embedding)
    }

    #[test]
    fn identical_vectors_similarity_one() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-5);
    }

    #[test]
    fn orthogonal_vectors_similarity_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-5);
    }

    #[test]
    fn opposite_vectors_similarity_negative() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-5);
    }

    #[test]
    fn mismatched_or_zero_vectors() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn ranks_most_similar_first() {
        let candidates = vec![
            lesson("far", Some(vec![0.0, 1.0])),
            lesson("near", Some(vec![1.0, 0.1])),
            lesson("mid", Some(vec![1.0, 1.0])),
        ];
        let ranked = rank_by_embedding(&candidates, &[1.0, 0.0], 2).unwrap();
        let contents: Vec<_> = ranked.iter().map(|l| l.content.as_str()).collect();
        assert_eq!(contents, vec!["near", "mid"]);
    }

    #[test]
    fn missing_embedding_disables_index() {
        let candidates = vec![lesson("a", Some(vec![1.0, 0.0])), lesson("b", None)];
        assert!(rank_by_embedding(&candidates, &[1.0, 0.0], 5).is_none());
    }

    #[test]
    fn dimension_mismatch_disables_index() {
        let candidates = vec![lesson("a", Some(vec![1.0, 0.0, 0.0]))];
        assert!(rank_by_embedding(&candidates, &[1.0, 0.0], 5).is_none());
    }

    #[test]
    fn ties_keep_input_order() {
        let candidates = vec![
            lesson("newer", Some(vec![1.0, 0.0])),
            lesson("older", Some(vec![2.0, 0.0])),
        ];
        let ranked = rank_by_embedding(&candidates, &[1.0, 0.0], 2).unwrap();
        assert_eq!(ranked[0].content, "newer");
    }
}
