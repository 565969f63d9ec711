//! Keyword ranking used when no embedding index is available.
//!
//! Each distinct query word scores `content_weight` if it appears as a word
//! of the lesson content and `tag_weight` if it appears as a word of any tag.
//! Query words shorter than `min_word_len` characters are ignored.

use std::collections::HashSet;

use taskwright_core::Lesson;

/// Tunable keyword scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeywordWeights {
    pub content_weight: u32,
    pub tag_weight: u32,
    pub min_word_len: usize,
}

impl Default for KeywordWeights {
    fn default() -> Self {
        Self {
            content_weight: 1,
            tag_weight: 2,
            min_word_len: 3,
        }
    }
}

/// Lowercased alphanumeric words of `text`.
fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

/// Distinct query words long enough to count.
pub fn query_words(query: &str, min_word_len: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    words(query)
        .filter(|w| w.chars().count() >= min_word_len)
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

/// Score one lesson against pre-split query words.
pub fn score(lesson: &Lesson, query_words: &[String], weights: &KeywordWeights) -> u32 {
    let content: HashSet<String> = words(&lesson.content).collect();
    let tags: HashSet<String> = lesson.tags.iter().flat_map(|t| words(t)).collect();

    query_words
        .iter()
        .map(|w| {
            let mut s = 0;
            if content.contains(w) {
                s += weights.content_weight;
            }
            if tags.contains(w) {
                s += weights.tag_weight;
            }
            s
        })
        .sum()
}

/// Keep the top `k` lessons by keyword score.
///
/// Candidates are expected newest-first; ties keep that order. When nothing
/// scores above zero the `k` most recent candidates are returned.
pub fn rank(candidates: Vec<Lesson>, query: &str, k: usize, weights: &KeywordWeights) -> Vec<Lesson> {
    let terms = query_words(query, weights.min_word_len);

    let mut scored: Vec<(u32, Lesson)> = candidates
        .into_iter()
        .map(|l| (score(&l, &terms, weights), l))
        .collect();

    if scored.iter().all(|(s, _)| *s == 0) {
        return scored.into_iter().take(k).map(|(_, l)| l).collect();
    }

    scored.retain(|(s, _)| *s > 0);
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().take(k).map(|(_, l)| l).collect()
}
