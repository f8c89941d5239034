//! Post-generation question quality filtering.
//!
//! The generator's structural validation already guarantees four options and a
//! valid answer letter; this filter judges whether a question is worth keeping.
//! Two stages: a fast structural rejection (too short, duplicate within the
//! batch), then a composite 0–100 heuristic score with a configurable cut-off.

use crate::generate::QuestionCandidate;
use crate::keywords::{category_keywords, count_hits, RELEVANT_KEYWORDS};
use std::collections::HashSet;

const MIN_QUESTION_WORDS: usize = 8;
const MAX_QUESTION_WORDS: usize = 55;
const MIN_EXPLANATION_CHARS: usize = 40;

/// Causal connectives that indicate an explanation actually explains.
const CAUSAL_TOKENS: &[&str] = &["because", "therefore", "hence", "due to"];

/// Drops low-quality and duplicate question candidates.
#[derive(Debug, Clone)]
pub struct QualityFilter {
    min_score: f64,
}

impl QualityFilter {
    pub fn new(min_score: f64) -> Self {
        Self { min_score }
    }

    /// Filter candidates below the score threshold and remove duplicates.
    ///
    /// Duplicates are detected by case/whitespace-normalized question text;
    /// the first occurrence wins. Survivors keep their original order.
    pub fn filter(
        &self,
        candidates: Vec<QuestionCandidate>,
        category: Option<&str>,
        article_content: Option<&str>,
    ) -> Vec<QuestionCandidate> {
        let mut kept = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for (idx, candidate) in candidates.into_iter().enumerate() {
            let normalized = normalize_question(&candidate.question);
            if normalized.len() < 10 {
                tracing::debug!(index = idx + 1, "Dropping question: text too short");
                continue;
            }
            if seen.contains(&normalized) {
                tracing::debug!(index = idx + 1, "Dropping question: duplicate in batch");
                continue;
            }

            let score = score_question(&candidate, category, article_content);
            if score >= self.min_score {
                tracing::debug!(
                    index = idx + 1,
                    score = format!("{score:.1}"),
                    category = category.unwrap_or("Unknown"),
                    "Keeping question"
                );
                seen.insert(normalized);
                kept.push(candidate);
            } else {
                tracing::debug!(
                    index = idx + 1,
                    score = format!("{score:.1}"),
                    threshold = format!("{:.1}", self.min_score),
                    "Dropping question: below threshold"
                );
            }
        }

        kept
    }
}

/// Normalize question text for duplicate detection: lowercase, collapsed
/// whitespace, trimmed.
pub fn normalize_question(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Compute the composite heuristic quality score (0–100) for one candidate.
pub fn score_question(
    candidate: &QuestionCandidate,
    category: Option<&str>,
    article_content: Option<&str>,
) -> f64 {
    let text = candidate.question.trim();
    let text_lower = text.to_lowercase();
    let explanation = candidate.explanation.trim();
    let mut score = 0.0;

    // Question structure
    let word_count = text.split_whitespace().count();
    if word_count >= MIN_QUESTION_WORDS {
        score += 20.0;
        if word_count <= MAX_QUESTION_WORDS {
            score += 10.0;
        } else {
            score -= 5.0;
        }
    } else {
        score -= 20.0;
    }

    if text.ends_with('?') {
        score += 10.0;
    } else {
        score -= 5.0;
    }

    // Options sanity: exactly four distinct, non-trivial options
    let cleaned: Vec<String> = candidate
        .options
        .iter()
        .map(|opt| opt.trim().to_lowercase())
        .collect();
    if cleaned.len() == 4 && cleaned.iter().all(|opt| opt.len() >= 3) {
        let unique: HashSet<&String> = cleaned.iter().collect();
        match unique.len() {
            4 => score += 20.0,
            3 => score += 10.0,
            _ => score -= 10.0,
        }
    } else {
        score -= 15.0;
    }

    // Explanation depth
    if explanation.len() >= MIN_EXPLANATION_CHARS {
        score += 15.0;
        let expl_lower = explanation.to_lowercase();
        if CAUSAL_TOKENS.iter().any(|t| expl_lower.contains(t)) {
            score += 5.0;
        }
    } else {
        score -= 10.0;
    }

    // Category alignment
    let category_hits = category
        .and_then(category_keywords)
        .map(|kws| count_hits(&text_lower, kws))
        .unwrap_or(0);
    if category_hits > 0 {
        score += (category_hits as f64 * 5.0).min(20.0);
    } else {
        // neutral bump to avoid harsh penalty for small categories
        score += 5.0;
    }

    // General relevance
    let relevance_hits = count_hits(&text_lower, RELEVANT_KEYWORDS);
    score += (relevance_hits as f64 * 2.0).min(10.0);

    // Lexical overlap with the source article
    if let Some(content) = article_content {
        let overlap = content_overlap(text, content);
        if overlap >= 4 {
            score += 15.0;
        } else if overlap >= 2 {
            score += 5.0;
        } else {
            score -= 5.0;
        }
    }

    score.clamp(0.0, 100.0)
}

/// Count informative tokens (alphabetic, ≥4 chars) shared between question and
/// article text.
fn content_overlap(question: &str, article: &str) -> usize {
    let tokens = |s: &str| -> HashSet<String> {
        s.to_lowercase()
            .split(|c: char| !c.is_alphabetic())
            .filter(|t| t.len() >= 4)
            .map(str::to_string)
            .collect()
    };
    let q = tokens(question);
    let a = tokens(article);
    q.intersection(&a).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::AnswerKey;

    fn candidate(question: &str, explanation: &str) -> QuestionCandidate {
        QuestionCandidate {
            question: question.into(),
            options: vec![
                "A. Repo rate reduction".into(),
                "B. Reverse repo hike".into(),
                "C. CRR increase".into(),
                "D. SLR revision".into(),
            ],
            answer: AnswerKey::A,
            explanation: explanation.into(),
            difficulty: None,
        }
    }

    fn good_candidate() -> QuestionCandidate {
        candidate(
            "Which monetary policy action did the RBI take regarding the repo rate this quarter?",
            "The RBI cut the repo rate because inflation eased, therefore borrowing costs fell.",
        )
    }

    #[test]
    fn test_good_question_passes_default_threshold() {
        let filter = QualityFilter::new(55.0);
        let article = "RBI repo rate monetary policy inflation quarter banking";
        let kept = filter.filter(vec![good_candidate()], Some("Banking"), Some(article));
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_too_short_question_rejected_structurally() {
        let filter = QualityFilter::new(0.0);
        let kept = filter.filter(vec![candidate("Rate?", "x")], None, None);
        assert!(kept.is_empty());
    }

    #[test]
    fn test_batch_duplicates_collapse_to_one() {
        let filter = QualityFilter::new(0.0);
        let a = good_candidate();
        let mut b = good_candidate();
        // Same text modulo case and spacing
        b.question = format!("  {}  ", a.question.to_uppercase());
        let kept = filter.filter(vec![a, b], Some("Banking"), None);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_duplicate_options_penalised() {
        let mut dup = good_candidate();
        dup.options = vec![
            "A. Same option".into(),
            "B. Same option".into(),
            "C. Same option".into(),
            "D. Same option".into(),
        ];
        let distinct = score_question(&good_candidate(), Some("Banking"), None);
        let duplicated = score_question(&dup, Some("Banking"), None);
        assert!(distinct > duplicated);
    }

    #[test]
    fn test_overlap_with_article_raises_score() {
        let c = good_candidate();
        let matching = "The RBI repo rate and monetary policy decision this quarter drew \
                        attention from the banking sector over inflation.";
        let unrelated = "Completely different words about gardening and weather patterns.";
        let with = score_question(&c, Some("Banking"), Some(matching));
        let without = score_question(&c, Some("Banking"), Some(unrelated));
        assert!(with > without);
    }

    #[test]
    fn test_normalize_question() {
        assert_eq!(
            normalize_question("  What   IS  the Repo\tRate? "),
            "what is the repo rate?"
        );
    }
}
