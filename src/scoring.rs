//! Article scoring and ranking.
//!
//! Scores are heuristic estimates of how much question-generation potential an
//! article has. Scoring is a pure function of the article text and the target
//! category — no I/O, fully deterministic — so the orchestrator can sort the
//! whole pending set globally and reproducibly.

use crate::keywords::{
    category_keywords, count_hits, CONCEPTUAL_KEYWORDS, DATA_KEYWORDS, HIGH_VALUE_KEYWORDS,
    RELEVANT_KEYWORDS,
};
use crate::storage::StoredArticle;

/// An article paired with its computed score. Per-run only, never persisted.
#[derive(Debug, Clone)]
pub struct ScoredArticle {
    pub article: StoredArticle,
    pub score: f64,
}

/// Score an article's question-generation potential on a 0–100 scale.
///
/// Five weighted sub-scores over the combined lowercased title + body text:
/// exam relevance (×0.4), target-category match (×0.2, omitted when no target
/// category is given), high-value domain keywords (×0.2), numeric/statistical
/// language (×0.1), conceptual/causal language (×0.1). Well-formed titles
/// (5–15 words) earn a small bonus; combined text under 200 characters takes a
/// ×0.7 penalty. The result is clamped to [0, 100].
pub fn score_article(title: &str, body: &str, target_category: Option<&str>) -> f64 {
    let title_lower = title.to_lowercase();
    let combined = format!("{} {}", title_lower, body.to_lowercase());

    let mut score = relevance_score(&combined) * 0.4;

    if let Some(category) = target_category {
        score += category_match_score(&combined, category) * 0.2;
    }

    score += high_value_score(&combined) * 0.2;
    score += data_presence_score(&combined) * 0.1;
    score += conceptual_score(&combined) * 0.1;

    // Title quality bonus: well-formed titles indicate important articles
    let title_words = title_lower.split_whitespace().count();
    if (5..=15).contains(&title_words) {
        score += 2.0;
    }

    // Short articles yield fewer questions
    if combined.len() < 200 {
        score *= 0.7;
    }

    score.clamp(0.0, 100.0)
}

/// Rank articles by score, descending, and keep the top `top_n`.
///
/// The sort is stable: equal scores keep their discovery order.
pub fn rank_articles(
    articles: &[StoredArticle],
    target_category: Option<&str>,
    top_n: usize,
) -> Vec<ScoredArticle> {
    let mut scored: Vec<ScoredArticle> = articles
        .iter()
        .map(|article| ScoredArticle {
            score: score_article(&article.title, &article.content, target_category),
            article: article.clone(),
        })
        .collect();
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    if let (Some(top), Some(bottom)) = (scored.first(), scored.last()) {
        tracing::info!(
            top = format!("{:.1}", top.score),
            bottom = format!("{:.1}", bottom.score),
            "Article scoring complete"
        );
    }
    scored.truncate(top_n);
    scored
}

/// General exam-relevance keyword density (0–100).
///
/// 0–5 keywords map to 0–50; each keyword past the fifth adds 5, capped at 100.
fn relevance_score(text: &str) -> f64 {
    let hits = count_hits(text, RELEVANT_KEYWORDS);
    if hits >= 5 {
        50.0 + ((hits - 5) as f64 * 5.0).min(50.0)
    } else {
        hits as f64 * 10.0
    }
}

/// Target-category keyword match (0–100). Unknown categories score neutral.
fn category_match_score(text: &str, category: &str) -> f64 {
    let Some(keywords) = category_keywords(category) else {
        return 50.0;
    };
    match count_hits(text, keywords) {
        0 => 0.0,
        1 => 50.0,
        n => 50.0 + ((n - 1) as f64 * 25.0).min(50.0),
    }
}

fn high_value_score(text: &str) -> f64 {
    (count_hits(text, HIGH_VALUE_KEYWORDS) as f64 * 10.0).min(100.0)
}

/// Numeric/statistical density: keyword hits plus raw digit-run count.
fn data_presence_score(text: &str) -> f64 {
    let keyword_part = (count_hits(text, DATA_KEYWORDS) as f64 * 10.0).min(50.0);

    // Count runs of digits as a proxy for statistics
    let mut numbers = 0usize;
    let mut in_number = false;
    for c in text.chars() {
        if c.is_ascii_digit() {
            if !in_number {
                numbers += 1;
                in_number = true;
            }
        } else {
            in_number = false;
        }
    }
    let number_part = (numbers as f64 * 2.0).min(50.0);

    (keyword_part + number_part).min(100.0)
}

fn conceptual_score(text: &str) -> f64 {
    (count_hits(text, CONCEPTUAL_KEYWORDS) as f64 * 15.0).min(100.0)
}
