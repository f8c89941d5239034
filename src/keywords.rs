//! Keyword tables used for relevance checks, category classification, and
//! article/question scoring.
//!
//! All matching is case-insensitive substring containment against lowercased
//! text. The tables are tuning values, not a contract — see `scoring.rs` for
//! how they combine.

/// Keywords indicating exam-relevant content (economy / polity / governance).
pub const RELEVANT_KEYWORDS: &[&str] = &[
    "budget",
    "economy",
    "finance",
    "banking",
    "trade",
    "policy",
    "government",
    "scheme",
    "initiative",
    "reform",
    "regulation",
    "infrastructure",
    "employment",
    "energy",
    "fiscal",
    "monetary",
    "rbi",
    "reserve bank",
    "union budget",
    "economic survey",
    "gdp",
    "inflation",
    "deficit",
    "tax",
    "revenue",
    "expenditure",
    "ministry",
    "department",
    "commission",
    "committee",
    "report",
    "index",
    "indicator",
    "growth",
    "sector",
    "industry",
];

/// Per-category keyword lists used for classification and category-match scoring.
pub const CATEGORIES: &[(&str, &[&str])] = &[
    (
        "Business",
        &["business", "corporate", "company", "market", "stock", "share"],
    ),
    (
        "Economy",
        &["economy", "economic", "gdp", "growth", "inflation", "fiscal"],
    ),
    (
        "Budget",
        &["budget", "union budget", "expenditure", "revenue", "allocation"],
    ),
    (
        "Polity",
        &["government", "ministry", "policy", "scheme", "initiative"],
    ),
    (
        "Banking",
        &["banking", "rbi", "reserve bank", "monetary", "interest rate"],
    ),
    (
        "Trade",
        &["trade", "export", "import", "commerce", "trading"],
    ),
];

/// High-value domain keywords: strong signals of question-generation potential.
pub const HIGH_VALUE_KEYWORDS: &[&str] = &[
    "policy",
    "scheme",
    "initiative",
    "reform",
    "regulation",
    "act",
    "bill",
    "budget",
    "allocation",
    "expenditure",
    "revenue",
    "fiscal",
    "gdp",
    "growth",
    "inflation",
    "deficit",
    "surplus",
    "rbi",
    "reserve bank",
    "monetary",
    "interest rate",
    "repo rate",
    "trade",
    "export",
    "import",
    "balance",
    "government",
    "ministry",
    "department",
    "commission",
    "committee",
    "report",
    "survey",
    "index",
    "indicator",
    "employment",
    "unemployment",
    "job",
    "skill",
    "energy",
    "renewable",
    "solar",
    "wind",
    "power",
    "infrastructure",
    "development",
    "project",
];

/// Numeric / statistical language markers.
pub const DATA_KEYWORDS: &[&str] = &[
    "percent",
    "percentage",
    "%",
    "crore",
    "billion",
    "million",
    "increase",
    "decrease",
    "growth",
    "decline",
    "rise",
    "fall",
    "compared to",
    "compared with",
    "versus",
    "vs",
    "higher than",
    "lower than",
    "above",
    "below",
];

/// Conceptual / causal language markers.
pub const CONCEPTUAL_KEYWORDS: &[&str] = &[
    "implication",
    "impact",
    "effect",
    "influence",
    "relationship",
    "cause",
    "due to",
    "because of",
    "result",
    "significance",
    "importance",
    "relevance",
    "strategy",
    "approach",
    "method",
    "framework",
];

/// Look up the keyword list for a known category name.
pub fn category_keywords(category: &str) -> Option<&'static [&'static str]> {
    CATEGORIES
        .iter()
        .find(|(name, _)| *name == category)
        .map(|(_, kws)| *kws)
}

/// Count how many of `keywords` appear in the (lowercased) text.
pub fn count_hits(text_lower: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|kw| text_lower.contains(*kw)).count()
}

/// Whether the content is worth spending a generation call on.
///
/// Requires at least 100 characters of trimmed text and at least one
/// exam-relevance keyword hit.
pub fn is_relevant_content(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.len() < 100 {
        return false;
    }
    let lower = trimmed.to_lowercase();
    RELEVANT_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Classify content into the category with the most keyword hits.
///
/// Falls back to "Business" when nothing matches.
pub fn classify_category(text: &str, title: &str) -> &'static str {
    let combined = format!("{} {}", title, text).to_lowercase();

    let best = CATEGORIES
        .iter()
        .map(|(name, kws)| (*name, count_hits(&combined, kws)))
        .filter(|(_, hits)| *hits > 0)
        .max_by_key(|(_, hits)| *hits);

    match best {
        Some((name, _)) => name,
        None => "Business",
    }
}
