use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process has locked the database
    #[error("Another pipeline run appears to hold the database. Wait for it to finish and retry.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Article Types
// ============================================================================

/// Lifecycle state of an article in the processing log.
///
/// Transitions are forward-only: `Pending` moves to exactly one of the
/// terminal states and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleStatus {
    Pending,
    Processed,
    Failed,
    Skipped,
}

impl ArticleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleStatus::Pending => "pending",
            ArticleStatus::Processed => "processed",
            ArticleStatus::Failed => "failed",
            ArticleStatus::Skipped => "skipped",
        }
    }
}

/// A crawled article ready for insertion.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub url: String,
    pub title: String,
    pub content: String,
    pub source: String,
    pub category: Option<String>,
    /// Publication date as YYYY-MM-DD.
    pub published: String,
}

/// An article loaded from the store.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredArticle {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub content: String,
    pub source: String,
    pub category: Option<String>,
    pub published: String,
}

// ============================================================================
// Persistence Types
// ============================================================================

/// Per-batch persistence statistics.
#[derive(Debug, Default)]
pub struct PersistenceResult {
    pub inserted: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

impl PersistenceResult {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

// ============================================================================
// Category Mapping
// ============================================================================

/// Mapping from crawl-side categories to the exam categories the question
/// store is organized by.
const CATEGORY_MAPPING: &[(&str, &str)] = &[
    ("Business", "Economy"),
    ("Economy", "Economy"),
    ("Banking", "Economy"),
    ("Trade", "Economy"),
    ("Current Affairs", "Current Affairs"),
    ("Polity", "India GK"),
    ("History", "History"),
    ("Geography", "India GK"),
    ("Science & Technology", "India GK"),
    ("Environment", "India GK"),
    ("International Relations", "Current Affairs"),
    ("General Knowledge", "India GK"),
    ("Explained", "Current Affairs"),
];

/// Map a pipeline category to its exam category. Unknown categories land in
/// "Current Affairs".
pub fn frontend_category(pipeline_category: &str) -> &'static str {
    CATEGORY_MAPPING
        .iter()
        .find(|(from, _)| from.eq_ignore_ascii_case(pipeline_category))
        .map(|(_, to)| *to)
        .unwrap_or("Current Affairs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frontend_category_mapping() {
        assert_eq!(frontend_category("Business"), "Economy");
        assert_eq!(frontend_category("banking"), "Economy");
        assert_eq!(frontend_category("Polity"), "India GK");
        assert_eq!(frontend_category("History"), "History");
        assert_eq!(frontend_category("Explained"), "Current Affairs");
        assert_eq!(frontend_category("Cryptozoology"), "Current Affairs");
    }

    #[test]
    fn test_status_as_str() {
        assert_eq!(ArticleStatus::Pending.as_str(), "pending");
        assert_eq!(ArticleStatus::Processed.as_str(), "processed");
        assert_eq!(ArticleStatus::Failed.as_str(), "failed");
        assert_eq!(ArticleStatus::Skipped.as_str(), "skipped");
    }
}
