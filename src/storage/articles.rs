use anyhow::Result;
use chrono::Utc;

use super::schema::Database;
use super::types::{ArticleStatus, NewArticle, StoredArticle};

impl Database {
    // ========================================================================
    // Article Operations
    // ========================================================================

    /// Insert a newly crawled article together with its pending log row, in
    /// one transaction. Returns false (and writes nothing) when the URL is
    /// already known.
    pub async fn insert_article(&self, article: &NewArticle) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO articles (url, title, content, source, category, published)
            VALUES (?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(&article.url)
        .bind(&article.title)
        .bind(&article.content)
        .bind(&article.source)
        .bind(&article.category)
        .bind(&article.published)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("INSERT INTO article_log (url, status) VALUES (?, 'pending')")
            .bind(&article.url)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// True if an article with this URL has already been stored.
    pub async fn article_exists(&self, url: &str) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM articles WHERE url = ? LIMIT 1")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Load all pending articles in log order (insertion order), which makes
    /// run-to-run processing deterministic.
    pub async fn pending_articles(&self) -> Result<Vec<StoredArticle>> {
        let articles = sqlx::query_as::<_, StoredArticle>(
            r#"
            SELECT a.id, a.url, a.title, a.content, a.source, a.category, a.published
            FROM articles a
            JOIN article_log l ON l.url = a.url
            WHERE l.status = 'pending'
            ORDER BY l.id ASC
        "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(articles)
    }

    /// Record an article's terminal status in the processing log.
    pub async fn update_article_status(
        &self,
        url: &str,
        status: ArticleStatus,
        error: Option<&str>,
        questions_generated: usize,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE article_log
            SET status = ?, error = ?, questions_generated = ?, processed_at = ?
            WHERE url = ?
        "#,
        )
        .bind(status.as_str())
        .bind(error)
        .bind(questions_generated as i64)
        .bind(Utc::now().format("%Y-%m-%d %H:%M:%S").to_string())
        .bind(url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persist a category assigned after crawling (backfill for feeds whose
    /// section the crawler could not map).
    pub async fn set_article_category(&self, url: &str, category: &str) -> Result<()> {
        sqlx::query("UPDATE articles SET category = ? WHERE url = ?")
            .bind(category)
            .bind(url)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Count log rows by status, for end-of-run reporting.
    pub async fn count_by_status(&self, status: ArticleStatus) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM article_log WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(url: &str) -> NewArticle {
        NewArticle {
            url: url.to_string(),
            title: "RBI cuts repo rate".to_string(),
            content: "The RBI cut the repo rate by 25 basis points.".to_string(),
            source: "The Hindu".to_string(),
            category: Some("Business".to_string()),
            published: "2026-08-31".to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_load_pending() {
        let db = Database::open(":memory:").await.unwrap();
        assert!(db.insert_article(&article("https://x.com/a")).await.unwrap());

        let pending = db.pending_articles().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].url, "https://x.com/a");
        assert_eq!(pending[0].category.as_deref(), Some("Business"));
    }

    #[tokio::test]
    async fn test_duplicate_url_ignored() {
        let db = Database::open(":memory:").await.unwrap();
        assert!(db.insert_article(&article("https://x.com/a")).await.unwrap());
        assert!(!db.insert_article(&article("https://x.com/a")).await.unwrap());
        assert!(db.article_exists("https://x.com/a").await.unwrap());
        assert!(!db.article_exists("https://x.com/b").await.unwrap());

        // The log must not gain a second row either
        assert_eq!(db.count_by_status(ArticleStatus::Pending).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_pending_order_is_insertion_order() {
        let db = Database::open(":memory:").await.unwrap();
        for i in 0..5 {
            db.insert_article(&article(&format!("https://x.com/{i}")))
                .await
                .unwrap();
        }
        let urls: Vec<String> = db
            .pending_articles()
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.url)
            .collect();
        let expected: Vec<String> = (0..5).map(|i| format!("https://x.com/{i}")).collect();
        assert_eq!(urls, expected);
    }

    #[tokio::test]
    async fn test_status_update_removes_from_pending() {
        let db = Database::open(":memory:").await.unwrap();
        db.insert_article(&article("https://x.com/a")).await.unwrap();
        db.update_article_status("https://x.com/a", ArticleStatus::Processed, None, 7)
            .await
            .unwrap();

        assert!(db.pending_articles().await.unwrap().is_empty());
        assert_eq!(
            db.count_by_status(ArticleStatus::Processed).await.unwrap(),
            1
        );

        let row: (String, i64) = sqlx::query_as(
            "SELECT status, questions_generated FROM article_log WHERE url = 'https://x.com/a'",
        )
        .fetch_one(&db.pool)
        .await
        .unwrap();
        assert_eq!(row.0, "processed");
        assert_eq!(row.1, 7);
    }

    #[tokio::test]
    async fn test_category_backfill() {
        let db = Database::open(":memory:").await.unwrap();
        let mut a = article("https://x.com/a");
        a.category = None;
        db.insert_article(&a).await.unwrap();

        db.set_article_category("https://x.com/a", "Economy")
            .await
            .unwrap();
        let pending = db.pending_articles().await.unwrap();
        assert_eq!(pending[0].category.as_deref(), Some("Economy"));
    }
}
