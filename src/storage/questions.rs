//! Question persistence across the dual store.
//!
//! Every accepted batch lands in two places: a `daily_batches` audit record
//! holding the raw batch JSON, and individual rows in the serving `questions`
//! table. The two writes share a savepoint so a failure in either leaves no
//! trace of the batch.

use anyhow::Result;
use serde_json::json;
use sqlx::Acquire;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::schema::Database;
use super::types::{frontend_category, PersistenceResult};
use crate::generate::{QuestionBatch, QuestionCandidate};

/// Category name -> id mapping with a TTL, so each batch does not re-query a
/// table that changes only on migration.
struct CategoryCache {
    map: HashMap<String, i64>,
    loaded_at: Option<Instant>,
}

pub struct PersistenceCoordinator {
    db: Database,
    cache: Mutex<CategoryCache>,
    cache_ttl: Duration,
}

impl PersistenceCoordinator {
    pub fn new(db: Database, cache_ttl: Duration) -> Self {
        Self {
            db,
            cache: Mutex::new(CategoryCache {
                map: HashMap::new(),
                loaded_at: None,
            }),
            cache_ttl,
        }
    }

    /// Persist one generation batch atomically.
    ///
    /// Individual duplicate questions are skipped without failing the batch;
    /// a write error rolls back the whole batch (audit record included) and
    /// surfaces in `PersistenceResult::errors`.
    pub async fn persist(&self, batch: &QuestionBatch) -> Result<PersistenceResult> {
        let mut result = PersistenceResult::default();

        let exam_category = frontend_category(&batch.category);
        let category_id = match self.category_id(exam_category).await? {
            Some(id) => id,
            None => {
                let msg = format!("Category not found: {exam_category}");
                tracing::error!(category = exam_category, "Unknown exam category");
                result.errors.push(msg);
                return Ok(result);
            }
        };

        let mut tx = self.db.pool.begin().await?;
        // Savepoint around the batch record and its question rows
        let mut sp = tx.begin().await?;

        let questions_json = serde_json::to_string(&batch_json(batch))?;
        let batch_insert = sqlx::query(
            r#"
            INSERT INTO daily_batches (source, category, date, total_questions, questions_json)
            VALUES (?, ?, ?, ?, ?)
        "#,
        )
        .bind(&batch.source)
        .bind(&batch.category)
        .bind(&batch.date)
        .bind(batch.total_questions as i64)
        .bind(&questions_json)
        .execute(&mut *sp)
        .await;

        if let Err(e) = batch_insert {
            sp.rollback().await?;
            tx.commit().await?;
            tracing::error!(error = %e, source = %batch.source, "Failed to record batch");
            result.errors.push(format!("batch record failed: {e}"));
            return Ok(result);
        }

        for question in &batch.questions {
            let existing: Result<Option<(i64,)>, sqlx::Error> =
                sqlx::query_as("SELECT id FROM questions WHERE question_text = ? LIMIT 1")
                    .bind(&question.question)
                    .fetch_optional(&mut *sp)
                    .await;

            match existing {
                Ok(Some(_)) => {
                    tracing::debug!(
                        question = question.question.chars().take(50).collect::<String>(),
                        "Skipping duplicate question"
                    );
                    result.skipped += 1;
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    sp.rollback().await?;
                    tx.commit().await?;
                    result.errors.push(format!("duplicate check failed: {e}"));
                    result.inserted = 0;
                    return Ok(result);
                }
            }

            let difficulty = derive_difficulty(question, &batch.source);
            let points = points_for(difficulty);

            let insert = sqlx::query(
                r#"
                INSERT INTO questions (
                    category_id, question_text,
                    option_a, option_b, option_c, option_d,
                    correct_answer, explanation, difficulty, points,
                    source, source_date
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            )
            .bind(category_id)
            .bind(&question.question)
            .bind(&question.options[0])
            .bind(&question.options[1])
            .bind(&question.options[2])
            .bind(&question.options[3])
            .bind(question.answer.as_lower())
            .bind(&question.explanation)
            .bind(difficulty)
            .bind(points)
            .bind(&batch.source)
            .bind(&batch.date)
            .execute(&mut *sp)
            .await;

            match insert {
                Ok(_) => result.inserted += 1,
                Err(e) => {
                    sp.rollback().await?;
                    tx.commit().await?;
                    tracing::error!(error = %e, "Question insert failed, batch rolled back");
                    result.errors.push(format!("question insert failed: {e}"));
                    result.inserted = 0;
                    return Ok(result);
                }
            }
        }

        sp.commit().await?;
        tx.commit().await?;

        tracing::info!(
            source = %batch.source,
            category = %batch.category,
            inserted = result.inserted,
            skipped = result.skipped,
            "Batch persisted"
        );
        Ok(result)
    }

    /// Questions already persisted today for a pipeline category, from the
    /// audit records. Seeds the orchestrator's quota counters so reruns on
    /// the same day respect earlier output.
    pub async fn questions_generated_today(&self, category: &str, date: &str) -> Result<i64> {
        let row: (Option<i64>,) = sqlx::query_as(
            "SELECT SUM(total_questions) FROM daily_batches WHERE category = ? AND date = ?",
        )
        .bind(category)
        .bind(date)
        .fetch_one(&self.db.pool)
        .await?;
        Ok(row.0.unwrap_or(0))
    }

    async fn category_id(&self, name: &str) -> Result<Option<i64>> {
        let mut cache = self.cache.lock().await;
        let stale = cache
            .loaded_at
            .map(|at| at.elapsed() >= self.cache_ttl)
            .unwrap_or(true);
        if stale {
            let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id, name FROM categories")
                .fetch_all(&self.db.pool)
                .await?;
            cache.map = rows.into_iter().map(|(id, name)| (name, id)).collect();
            cache.loaded_at = Some(Instant::now());
        }
        Ok(cache.map.get(name).copied())
    }

    /// Drop the cached category mapping; the next lookup reloads it.
    #[allow(dead_code)]
    pub async fn invalidate_cache(&self) {
        self.cache.lock().await.loaded_at = None;
    }
}

fn batch_json(batch: &QuestionBatch) -> serde_json::Value {
    json!({
        "source": batch.source,
        "category": batch.category,
        "date": batch.date,
        "total_questions": batch.total_questions,
        "questions": batch.questions.iter().map(|q| json!({
            "question": q.question,
            "options": q.options,
            "answer": q.answer.as_lower().to_uppercase(),
            "explanation": q.explanation,
        })).collect::<Vec<_>>(),
    })
}

/// Difficulty from content length when the model did not supply one.
/// Broadsheet sources run denser prose, so their thresholds sit higher.
fn derive_difficulty(question: &QuestionCandidate, source: &str) -> &'static str {
    if let Some(d) = question.difficulty.as_deref() {
        match d {
            "easy" => return "easy",
            "medium" => return "medium",
            "hard" => return "hard",
            _ => {}
        }
    }

    let total_length = question.question.len() + question.explanation.len();
    if matches!(source, "The Hindu" | "Indian Express") {
        if total_length > 400 {
            "hard"
        } else if total_length > 250 {
            "medium"
        } else {
            "easy"
        }
    } else if total_length > 350 {
        "medium"
    } else {
        "easy"
    }
}

fn points_for(difficulty: &str) -> i64 {
    match difficulty {
        "hard" => 20,
        "medium" => 15,
        _ => 10,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::AnswerKey;

    fn candidate(text: &str) -> QuestionCandidate {
        QuestionCandidate {
            question: text.to_string(),
            options: vec![
                "A. One".into(),
                "B. Two".into(),
                "C. Three".into(),
                "D. Four".into(),
            ],
            answer: AnswerKey::B,
            explanation: "Stated in the article.".to_string(),
            difficulty: None,
        }
    }

    fn batch(questions: Vec<QuestionCandidate>) -> QuestionBatch {
        QuestionBatch {
            source: "The Hindu".into(),
            category: "Business".into(),
            date: "2026-08-31".into(),
            total_questions: questions.len(),
            questions,
        }
    }

    async fn coordinator() -> PersistenceCoordinator {
        let db = Database::open(":memory:").await.unwrap();
        PersistenceCoordinator::new(db, Duration::from_secs(300))
    }

    #[tokio::test]
    async fn test_persist_writes_both_stores() {
        let pc = coordinator().await;
        let result = pc
            .persist(&batch(vec![candidate("What did the RBI cut?")]))
            .await
            .unwrap();
        assert!(result.is_success());
        assert_eq!(result.inserted, 1);

        let batches: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM daily_batches")
            .fetch_one(&pc.db.pool)
            .await
            .unwrap();
        assert_eq!(batches.0, 1);

        // Business maps to the Economy exam category
        let row: (String, String, i64) = sqlx::query_as(
            r#"
            SELECT c.name, q.correct_answer, q.points
            FROM questions q JOIN categories c ON c.id = q.category_id
        "#,
        )
        .fetch_one(&pc.db.pool)
        .await
        .unwrap();
        assert_eq!(row.0, "Economy");
        assert_eq!(row.1, "b");
        assert_eq!(row.2, 10);
    }

    #[tokio::test]
    async fn test_cross_batch_duplicates_skipped() {
        let pc = coordinator().await;
        pc.persist(&batch(vec![candidate("Repeated question?")]))
            .await
            .unwrap();
        let result = pc
            .persist(&batch(vec![
                candidate("Repeated question?"),
                candidate("A new question?"),
            ]))
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(result.inserted, 1);
        assert_eq!(result.skipped, 1);

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM questions")
            .fetch_one(&pc.db.pool)
            .await
            .unwrap();
        assert_eq!(count.0, 2);
    }

    #[tokio::test]
    async fn test_quota_accounting_from_audit_records() {
        let pc = coordinator().await;
        pc.persist(&batch(vec![candidate("Q one?"), candidate("Q two?")]))
            .await
            .unwrap();
        pc.persist(&batch(vec![candidate("Q three?")]))
            .await
            .unwrap();

        assert_eq!(
            pc.questions_generated_today("Business", "2026-08-31")
                .await
                .unwrap(),
            3
        );
        assert_eq!(
            pc.questions_generated_today("Business", "2026-09-01")
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_write_failure_rolls_back_batch_record() {
        let pc = coordinator().await;
        // Dropping the questions table makes the question insert fail while
        // the daily_batches insert still succeeds inside the savepoint
        sqlx::query("DROP TABLE questions")
            .execute(&pc.db.pool)
            .await
            .unwrap();

        let result = pc
            .persist(&batch(vec![candidate("Doomed question?")]))
            .await
            .unwrap();
        assert!(!result.is_success());
        assert_eq!(result.inserted, 0);

        let batches: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM daily_batches")
            .fetch_one(&pc.db.pool)
            .await
            .unwrap();
        assert_eq!(batches.0, 0, "batch record must roll back with the questions");
    }

    #[test]
    fn test_difficulty_thresholds() {
        let mut q = candidate("short?");
        q.explanation = "e".repeat(50);
        assert_eq!(derive_difficulty(&q, "The Hindu"), "easy");

        q.explanation = "e".repeat(300);
        assert_eq!(derive_difficulty(&q, "The Hindu"), "medium");

        q.explanation = "e".repeat(450);
        assert_eq!(derive_difficulty(&q, "The Hindu"), "hard");
        // Non-broadsheet sources cap at medium
        assert_eq!(derive_difficulty(&q, "PIB"), "medium");
    }

    #[test]
    fn test_model_supplied_difficulty_wins() {
        let mut q = candidate("short?");
        q.difficulty = Some("hard".into());
        assert_eq!(derive_difficulty(&q, "PIB"), "hard");

        q.difficulty = Some("impossible".into());
        assert_eq!(derive_difficulty(&q, "PIB"), "easy");
    }

    #[test]
    fn test_points_for_difficulty() {
        assert_eq!(points_for("easy"), 10);
        assert_eq!(points_for("medium"), 15);
        assert_eq!(points_for("hard"), 20);
        assert_eq!(points_for("unknown"), 10);
    }
}
