//! Integration tests for the generation run: ranking, admission caps, daily
//! quota, cancellation, and terminal article states.
//!
//! Each test creates its own in-memory SQLite database for isolation and
//! drives the orchestrator with a scripted generation backend, so no network
//! is involved.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use qbank::cancel::{CancellationGateway, ControlPlane, NullControlPlane, PlaneError, RunState};
use qbank::generate::{AnswerKey, GenerationRequest, GenerationService, Outcome, QuestionBatch, QuestionCandidate};
use qbank::pipeline::PipelineOrchestrator;
use qbank::storage::{ArticleStatus, Database, NewArticle, PersistenceCoordinator};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const RUN_DATE: &str = "2026-08-31";

async fn test_db() -> Database {
    Database::open(":memory:").await.unwrap()
}

fn test_config() -> qbank::config::Config {
    qbank::config::Config {
        // Scripted batches are hand-built; quality scoring itself is covered
        // by unit tests, so the floor is lowered out of the way here.
        question_quality_min_score: 0.0,
        ..Default::default()
    }
}

fn business_article(n: usize) -> NewArticle {
    NewArticle {
        url: format!("https://news.example.com/business/{n}"),
        title: format!("RBI announces repo rate decision {n}"),
        content: "The Reserve Bank of India announced changes to the repo rate \
                  affecting banking and the wider economy. The monetary policy \
                  decision is expected to influence inflation, GDP growth and \
                  the fiscal outlook, and analysts expect the finance ministry \
                  to respond with fresh budget measures."
            .to_string(),
        source: "The Hindu".to_string(),
        category: Some("Business".to_string()),
        published: RUN_DATE.to_string(),
    }
}

fn candidate(topic: &str) -> QuestionCandidate {
    QuestionCandidate {
        question: format!("What did the central bank announce regarding {topic}?"),
        options: vec![
            "A rate increase".to_string(),
            "A rate reduction".to_string(),
            "No change at all".to_string(),
            "A new committee".to_string(),
        ],
        answer: AnswerKey::B,
        explanation: "The announcement reduced the rate because the regulator \
                      judged inflation to be within the tolerance band."
            .to_string(),
        difficulty: None,
    }
}

/// A generated batch whose question texts are unique across the whole test
/// (the persistence layer deduplicates on exact question text).
fn batch(prefix: &str, count: usize) -> Outcome {
    let questions: Vec<QuestionCandidate> = (0..count)
        .map(|i| candidate(&format!("{prefix} item {i}")))
        .collect();
    Outcome::Generated(QuestionBatch {
        source: "The Hindu".to_string(),
        category: "Business".to_string(),
        date: RUN_DATE.to_string(),
        total_questions: questions.len(),
        questions,
    })
}

/// Generation backend that replays a scripted sequence of outcomes and counts
/// how many times it was called.
struct ScriptedGenerator {
    outcomes: Mutex<VecDeque<Outcome>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedGenerator {
    fn new(outcomes: Vec<Outcome>) -> (Arc<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let generator = Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            calls: calls.clone(),
        });
        (generator, calls)
    }
}

#[async_trait]
impl GenerationService for ScriptedGenerator {
    async fn generate(&self, _request: &GenerationRequest<'_>) -> Outcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Outcome::NotRelevant)
    }
}

fn orchestrator(
    db: &Database,
    generator: Arc<ScriptedGenerator>,
    config: qbank::config::Config,
) -> PipelineOrchestrator {
    let persistence = PersistenceCoordinator::new(db.clone(), Duration::from_secs(60));
    PipelineOrchestrator::new(db.clone(), generator, persistence, config)
}

// ============================================================================
// End-to-end processing
// ============================================================================

#[tokio::test]
async fn test_run_processes_pending_articles_end_to_end() {
    let db = test_db().await;
    db.insert_article(&business_article(1)).await.unwrap();
    db.insert_article(&business_article(2)).await.unwrap();

    let (generator, calls) = ScriptedGenerator::new(vec![batch("first", 3), batch("second", 3)]);
    let orch = orchestrator(&db, generator, test_config());

    let stats = orch.run(RUN_DATE, &CancellationGateway::disabled()).await.unwrap();

    assert_eq!(stats.articles_processed, 2);
    assert_eq!(stats.questions_generated, 6);
    assert_eq!(stats.articles_failed, 0);
    assert!(!stats.cancelled);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // Both articles reached a terminal state
    assert_eq!(db.count_by_status(ArticleStatus::Processed).await.unwrap(), 2);
    assert!(db.pending_articles().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_pending_set_is_a_noop() {
    let db = test_db().await;
    let (generator, calls) = ScriptedGenerator::new(vec![]);
    let orch = orchestrator(&db, generator, test_config());

    let stats = orch.run(RUN_DATE, &CancellationGateway::disabled()).await.unwrap();

    assert_eq!(stats.articles_processed, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Daily quota
// ============================================================================

#[tokio::test]
async fn test_quota_truncates_batch_then_skips_remaining_articles() {
    let db = test_db().await;
    for n in 1..=3 {
        db.insert_article(&business_article(n)).await.unwrap();
    }

    // Quota 12: the first article contributes 10, the second batch of 5 is
    // truncated to the remaining 2, and the third article is skipped outright.
    let mut config = test_config();
    config.questions_per_category_per_day = 12;

    let (generator, calls) =
        ScriptedGenerator::new(vec![batch("first", 10), batch("second", 5), batch("third", 5)]);
    let orch = orchestrator(&db, generator, config);

    let stats = orch.run(RUN_DATE, &CancellationGateway::disabled()).await.unwrap();

    assert_eq!(stats.questions_generated, 12);
    assert_eq!(stats.articles_processed, 2);
    assert_eq!(stats.articles_skipped, 1);
    // The third article never reached the backend
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_quota_counts_questions_persisted_by_earlier_runs() {
    let db = test_db().await;
    db.insert_article(&business_article(1)).await.unwrap();

    let mut config = test_config();
    config.questions_per_category_per_day = 10;

    // First run uses the whole quota
    let (generator, _) = ScriptedGenerator::new(vec![batch("first-run", 10)]);
    let orch = orchestrator(&db, generator, config.clone());
    let stats = orch.run(RUN_DATE, &CancellationGateway::disabled()).await.unwrap();
    assert_eq!(stats.questions_generated, 10);

    // A rerun on the same date finds the quota already met
    db.insert_article(&business_article(2)).await.unwrap();
    let (generator, calls) = ScriptedGenerator::new(vec![batch("second-run", 5)]);
    let orch = orchestrator(&db, generator, config);
    let stats = orch.run(RUN_DATE, &CancellationGateway::disabled()).await.unwrap();

    assert_eq!(stats.questions_generated, 0);
    assert_eq!(stats.articles_skipped, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Admission and relevance gates
// ============================================================================

#[tokio::test]
async fn test_irrelevant_article_skipped_without_generator_call() {
    let db = test_db().await;
    db.insert_article(&NewArticle {
        url: "https://news.example.com/sport/final".to_string(),
        title: "Home side clinches the series".to_string(),
        content: "The home team won the cricket match by five wickets on a \
                  humid evening at the stadium. The captain praised the \
                  bowlers for a disciplined spell and the crowd celebrated \
                  late into the night as the visitors struggled against spin."
            .to_string(),
        source: "The Hindu".to_string(),
        category: Some("Business".to_string()),
        published: RUN_DATE.to_string(),
    })
    .await
    .unwrap();

    let (generator, calls) = ScriptedGenerator::new(vec![batch("unused", 3)]);
    let orch = orchestrator(&db, generator, test_config());

    let stats = orch.run(RUN_DATE, &CancellationGateway::disabled()).await.unwrap();

    assert_eq!(stats.articles_skipped, 1);
    assert_eq!(stats.questions_generated, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(db.count_by_status(ArticleStatus::Skipped).await.unwrap(), 1);
}

#[tokio::test]
async fn test_disabled_category_is_skipped() {
    let db = test_db().await;
    db.insert_article(&business_article(1)).await.unwrap();

    let mut config = test_config();
    config.enabled_categories = vec!["Polity".to_string()];

    let (generator, calls) = ScriptedGenerator::new(vec![batch("unused", 3)]);
    let orch = orchestrator(&db, generator, config);

    let stats = orch.run(RUN_DATE, &CancellationGateway::disabled()).await.unwrap();

    assert_eq!(stats.articles_skipped, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_wildcard_category_list_processes_articles() {
    let db = test_db().await;
    db.insert_article(&business_article(1)).await.unwrap();

    let mut config = test_config();
    config.enabled_categories = vec!["*".to_string()];

    let (generator, calls) = ScriptedGenerator::new(vec![batch("wild", 3)]);
    let orch = orchestrator(&db, generator, config);

    let stats = orch.run(RUN_DATE, &CancellationGateway::disabled()).await.unwrap();

    assert_eq!(stats.articles_processed, 1);
    assert_eq!(stats.articles_skipped, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_per_run_cap_defers_remaining_articles() {
    let db = test_db().await;
    for n in 1..=4 {
        db.insert_article(&business_article(n)).await.unwrap();
    }

    let mut config = test_config();
    config.max_articles_per_run = 2;

    let (generator, calls) = ScriptedGenerator::new(vec![batch("one", 2), batch("two", 2)]);
    let orch = orchestrator(&db, generator, config);

    let stats = orch.run(RUN_DATE, &CancellationGateway::disabled()).await.unwrap();

    assert_eq!(stats.articles_processed, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    // Deferred articles stay pending for the next run, not skipped
    assert_eq!(db.pending_articles().await.unwrap().len(), 2);
}

// ============================================================================
// Backend outcomes
// ============================================================================

#[tokio::test]
async fn test_failed_generation_marks_article_failed() {
    let db = test_db().await;
    db.insert_article(&business_article(1)).await.unwrap();

    let (generator, _) =
        ScriptedGenerator::new(vec![Outcome::Failed("backend unavailable".to_string())]);
    let orch = orchestrator(&db, generator, test_config());

    let stats = orch.run(RUN_DATE, &CancellationGateway::disabled()).await.unwrap();

    assert_eq!(stats.articles_failed, 1);
    assert_eq!(stats.questions_generated, 0);
    assert_eq!(stats.errors.len(), 1);
    assert!(stats.errors[0].contains("backend unavailable"));
    assert_eq!(db.count_by_status(ArticleStatus::Failed).await.unwrap(), 1);
}

#[tokio::test]
async fn test_not_relevant_outcome_skips_article() {
    let db = test_db().await;
    db.insert_article(&business_article(1)).await.unwrap();

    let (generator, _) = ScriptedGenerator::new(vec![Outcome::NotRelevant]);
    let orch = orchestrator(&db, generator, test_config());

    let stats = orch.run(RUN_DATE, &CancellationGateway::disabled()).await.unwrap();

    assert_eq!(stats.articles_skipped, 1);
    assert_eq!(stats.articles_failed, 0);
    assert_eq!(db.count_by_status(ArticleStatus::Skipped).await.unwrap(), 1);
}

#[tokio::test]
async fn test_duplicate_questions_within_batch_are_dropped() {
    let db = test_db().await;
    db.insert_article(&business_article(1)).await.unwrap();

    let duplicate = candidate("the same repo rate change");
    let questions = vec![duplicate.clone(), duplicate, candidate("a different reform")];
    let (generator, _) = ScriptedGenerator::new(vec![Outcome::Generated(QuestionBatch {
        source: "The Hindu".to_string(),
        category: "Business".to_string(),
        date: RUN_DATE.to_string(),
        total_questions: questions.len(),
        questions,
    })]);
    let orch = orchestrator(&db, generator, test_config());

    let stats = orch.run(RUN_DATE, &CancellationGateway::disabled()).await.unwrap();

    assert_eq!(stats.articles_processed, 1);
    assert_eq!(stats.questions_generated, 2);
}

// ============================================================================
// Cancellation
// ============================================================================

/// Control plane that reports Cancelled once the shared counter reaches the
/// limit. Paired with the generator's call counter, it cancels the run after
/// a fixed number of articles have been generated.
struct CancelAfter {
    calls: Arc<AtomicUsize>,
    limit: usize,
}

#[async_trait]
impl ControlPlane for CancelAfter {
    async fn state(&self) -> Result<RunState, PlaneError> {
        if self.calls.load(Ordering::SeqCst) >= self.limit {
            Ok(RunState::Cancelled)
        } else {
            Ok(RunState::Running)
        }
    }
}

#[tokio::test]
async fn test_cancellation_stops_run_between_articles() {
    let db = test_db().await;
    for n in 1..=10 {
        db.insert_article(&business_article(n)).await.unwrap();
    }

    let outcomes = (0..10).map(|i| batch(&format!("b{i}"), 2)).collect();
    let (generator, calls) = ScriptedGenerator::new(outcomes);

    // Zero poll interval disables state caching so every checkpoint sees the
    // live counter
    let gateway = CancellationGateway::new(
        Box::new(CancelAfter {
            calls: calls.clone(),
            limit: 3,
        }),
        Duration::ZERO,
    );

    let orch = orchestrator(&db, generator, test_config());
    let stats = orch.run(RUN_DATE, &gateway).await.unwrap();

    assert!(stats.cancelled);
    assert_eq!(stats.articles_processed, 3);
    assert_eq!(stats.questions_generated, 6);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // Unreached articles remain pending for the next run
    assert_eq!(db.pending_articles().await.unwrap().len(), 7);
}

#[tokio::test]
async fn test_null_control_plane_never_interrupts() {
    let db = test_db().await;
    db.insert_article(&business_article(1)).await.unwrap();

    let (generator, _) = ScriptedGenerator::new(vec![batch("only", 2)]);
    let gateway = CancellationGateway::new(Box::new(NullControlPlane), Duration::from_secs(5));

    let orch = orchestrator(&db, generator, test_config());
    let stats = orch.run(RUN_DATE, &gateway).await.unwrap();

    assert!(!stats.cancelled);
    assert_eq!(stats.articles_processed, 1);
}
