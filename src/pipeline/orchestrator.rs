//! Generation-run coordination.
//!
//! The orchestrator drains pending articles in score order, enforces the
//! per-run and per-category admission caps plus the daily question quota,
//! runs generation and quality filtering, and hands surviving batches to the
//! persistence coordinator. Articles always end a run in a terminal log state
//! (or stay pending for a later run when a cap deferred them).

use crate::cancel::{Cancelled, CancellationGateway};
use crate::config::Config;
use crate::generate::{GenerationRequest, GenerationService, Outcome};
use crate::keywords::{classify_category, is_relevant_content};
use crate::quality::QualityFilter;
use crate::scoring::{rank_articles, ScoredArticle};
use crate::storage::{ArticleStatus, Database, PersistenceCoordinator, StoredArticle};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of one generation run.
#[derive(Debug, Default)]
pub struct RunStats {
    pub articles_processed: usize,
    pub articles_skipped: usize,
    pub articles_failed: usize,
    pub questions_generated: usize,
    pub cancelled: bool,
    pub errors: Vec<String>,
}

pub struct PipelineOrchestrator {
    db: Database,
    generator: Arc<dyn GenerationService>,
    persistence: PersistenceCoordinator,
    quality: QualityFilter,
    config: Config,
}

impl PipelineOrchestrator {
    pub fn new(
        db: Database,
        generator: Arc<dyn GenerationService>,
        persistence: PersistenceCoordinator,
        config: Config,
    ) -> Self {
        let quality = QualityFilter::new(config.question_quality_min_score);
        Self {
            db,
            generator,
            persistence,
            quality,
            config,
        }
    }

    /// Run generation over all pending articles for `run_date` (YYYY-MM-DD).
    ///
    /// Cancellation is cooperative: the gateway is consulted before each
    /// article and a cancelled run returns its partial stats with
    /// `cancelled` set rather than an error.
    pub async fn run(
        &self,
        run_date: &str,
        gateway: &CancellationGateway,
    ) -> Result<RunStats> {
        let mut stats = RunStats::default();

        let pending = self.db.pending_articles().await?;
        if pending.is_empty() {
            tracing::info!("No pending articles to process");
            return Ok(stats);
        }
        tracing::info!(count = pending.len(), "Starting generation run");

        let ranked = self.rank_pending(pending).await?;

        // Questions already persisted today count against the quota, so a
        // rerun on the same day picks up where the last one stopped
        let mut quota_used: HashMap<String, usize> = HashMap::new();
        let mut admitted_total = 0usize;
        let mut admitted_per_category: HashMap<String, usize> = HashMap::new();

        for scored in ranked {
            let article = &scored.article;
            let category = article
                .category
                .clone()
                .unwrap_or_else(|| "Business".to_string());

            match self.checkpoint(gateway, "article processing").await {
                Ok(()) => {}
                Err(Cancelled { .. }) => {
                    stats.cancelled = true;
                    break;
                }
            }

            if scored.score < self.config.min_article_score {
                tracing::info!(
                    url = %article.url,
                    score = format!("{:.1}", scored.score),
                    "Article below score floor, skipping"
                );
                self.skip(article, "below score floor", &mut stats).await?;
                continue;
            }

            if admitted_total >= self.config.max_articles_per_run {
                tracing::info!(
                    cap = self.config.max_articles_per_run,
                    "Run article cap reached, deferring the rest"
                );
                break;
            }
            let per_category = admitted_per_category.entry(category.clone()).or_insert(0);
            if *per_category >= self.config.max_articles_per_category {
                // Stays pending for a later run
                tracing::debug!(category = %category, url = %article.url, "Category article cap reached");
                continue;
            }

            if !self.config.category_enabled(&category) {
                self.skip(article, "category disabled", &mut stats).await?;
                continue;
            }

            if !quota_used.contains_key(&category) {
                let existing = self
                    .persistence
                    .questions_generated_today(&category, run_date)
                    .await?;
                quota_used.insert(category.clone(), existing as usize);
            }
            let used = quota_used[&category];
            if used >= self.config.questions_per_category_per_day {
                self.skip(article, "daily question quota met", &mut stats)
                    .await?;
                continue;
            }

            if !is_relevant_content(&article.content) {
                self.skip(article, "content not exam-relevant", &mut stats)
                    .await?;
                continue;
            }

            admitted_total += 1;
            *admitted_per_category.entry(category.clone()).or_insert(0) += 1;

            let request = GenerationRequest {
                source: &article.source,
                category: &category,
                date: run_date,
                content: &article.content,
            };
            let outcome = self.generator.generate(&request).await;

            match outcome {
                Outcome::NotRelevant => {
                    self.skip(article, "model judged content not relevant", &mut stats)
                        .await?;
                }
                Outcome::Failed(reason) => {
                    tracing::error!(url = %article.url, reason = %reason, "Generation failed");
                    self.db
                        .update_article_status(
                            &article.url,
                            ArticleStatus::Failed,
                            Some(&reason),
                            0,
                        )
                        .await?;
                    stats.articles_failed += 1;
                    stats.errors.push(format!("{}: {reason}", article.url));
                }
                Outcome::Generated(mut batch) => {
                    batch.questions = self.quality.filter(
                        batch.questions,
                        Some(&category),
                        Some(&article.content),
                    );
                    batch.total_questions = batch.questions.len();

                    if batch.questions.is_empty() {
                        self.skip(article, "no questions survived quality filter", &mut stats)
                            .await?;
                        continue;
                    }

                    // Trim to the remaining quota, preserving order
                    let remaining = self.config.questions_per_category_per_day - used;
                    if batch.questions.len() > remaining {
                        tracing::info!(
                            category = %category,
                            generated = batch.questions.len(),
                            remaining,
                            "Truncating batch to remaining quota"
                        );
                        batch.truncate(remaining);
                    }

                    let result = self.persistence.persist(&batch).await?;
                    if result.is_success() {
                        let count = batch.total_questions;
                        self.db
                            .update_article_status(
                                &article.url,
                                ArticleStatus::Processed,
                                None,
                                count,
                            )
                            .await?;
                        *quota_used.entry(category.clone()).or_insert(0) += count;
                        stats.articles_processed += 1;
                        stats.questions_generated += count;
                    } else {
                        let reason = result.errors.join("; ");
                        self.db
                            .update_article_status(
                                &article.url,
                                ArticleStatus::Failed,
                                Some(&reason),
                                0,
                            )
                            .await?;
                        stats.articles_failed += 1;
                        stats.errors.extend(result.errors);
                    }
                }
            }
        }

        tracing::info!(
            processed = stats.articles_processed,
            skipped = stats.articles_skipped,
            failed = stats.articles_failed,
            questions = stats.questions_generated,
            cancelled = stats.cancelled,
            "Generation run complete"
        );
        Ok(stats)
    }

    /// Backfill missing categories, rank each category's articles against that
    /// category, and merge best-first. Equal scores keep log order across the
    /// merged list so reruns are deterministic.
    async fn rank_pending(&self, pending: Vec<StoredArticle>) -> Result<Vec<ScoredArticle>> {
        let mut log_order: HashMap<String, usize> = HashMap::with_capacity(pending.len());
        let mut groups: Vec<(String, Vec<StoredArticle>)> = Vec::new();
        for (index, mut article) in pending.into_iter().enumerate() {
            if article.category.is_none() {
                let category = classify_category(&article.content, &article.title);
                self.db.set_article_category(&article.url, category).await?;
                article.category = Some(category.to_string());
            }
            log_order.insert(article.url.clone(), index);
            let category = article.category.clone().unwrap_or_default();
            match groups.iter_mut().find(|(c, _)| *c == category) {
                Some((_, group)) => group.push(article),
                None => groups.push((category, vec![article])),
            }
        }

        let mut scored = Vec::with_capacity(log_order.len());
        for (category, group) in &groups {
            scored.extend(rank_articles(group, Some(category.as_str()), group.len()));
        }
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let a = log_order.get(&a.article.url).copied().unwrap_or(usize::MAX);
                    let b = log_order.get(&b.article.url).copied().unwrap_or(usize::MAX);
                    a.cmp(&b)
                })
        });
        Ok(scored)
    }

    async fn skip(
        &self,
        article: &StoredArticle,
        reason: &str,
        stats: &mut RunStats,
    ) -> Result<()> {
        self.db
            .update_article_status(&article.url, ArticleStatus::Skipped, Some(reason), 0)
            .await?;
        stats.articles_skipped += 1;
        Ok(())
    }

    async fn checkpoint(
        &self,
        gateway: &CancellationGateway,
        context: &str,
    ) -> Result<(), Cancelled> {
        gateway.wait_if_paused(context).await?;
        gateway.check_cancelled(context).await
    }
}
