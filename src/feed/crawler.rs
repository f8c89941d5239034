//! Feed crawling: fetch RSS feeds, pull today's entries, scrape their full
//! text through the content reader, and store new articles as pending work.

use crate::cancel::{Cancelled, CancellationGateway};
use crate::config::{Config, FeedConfig};
use crate::content;
use crate::feed::parser::{parse_feed, ParsedEntry};
use crate::storage::{Database, NewArticle};
use futures::stream::{self, StreamExt};
use std::time::Duration;
use thiserror::Error;

const FEED_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the 30-second timeout
    #[error("Request timed out")]
    Timeout,
    /// Feed XML could not be parsed as RSS or Atom
    #[error("Parse error: {0}")]
    Parse(String),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
}

impl FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network(_) | FetchError::Timeout => true,
            FetchError::HttpStatus(status) => *status >= 500 || *status == 429,
            FetchError::Parse(_) | FetchError::ResponseTooLarge => false,
        }
    }
}

/// Outcome of one crawl pass over all configured feeds.
#[derive(Debug, Default)]
pub struct CrawlStats {
    pub feeds_processed: usize,
    pub articles_fetched: usize,
    pub articles_stored: usize,
    pub articles_skipped: usize,
    pub articles_failed: usize,
    pub cancelled: bool,
    pub errors: Vec<String>,
}

pub struct FeedCrawler {
    db: Database,
    client: reqwest::Client,
    reader_base_url: String,
    max_concurrent_renders: usize,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl FeedCrawler {
    pub fn new(db: Database, client: reqwest::Client, config: &Config) -> Self {
        Self {
            db,
            client,
            reader_base_url: config.reader_base_url.clone(),
            max_concurrent_renders: config.max_concurrent_renders,
            retry_attempts: config.retry_attempts,
            retry_delay: Duration::from_secs(config.retry_delay_secs),
        }
    }

    /// Crawl every configured feed for articles published on `run_date`
    /// (YYYY-MM-DD). Checks the gateway between feeds and before each scrape;
    /// on cancellation the partial stats come back with `cancelled` set.
    pub async fn crawl(
        &self,
        feeds: &[FeedConfig],
        run_date: &str,
        gateway: &CancellationGateway,
    ) -> CrawlStats {
        let mut stats = CrawlStats::default();

        'feeds: for feed in feeds {
            for feed_url in &feed.urls {
                if let Err(Cancelled { .. }) = self.checkpoint(gateway, "feed crawl").await {
                    stats.cancelled = true;
                    break 'feeds;
                }

                tracing::info!(source = %feed.source, url = %feed_url, "Fetching feed");
                let entries = match self.fetch_feed(feed_url).await {
                    Ok(entries) => entries,
                    Err(e) => {
                        tracing::error!(url = %feed_url, error = %e, "Feed fetch failed");
                        stats.errors.push(format!("{feed_url}: {e}"));
                        continue;
                    }
                };
                stats.feeds_processed += 1;

                let cancelled = self
                    .process_entries(feed, entries, run_date, gateway, &mut stats)
                    .await;
                if cancelled {
                    stats.cancelled = true;
                    break 'feeds;
                }
            }
        }

        tracing::info!(
            feeds = stats.feeds_processed,
            fetched = stats.articles_fetched,
            stored = stats.articles_stored,
            skipped = stats.articles_skipped,
            failed = stats.articles_failed,
            cancelled = stats.cancelled,
            "Crawl complete"
        );
        stats
    }

    /// Scrape and store the entries of one feed. Returns true if the run was
    /// cancelled part-way.
    async fn process_entries(
        &self,
        feed: &FeedConfig,
        entries: Vec<ParsedEntry>,
        run_date: &str,
        gateway: &CancellationGateway,
        stats: &mut CrawlStats,
    ) -> bool {
        // Only today's entries are of interest; the question bank is daily
        let mut fresh = Vec::new();
        for entry in entries {
            if entry.published.as_deref() != Some(run_date) {
                continue;
            }
            match self.db.article_exists(&entry.url).await {
                Ok(true) => {
                    tracing::debug!(url = %entry.url, "Already stored, skipping");
                    stats.articles_skipped += 1;
                }
                Ok(false) => fresh.push(entry),
                Err(e) => {
                    stats.errors.push(format!("{}: {e}", entry.url));
                    stats.articles_failed += 1;
                }
            }
        }

        // Scrape full text with bounded concurrency; each task checks the
        // gateway before doing network work
        let scraped: Vec<(ParsedEntry, Result<Result<String, content::ContentError>, Cancelled>)> =
            stream::iter(fresh.into_iter())
                .map(|entry| async move {
                    if let Err(c) = gateway.check_cancelled("article scrape").await {
                        return (entry, Err(c));
                    }
                    let content = content::fetch_content(
                        &self.client,
                        &entry.url,
                        &self.reader_base_url,
                        self.retry_attempts,
                        self.retry_delay,
                    )
                    .await;
                    (entry, Ok(content))
                })
                .buffer_unordered(self.max_concurrent_renders)
                .collect()
                .await;

        let mut cancelled = false;
        for (entry, outcome) in scraped {
            let text = match outcome {
                Err(Cancelled { .. }) => {
                    cancelled = true;
                    continue;
                }
                Ok(Err(e)) => {
                    tracing::warn!(url = %entry.url, error = %e, "Could not scrape content");
                    stats.articles_failed += 1;
                    stats.errors.push(format!("{}: {e}", entry.url));
                    continue;
                }
                Ok(Ok(text)) => text,
            };
            stats.articles_fetched += 1;

            let article = NewArticle {
                url: entry.url.clone(),
                title: entry.title,
                content: text,
                source: feed.source.clone(),
                category: Some(feed.category.clone()),
                published: run_date.to_string(),
            };
            match self.db.insert_article(&article).await {
                Ok(true) => stats.articles_stored += 1,
                Ok(false) => stats.articles_skipped += 1,
                Err(e) => {
                    tracing::error!(url = %entry.url, error = %e, "Failed to store article");
                    stats.articles_failed += 1;
                    stats.errors.push(format!("{}: {e}", entry.url));
                }
            }
        }
        cancelled
    }

    async fn checkpoint(
        &self,
        gateway: &CancellationGateway,
        context: &str,
    ) -> Result<(), Cancelled> {
        gateway.wait_if_paused(context).await?;
        gateway.check_cancelled(context).await
    }

    async fn fetch_feed(&self, feed_url: &str) -> Result<Vec<ParsedEntry>, FetchError> {
        let mut attempt = 0;
        let bytes = loop {
            attempt += 1;
            match self.fetch_feed_once(feed_url).await {
                Ok(bytes) => break bytes,
                Err(e) if e.is_retryable() && attempt < self.retry_attempts => {
                    tracing::warn!(
                        url = feed_url,
                        error = %e,
                        attempt,
                        "Retrying feed fetch after transient error"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        };

        parse_feed(&bytes).map_err(|e| FetchError::Parse(e.to_string()))
    }

    async fn fetch_feed_once(&self, feed_url: &str) -> Result<Vec<u8>, FetchError> {
        let response = tokio::time::timeout(FEED_TIMEOUT, self.client.get(feed_url).send())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(FetchError::Network)?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        read_limited_bytes(response, MAX_FEED_SIZE).await
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
