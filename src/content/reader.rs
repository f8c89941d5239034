//! Full-text article retrieval via a reader service.
//!
//! RSS entries rarely carry usable body text, so articles are fetched through
//! a markdown-rendering reader proxy (`{base_url}/{article_url}`) that strips
//! site chrome server-side. The returned text is then normalized locally
//! before scoring and generation.

use crate::util::validate_url;
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

const MAX_CONTENT_SIZE: usize = 5 * 1024 * 1024; // 5MB
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Request timed out after 20s")]
    Timeout,
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    #[error("Invalid UTF-8 in response")]
    InvalidUtf8,
    #[error("Invalid article URL")]
    InvalidUrl,
}

impl ContentError {
    /// Returns true if this error is transient and the request should be retried.
    fn is_retryable(&self) -> bool {
        match self {
            ContentError::Timeout | ContentError::Network(_) => true,
            ContentError::HttpStatus(status) => *status >= 500,
            ContentError::ResponseTooLarge(_)
            | ContentError::InvalidUtf8
            | ContentError::InvalidUrl => false,
        }
    }
}

/// Fetch an article's full text through the reader service and normalize it.
///
/// Retries transient failures (`retry_attempts` total attempts with a fixed
/// `retry_delay` between them); 4xx responses and oversized bodies fail
/// immediately.
pub async fn fetch_content(
    client: &reqwest::Client,
    article_url: &str,
    base_url: &str,
    retry_attempts: u32,
    retry_delay: Duration,
) -> Result<String, ContentError> {
    // Feed URLs come from config but entry links come from the wire, so
    // validate before building the proxy URL
    let parsed = validate_url(article_url).map_err(|_| ContentError::InvalidUrl)?;
    let reader_url = format!("{}/{}", base_url.trim_end_matches('/'), parsed.as_str());

    let mut attempt = 0;
    let raw = loop {
        attempt += 1;
        match fetch_once(client, &reader_url).await {
            Ok(content) => break content,
            Err(e) if e.is_retryable() && attempt < retry_attempts => {
                tracing::debug!(
                    error = %e,
                    attempt,
                    url = article_url,
                    "Retrying content fetch after transient error"
                );
                tokio::time::sleep(retry_delay).await;
            }
            Err(e) => return Err(e),
        }
    };

    Ok(clean_text(&raw))
}

async fn fetch_once(client: &reqwest::Client, reader_url: &str) -> Result<String, ContentError> {
    let response = tokio::time::timeout(REQUEST_TIMEOUT, client.get(reader_url).send())
        .await
        .map_err(|_| ContentError::Timeout)?
        .map_err(ContentError::Network)?;

    if !response.status().is_success() {
        return Err(ContentError::HttpStatus(response.status().as_u16()));
    }

    read_limited_text(response, MAX_CONTENT_SIZE).await
}

async fn read_limited_text(
    response: reqwest::Response,
    limit: usize,
) -> Result<String, ContentError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(ContentError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(ContentError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ContentError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    String::from_utf8(bytes).map_err(|_| ContentError::InvalidUtf8)
}

/// Normalize article text for scoring and prompting.
///
/// Collapses whitespace, drops inline URLs and email addresses, and strips
/// characters outside word text and basic punctuation.
pub fn clean_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());

    for token in text.split_whitespace() {
        if token.starts_with("http://") || token.starts_with("https://") {
            continue;
        }
        // Crude but effective email detection for user@host tokens
        if token.contains('@') && token.split('@').filter(|p| !p.is_empty()).count() >= 2 {
            continue;
        }

        let cleaned: String = token
            .chars()
            .filter(|c| {
                c.is_alphanumeric()
                    || *c == '_'
                    || matches!(c, '.' | ',' | ';' | ':' | '!' | '?' | '-' | '(' | ')')
            })
            .collect();

        if cleaned.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&cleaned);
    }

    out
}
