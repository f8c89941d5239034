//! Hosted chat-completions backend.

use super::{
    build_prompt, content_too_thin, parse_response, GenerateError, GenerationRequest,
    GenerationService, Outcome, SYSTEM_PROMPT,
};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Generates questions via an OpenAI-compatible chat-completions endpoint.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    temperature: f64,
    max_tokens: u32,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl std::fmt::Debug for OpenAiGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiGenerator")
            .field("base_url", &self.base_url)
            .field("api_key", &"***REDACTED***")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiGenerator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: reqwest::Client,
        base_url: String,
        api_key: SecretString,
        model: String,
        temperature: f64,
        max_tokens: u32,
        retry_attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        tracing::info!(model = %model, "OpenAI generator initialized");
        Self {
            client,
            base_url,
            api_key,
            model,
            temperature,
            max_tokens,
            retry_attempts,
            retry_delay,
        }
    }

    async fn complete_once(&self, prompt: &str) -> Result<String, GenerateError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt},
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let request = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send();

        let response = tokio::time::timeout(REQUEST_TIMEOUT, request)
            .await
            .map_err(|_| GenerateError::Timeout)?
            .map_err(GenerateError::Network)?;

        if !response.status().is_success() {
            return Err(GenerateError::HttpStatus(response.status().as_u16()));
        }

        let value: Value = response.json().await.map_err(GenerateError::Network)?;
        let content = value["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                GenerateError::MalformedResponse("missing choices[0].message.content".into())
            })?;
        if content.is_empty() {
            return Err(GenerateError::MalformedResponse("empty completion".into()));
        }
        Ok(content.to_string())
    }

    async fn complete(&self, prompt: &str) -> Result<String, GenerateError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            tracing::debug!(attempt, "Calling chat-completions API");
            match self.complete_once(prompt).await {
                Ok(content) => {
                    tracing::debug!(chars = content.len(), "Completion received");
                    return Ok(content);
                }
                Err(e) if e.is_retryable() && attempt < self.retry_attempts => {
                    tracing::warn!(error = %e, attempt, "Retrying after transient API error");
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl GenerationService for OpenAiGenerator {
    async fn generate(&self, request: &GenerationRequest<'_>) -> Outcome {
        if content_too_thin(request.content) {
            tracing::warn!(source = request.source, "Insufficient content for generation");
            return Outcome::NotRelevant;
        }

        let prompt = build_prompt(request);
        tracing::info!(
            source = request.source,
            category = request.category,
            "Generating questions"
        );

        match self.complete(&prompt).await {
            Ok(raw) => parse_response(&raw, request),
            Err(e) => {
                tracing::error!(error = %e, source = request.source, "Generation request failed");
                Outcome::Failed(e.to_string())
            }
        }
    }
}
