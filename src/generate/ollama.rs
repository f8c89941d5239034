//! Local inference backend for self-hosted deployments.

use super::{
    build_prompt, content_too_thin, parse_response, GenerateError, GenerationRequest,
    GenerationService, Outcome, SYSTEM_PROMPT,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

// Local models can be slow on long articles
const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

/// Generates questions via an Ollama chat endpoint running on localhost or a
/// private host. No API key is involved.
#[derive(Debug)]
pub struct OllamaGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f64,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl OllamaGenerator {
    pub fn new(
        client: reqwest::Client,
        base_url: String,
        model: String,
        temperature: f64,
        retry_attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        tracing::info!(model = %model, base_url = %base_url, "Ollama generator initialized");
        Self {
            client,
            base_url,
            model,
            temperature,
            retry_attempts,
            retry_delay,
        }
    }

    async fn complete_once(&self, prompt: &str) -> Result<String, GenerateError> {
        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt},
            ],
            "options": {"temperature": self.temperature},
            "stream": false,
        });

        let response = tokio::time::timeout(REQUEST_TIMEOUT, self.client.post(&url).json(&body).send())
            .await
            .map_err(|_| GenerateError::Timeout)?
            .map_err(GenerateError::Network)?;

        if !response.status().is_success() {
            return Err(GenerateError::HttpStatus(response.status().as_u16()));
        }

        let value: Value = response.json().await.map_err(GenerateError::Network)?;
        let content = value["message"]["content"].as_str().unwrap_or_default();
        if content.is_empty() {
            return Err(GenerateError::MalformedResponse(
                "empty response from Ollama".into(),
            ));
        }
        Ok(content.to_string())
    }

    async fn complete(&self, prompt: &str) -> Result<String, GenerateError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            tracing::debug!(attempt, "Calling Ollama API");
            match self.complete_once(prompt).await {
                Ok(content) => return Ok(content),
                Err(e) if e.is_retryable() && attempt < self.retry_attempts => {
                    tracing::warn!(error = %e, attempt, "Retrying after transient Ollama error");
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl GenerationService for OllamaGenerator {
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

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn generator(base_url: String) -> OllamaGenerator {
        OllamaGenerator::new(
            reqwest::Client::new(),
            base_url,
            "llama3.1:8b".into(),
            0.7,
            2,
            Duration::from_millis(10),
        )
    }

    fn request() -> GenerationRequest<'static> {
        GenerationRequest {
            source: "Indian Express",
            category: "Banking",
            date: "2026-08-31",
            content: "The finance ministry announced new capital adequacy norms for public \
                      sector banks following the latest Basel committee recommendations.",
        }
    }

    #[tokio::test]
    async fn test_generate_success() {
        let server = MockServer::start().await;
        let inner = r#"{"questions": [{"question": "Which norms were announced?", "options": ["A. Liquidity", "B. Capital adequacy", "C. Leverage", "D. Exposure"], "answer": "B", "explanation": "From the article."}]}"#;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": {"role": "assistant", "content": inner}
            })))
            .mount(&server)
            .await;

        match generator(server.uri()).generate(&request()).await {
            Outcome::Generated(batch) => assert_eq!(batch.total_questions, 1),
            other => panic!("expected Generated, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_content_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": {"role": "assistant", "content": ""}
            })))
            .mount(&server)
            .await;

        let outcome = generator(server.uri()).generate(&request()).await;
        assert!(matches!(outcome, Outcome::Failed(_)));
    }
}
