//! Question generation backends.
//!
//! A [`GenerationService`] turns one article's content into a batch of
//! multiple-choice question candidates. Two backends are provided: a hosted
//! chat-completions API ([`openai::OpenAiGenerator`]) and a local inference
//! server ([`ollama::OllamaGenerator`]). Both share the prompt templates and
//! response parsing in this module; only the HTTP transport differs.

pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use ollama::OllamaGenerator;
pub use openai::OpenAiGenerator;

/// Floor below which article content is not worth sending to a model.
const MIN_CONTENT_CHARS: usize = 100;

/// Hard cap on questions accepted from a single article.
const MAX_QUESTIONS_PER_BATCH: usize = 15;

const SYSTEM_PROMPT: &str = "\
You are an expert question generator for competitive examinations like UPSC, SSC, and Banking exams.

Your task is to transform news articles and documents into high-quality, factual multiple-choice questions (MCQs).

Guidelines:
1. Generate 5-15 MCQs per article (depending on content length and relevance)
2. Questions should be factual, clear, and concept-oriented
3. Focus on: Economy, Budget, Finance, Banking, Trade, Policy, Government Schemes, Reforms, Regulatory Changes
4. Each question must have exactly 4 options (A, B, C, D)
5. Provide a brief explanation (1-2 lines) for the correct answer
6. Avoid repetitive questions
7. Ensure questions are answerable from the provided content only
8. Use neutral, objective tone
9. Prefer conceptual framing over pure factual recall
10. Do not hallucinate facts beyond the provided content

Output format: Strict JSON only (no markdown, no commentary)";

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("Request timed out")]
    Timeout,
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Malformed API response: {0}")]
    MalformedResponse(String),
}

impl GenerateError {
    /// Transient errors get retried; client errors do not.
    pub(crate) fn is_retryable(&self) -> bool {
        match self {
            GenerateError::Timeout | GenerateError::Network(_) => true,
            GenerateError::HttpStatus(status) => *status >= 500 || *status == 429,
            GenerateError::MalformedResponse(_) => false,
        }
    }
}

/// Correct-option letter for a four-option question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerKey {
    A,
    B,
    C,
    D,
}

impl AnswerKey {
    pub fn from_letter(letter: &str) -> Option<Self> {
        match letter.trim().to_uppercase().as_str() {
            "A" => Some(AnswerKey::A),
            "B" => Some(AnswerKey::B),
            "C" => Some(AnswerKey::C),
            "D" => Some(AnswerKey::D),
            _ => None,
        }
    }

    pub fn as_lower(&self) -> &'static str {
        match self {
            AnswerKey::A => "a",
            AnswerKey::B => "b",
            AnswerKey::C => "c",
            AnswerKey::D => "d",
        }
    }
}

/// One validated question candidate from a model response.
#[derive(Debug, Clone)]
pub struct QuestionCandidate {
    pub question: String,
    pub options: Vec<String>,
    pub answer: AnswerKey,
    pub explanation: String,
    pub difficulty: Option<String>,
}

/// All questions accepted from a single article.
#[derive(Debug, Clone)]
pub struct QuestionBatch {
    pub source: String,
    pub category: String,
    pub date: String,
    pub total_questions: usize,
    pub questions: Vec<QuestionCandidate>,
}

impl QuestionBatch {
    /// Keep at most `limit` questions, preserving order, and fix up the count.
    pub fn truncate(&mut self, limit: usize) {
        self.questions.truncate(limit);
        self.total_questions = self.questions.len();
    }
}

/// Result of one generation attempt. `NotRelevant` is an expected outcome for
/// off-topic content, distinct from `Failed` which covers transport and
/// parsing errors.
#[derive(Debug)]
pub enum Outcome {
    Generated(QuestionBatch),
    NotRelevant,
    Failed(String),
}

/// Inputs for one generation call.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub source: &'a str,
    pub category: &'a str,
    pub date: &'a str,
    pub content: &'a str,
}

#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, request: &GenerationRequest<'_>) -> Outcome;
}

/// Build the per-article user prompt.
fn build_prompt(request: &GenerationRequest<'_>) -> String {
    format!(
        r#"Analyze the following article and generate exam-oriented multiple-choice questions.

Article Source: {source}
Category: {category}
Date: {date}

Article Content:
{content}

Generate 5-15 multiple-choice questions based on this content. Focus on:
- Key concepts, policies, and reforms mentioned
- Important data, statistics, and figures
- Government schemes and initiatives
- Economic and financial implications

Return the output as strict JSON in this format:
{{
  "source": "{source}",
  "category": "{category}",
  "date": "{date}",
  "total_questions": <number>,
  "questions": [
    {{
      "question": "<MCQ question text>",
      "options": ["A. ...", "B. ...", "C. ...", "D. ..."],
      "answer": "<Correct option letter>",
      "explanation": "<Short factual reasoning>"
    }}
  ]
}}

If the content is not relevant for exam preparation (e.g., sports, entertainment, local news without policy implications), return:
{{
  "status": "No relevant content"
}}"#,
        source = request.source,
        category = request.category,
        date = request.date,
        content = request.content,
    )
}

/// Short-circuit check applied before any model call.
fn content_too_thin(content: &str) -> bool {
    content.trim().len() < MIN_CONTENT_CHARS
}

/// Strip a fenced markdown code block wrapper if the model added one.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag line (```json)
    let rest = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse and validate a raw model response into an [`Outcome`].
///
/// Invalid questions are dropped individually; the batch fails only when
/// nothing valid remains. A `{"status": "No relevant content"}` sentinel maps
/// to `Outcome::NotRelevant`.
fn parse_response(raw: &str, request: &GenerationRequest<'_>) -> Outcome {
    let cleaned = strip_code_fence(raw);

    let value: Value = match serde_json::from_str(cleaned) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(error = %e, source = request.source, "Failed to parse model response as JSON");
            tracing::debug!(
                response = cleaned.chars().take(500).collect::<String>(),
                "Unparseable response prefix"
            );
            return Outcome::Failed(format!("invalid JSON in model response: {e}"));
        }
    };

    if value.get("status").and_then(Value::as_str) == Some("No relevant content") {
        tracing::info!(source = request.source, "Model judged content not relevant");
        return Outcome::NotRelevant;
    }

    let Some(questions) = value.get("questions").and_then(Value::as_array) else {
        return Outcome::Failed("missing 'questions' field in model response".into());
    };

    let mut valid = Vec::new();
    for (i, q) in questions.iter().enumerate() {
        match validate_question(q) {
            Ok(candidate) => valid.push(candidate),
            Err(reason) => {
                tracing::warn!(index = i + 1, reason, "Skipping invalid question");
            }
        }
    }

    if valid.is_empty() {
        return Outcome::Failed("no valid questions in model response".into());
    }
    if valid.len() > MAX_QUESTIONS_PER_BATCH {
        valid.truncate(MAX_QUESTIONS_PER_BATCH);
    }

    Outcome::Generated(QuestionBatch {
        source: request.source.to_string(),
        category: request.category.to_string(),
        date: request.date.to_string(),
        total_questions: valid.len(),
        questions: valid,
    })
}

fn validate_question(q: &Value) -> Result<QuestionCandidate, &'static str> {
    let obj = q.as_object().ok_or("not an object")?;

    let question = obj
        .get("question")
        .and_then(Value::as_str)
        .ok_or("missing question text")?
        .trim()
        .to_string();

    let options: Vec<String> = obj
        .get("options")
        .and_then(Value::as_array)
        .ok_or("missing options")?
        .iter()
        .filter_map(Value::as_str)
        .map(|s| s.trim().to_string())
        .collect();
    if options.len() != 4 {
        return Err("options must be a list of 4");
    }

    let answer = obj
        .get("answer")
        .and_then(Value::as_str)
        .and_then(AnswerKey::from_letter)
        .ok_or("answer must be one of A, B, C, D")?;

    let explanation = obj
        .get("explanation")
        .and_then(Value::as_str)
        .ok_or("missing explanation")?
        .trim()
        .to_string();

    let difficulty = obj
        .get("difficulty")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_lowercase());

    Ok(QuestionCandidate {
        question,
        options,
        answer,
        explanation,
        difficulty,
    })
}
