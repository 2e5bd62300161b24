use std::time::{Duration, Instant};

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::core::config::Settings;
use crate::db::types::DifficultyLevel;
use crate::schemas::test::QuestionCounts;

/// Source text is clipped before prompting so oversized uploads cannot blow
/// the model's context window.
const MAX_SOURCE_CHARS: usize = 12_000;

#[derive(Debug, Error)]
pub(crate) enum AiError {
    #[error("AI provider is not configured")]
    NotConfigured,
    #[error("AI provider request failed: {0}")]
    Upstream(String),
    #[error("AI provider returned malformed data: {message}")]
    BadResponse { message: String, raw: String },
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub(crate) struct GeneratedQuestion {
    pub(crate) text: String,
    pub(crate) options: Vec<String>,
    #[serde(alias = "correctIndex")]
    pub(crate) correct_index: i32,
    pub(crate) difficulty: DifficultyLevel,
}

#[derive(Debug, Clone)]
pub(crate) struct AiQuestionService {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_retries: u32,
}

impl AiQuestionService {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self, reqwest::Error> {
        let timeout = Duration::from_secs(settings.ai().ai_request_timeout);
        let client =
            Client::builder().connect_timeout(Duration::from_secs(30)).timeout(timeout).build()?;

        Ok(Self {
            client,
            api_key: settings.ai().gemini_api_key.clone(),
            base_url: settings.ai().gemini_base_url.trim_end_matches('/').to_string(),
            model: settings.ai().gemini_model.clone(),
            max_retries: settings.ai().ai_max_retries,
        })
    }

    pub(crate) fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    pub(crate) async fn generate(
        &self,
        subject: &str,
        source_text: &str,
        counts: QuestionCounts,
    ) -> Result<Vec<GeneratedQuestion>, AiError> {
        if !self.is_configured() {
            return Err(AiError::NotConfigured);
        }

        let prompt = build_prompt(subject, source_text, counts);
        let payload = json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "generationConfig": {"temperature": 0.7, "responseMimeType": "application/json"}
        });

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let timer = Instant::now();
        let mut last_error = None;
        let mut body = Value::Null;

        for attempt in 0..=self.max_retries {
            let response = self.client.post(&url).json(&payload).send().await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    body = resp.json().await.unwrap_or(Value::Null);
                    if status.is_success() {
                        last_error = None;
                        break;
                    }
                    let error = AiError::Upstream(format!("status {status}: {body}"));
                    // 4xx other than rate limiting will not succeed on retry.
                    if !retryable_status(status) {
                        return Err(error);
                    }
                    last_error = Some(error);
                }
                Err(err) => {
                    last_error = Some(AiError::Upstream(err.to_string()));
                }
            }

            if attempt < self.max_retries {
                tokio::time::sleep(Duration::from_secs(2_u64.pow(attempt))).await;
            }
        }

        if let Some(err) = last_error {
            return Err(err);
        }

        let content = body
            .get("candidates")
            .and_then(|candidates| candidates.get(0))
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(|parts| parts.get(0))
            .and_then(|part| part.get("text"))
            .and_then(|value| value.as_str())
            .ok_or_else(|| AiError::BadResponse {
                message: "missing candidate text".to_string(),
                raw: body.to_string(),
            })?;

        let questions = parse_generated_questions(content)?;
        let expected = counts.total();

        tracing::info!(
            subject = %subject,
            requested = expected,
            generated = questions.len(),
            duration_seconds = timer.elapsed().as_secs_f64(),
            "AI question generation completed"
        );

        Ok(questions)
    }
}

fn retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn build_prompt(subject: &str, source_text: &str, counts: QuestionCounts) -> String {
    let clipped: String = source_text.chars().take(MAX_SOURCE_CHARS).collect();
    format!(
        "You are an expert exam author. Based on the study material below, generate \
         multiple-choice questions for the subject \"{subject}\".\n\
         Generate exactly {easy} EASY, {medium} MEDIUM and {hard} HARD questions.\n\
         Each question must have exactly 4 options and exactly one correct answer.\n\
         Respond with a strict JSON array, no prose, where each element is:\n\
         {{\"text\": \"question text\", \"options\": [\"a\", \"b\", \"c\", \"d\"], \
         \"correctIndex\": <0-3>, \"difficulty\": \"EASY\"|\"MEDIUM\"|\"HARD\"}}\n\n\
         Study material:\n{clipped}",
        easy = counts.easy,
        medium = counts.medium,
        hard = counts.hard,
    )
}

/// Parses the model output, tolerating markdown code fences some models
/// wrap JSON in despite instructions.
pub(crate) fn parse_generated_questions(raw: &str) -> Result<Vec<GeneratedQuestion>, AiError> {
    let trimmed = strip_code_fences(raw);

    let questions: Vec<GeneratedQuestion> =
        serde_json::from_str(trimmed).map_err(|err| AiError::BadResponse {
            message: format!("invalid JSON: {err}"),
            raw: raw.to_string(),
        })?;

    if questions.is_empty() {
        return Err(AiError::BadResponse {
            message: "empty question list".to_string(),
            raw: raw.to_string(),
        });
    }

    for (index, question) in questions.iter().enumerate() {
        if question.text.trim().is_empty() {
            return Err(AiError::BadResponse {
                message: format!("question {index} has empty text"),
                raw: raw.to_string(),
            });
        }
        if question.options.len() != 4 {
            return Err(AiError::BadResponse {
                message: format!(
                    "question {index} has {} options, expected 4",
                    question.options.len()
                ),
                raw: raw.to_string(),
            });
        }
        if !(0..=3).contains(&question.correct_index) {
            return Err(AiError::BadResponse {
                message: format!("question {index} has correctIndex out of range"),
                raw: raw.to_string(),
            });
        }
    }

    Ok(questions)
}

fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"[
        {"text": "2+2?", "options": ["3", "4", "5", "6"], "correctIndex": 1, "difficulty": "EASY"}
    ]"#;

    #[test]
    fn parses_plain_json_array() {
        let questions = parse_generated_questions(VALID).unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].correct_index, 1);
        assert_eq!(questions[0].difficulty, DifficultyLevel::Easy);
    }

    #[test]
    fn parses_fenced_json() {
        let fenced = format!("```json\n{VALID}\n```");
        let questions = parse_generated_questions(&fenced).unwrap();
        assert_eq!(questions.len(), 1);
    }

    #[test]
    fn rejects_wrong_option_count() {
        let raw = r#"[{"text": "?", "options": ["a", "b"], "correctIndex": 0, "difficulty": "EASY"}]"#;
        let err = parse_generated_questions(raw).unwrap_err();
        assert!(matches!(err, AiError::BadResponse { .. }));
    }

    #[test]
    fn rejects_index_out_of_range() {
        let raw =
            r#"[{"text": "?", "options": ["a", "b", "c", "d"], "correctIndex": 4, "difficulty": "HARD"}]"#;
        assert!(parse_generated_questions(raw).is_err());
    }

    #[test]
    fn rejects_empty_list() {
        assert!(parse_generated_questions("[]").is_err());
    }

    #[test]
    fn only_rate_limits_and_server_errors_are_retried() {
        use reqwest::StatusCode;

        assert!(retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(retryable_status(StatusCode::SERVICE_UNAVAILABLE));

        assert!(!retryable_status(StatusCode::BAD_REQUEST));
        assert!(!retryable_status(StatusCode::UNAUTHORIZED));
        assert!(!retryable_status(StatusCode::NOT_FOUND));
    }

    #[test]
    fn prompt_clips_source_text() {
        let long_text = "x".repeat(MAX_SOURCE_CHARS + 500);
        let counts = QuestionCounts { easy: 1, medium: 0, hard: 0 };
        let prompt = build_prompt("Math", &long_text, counts);
        assert!(prompt.len() < long_text.len() + 600);
        assert!(prompt.contains("exactly 1 EASY"));
    }
}
