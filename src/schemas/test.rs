use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::Test;
use crate::db::types::{DifficultyLevel, TestStatus};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct TestCreate {
    #[validate(length(min = 3, message = "title must be at least 3 characters"))]
    pub(crate) title: String,
    #[validate(length(min = 2, message = "subject must be at least 2 characters"))]
    pub(crate) subject: String,
    #[serde(alias = "durationMinutes")]
    #[validate(range(min = 1, message = "duration_minutes must be positive"))]
    pub(crate) duration_minutes: i32,
    #[serde(default = "default_status")]
    pub(crate) status: TestStatus,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct TestUpdate {
    #[serde(default)]
    #[validate(length(min = 3, message = "title must be at least 3 characters"))]
    pub(crate) title: Option<String>,
    #[serde(default)]
    #[validate(length(min = 2, message = "subject must be at least 2 characters"))]
    pub(crate) subject: Option<String>,
    #[serde(default)]
    #[serde(alias = "durationMinutes")]
    #[validate(range(min = 1, message = "duration_minutes must be positive"))]
    pub(crate) duration_minutes: Option<i32>,
    #[serde(default)]
    pub(crate) status: Option<TestStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TestListQuery {
    #[serde(default)]
    pub(crate) status: Option<TestStatus>,
    #[serde(default)]
    pub(crate) subject: Option<String>,
    #[serde(default)]
    pub(crate) page: Option<i64>,
    #[serde(default)]
    pub(crate) limit: Option<i64>,
}

/// Per-difficulty counts for bank sampling and AI generation.
#[derive(Debug, Clone, Copy, Deserialize, Validate)]
pub(crate) struct QuestionCounts {
    #[serde(default)]
    #[validate(range(min = 0, max = 100, message = "easy must be between 0 and 100"))]
    pub(crate) easy: i64,
    #[serde(default)]
    #[validate(range(min = 0, max = 100, message = "medium must be between 0 and 100"))]
    pub(crate) medium: i64,
    #[serde(default)]
    #[validate(range(min = 0, max = 100, message = "hard must be between 0 and 100"))]
    pub(crate) hard: i64,
}

impl QuestionCounts {
    pub(crate) fn total(&self) -> i64 {
        self.easy + self.medium + self.hard
    }

    pub(crate) fn per_difficulty(&self) -> [(DifficultyLevel, i64); 3] {
        [
            (DifficultyLevel::Easy, self.easy),
            (DifficultyLevel::Medium, self.medium),
            (DifficultyLevel::Hard, self.hard),
        ]
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct GenerateQuestionsRequest {
    #[validate(nested)]
    pub(crate) counts: QuestionCounts,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApproveQuestionsRequest {
    #[serde(alias = "questionIds")]
    pub(crate) question_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TestResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) subject: String,
    pub(crate) duration_minutes: i32,
    pub(crate) status: TestStatus,
    pub(crate) total_questions: i32,
    pub(crate) created_by: String,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl TestResponse {
    pub(crate) fn from_db(test: Test) -> Self {
        Self {
            id: test.id,
            title: test.title,
            subject: test.subject,
            duration_minutes: test.duration_minutes,
            status: test.status,
            total_questions: test.total_questions,
            created_by: test.created_by,
            created_at: format_primitive(test.created_at),
            updated_at: format_primitive(test.updated_at),
        }
    }
}

fn default_status() -> TestStatus {
    TestStatus::Draft
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_defaults_to_draft() {
        let payload: TestCreate = serde_json::from_str(
            r#"{"title": "Algebra I", "subject": "Math", "durationMinutes": 30}"#,
        )
        .unwrap();
        assert_eq!(payload.status, TestStatus::Draft);
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn counts_total_and_split() {
        let counts: QuestionCounts =
            serde_json::from_str(r#"{"easy": 2, "medium": 3, "hard": 1}"#).unwrap();
        assert_eq!(counts.total(), 6);
        assert_eq!(counts.per_difficulty()[0], (DifficultyLevel::Easy, 2));
    }

    #[test]
    fn counts_default_to_zero() {
        let counts: QuestionCounts = serde_json::from_str(r#"{"easy": 4}"#).unwrap();
        assert_eq!(counts.total(), 4);
        assert_eq!(counts.hard, 0);
    }
}
