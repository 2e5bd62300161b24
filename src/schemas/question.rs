use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::Question;
use crate::db::types::{ApprovalStatus, DifficultyLevel};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct QuestionCreate {
    #[serde(default)]
    #[serde(alias = "testId")]
    pub(crate) test_id: Option<String>,
    #[validate(length(min = 2, message = "subject must be at least 2 characters"))]
    pub(crate) subject: String,
    #[validate(length(min = 1, message = "text must not be empty"))]
    pub(crate) text: String,
    #[validate(length(min = 4, max = 4, message = "options must contain exactly 4 entries"))]
    pub(crate) options: Vec<String>,
    #[serde(alias = "correctIndex")]
    #[validate(range(min = 0, max = 3, message = "correct_index must be between 0 and 3"))]
    pub(crate) correct_index: i32,
    #[serde(default = "default_difficulty")]
    pub(crate) difficulty: DifficultyLevel,
    #[serde(default = "default_is_bank")]
    #[serde(alias = "isBank")]
    pub(crate) is_bank: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct QuestionUpdate {
    #[serde(default)]
    #[validate(length(min = 1, message = "text must not be empty"))]
    pub(crate) text: Option<String>,
    #[serde(default)]
    #[validate(length(min = 4, max = 4, message = "options must contain exactly 4 entries"))]
    pub(crate) options: Option<Vec<String>>,
    #[serde(default)]
    #[serde(alias = "correctIndex")]
    #[validate(range(min = 0, max = 3, message = "correct_index must be between 0 and 3"))]
    pub(crate) correct_index: Option<i32>,
    #[serde(default)]
    pub(crate) difficulty: Option<DifficultyLevel>,
    #[serde(default)]
    #[serde(alias = "approvalStatus")]
    pub(crate) approval_status: Option<ApprovalStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct QuestionListQuery {
    #[serde(default)]
    pub(crate) subject: Option<String>,
    #[serde(default)]
    pub(crate) difficulty: Option<DifficultyLevel>,
    #[serde(default)]
    #[serde(alias = "testId")]
    pub(crate) test_id: Option<String>,
    #[serde(default)]
    #[serde(alias = "isBank")]
    pub(crate) is_bank: Option<bool>,
    #[serde(default)]
    #[serde(alias = "approvalStatus")]
    pub(crate) approval_status: Option<ApprovalStatus>,
    #[serde(default)]
    pub(crate) page: Option<i64>,
    #[serde(default)]
    pub(crate) limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QuestionResponse {
    pub(crate) id: String,
    pub(crate) test_id: Option<String>,
    pub(crate) subject: String,
    pub(crate) text: String,
    pub(crate) options: Vec<String>,
    pub(crate) correct_index: i32,
    pub(crate) difficulty: DifficultyLevel,
    pub(crate) is_bank: bool,
    pub(crate) approval_status: ApprovalStatus,
    pub(crate) created_by: String,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl QuestionResponse {
    pub(crate) fn from_db(question: Question) -> Self {
        Self {
            id: question.id,
            test_id: question.test_id,
            subject: question.subject,
            text: question.text,
            options: question.options.0,
            correct_index: question.correct_index,
            difficulty: question.difficulty,
            is_bank: question.is_bank,
            approval_status: question.approval_status,
            created_by: question.created_by,
            created_at: format_primitive(question.created_at),
            updated_at: format_primitive(question.updated_at),
        }
    }
}

/// Taker-facing view of a question. The correct index never leaves the
/// server while an attempt is open.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QuestionPublicResponse {
    pub(crate) id: String,
    pub(crate) subject: String,
    pub(crate) text: String,
    pub(crate) options: Vec<String>,
    pub(crate) difficulty: DifficultyLevel,
}

impl QuestionPublicResponse {
    pub(crate) fn from_db(question: Question) -> Self {
        Self {
            id: question.id,
            subject: question.subject,
            text: question.text,
            options: question.options.0,
            difficulty: question.difficulty,
        }
    }
}

fn default_difficulty() -> DifficultyLevel {
    DifficultyLevel::Medium
}

fn default_is_bank() -> bool {
    true
}
