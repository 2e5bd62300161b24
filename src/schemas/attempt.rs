use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{Attempt, AttemptAnswer};
use crate::db::types::AttemptStatus;
use crate::schemas::question::QuestionPublicResponse;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct AttemptStart {
    #[serde(alias = "testId")]
    #[validate(length(min = 1, message = "test_id must not be empty"))]
    pub(crate) test_id: String,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct AnswerSubmit {
    #[serde(alias = "questionId")]
    #[validate(length(min = 1, message = "question_id must not be empty"))]
    pub(crate) question_id: String,
    #[serde(alias = "selectedIndex")]
    #[validate(range(min = 0, max = 3, message = "selected_index must be between 0 and 3"))]
    pub(crate) selected_index: i32,
}

/// Client reports the outcome it observed (SUBMITTED or TIMED_OUT); the
/// handler still overrides to TIMED_OUT past the deadline.
#[derive(Debug, Deserialize, Validate)]
pub(crate) struct AttemptSubmit {
    #[validate(nested)]
    pub(crate) answers: Vec<AnswerSubmit>,
    pub(crate) status: AttemptStatus,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AttemptListQuery {
    #[serde(default)]
    #[serde(alias = "userId")]
    pub(crate) user_id: Option<String>,
    #[serde(default)]
    #[serde(alias = "testId")]
    pub(crate) test_id: Option<String>,
    #[serde(default)]
    pub(crate) status: Option<AttemptStatus>,
    #[serde(default)]
    pub(crate) page: Option<i64>,
    #[serde(default)]
    pub(crate) limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AttemptResponse {
    pub(crate) id: String,
    pub(crate) user_id: String,
    pub(crate) test_id: String,
    pub(crate) answers: Vec<AttemptAnswer>,
    pub(crate) started_at: String,
    pub(crate) submitted_at: Option<String>,
    pub(crate) score: Option<i32>,
    pub(crate) total: Option<i32>,
    pub(crate) status: AttemptStatus,
}

impl AttemptResponse {
    pub(crate) fn from_db(attempt: Attempt) -> Self {
        Self {
            id: attempt.id,
            user_id: attempt.user_id,
            test_id: attempt.test_id,
            answers: attempt.answers.0,
            started_at: format_primitive(attempt.started_at),
            submitted_at: attempt.submitted_at.map(format_primitive),
            score: attempt.score,
            total: attempt.total,
            status: attempt.status,
        }
    }
}

/// Returned from start: the open attempt plus its question sheet without
/// correct indices.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AttemptStartResponse {
    pub(crate) attempt: AttemptResponse,
    pub(crate) questions: Vec<QuestionPublicResponse>,
    pub(crate) duration_minutes: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_requires_final_status() {
        let missing: Result<AttemptSubmit, _> = serde_json::from_str(r#"{"answers": []}"#);
        assert!(missing.is_err());

        let timed_out: AttemptSubmit =
            serde_json::from_str(r#"{"answers": [], "status": "TIMED_OUT"}"#).unwrap();
        assert_eq!(timed_out.status, AttemptStatus::TimedOut);
    }
}
