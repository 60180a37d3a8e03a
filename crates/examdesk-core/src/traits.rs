//! The grading backend contract consumed by the session controller.
//!
//! Implemented over HTTP by `examdesk-client` and in memory by
//! [`crate::mock::MockBackend`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::model::{
    Attempt, AttemptId, AttemptResult, ChoiceId, ExamId, Question, QuestionId, SavedAnswer,
};

/// Remote persistence and grading for exam attempts.
#[async_trait]
pub trait ExamBackend: Send + Sync {
    /// Create an attempt for the current student, or resume the open one.
    async fn start_attempt(&self, exam_id: ExamId) -> Result<StartOutcome, BackendError>;

    /// Load the ordered question set for an exam.
    async fn fetch_questions(&self, exam_id: ExamId) -> Result<Vec<Question>, BackendError>;

    /// Persist the latest answer to one question. Overwrites by question id.
    async fn save_answer(
        &self,
        attempt_id: AttemptId,
        payload: &AnswerPayload,
    ) -> Result<SaveOutcome, BackendError>;

    /// Submit the attempt for grading.
    async fn submit_attempt(&self, attempt_id: AttemptId) -> Result<SubmitOutcome, BackendError>;

    /// Fetch the graded result of a submitted attempt.
    async fn fetch_result(&self, attempt_id: AttemptId) -> Result<AttemptResult, BackendError>;

    /// Answers already saved for an attempt. Backends without this capability
    /// report none.
    async fn fetch_saved_answers(
        &self,
        attempt_id: AttemptId,
    ) -> Result<Vec<SavedAnswer>, BackendError> {
        let _ = attempt_id;
        Ok(Vec::new())
    }
}

/// Result of asking the backend to start an attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    /// An attempt is open; `resumed` is set when it existed before this call.
    Attempt { attempt: Attempt, resumed: bool },
    /// The student already finished this exam. The attempt id is known when
    /// the backend closed the attempt itself because its time ran out.
    AlreadyCompleted { attempt_id: Option<AttemptId> },
    /// The exam is not open for attempts.
    ExamInactive,
}

/// Result of a single autosave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// The attempt's time limit has passed; the backend has closed it.
    TimeExpired,
}

/// Result of submitting an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Submitted,
    AlreadyCompleted,
}

/// Wire shape of a saved answer.
///
/// Choice questions carry `chosen_choice_id`; free-text and multi-select
/// answers travel as `answer_text` (multi-select as a comma-joined id list).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerPayload {
    pub question_id: QuestionId,
    pub chosen_choice_id: Option<ChoiceId>,
    pub answer_text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answers::Answer;

    #[test]
    fn choice_payload_carries_empty_text() {
        let payload =
            crate::autosave::encode_payload(QuestionId(4), &Answer::Choice(Some(ChoiceId(12))));
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"question_id": 4, "chosen_choice_id": 12, "answer_text": ""})
        );
    }

    #[test]
    fn text_payload_has_null_choice() {
        let payload = crate::autosave::encode_payload(QuestionId(5), &Answer::Text("ok".into()));
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"question_id": 5, "chosen_choice_id": null, "answer_text": "ok"})
        );
    }
}
