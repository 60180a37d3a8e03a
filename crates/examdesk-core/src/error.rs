//! Error types.
//!
//! `BackendError` represents failures talking to the grading backend. It is
//! defined here rather than in `examdesk-client` so the session controller can
//! classify failures without string matching. `SessionError` is what the
//! controller itself reports to the presentation layer.

use thiserror::Error;

use crate::coordinator::Lifecycle;
use crate::model::{ChoiceId, ExamId, QuestionId, QuestionType};

/// Errors that can occur when interacting with the grading backend.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// Missing or rejected credentials.
    #[error("not authorized: {0}")]
    Unauthorized(String),

    /// The requested exam or attempt does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    Network(String),

    /// The response body could not be decoded.
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl BackendError {
    /// Returns `true` if repeating the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Timeout(_) | BackendError::Network(_) => true,
            BackendError::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// How an error affects the attempt, from the student's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Absorbed and logged; retried implicitly by the next edit.
    RecoverableLocal,
    /// Shown to the student, who may try again.
    RecoverableUserFacing,
    /// The attempt is already over; treated as success.
    TerminalBenign,
    /// Shown to the student; only a full reload can continue.
    TerminalFatal,
}

/// Errors reported by the exam session controller.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Starting the attempt or loading questions failed. Re-initializing is allowed.
    #[error("failed to load exam: {0}")]
    Initialization(#[source] BackendError),

    /// The exam is not open for attempts.
    #[error("exam {0} is not currently active")]
    ExamInactive(ExamId),

    /// The question does not belong to this exam.
    #[error("unknown question {0}")]
    UnknownQuestion(QuestionId),

    /// The choice does not belong to the question.
    #[error("choice {choice} is not an option of question {question}")]
    UnknownChoice {
        question: QuestionId,
        choice: ChoiceId,
    },

    /// The answer's shape does not fit the question type.
    #[error("a {given} answer does not fit {question_type} question {question}")]
    AnswerMismatch {
        question: QuestionId,
        question_type: QuestionType,
        given: &'static str,
    },

    /// The session no longer accepts edits or submit requests.
    #[error("session is {0}, no further changes are accepted")]
    NotActive(Lifecycle),

    /// A manual submit failed; the attempt is active again.
    #[error("failed to submit exam, please try again: {0}")]
    SubmitFailed(#[source] BackendError),

    /// Time ran out and the automatic submit failed.
    #[error("exam time expired and the attempt could not be submitted: {0}")]
    SubmitFatal(#[source] BackendError),
}

impl SessionError {
    /// Classify the error according to its effect on the attempt.
    pub fn class(&self) -> ErrorClass {
        match self {
            SessionError::Initialization(_)
            | SessionError::SubmitFailed(_)
            | SessionError::UnknownQuestion(_)
            | SessionError::UnknownChoice { .. }
            | SessionError::AnswerMismatch { .. } => ErrorClass::RecoverableUserFacing,
            SessionError::NotActive(state) if !state.is_fatal() => ErrorClass::TerminalBenign,
            SessionError::ExamInactive(_) | SessionError::SubmitFatal(_) | SessionError::NotActive(_) => {
                ErrorClass::TerminalFatal
            }
        }
    }

    /// Returns `true` if the student can retry the failed action.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::RecoverableUserFacing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(BackendError::Timeout(30).is_transient());
        assert!(BackendError::Network("reset".into()).is_transient());
        assert!(BackendError::Api {
            status: 503,
            message: "unavailable".into()
        }
        .is_transient());
        assert!(!BackendError::Api {
            status: 400,
            message: "bad".into()
        }
        .is_transient());
        assert!(!BackendError::Unauthorized("token".into()).is_transient());
    }

    #[test]
    fn session_error_taxonomy() {
        let submit = SessionError::SubmitFailed(BackendError::Network("down".into()));
        assert_eq!(submit.class(), ErrorClass::RecoverableUserFacing);
        assert!(submit.is_retryable());

        let fatal = SessionError::SubmitFatal(BackendError::Network("down".into()));
        assert_eq!(fatal.class(), ErrorClass::TerminalFatal);
        assert!(!fatal.is_retryable());

        assert_eq!(
            SessionError::ExamInactive(ExamId(4)).class(),
            ErrorClass::TerminalFatal
        );
        assert_eq!(
            SessionError::NotActive(Lifecycle::Submitted).class(),
            ErrorClass::TerminalBenign
        );
        assert_eq!(
            SessionError::NotActive(Lifecycle::Fatal).class(),
            ErrorClass::TerminalFatal
        );
    }

    #[test]
    fn error_messages() {
        let err = SessionError::UnknownChoice {
            question: QuestionId(2),
            choice: ChoiceId(99),
        };
        assert_eq!(err.to_string(), "choice 99 is not an option of question 2");
        let err = BackendError::Api {
            status: 500,
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "API error (HTTP 500): boom");
    }
}
