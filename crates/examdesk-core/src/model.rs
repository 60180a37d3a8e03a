//! Core data model types for examdesk.
//!
//! These mirror the records the grading backend exposes during an attempt:
//! exams, their questions and choices, and the attempt itself. They are
//! immutable for the lifetime of a session; only the backend mutates them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<u64>().map($name)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                $name(value)
            }
        }
    };
}

numeric_id!(
    /// Backend identifier of an exam.
    ExamId
);
numeric_id!(
    /// Backend identifier of a question.
    QuestionId
);
numeric_id!(
    /// Backend identifier of an answer choice.
    ChoiceId
);
numeric_id!(
    /// Backend identifier of a student's attempt.
    AttemptId
);

/// The kinds of question an exam can contain.
///
/// Serialized with the backend's two-letter codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuestionType {
    #[serde(rename = "MC")]
    SingleChoice,
    #[serde(rename = "TF")]
    TrueFalse,
    #[serde(rename = "MS")]
    MultiSelect,
    #[serde(rename = "FB")]
    FreeText,
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionType::SingleChoice => write!(f, "single-choice"),
            QuestionType::TrueFalse => write!(f, "true/false"),
            QuestionType::MultiSelect => write!(f, "multi-select"),
            QuestionType::FreeText => write!(f, "free-text"),
        }
    }
}

/// One selectable answer of a choice question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub id: ChoiceId,
    pub text: String,
    /// Correctness flag. Absent while an attempt is active; the backend
    /// only reveals it on the results view.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
}

/// A single exam question as presented to the student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub question_type: QuestionType,
    pub text: String,
    /// Points awarded for a correct answer.
    #[serde(default = "default_points")]
    pub points: f64,
    /// Ordered choices; empty for free-text questions.
    #[serde(default)]
    pub choices: Vec<Choice>,
}

fn default_points() -> f64 {
    1.0
}

impl Question {
    /// Whether `choice` is one of this question's choices.
    pub fn has_choice(&self, choice: ChoiceId) -> bool {
        self.choices.iter().any(|c| c.id == choice)
    }

    /// Drop any correctness information from the choices.
    pub fn redact(&mut self) {
        for choice in &mut self.choices {
            choice.is_correct = None;
        }
    }
}

/// An exam as seen by an attempt in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exam {
    pub id: ExamId,
    pub title: String,
    pub duration_minutes: u32,
    /// Pass mark in percent. The attempt endpoints do not carry it, so a
    /// session built from an attempt leaves it unset.
    #[serde(default)]
    pub pass_mark: Option<u32>,
    /// Always set inside a session: attempts only start on active exams.
    pub is_active: bool,
    /// Ordered question set.
    #[serde(default)]
    pub questions: Vec<Question>,
}

/// One student's timed instance of an exam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: AttemptId,
    pub exam: ExamId,
    #[serde(default)]
    pub exam_title: String,
    /// Exam duration copied onto the attempt by the backend.
    pub duration_minutes: u32,
    /// Server-issued start instant; the only source of truth for the deadline.
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub is_completed: bool,
}

impl Attempt {
    /// Instant after which the backend rejects further answers.
    pub fn deadline(&self) -> DateTime<Utc> {
        self.start_time + chrono::Duration::minutes(i64::from(self.duration_minutes))
    }
}

/// A previously saved answer as reported by the backend on resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedAnswer {
    pub question_id: QuestionId,
    #[serde(default)]
    pub chosen_choice_id: Option<ChoiceId>,
    #[serde(default)]
    pub answer_text: Option<String>,
}

/// Graded outcome of a submitted attempt, consumed by the results view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptResult {
    pub attempt_id: AttemptId,
    pub exam_title: String,
    pub score: f64,
    pub correct_answers: u32,
    pub total_questions: u32,
    pub percentage_score: f64,
    pub passed: bool,
    /// Minutes between start and submission.
    #[serde(default)]
    pub time_taken_minutes: Option<f64>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn question_type_uses_backend_codes() {
        assert_eq!(QuestionType::MultiSelect.to_string(), "multi-select");
        let json = serde_json::to_string(&QuestionType::MultiSelect).unwrap();
        assert_eq!(json, "\"MS\"");
        let parsed: QuestionType = serde_json::from_str("\"FB\"").unwrap();
        assert_eq!(parsed, QuestionType::FreeText);
    }

    #[test]
    fn ids_are_transparent() {
        let id: QuestionId = serde_json::from_str("42").unwrap();
        assert_eq!(id, QuestionId(42));
        assert_eq!(" 7 ".parse::<ChoiceId>().unwrap(), ChoiceId(7));
    }

    #[test]
    fn redact_strips_correctness() {
        let mut question = Question {
            id: QuestionId(1),
            question_type: QuestionType::SingleChoice,
            text: "2 + 2?".into(),
            points: 1.0,
            choices: vec![Choice {
                id: ChoiceId(10),
                text: "4".into(),
                is_correct: Some(true),
            }],
        };
        question.redact();
        assert_eq!(question.choices[0].is_correct, None);
        assert!(question.has_choice(ChoiceId(10)));
        assert!(!question.has_choice(ChoiceId(11)));
    }

    #[test]
    fn attempt_deadline_adds_duration() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let attempt = Attempt {
            id: AttemptId(3),
            exam: ExamId(1),
            exam_title: "Algebra".into(),
            duration_minutes: 45,
            start_time: start,
            end_time: None,
            score: None,
            is_completed: false,
        };
        assert_eq!(
            attempt.deadline(),
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 45, 0).unwrap()
        );
    }
}
