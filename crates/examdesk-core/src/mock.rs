//! In-memory backend for testing the session controller without a server.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::BackendError;
use crate::model::{
    Attempt, AttemptId, AttemptResult, Choice, ChoiceId, ExamId, Question, QuestionId,
    QuestionType, SavedAnswer,
};
use crate::sync::lock;
use crate::traits::{AnswerPayload, ExamBackend, SaveOutcome, StartOutcome, SubmitOutcome};

/// A scripted [`ExamBackend`].
///
/// Save and submit outcomes are consumed from queues; once a queue is empty
/// every call succeeds. Every save payload is recorded.
pub struct MockBackend {
    attempt: Attempt,
    start: Mutex<Result<StartOutcome, BackendError>>,
    questions: Mutex<Result<Vec<Question>, BackendError>>,
    saved_answers: Mutex<Result<Vec<SavedAnswer>, BackendError>>,
    save_outcomes: Mutex<VecDeque<Result<SaveOutcome, BackendError>>>,
    submit_outcomes: Mutex<VecDeque<Result<SubmitOutcome, BackendError>>>,
    save_delay: Duration,
    submit_delay: Duration,
    saves: Mutex<Vec<AnswerPayload>>,
    start_calls: AtomicU32,
    submit_calls: AtomicU32,
}

impl MockBackend {
    /// A backend that opens `attempt` as a fresh attempt with `questions`.
    pub fn new(attempt: Attempt, questions: Vec<Question>) -> Self {
        Self {
            start: Mutex::new(Ok(StartOutcome::Attempt {
                attempt: attempt.clone(),
                resumed: false,
            })),
            attempt,
            questions: Mutex::new(Ok(questions)),
            saved_answers: Mutex::new(Ok(Vec::new())),
            save_outcomes: Mutex::new(VecDeque::new()),
            submit_outcomes: Mutex::new(VecDeque::new()),
            save_delay: Duration::ZERO,
            submit_delay: Duration::ZERO,
            saves: Mutex::new(Vec::new()),
            start_calls: AtomicU32::new(0),
            submit_calls: AtomicU32::new(0),
        }
    }

    /// Report the attempt as resumed, with `saved` already on the server.
    pub fn resumed(self, saved: Vec<SavedAnswer>) -> Self {
        *lock(&self.start) = Ok(StartOutcome::Attempt {
            attempt: self.attempt.clone(),
            resumed: true,
        });
        *lock(&self.saved_answers) = Ok(saved);
        self
    }

    /// Replace the start outcome.
    pub fn with_start(self, outcome: Result<StartOutcome, BackendError>) -> Self {
        *lock(&self.start) = outcome;
        self
    }

    /// Make question loading fail.
    pub fn with_questions_error(self, err: BackendError) -> Self {
        *lock(&self.questions) = Err(err);
        self
    }

    /// Make saved-answer loading fail.
    pub fn with_saved_answers_error(self, err: BackendError) -> Self {
        *lock(&self.saved_answers) = Err(err);
        self
    }

    /// Simulated latency of every save.
    pub fn with_save_delay(mut self, delay: Duration) -> Self {
        self.save_delay = delay;
        self
    }

    /// Simulated latency of every submit.
    pub fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = delay;
        self
    }

    pub fn push_save_outcome(&self, outcome: Result<SaveOutcome, BackendError>) {
        lock(&self.save_outcomes).push_back(outcome);
    }

    pub fn push_submit_outcome(&self, outcome: Result<SubmitOutcome, BackendError>) {
        lock(&self.submit_outcomes).push_back(outcome);
    }

    /// Every save payload received, in arrival order.
    pub fn saves(&self) -> Vec<AnswerPayload> {
        lock(&self.saves).clone()
    }

    pub fn start_calls(&self) -> u32 {
        self.start_calls.load(Ordering::Relaxed)
    }

    pub fn submit_calls(&self) -> u32 {
        self.submit_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ExamBackend for MockBackend {
    async fn start_attempt(&self, _exam_id: ExamId) -> Result<StartOutcome, BackendError> {
        self.start_calls.fetch_add(1, Ordering::Relaxed);
        lock(&self.start).clone()
    }

    async fn fetch_questions(&self, _exam_id: ExamId) -> Result<Vec<Question>, BackendError> {
        lock(&self.questions).clone()
    }

    async fn save_answer(
        &self,
        _attempt_id: AttemptId,
        payload: &AnswerPayload,
    ) -> Result<SaveOutcome, BackendError> {
        if !self.save_delay.is_zero() {
            tokio::time::sleep(self.save_delay).await;
        }
        lock(&self.saves).push(payload.clone());
        lock(&self.save_outcomes)
            .pop_front()
            .unwrap_or(Ok(SaveOutcome::Saved))
    }

    async fn submit_attempt(&self, _attempt_id: AttemptId) -> Result<SubmitOutcome, BackendError> {
        self.submit_calls.fetch_add(1, Ordering::Relaxed);
        if !self.submit_delay.is_zero() {
            tokio::time::sleep(self.submit_delay).await;
        }
        lock(&self.submit_outcomes)
            .pop_front()
            .unwrap_or(Ok(SubmitOutcome::Submitted))
    }

    async fn fetch_result(&self, attempt_id: AttemptId) -> Result<AttemptResult, BackendError> {
        let total = match &*lock(&self.questions) {
            Ok(questions) => questions.len() as u32,
            Err(_) => 0,
        };
        Ok(AttemptResult {
            attempt_id,
            exam_title: self.attempt.exam_title.clone(),
            score: 0.0,
            correct_answers: 0,
            total_questions: total,
            percentage_score: 0.0,
            passed: false,
            time_taken_minutes: None,
            start_time: Some(self.attempt.start_time),
            end_time: None,
        })
    }

    async fn fetch_saved_answers(
        &self,
        _attempt_id: AttemptId,
    ) -> Result<Vec<SavedAnswer>, BackendError> {
        lock(&self.saved_answers).clone()
    }
}

/// A one-hour attempt on exam 1 started at `start_time`.
pub fn sample_attempt(start_time: DateTime<Utc>) -> Attempt {
    Attempt {
        id: AttemptId(7),
        exam: ExamId(1),
        exam_title: "Rust Fundamentals".into(),
        duration_minutes: 60,
        start_time,
        end_time: None,
        score: None,
        is_completed: false,
    }
}

fn choice(id: u64, text: &str, is_correct: Option<bool>) -> Choice {
    Choice {
        id: ChoiceId(id),
        text: text.into(),
        is_correct,
    }
}

/// One question of each type.
///
/// Question 1 carries correctness flags, as a misconfigured backend might
/// leak them.
pub fn sample_questions() -> Vec<Question> {
    vec![
        Question {
            id: QuestionId(1),
            question_type: QuestionType::SingleChoice,
            text: "Which keyword declares an immutable binding?".into(),
            points: 1.0,
            choices: vec![
                choice(11, "let", Some(true)),
                choice(12, "mut", Some(false)),
                choice(13, "static", Some(false)),
            ],
        },
        Question {
            id: QuestionId(2),
            question_type: QuestionType::TrueFalse,
            text: "A `&mut T` may coexist with a `&T` to the same value.".into(),
            points: 1.0,
            choices: vec![choice(21, "True", None), choice(22, "False", None)],
        },
        Question {
            id: QuestionId(3),
            question_type: QuestionType::MultiSelect,
            text: "Which of these types are `Copy`?".into(),
            points: 2.0,
            choices: vec![
                choice(31, "u32", None),
                choice(32, "String", None),
                choice(33, "bool", None),
                choice(34, "Vec<u8>", None),
                choice(35, "char", None),
            ],
        },
        Question {
            id: QuestionId(4),
            question_type: QuestionType::FreeText,
            text: "Name the trait that runs code when a value goes out of scope.".into(),
            points: 1.0,
            choices: Vec::new(),
        },
    ]
}
