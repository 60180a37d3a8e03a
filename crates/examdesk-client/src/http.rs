//! Grading backend over HTTP.

use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder};
use serde::{Deserialize, Deserializer};
use tracing::instrument;

use examdesk_core::error::BackendError;
use examdesk_core::model::{
    Attempt, AttemptId, AttemptResult, Choice, ChoiceId, ExamId, Question, QuestionId,
    QuestionType, SavedAnswer,
};
use examdesk_core::traits::{AnswerPayload, ExamBackend, SaveOutcome, StartOutcome, SubmitOutcome};

use crate::config::ClientConfig;

const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);
const TIME_EXPIRED: &str = "time limit exceeded";
const ALREADY_COMPLETED: &str = "already completed";
const ALREADY_SUBMITTED: &str = "already been submitted";
const NOT_ACTIVE: &str = "not currently active";

/// [`ExamBackend`] talking to the grading REST API.
pub struct HttpBackend {
    base_url: String,
    token: Option<String>,
    timeout_secs: u64,
    retry_attempts: u32,
    retry_delay: Duration,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .context("failed to build HTTP client")?;

        let mut base_url = config.base_url.clone();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self {
            base_url,
            token: config.token.clone(),
            timeout_secs: config.timeout_secs,
            retry_attempts: config.retry_attempts,
            retry_delay: config.retry_delay(),
            client,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut req = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .header("accept", "application/json");
        if let Some(token) = &self.token {
            req = req.header("Authorization", format!("Token {token}"));
        }
        req
    }

    async fn send(&self, req: RequestBuilder) -> Result<Reply, BackendError> {
        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout(self.timeout_secs)
            } else {
                BackendError::Network(e.to_string())
            }
        })?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout(self.timeout_secs)
            } else {
                BackendError::Network(e.to_string())
            }
        })?;
        Ok(Reply { status, body })
    }

    /// Run an idempotent request, retrying transient failures with
    /// exponential backoff.
    async fn with_retry<T, F, Fut>(&self, operation: &str, call: F) -> Result<T, BackendError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let mut delay = self.retry_delay;
        let mut retry = 0;
        loop {
            match call().await {
                Err(err) if err.is_transient() && retry < self.retry_attempts => {
                    retry += 1;
                    tracing::warn!(operation, retry, error = %err, "transient backend error, retrying");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(MAX_RETRY_DELAY);
                }
                result => return result,
            }
        }
    }

    async fn try_start(&self, exam_id: ExamId) -> Result<StartOutcome, BackendError> {
        let reply = self
            .send(self.request(Method::POST, &format!("api/exams/{exam_id}/start/")))
            .await?;
        match reply.status {
            201 => Ok(StartOutcome::Attempt {
                attempt: reply.json::<WireAttempt>()?.into(),
                resumed: false,
            }),
            200..=299 => {
                let value: serde_json::Value = reply.json()?;
                if detail_of(&value).is_some_and(|d| contains(&d, TIME_EXPIRED)) {
                    let attempt_id = value.get("id").and_then(|id| id.as_u64()).map(AttemptId);
                    return Ok(StartOutcome::AlreadyCompleted { attempt_id });
                }
                let attempt: WireAttempt = serde_json::from_value(value)
                    .map_err(|e| BackendError::Decode(format!("attempt: {e}")))?;
                Ok(StartOutcome::Attempt {
                    attempt: attempt.into(),
                    resumed: true,
                })
            }
            400 => {
                let message = reply.message();
                if contains(&message, ALREADY_COMPLETED) {
                    Ok(StartOutcome::AlreadyCompleted { attempt_id: None })
                } else if contains(&message, NOT_ACTIVE) {
                    Ok(StartOutcome::ExamInactive)
                } else {
                    Err(reply.into_error())
                }
            }
            _ => Err(reply.into_error()),
        }
    }

    async fn try_get<T>(&self, path: &str) -> Result<T, BackendError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let reply = self.send(self.request(Method::GET, path)).await?;
        if reply.is_success() {
            reply.json()
        } else {
            Err(reply.into_error())
        }
    }
}

struct Reply {
    status: u16,
    body: String,
}

impl Reply {
    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn json<T>(&self) -> Result<T, BackendError>
    where
        T: for<'de> Deserialize<'de>,
    {
        serde_json::from_str(&self.body)
            .map_err(|e| BackendError::Decode(format!("failed to parse response: {e}")))
    }

    /// Human-readable error text: `detail`, `error` or `message`, else the raw body.
    fn message(&self) -> String {
        serde_json::from_str::<serde_json::Value>(&self.body)
            .ok()
            .and_then(|v| detail_of(&v))
            .unwrap_or_else(|| self.body.trim().to_string())
    }

    fn into_error(self) -> BackendError {
        let message = self.message();
        match self.status {
            401 | 403 => BackendError::Unauthorized(message),
            404 => BackendError::NotFound(message),
            status => BackendError::Api { status, message },
        }
    }
}

fn detail_of(value: &serde_json::Value) -> Option<String> {
    ["detail", "error", "message"]
        .iter()
        .find_map(|key| value.get(key).and_then(|v| v.as_str()))
        .map(str::to_string)
}

fn contains(message: &str, needle: &str) -> bool {
    message.to_lowercase().contains(needle)
}

/// Accept a decimal either as a JSON number or as a string such as `"1.50"`.
fn decimal<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Decimal {
        Number(f64),
        Text(String),
    }

    match Option::<Decimal>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Decimal::Number(n)) => Ok(Some(n)),
        Some(Decimal::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[derive(Deserialize)]
struct WireAttempt {
    id: u64,
    exam: u64,
    #[serde(default)]
    exam_title: String,
    exam_duration: u32,
    start_time: DateTime<Utc>,
    #[serde(default)]
    end_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "decimal")]
    score: Option<f64>,
    #[serde(default)]
    is_completed: bool,
}

impl From<WireAttempt> for Attempt {
    fn from(w: WireAttempt) -> Self {
        Attempt {
            id: AttemptId(w.id),
            exam: ExamId(w.exam),
            exam_title: w.exam_title,
            duration_minutes: w.exam_duration,
            start_time: w.start_time,
            end_time: w.end_time,
            score: w.score,
            is_completed: w.is_completed,
        }
    }
}

#[derive(Deserialize)]
struct WireChoice {
    id: u64,
    #[serde(alias = "text")]
    choice_text: String,
    #[serde(default)]
    is_correct: Option<bool>,
}

#[derive(Deserialize)]
struct WireQuestion {
    id: u64,
    #[serde(alias = "text")]
    question_text: String,
    question_type: QuestionType,
    #[serde(default, deserialize_with = "decimal")]
    score_points: Option<f64>,
    #[serde(default)]
    choices: Vec<WireChoice>,
}

impl From<WireQuestion> for Question {
    fn from(w: WireQuestion) -> Self {
        Question {
            id: QuestionId(w.id),
            question_type: w.question_type,
            text: w.question_text,
            points: w.score_points.unwrap_or(1.0),
            choices: w
                .choices
                .into_iter()
                .map(|c| Choice {
                    id: ChoiceId(c.id),
                    text: c.choice_text,
                    is_correct: c.is_correct,
                })
                .collect(),
        }
    }
}

#[derive(Deserialize)]
struct WireResult {
    id: u64,
    #[serde(default)]
    exam_title: String,
    #[serde(default, deserialize_with = "decimal")]
    score: Option<f64>,
    #[serde(default)]
    correct_answers: u32,
    #[serde(default)]
    total_questions: u32,
    #[serde(default, deserialize_with = "decimal")]
    percentage_score: Option<f64>,
    #[serde(default)]
    passed: bool,
    #[serde(default, deserialize_with = "decimal")]
    time_taken: Option<f64>,
    #[serde(default)]
    start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    end_time: Option<DateTime<Utc>>,
}

impl From<WireResult> for AttemptResult {
    fn from(w: WireResult) -> Self {
        AttemptResult {
            attempt_id: AttemptId(w.id),
            exam_title: w.exam_title,
            score: w.score.unwrap_or_default(),
            correct_answers: w.correct_answers,
            total_questions: w.total_questions,
            percentage_score: w.percentage_score.unwrap_or_default(),
            passed: w.passed,
            time_taken_minutes: w.time_taken,
            start_time: w.start_time,
            end_time: w.end_time,
        }
    }
}

#[derive(Deserialize)]
struct WireSavedAnswer {
    #[serde(alias = "question_id")]
    question: u64,
    #[serde(default, alias = "chosen_choice_id")]
    chosen_choice: Option<u64>,
    #[serde(default)]
    answer_text: Option<String>,
}

impl From<WireSavedAnswer> for SavedAnswer {
    fn from(w: WireSavedAnswer) -> Self {
        SavedAnswer {
            question_id: QuestionId(w.question),
            chosen_choice_id: w.chosen_choice.map(ChoiceId),
            answer_text: w.answer_text,
        }
    }
}

#[async_trait]
impl ExamBackend for HttpBackend {
    #[instrument(skip(self))]
    async fn start_attempt(&self, exam_id: ExamId) -> Result<StartOutcome, BackendError> {
        self.with_retry("start_attempt", || self.try_start(exam_id))
            .await
    }

    #[instrument(skip(self))]
    async fn fetch_questions(&self, exam_id: ExamId) -> Result<Vec<Question>, BackendError> {
        let path = format!("api/exams/{exam_id}/questions/");
        let questions: Vec<WireQuestion> = self
            .with_retry("fetch_questions", || self.try_get(&path))
            .await?;
        Ok(questions.into_iter().map(Question::from).collect())
    }

    #[instrument(skip(self, payload), fields(question_id = %payload.question_id))]
    async fn save_answer(
        &self,
        attempt_id: AttemptId,
        payload: &AnswerPayload,
    ) -> Result<SaveOutcome, BackendError> {
        let req = self
            .request(Method::POST, &format!("api/attempts/{attempt_id}/submit-answer/"))
            .json(payload);
        let reply = self.send(req).await?;
        if reply.is_success() {
            return Ok(SaveOutcome::Saved);
        }
        if reply.status == 400 && contains(&reply.message(), TIME_EXPIRED) {
            return Ok(SaveOutcome::TimeExpired);
        }
        Err(reply.into_error())
    }

    #[instrument(skip(self))]
    async fn submit_attempt(&self, attempt_id: AttemptId) -> Result<SubmitOutcome, BackendError> {
        let reply = self
            .send(self.request(Method::POST, &format!("api/attempts/{attempt_id}/submit/")))
            .await?;
        if reply.is_success() {
            return Ok(SubmitOutcome::Submitted);
        }
        // The submit endpoint only looks up open attempts, so a closed one is
        // reported as missing.
        if reply.status == 404 {
            tracing::info!(%attempt_id, "attempt no longer open, treating as submitted");
            return Ok(SubmitOutcome::AlreadyCompleted);
        }
        let message = reply.message();
        if reply.status == 400
            && (contains(&message, ALREADY_SUBMITTED) || contains(&message, ALREADY_COMPLETED))
        {
            return Ok(SubmitOutcome::AlreadyCompleted);
        }
        Err(reply.into_error())
    }

    #[instrument(skip(self))]
    async fn fetch_result(&self, attempt_id: AttemptId) -> Result<AttemptResult, BackendError> {
        let path = format!("api/attempts/{attempt_id}/results/");
        let result: WireResult = self
            .with_retry("fetch_result", || self.try_get(&path))
            .await?;
        Ok(result.into())
    }

    #[instrument(skip(self))]
    async fn fetch_saved_answers(
        &self,
        attempt_id: AttemptId,
    ) -> Result<Vec<SavedAnswer>, BackendError> {
        let path = format!("api/attempts/{attempt_id}/answers/");
        match self
            .with_retry("fetch_saved_answers", || {
                self.try_get::<Vec<WireSavedAnswer>>(&path)
            })
            .await
        {
            Ok(saved) => Ok(saved.into_iter().map(SavedAnswer::from).collect()),
            Err(BackendError::NotFound(_)) => {
                tracing::debug!(%attempt_id, "backend does not expose saved answers");
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }
}
