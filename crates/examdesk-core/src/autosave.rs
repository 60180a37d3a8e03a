//! Debounced, per-question autosave.
//!
//! Each question owns at most one pending save. A new edit aborts the pending
//! task for that question and schedules a fresh one carrying the latest value,
//! so intermediate values are never sent. Questions are independent: their
//! saves are neither serialized nor ordered relative to each other.
//!
//! Once a save has left its debounce window it is in flight and is never
//! cancelled; only pending saves are.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::answers::Answer;
use crate::model::{AttemptId, QuestionId};
use crate::sync::lock;
use crate::traits::{AnswerPayload, ExamBackend, SaveOutcome};

/// Default quiet period before an edit is sent.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1500);

/// Encode an answer for transmission.
///
/// Choice answers travel as `chosen_choice_id`; text and multi-select answers
/// as `answer_text`, the latter a comma-joined list of choice ids.
/// `answer_text` is never null: the backend strips it for every question type.
pub fn encode_payload(question_id: QuestionId, answer: &Answer) -> AnswerPayload {
    match answer {
        Answer::Choice(choice) => AnswerPayload {
            question_id,
            chosen_choice_id: *choice,
            answer_text: Some(String::new()),
        },
        Answer::Choices(set) => AnswerPayload {
            question_id,
            chosen_choice_id: None,
            answer_text: Some(
                set.iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(","),
            ),
        },
        Answer::Text(text) => AnswerPayload {
            question_id,
            chosen_choice_id: None,
            answer_text: Some(text.clone()),
        },
    }
}

/// Receives the one autosave result that affects the attempt lifecycle.
pub trait SaveListener: Send + Sync {
    /// The backend rejected a save because the time limit has passed.
    fn on_time_expired(&self);
}

struct Pending {
    generation: u64,
    payload: AnswerPayload,
    task: JoinHandle<()>,
}

struct Inner {
    backend: Arc<dyn ExamBackend>,
    attempt_id: AttemptId,
    debounce: Duration,
    listener: Arc<dyn SaveListener>,
    enabled: AtomicBool,
    generation: AtomicU64,
    pending: Mutex<HashMap<QuestionId, Pending>>,
    in_flight: watch::Sender<usize>,
}

/// Arena of cancellable debounce tasks keyed by question id.
pub struct AutosaveDispatcher {
    inner: Arc<Inner>,
}

impl AutosaveDispatcher {
    pub fn new(
        backend: Arc<dyn ExamBackend>,
        attempt_id: AttemptId,
        debounce: Duration,
        listener: Arc<dyn SaveListener>,
    ) -> Self {
        let (in_flight, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                backend,
                attempt_id,
                debounce,
                listener,
                enabled: AtomicBool::new(true),
                generation: AtomicU64::new(0),
                pending: Mutex::new(HashMap::new()),
                in_flight,
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Number of questions with a save waiting out its debounce window.
    pub fn pending(&self) -> usize {
        lock(&self.inner.pending).len()
    }

    /// Number of saves sent and not yet answered.
    pub fn in_flight(&self) -> usize {
        *self.inner.in_flight.borrow()
    }

    /// Schedule a save of `answer`, replacing any pending save for the question.
    pub fn schedule(&self, question_id: QuestionId, answer: &Answer) {
        if !self.is_enabled() {
            tracing::trace!(%question_id, "autosave disabled, edit not scheduled");
            return;
        }
        let payload = encode_payload(question_id, answer);
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);

        let mut pending = lock(&self.inner.pending);
        let task = tokio::spawn(async move {
            tokio::time::sleep(inner.debounce).await;
            if let Some(payload) = inner.claim(question_id, generation) {
                inner.send(payload).await;
            }
        });
        let replaced = pending.insert(
            question_id,
            Pending {
                generation,
                payload,
                task,
            },
        );
        if let Some(previous) = replaced {
            previous.task.abort();
            tracing::trace!(%question_id, "pending save superseded");
        }
    }

    /// Stop accepting edits and cancel every pending save.
    ///
    /// Returns the payloads that were waiting, ordered by question id, so the
    /// caller can either drop or [`flush`](Self::flush) them. In-flight saves
    /// are left to finish.
    pub fn pause(&self) -> Vec<AnswerPayload> {
        self.inner.enabled.store(false, Ordering::SeqCst);
        let mut drained: Vec<AnswerPayload> = lock(&self.inner.pending)
            .drain()
            .map(|(_, pending)| {
                pending.task.abort();
                pending.payload
            })
            .collect();
        drained.sort_by_key(|p| p.question_id);
        if !drained.is_empty() {
            tracing::debug!(count = drained.len(), "cancelled pending saves");
        }
        drained
    }

    /// Accept edits again after a [`pause`](Self::pause).
    pub fn resume(&self) {
        self.inner.enabled.store(true, Ordering::SeqCst);
    }

    /// Send `payloads` now and wait until no save is in flight.
    pub async fn flush(&self, payloads: Vec<AnswerPayload>) {
        let mut sends: FuturesUnordered<_> =
            payloads.into_iter().map(|p| self.inner.send(p)).collect();
        while sends.next().await.is_some() {}
        let mut idle = self.inner.in_flight.subscribe();
        if idle.wait_for(|n| *n == 0).await.is_err() {
            tracing::debug!("in-flight counter closed before saves drained");
        }
    }
}

impl Drop for AutosaveDispatcher {
    fn drop(&mut self) {
        self.pause();
    }
}

impl Inner {
    /// Take the pending payload if `generation` is still the latest for the question.
    fn claim(&self, question_id: QuestionId, generation: u64) -> Option<AnswerPayload> {
        if !self.enabled.load(Ordering::SeqCst) {
            return None;
        }
        let mut pending = lock(&self.pending);
        match pending.get(&question_id) {
            Some(entry) if entry.generation == generation => {
                pending.remove(&question_id).map(|entry| entry.payload)
            }
            _ => None,
        }
    }

    async fn send(&self, payload: AnswerPayload) {
        let question_id = payload.question_id;
        self.in_flight.send_modify(|n| *n += 1);
        let result = self.backend.save_answer(self.attempt_id, &payload).await;
        self.in_flight.send_modify(|n| *n = n.saturating_sub(1));

        match result {
            Ok(SaveOutcome::Saved) => {
                tracing::debug!(attempt_id = %self.attempt_id, %question_id, "answer saved");
            }
            Ok(SaveOutcome::TimeExpired) => {
                tracing::warn!(
                    attempt_id = %self.attempt_id,
                    %question_id,
                    "save rejected, time limit exceeded"
                );
                self.listener.on_time_expired();
            }
            Err(err) => {
                tracing::warn!(
                    attempt_id = %self.attempt_id,
                    %question_id,
                    error = %err,
                    "autosave failed"
                );
            }
        }
    }
}
