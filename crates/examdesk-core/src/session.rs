//! The exam attempt session: initialization and the running controller.
//!
//! [`SessionInitializer`] resolves the attempt, loads the questions and wires
//! the answer store, countdown timer, autosave dispatcher and submission
//! coordinator into an [`ExamSession`]. The session publishes a
//! [`SessionSnapshot`] on a watch channel for the presentation layer.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use crate::answers::{Answer, AnswerInput, AnswerStore, Progress};
use crate::autosave::{AutosaveDispatcher, SaveListener};
use crate::coordinator::{Lifecycle, SubmissionCoordinator, SubmitTrigger};
use crate::error::{BackendError, SessionError};
use crate::model::{Attempt, AttemptId, Exam, ExamId, Question, QuestionId};
use crate::sync::lock;
use crate::time::Clock;
use crate::timer::{Countdown, CountdownTimer, TimerListener, TimerStart};
use crate::traits::{AnswerPayload, ExamBackend, StartOutcome, SubmitOutcome};

/// Tunables of a running session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Quiet period before an edited answer is saved.
    pub autosave_debounce_ms: u64,
    /// Remaining seconds at which the one-shot warning fires.
    pub warning_threshold_secs: u64,
    /// Send pending saves and wait for in-flight ones before submitting.
    pub flush_on_submit: bool,
    /// Restore answers saved by an earlier session when resuming an attempt.
    pub hydrate_on_resume: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            autosave_debounce_ms: 1500,
            warning_threshold_secs: crate::timer::DEFAULT_WARNING_THRESHOLD_SECS,
            flush_on_submit: false,
            hydrate_on_resume: true,
        }
    }
}

impl SessionConfig {
    pub fn autosave_debounce(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }
}

/// Observable state of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub lifecycle: Lifecycle,
    pub remaining_seconds: u64,
    pub progress: Progress,
    /// Message of the last error that changed the lifecycle.
    pub last_error: Option<String>,
    pub warning_issued: bool,
    /// A submit confirmation is open.
    pub awaiting_confirmation: bool,
    /// Set once the attempt is submitted; the results view reads it.
    pub completed_attempt: Option<AttemptId>,
}

/// How a session start resolved.
#[derive(Debug)]
pub enum SessionStart {
    /// An attempt is open and the timer is running (or has already expired).
    Active(ExamSession),
    /// The student already finished this exam; go straight to the results.
    AlreadySubmitted { attempt_id: Option<AttemptId> },
}

/// Result of a confirmed submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStatus {
    Submitted(AttemptId),
    /// Another trigger is already submitting or has submitted the attempt.
    Superseded,
}

/// Builds sessions against one backend.
pub struct SessionInitializer {
    backend: Arc<dyn ExamBackend>,
    config: SessionConfig,
    clock: Clock,
}

impl SessionInitializer {
    pub fn new(backend: Arc<dyn ExamBackend>) -> Self {
        Self {
            backend,
            config: SessionConfig::default(),
            clock: Clock::System,
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Start or resume an attempt on `exam_id`.
    ///
    /// Fails with [`SessionError::ExamInactive`] when the exam is closed and
    /// with [`SessionError::Initialization`] when loading fails; calling
    /// `start` again is the retry.
    pub async fn start(&self, exam_id: ExamId) -> Result<SessionStart, SessionError> {
        let session_id = Uuid::new_v4();
        let coordinator = SubmissionCoordinator::new();
        tracing::info!(%session_id, %exam_id, "starting exam session");

        let outcome = match self.backend.start_attempt(exam_id).await {
            Ok(outcome) => outcome,
            Err(err) => return Err(failed(&coordinator, session_id, err)),
        };
        let (attempt, resumed) = match outcome {
            StartOutcome::Attempt { attempt, resumed } => (attempt, resumed),
            StartOutcome::AlreadyCompleted { attempt_id } => {
                tracing::info!(%session_id, %exam_id, ?attempt_id, "exam already completed");
                return Ok(SessionStart::AlreadySubmitted { attempt_id });
            }
            StartOutcome::ExamInactive => {
                tracing::warn!(%session_id, %exam_id, "exam is not active");
                return Err(SessionError::ExamInactive(exam_id));
            }
        };

        let mut questions = match self.backend.fetch_questions(exam_id).await {
            Ok(questions) => questions,
            Err(err) => return Err(failed(&coordinator, session_id, err)),
        };
        questions.iter_mut().for_each(Question::redact);
        let mut store = AnswerStore::new(questions);

        if resumed && self.config.hydrate_on_resume {
            match self.backend.fetch_saved_answers(attempt.id).await {
                Ok(saved) => {
                    let restored = store.hydrate(&saved);
                    tracing::info!(%session_id, attempt_id = %attempt.id, restored, "restored saved answers");
                }
                Err(err) => {
                    tracing::warn!(
                        %session_id,
                        attempt_id = %attempt.id,
                        error = %err,
                        "could not load saved answers, starting empty"
                    );
                }
            }
        }

        let session = ExamSession::assemble(
            session_id,
            Arc::clone(&self.backend),
            attempt,
            resumed,
            store,
            coordinator,
            self.config.clone(),
            self.clock,
        );
        session.shared.activate();
        Ok(SessionStart::Active(session))
    }
}

fn failed(
    coordinator: &SubmissionCoordinator,
    session_id: Uuid,
    err: BackendError,
) -> SessionError {
    coordinator.fail_initialization();
    tracing::warn!(%session_id, state = %coordinator.state(), error = %err, "session initialization failed");
    SessionError::Initialization(err)
}

struct Shared {
    id: Uuid,
    backend: Arc<dyn ExamBackend>,
    attempt: Attempt,
    exam: Exam,
    resumed: bool,
    config: SessionConfig,
    answers: Mutex<AnswerStore>,
    timer: CountdownTimer,
    autosave: AutosaveDispatcher,
    coordinator: SubmissionCoordinator,
    unsent: Mutex<Vec<AnswerPayload>>,
    snapshot: watch::Sender<SessionSnapshot>,
}

/// Routes timer and autosave events back into the session without keeping
/// it alive.
struct Hooks(Weak<Shared>);

impl TimerListener for Hooks {
    fn on_tick(&self, remaining: u64) {
        if let Some(shared) = self.0.upgrade() {
            shared.publish(|s| s.remaining_seconds = remaining);
        }
    }

    fn on_warning(&self, remaining: u64) {
        if let Some(shared) = self.0.upgrade() {
            tracing::warn!(session_id = %shared.id, remaining, "exam time is running out");
            shared.publish(|s| s.warning_issued = true);
        }
    }

    fn on_expire(&self) {
        if let Some(shared) = self.0.upgrade() {
            shared.expire(SubmitTrigger::Timer);
        }
    }
}

impl SaveListener for Hooks {
    fn on_time_expired(&self) {
        if let Some(shared) = self.0.upgrade() {
            shared.expire(SubmitTrigger::SaveRejected);
        }
    }
}

impl Shared {
    fn publish(&self, update: impl FnOnce(&mut SessionSnapshot)) {
        self.snapshot.send_modify(update);
    }

    fn activate(&self) {
        self.coordinator.activate();
        self.publish(|s| s.lifecycle = Lifecycle::Active);
        tracing::info!(
            session_id = %self.id,
            attempt_id = %self.attempt.id,
            resumed = self.resumed,
            remaining = self.timer.remaining(),
            deadline = %self.attempt.deadline(),
            "attempt active"
        );
        if self.timer.start() == TimerStart::Expired {
            tracing::info!(session_id = %self.id, "no time left on attempt");
        }
    }

    /// Zero-time path shared by the timer, rejected saves and external signals.
    fn expire(self: &Arc<Self>, trigger: SubmitTrigger) {
        if !self.begin_submission(trigger) {
            return;
        }
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            // Failures are published on the snapshot.
            let _ = shared.finish_submission(trigger).await;
        });
    }

    /// Claim the submission token and quiesce the timer and autosave.
    fn begin_submission(&self, trigger: SubmitTrigger) -> bool {
        if !self.coordinator.try_begin(trigger) {
            return false;
        }
        self.timer.stop();
        let pending = self.autosave.pause();
        let remaining = if trigger.is_manual() {
            self.timer.remaining()
        } else {
            0
        };
        tracing::info!(
            session_id = %self.id,
            attempt_id = %self.attempt.id,
            %trigger,
            pending = pending.len(),
            "submitting attempt"
        );
        *lock(&self.unsent) = pending;
        self.publish(|s| {
            s.lifecycle = Lifecycle::Submitting;
            s.awaiting_confirmation = false;
            s.remaining_seconds = remaining;
        });
        true
    }

    async fn finish_submission(&self, trigger: SubmitTrigger) -> Result<SubmitStatus, SessionError> {
        let unsent = std::mem::take(&mut *lock(&self.unsent));
        if self.config.flush_on_submit {
            self.autosave.flush(unsent).await;
        } else if !unsent.is_empty() {
            tracing::debug!(session_id = %self.id, count = unsent.len(), "abandoned pending saves");
        }

        match self.backend.submit_attempt(self.attempt.id).await {
            Ok(outcome) => {
                if outcome == SubmitOutcome::AlreadyCompleted {
                    tracing::info!(session_id = %self.id, %trigger, "attempt was already completed");
                }
                self.coordinator.complete();
                let attempt_id = self.attempt.id;
                self.publish(|s| {
                    s.lifecycle = Lifecycle::Submitted;
                    s.completed_attempt = Some(attempt_id);
                    s.last_error = None;
                });
                tracing::info!(session_id = %self.id, %attempt_id, %trigger, "attempt submitted");
                Ok(SubmitStatus::Submitted(attempt_id))
            }
            Err(err) if trigger.is_manual() => {
                tracing::warn!(session_id = %self.id, error = %err, "submit failed, attempt reopened");
                let error = SessionError::SubmitFailed(err);
                self.coordinator.reopen();
                self.autosave.resume();
                self.publish(|s| {
                    s.lifecycle = Lifecycle::Active;
                    s.last_error = Some(error.to_string());
                });
                self.timer.start();
                Err(error)
            }
            Err(err) => {
                tracing::error!(session_id = %self.id, %trigger, error = %err, "automatic submit failed");
                let error = SessionError::SubmitFatal(err);
                self.coordinator.fail();
                self.publish(|s| {
                    s.lifecycle = Lifecycle::Fatal;
                    s.last_error = Some(error.to_string());
                });
                Err(error)
            }
        }
    }

    fn teardown(&self) {
        self.timer.stop();
        let dropped = self.autosave.pause();
        tracing::debug!(session_id = %self.id, dropped = dropped.len(), "session closed");
    }
}

/// A running exam attempt.
///
/// Dropping the session stops the timer and cancels every pending save.
pub struct ExamSession {
    shared: Arc<Shared>,
}

impl ExamSession {
    #[allow(clippy::too_many_arguments)]
    fn assemble(
        id: Uuid,
        backend: Arc<dyn ExamBackend>,
        attempt: Attempt,
        resumed: bool,
        store: AnswerStore,
        coordinator: SubmissionCoordinator,
        config: SessionConfig,
        clock: Clock,
    ) -> Self {
        let countdown = Countdown::new(
            attempt.start_time,
            attempt.duration_minutes,
            clock.now(),
            config.warning_threshold_secs,
        );
        let initial = SessionSnapshot {
            lifecycle: coordinator.state(),
            remaining_seconds: countdown.remaining(),
            progress: store.progress(),
            last_error: None,
            warning_issued: countdown.warning_issued(),
            awaiting_confirmation: false,
            completed_attempt: None,
        };
        // The attempt endpoints report no pass mark, and a started attempt
        // implies an active exam.
        let exam = Exam {
            id: attempt.exam,
            title: attempt.exam_title.clone(),
            duration_minutes: attempt.duration_minutes,
            pass_mark: None,
            is_active: true,
            questions: store.questions().to_vec(),
        };

        let shared = Arc::new_cyclic(|weak: &Weak<Shared>| {
            let hooks = Arc::new(Hooks(weak.clone()));
            let autosave = AutosaveDispatcher::new(
                Arc::clone(&backend),
                attempt.id,
                config.autosave_debounce(),
                hooks.clone(),
            );
            Shared {
                id,
                timer: CountdownTimer::new(countdown, clock, hooks),
                autosave,
                backend,
                attempt,
                exam,
                resumed,
                config,
                answers: Mutex::new(store),
                coordinator,
                unsent: Mutex::new(Vec::new()),
                snapshot: watch::channel(initial).0,
            }
        });
        Self { shared }
    }

    /// Client-side correlation id.
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn attempt(&self) -> &Attempt {
        &self.shared.attempt
    }

    pub fn exam(&self) -> &Exam {
        &self.shared.exam
    }

    /// Whether the attempt existed before this session.
    pub fn resumed(&self) -> bool {
        self.shared.resumed
    }

    pub fn questions(&self) -> &[Question] {
        &self.shared.exam.questions
    }

    pub fn state(&self) -> Lifecycle {
        self.shared.coordinator.state()
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.shared.snapshot.borrow().remaining_seconds
    }

    pub fn progress(&self) -> Progress {
        lock(&self.shared.answers).progress()
    }

    pub fn answer(&self, question_id: QuestionId) -> Option<Answer> {
        lock(&self.shared.answers).get(question_id).cloned()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.snapshot.subscribe()
    }

    /// Record an edit and schedule its autosave.
    pub fn set_answer(
        &self,
        question_id: QuestionId,
        input: AnswerInput,
    ) -> Result<Answer, SessionError> {
        let state = self.state();
        if state != Lifecycle::Active {
            return Err(SessionError::NotActive(state));
        }
        let (answer, progress) = {
            let mut store = lock(&self.shared.answers);
            let answer = store.set_answer(question_id, input)?.clone();
            (answer, store.progress())
        };
        self.shared.autosave.schedule(question_id, &answer);
        self.shared.publish(|s| s.progress = progress);
        Ok(answer)
    }

    /// Open the submit confirmation. Returns the progress to show in it.
    pub fn request_submit(&self) -> Result<Progress, SessionError> {
        let state = self.state();
        if state != Lifecycle::Active {
            return Err(SessionError::NotActive(state));
        }
        self.shared.publish(|s| s.awaiting_confirmation = true);
        Ok(self.progress())
    }

    /// Close the submit confirmation without submitting.
    pub fn cancel_submit(&self) {
        self.shared.publish(|s| s.awaiting_confirmation = false);
    }

    /// Submit the attempt on the student's behalf.
    ///
    /// On failure the attempt is active again with the remaining time it had
    /// when the submit began, and may be submitted again.
    pub async fn confirm_submit(&self) -> Result<SubmitStatus, SessionError> {
        if !self.shared.begin_submission(SubmitTrigger::Manual) {
            return match self.state() {
                Lifecycle::Submitting | Lifecycle::Submitted => Ok(SubmitStatus::Superseded),
                other => Err(SessionError::NotActive(other)),
            };
        }
        self.shared.finish_submission(SubmitTrigger::Manual).await
    }

    /// Treat the deadline as reached, exactly as if the timer hit zero.
    pub fn notify_time_expired(&self) {
        self.shared.expire(SubmitTrigger::Timer);
    }

    /// Wait until the session reaches a terminal lifecycle state.
    pub async fn wait_until_terminal(&self) -> SessionSnapshot {
        let mut rx = self.shared.snapshot.subscribe();
        let terminal = rx.wait_for(|s| s.lifecycle.is_terminal()).await;
        match terminal {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => self.snapshot(),
        }
    }

    /// Stop the timer and cancel pending saves.
    pub fn close(self) {}
}

impl Drop for ExamSession {
    fn drop(&mut self) {
        self.shared.teardown();
    }
}

impl fmt::Debug for ExamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExamSession")
            .field("id", &self.shared.id)
            .field("attempt", &self.shared.attempt.id)
            .field("state", &self.state())
            .finish()
    }
}
