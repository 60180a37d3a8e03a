//! Attempt lifecycle and the single-submission guard.
//!
//! Timer expiry, a rejected autosave and the student's confirm click all race
//! to move an active attempt into `Submitting`. The guard is a compare-and-set
//! token: whichever trigger flips it first proceeds, every later one is a no-op
//! until a failed manual submit hands the token back.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::sync::lock;

/// Coarse progress stage of an attempt within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Initializing,
    Active,
    Submitting,
    /// Terminal. The attempt is graded or was already complete.
    Submitted,
    /// Terminal. Loading failed; a fresh initialization may succeed.
    InitFailed,
    /// Terminal. The automatic submit failed; only a reload can continue.
    Fatal,
}

impl Lifecycle {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Lifecycle::Submitted | Lifecycle::InitFailed | Lifecycle::Fatal
        )
    }

    pub fn is_fatal(self) -> bool {
        matches!(self, Lifecycle::Fatal)
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Lifecycle::Initializing => "initializing",
            Lifecycle::Active => "active",
            Lifecycle::Submitting => "submitting",
            Lifecycle::Submitted => "submitted",
            Lifecycle::InitFailed => "failed to initialize",
            Lifecycle::Fatal => "failed",
        };
        f.write_str(s)
    }
}

/// What moved the attempt towards submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitTrigger {
    /// The student confirmed the submit dialog.
    Manual,
    /// The countdown reached zero.
    Timer,
    /// An autosave was rejected because the time limit had passed.
    SaveRejected,
}

impl SubmitTrigger {
    pub fn is_manual(self) -> bool {
        self == SubmitTrigger::Manual
    }
}

impl fmt::Display for SubmitTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitTrigger::Manual => f.write_str("manual"),
            SubmitTrigger::Timer => f.write_str("timer"),
            SubmitTrigger::SaveRejected => f.write_str("save-rejected"),
        }
    }
}

/// Owner of the lifecycle state.
#[derive(Debug)]
pub struct SubmissionCoordinator {
    guard: AtomicBool,
    state: Mutex<Lifecycle>,
}

impl Default for SubmissionCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl SubmissionCoordinator {
    pub fn new() -> Self {
        Self {
            guard: AtomicBool::new(false),
            state: Mutex::new(Lifecycle::Initializing),
        }
    }

    pub fn state(&self) -> Lifecycle {
        *lock(&self.state)
    }

    /// `Initializing → Active`.
    pub fn activate(&self) -> bool {
        self.transition(Lifecycle::Initializing, Lifecycle::Active)
    }

    /// `Initializing → InitFailed`.
    pub fn fail_initialization(&self) -> bool {
        self.transition(Lifecycle::Initializing, Lifecycle::InitFailed)
    }

    /// `Active → Submitting`, at most once per held token.
    ///
    /// Returns `false` when another trigger already holds the token or the
    /// attempt is not active.
    pub fn try_begin(&self, trigger: SubmitTrigger) -> bool {
        if self
            .guard
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(%trigger, "submission already claimed");
            return false;
        }
        if self.transition(Lifecycle::Active, Lifecycle::Submitting) {
            true
        } else {
            self.guard.store(false, Ordering::Release);
            false
        }
    }

    /// `Submitting → Submitted`. The token is never released.
    pub fn complete(&self) -> bool {
        self.transition(Lifecycle::Submitting, Lifecycle::Submitted)
    }

    /// `Submitting → Active` after a failed manual submit; releases the token.
    pub fn reopen(&self) -> bool {
        let reopened = self.transition(Lifecycle::Submitting, Lifecycle::Active);
        if reopened {
            self.guard.store(false, Ordering::Release);
        }
        reopened
    }

    /// `Submitting → Fatal`.
    pub fn fail(&self) -> bool {
        self.transition(Lifecycle::Submitting, Lifecycle::Fatal)
    }

    fn transition(&self, from: Lifecycle, to: Lifecycle) -> bool {
        let mut state = lock(&self.state);
        if *state != from {
            tracing::debug!(%from, %to, current = %*state, "lifecycle transition refused");
            return false;
        }
        *state = to;
        true
    }
}
