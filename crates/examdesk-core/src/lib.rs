//! examdesk-core: exam attempt session controller.
//!
//! This crate holds the data model, the `ExamBackend` contract and the
//! session logic built on it: answer store, countdown timer, debounced
//! autosave and the single-submission coordinator.

pub mod answers;
pub mod autosave;
pub mod coordinator;
pub mod error;
pub mod mock;
pub mod model;
pub mod session;
mod sync;
pub mod time;
pub mod timer;
pub mod traits;

pub use answers::{Answer, AnswerInput, AnswerStore, Progress};
pub use coordinator::{Lifecycle, SubmitTrigger};
pub use error::{BackendError, ErrorClass, SessionError};
pub use session::{
    ExamSession, SessionConfig, SessionInitializer, SessionSnapshot, SessionStart, SubmitStatus,
};
pub use traits::{AnswerPayload, ExamBackend, SaveOutcome, StartOutcome, SubmitOutcome};
