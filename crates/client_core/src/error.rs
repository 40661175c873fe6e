//! Error taxonomy for session operations.
//!
//! Every variant is recoverable: callers render a fallback and keep going.

use shared::domain::{ExamId, Lifecycle};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Exam config, questions or timer start failed; lifecycle stays NotStarted.
    #[error("failed to load exam {exam_id}: {source}")]
    Load {
        exam_id: ExamId,
        source: anyhow::Error,
    },
    #[error("failed to load exam list: {source}")]
    ExamList { source: anyhow::Error },
    /// Transient; the next tick polls again.
    #[error("timer poll failed: {source}")]
    TimerPoll { source: anyhow::Error },
    /// Flag or pause toggle failed; local state is untouched.
    #[error("{action} failed: {source}")]
    Action {
        action: &'static str,
        source: anyhow::Error,
    },
    /// Scoring failed; the session still sits in Scoring with the message on screen.
    #[error("scoring failed: {message}")]
    Scoring { message: String },
    /// Cleanup or shutdown failed; the score view is restored.
    #[error("cleanup failed: {source}")]
    Cleanup { source: anyhow::Error },
    #[error("{action} is not allowed while {lifecycle:?}")]
    NotAllowed {
        action: &'static str,
        lifecycle: Lifecycle,
    },
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;
