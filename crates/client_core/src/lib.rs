pub mod api;
pub mod error;
pub mod intent;
pub mod session;
pub mod terminal;
pub mod timer;
pub mod view;

pub use api::{ExamApi, HttpExamApi};
pub use error::{SessionError, SessionResult};
pub use intent::Intent;
pub use session::{
    resume_index, ControllerOptions, Session, SessionController, SessionEvent, SessionSnapshot,
    TickOutcome,
};
pub use terminal::{resolve_terminal_panel, LaunchOptions, TerminalPanel};
pub use timer::{TimerSynchronizer, DEFAULT_POLL_INTERVAL, MIN_POLL_INTERVAL};
pub use view::{
    ExamHeader, FlaggedEntry, KeyPress, Notice, NoticeLevel, NullRenderer, Overlay, QuestionView,
    Renderer, Screen, ScoreDisplay, ScoreOutcome, ScoreResult, SolutionDisplay, TimerDisplay,
    ViewCoordinator,
};

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod api_tests;
