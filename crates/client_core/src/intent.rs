use std::sync::Arc;

use shared::domain::ExamId;
use tracing::{debug, warn};

use crate::{
    error::{SessionError, SessionResult},
    session::SessionController,
    view::KeyPress,
};

/// User intents raised by the view layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    SelectExam(ExamId),
    Navigate(usize),
    NextQuestion,
    PreviousQuestion,
    ToggleFlag,
    TogglePause,
    RequestStop,
    ConfirmStop,
    CancelOverlay,
    AcknowledgeTimesUp,
    ShowFlagged,
    JumpToFlagged(usize),
    ViewSolutions,
    ShowSolution(usize),
    NextSolution,
    PreviousSolution,
    BackToScore,
    CloseScore,
    RequestLeave,
    ConfirmLeave,
    ReturnToSelection,
    CleanupAndReturn,
    CleanupAndTerminate,
    Key(KeyPress),
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Intent::SelectExam(_) => "select_exam",
            Intent::Navigate(_) => "navigate",
            Intent::NextQuestion => "next_question",
            Intent::PreviousQuestion => "previous_question",
            Intent::ToggleFlag => "toggle_flag",
            Intent::TogglePause => "toggle_pause",
            Intent::RequestStop => "request_stop",
            Intent::ConfirmStop => "confirm_stop",
            Intent::CancelOverlay => "cancel_overlay",
            Intent::AcknowledgeTimesUp => "acknowledge_times_up",
            Intent::ShowFlagged => "show_flagged",
            Intent::JumpToFlagged(_) => "jump_to_flagged",
            Intent::ViewSolutions => "view_solutions",
            Intent::ShowSolution(_) => "show_solution",
            Intent::NextSolution => "next_solution",
            Intent::PreviousSolution => "previous_solution",
            Intent::BackToScore => "back_to_score",
            Intent::CloseScore => "close_score",
            Intent::RequestLeave => "request_leave",
            Intent::ConfirmLeave => "confirm_leave",
            Intent::ReturnToSelection => "return_to_selection",
            Intent::CleanupAndReturn => "cleanup_and_return",
            Intent::CleanupAndTerminate => "cleanup_and_terminate",
            Intent::Key(_) => "key",
        }
    }
}

impl SessionController {
    /// Single entry point for the view layer. Key presses are routed first;
    /// failures are logged here and handed back for callers that care.
    pub async fn dispatch(self: &Arc<Self>, intent: Intent) -> SessionResult<()> {
        let intent = match intent {
            Intent::Key(key) => match self.route_key(&key).await {
                Some(routed) => routed,
                None => return Ok(()),
            },
            other => other,
        };
        let name = intent.name();
        let result = self.apply_intent(intent).await;
        match &result {
            Err(err @ SessionError::NotAllowed { .. }) => {
                debug!(intent = name, error = %err, "intent: ignored")
            }
            Err(err) => warn!(intent = name, error = %err, "intent: failed"),
            Ok(()) => {}
        }
        result
    }

    async fn apply_intent(self: &Arc<Self>, intent: Intent) -> SessionResult<()> {
        match intent {
            Intent::SelectExam(exam_id) => self.start(exam_id).await,
            Intent::Navigate(index) => {
                self.navigate(index).await;
                Ok(())
            }
            Intent::NextQuestion => {
                self.next().await;
                Ok(())
            }
            Intent::PreviousQuestion => {
                self.previous().await;
                Ok(())
            }
            Intent::ToggleFlag => self.toggle_flag().await,
            Intent::TogglePause => self.toggle_pause().await,
            Intent::RequestStop => self.request_stop().await,
            Intent::ConfirmStop => self.confirm_stop().await,
            Intent::CancelOverlay => {
                self.cancel_overlay().await;
                Ok(())
            }
            Intent::AcknowledgeTimesUp => self.acknowledge_times_up().await,
            Intent::ShowFlagged => self.show_flagged_list().await,
            Intent::JumpToFlagged(index) => self.jump_to_flagged(index).await,
            Intent::ViewSolutions => self.request_solutions().await,
            Intent::ShowSolution(index) => self.show_solution(index).await,
            Intent::NextSolution => self.next_solution().await,
            Intent::PreviousSolution => self.previous_solution().await,
            Intent::BackToScore => self.back_to_score().await,
            Intent::CloseScore => self.close_score().await,
            Intent::RequestLeave => self.request_leave().await,
            Intent::ConfirmLeave => self.confirm_leave().await,
            Intent::ReturnToSelection => self.return_to_selection().await,
            Intent::CleanupAndReturn => self.cleanup_and_return().await,
            Intent::CleanupAndTerminate => self.cleanup_and_terminate().await,
            Intent::Key(_) => Ok(()),
        }
    }
}
