//! Screen and overlay bookkeeping plus the `Renderer` seam.
//!
//! Exactly one screen is shown at a time, with at most one overlay on top of
//! it. The Solutions overlay remembers the Score overlay it replaced so that
//! backing out of solutions brings the score back.

use std::sync::Arc;

use shared::{
    domain::{format_clock, QuestionId, Theme, TimerSeverity},
    protocol::{ExamConfig, ExamSummary, Question, QuestionScore, ScoreResponse, Solution},
};

use crate::{intent::Intent, terminal::TerminalPanel};

pub const START_FAILED_NOTICE: &str = "Failed to start exam. Please check the server.";
pub const EXAM_LIST_FAILED_NOTICE: &str = "Failed to load exams. Please check the server.";
pub const SOLUTIONS_UNAVAILABLE_NOTICE: &str = "Solutions are not available for this exam yet.";
pub const SOLUTIONS_FAILED_NOTICE: &str = "Failed to load solutions. Please try again.";
pub const SCORE_FAILED_STATUS: &str = "Failed to calculate score";
pub const SCORE_UNREACHABLE_STATUS: &str = "Failed to connect to server";
pub const MANUAL_SCORING_HINT: &str =
    "Could not calculate score. Run ./scripts/ckad-score.sh manually in your terminal.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Screen {
    ExamSelection,
    ExamInterface,
    /// Static end-of-session message after the server was shut down.
    SessionEnded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Overlay {
    TimesUp,
    FlaggedQuestions,
    StopConfirmation,
    LeaveConfirmation,
    Score,
    Solutions,
}

impl Overlay {
    /// Confirmation dialogs swallow Escape before any other shortcut.
    pub fn is_confirmation(self) -> bool {
        matches!(self, Overlay::StopConfirmation | Overlay::LeaveConfirmation)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPress {
    pub key: String,
    pub ctrl: bool,
    pub meta: bool,
}

impl KeyPress {
    pub fn plain(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ctrl: false,
            meta: false,
        }
    }

    pub fn with_ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn with_meta(mut self) -> Self {
        self.meta = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExamHeader {
    pub exam_name: String,
    pub question_count: usize,
    pub total_points: u32,
    pub duration_minutes: u32,
}

impl ExamHeader {
    pub fn new(config: &ExamConfig, question_count: usize) -> Self {
        Self {
            exam_name: config.exam_name.clone(),
            question_count,
            total_points: config.total_points,
            duration_minutes: config.duration,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuestionView {
    pub index: usize,
    pub total: usize,
    pub question: Question,
    pub flagged: bool,
    pub flagged_count: usize,
}

impl QuestionView {
    /// "Question 3 of 22".
    pub fn position_label(&self) -> String {
        format!("Question {} of {}", self.index + 1, self.total)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerDisplay {
    pub remaining_seconds: u64,
    pub text: String,
    pub severity: TimerSeverity,
    pub paused: bool,
}

impl TimerDisplay {
    pub fn new(remaining_seconds: u64, paused: bool) -> Self {
        Self {
            remaining_seconds,
            text: format_clock(remaining_seconds),
            severity: TimerSeverity::from_remaining(remaining_seconds),
            paused,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlaggedEntry {
    pub index: usize,
    pub question_id: QuestionId,
    pub topic: String,
}

/// Outcome of a successful compute-score call.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreResult {
    pub total_score: f64,
    pub max_score: f64,
    pub percentage: f64,
    pub passed: bool,
    pub elapsed: Option<String>,
    pub questions: Vec<QuestionScore>,
    pub solutions_available: bool,
}

impl ScoreResult {
    pub fn question(&self, id: &QuestionId) -> Option<&QuestionScore> {
        self.questions.iter().find(|question| &question.id == id)
    }
}

impl From<ScoreResponse> for ScoreResult {
    fn from(response: ScoreResponse) -> Self {
        Self {
            total_score: response.total_score,
            max_score: response.max_score,
            percentage: response.percentage,
            passed: response.passed,
            elapsed: response.elapsed_formatted,
            questions: response.questions,
            solutions_available: response.solutions_available,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreOutcome {
    Pending,
    Passed,
    Failed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreRow {
    pub label: String,
    pub topic: String,
    pub points: String,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreDisplay {
    pub outcome: ScoreOutcome,
    pub title: String,
    pub status: String,
    pub percentage: String,
    pub points: String,
    pub elapsed: String,
    pub rows: Vec<ScoreRow>,
    pub detail: Option<String>,
    pub solutions_available: bool,
    /// Set when cleanup failed and the score view was put back.
    pub inline_error: Option<String>,
}

impl ScoreDisplay {
    pub fn pending() -> Self {
        Self {
            outcome: ScoreOutcome::Pending,
            title: "Calculating Score...".to_string(),
            status: "Please wait...".to_string(),
            percentage: "--".to_string(),
            points: "-- / --".to_string(),
            elapsed: "--:--".to_string(),
            rows: Vec::new(),
            detail: None,
            solutions_available: false,
            inline_error: None,
        }
    }

    pub fn from_result(result: &ScoreResult) -> Self {
        let (outcome, title, status) = if result.passed {
            (ScoreOutcome::Passed, "Congratulations!", "PASSED")
        } else {
            (ScoreOutcome::Failed, "Keep Practicing!", "NOT PASSED")
        };
        Self {
            outcome,
            title: title.to_string(),
            status: status.to_string(),
            percentage: format_number(result.percentage),
            points: format!(
                "{} / {}",
                format_number(result.total_score),
                format_number(result.max_score)
            ),
            elapsed: result
                .elapsed
                .clone()
                .unwrap_or_else(|| "--:--".to_string()),
            rows: result
                .questions
                .iter()
                .map(|question| ScoreRow {
                    label: format!("Q{}", question.id),
                    topic: question.topic.clone(),
                    points: format!(
                        "{}/{}",
                        format_number(question.score),
                        format_number(question.max_score)
                    ),
                    passed: question.passed,
                })
                .collect(),
            detail: None,
            solutions_available: result.solutions_available,
            inline_error: None,
        }
    }

    /// The server answered but refused to score.
    pub fn refused(error: Option<&str>) -> Self {
        Self {
            outcome: ScoreOutcome::Error,
            title: "Scoring Error".to_string(),
            status: error
                .filter(|message| !message.is_empty())
                .unwrap_or(SCORE_FAILED_STATUS)
                .to_string(),
            detail: Some(MANUAL_SCORING_HINT.to_string()),
            ..Self::pending_shell()
        }
    }

    /// The score request never got an answer.
    pub fn unreachable() -> Self {
        Self {
            outcome: ScoreOutcome::Error,
            title: "Error".to_string(),
            status: SCORE_UNREACHABLE_STATUS.to_string(),
            ..Self::pending_shell()
        }
    }

    pub fn with_inline_error(mut self, message: impl Into<String>) -> Self {
        self.inline_error = Some(message.into());
        self
    }

    fn pending_shell() -> Self {
        Self {
            title: String::new(),
            status: String::new(),
            ..Self::pending()
        }
    }
}

/// `75.0` renders as `75`, `82.5` stays `82.5`.
pub fn format_number(value: f64) -> String {
    format!("{value}")
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolutionDisplay {
    pub index: usize,
    pub total: usize,
    pub solution: Solution,
    pub passed: Option<bool>,
}

impl SolutionDisplay {
    pub fn new(index: usize, total: usize, solution: Solution, score: Option<&ScoreResult>) -> Self {
        let passed = score
            .and_then(|score| score.question(&solution.id))
            .map(|question| question.passed);
        Self {
            index,
            total,
            solution,
            passed,
        }
    }

    pub fn title(&self) -> String {
        format!("Question {} | {}", self.solution.id, self.solution.topic)
    }

    pub fn status_label(&self) -> &'static str {
        match self.passed {
            Some(true) => "PASSED",
            Some(false) => "FAILED",
            None => "",
        }
    }
}

/// Everything the session controller needs to put on screen.
///
/// Calls happen while the controller holds its state lock, so
/// implementations must not call back into the controller.
pub trait Renderer: Send + Sync {
    fn show_screen(&self, screen: Screen);
    fn show_overlay(&self, overlay: Overlay);
    fn hide_overlay(&self, overlay: Overlay);
    fn render_exam_list(&self, exams: &[ExamSummary]);
    fn render_exam_header(&self, header: &ExamHeader);
    fn render_question(&self, view: &QuestionView);
    fn render_timer(&self, timer: &TimerDisplay);
    fn render_flagged_list(&self, entries: &[FlaggedEntry]);
    fn render_score(&self, score: &ScoreDisplay);
    fn render_solution(&self, solution: &SolutionDisplay);
    fn render_terminal(&self, panel: &TerminalPanel);
    fn notify(&self, notice: &Notice);
    fn apply_theme(&self, theme: Theme);
    fn apply_split_ratio(&self, ratio: f64);
}

/// Headless renderer.
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn show_screen(&self, _screen: Screen) {}
    fn show_overlay(&self, _overlay: Overlay) {}
    fn hide_overlay(&self, _overlay: Overlay) {}
    fn render_exam_list(&self, _exams: &[ExamSummary]) {}
    fn render_exam_header(&self, _header: &ExamHeader) {}
    fn render_question(&self, _view: &QuestionView) {}
    fn render_timer(&self, _timer: &TimerDisplay) {}
    fn render_flagged_list(&self, _entries: &[FlaggedEntry]) {}
    fn render_score(&self, _score: &ScoreDisplay) {}
    fn render_solution(&self, _solution: &SolutionDisplay) {}
    fn render_terminal(&self, _panel: &TerminalPanel) {}
    fn notify(&self, _notice: &Notice) {}
    fn apply_theme(&self, _theme: Theme) {}
    fn apply_split_ratio(&self, _ratio: f64) {}
}

pub struct ViewCoordinator {
    renderer: Arc<dyn Renderer>,
    screen: Screen,
    overlay: Option<Overlay>,
    underlay: Option<Overlay>,
    terminal: TerminalPanel,
}

impl ViewCoordinator {
    pub fn new(renderer: Arc<dyn Renderer>) -> Self {
        Self {
            renderer,
            screen: Screen::ExamSelection,
            overlay: None,
            underlay: None,
            terminal: TerminalPanel::Hidden,
        }
    }

    pub fn renderer(&self) -> &dyn Renderer {
        self.renderer.as_ref()
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn overlay(&self) -> Option<Overlay> {
        self.overlay
    }

    pub fn terminal(&self) -> &TerminalPanel {
        &self.terminal
    }

    /// Switching screens drops every overlay.
    pub fn show_screen(&mut self, screen: Screen) {
        self.clear_overlays();
        self.screen = screen;
        self.renderer.show_screen(screen);
    }

    pub fn open_overlay(&mut self, overlay: Overlay) {
        if self.overlay == Some(overlay) {
            return;
        }
        self.underlay = None;
        if let Some(current) = self.overlay.take() {
            self.renderer.hide_overlay(current);
            if current == Overlay::Score && overlay == Overlay::Solutions {
                self.underlay = Some(Overlay::Score);
            }
        }
        self.overlay = Some(overlay);
        self.renderer.show_overlay(overlay);
    }

    /// Closes the visible overlay, bringing back whatever it replaced.
    pub fn close_overlay(&mut self) -> Option<Overlay> {
        let closed = self.overlay.take()?;
        self.renderer.hide_overlay(closed);
        if let Some(underlay) = self.underlay.take() {
            self.overlay = Some(underlay);
            self.renderer.show_overlay(underlay);
        }
        Some(closed)
    }

    /// Closes `overlay` only if it is the one on top.
    pub fn dismiss(&mut self, overlay: Overlay) -> bool {
        if self.overlay != Some(overlay) {
            return false;
        }
        self.close_overlay();
        true
    }

    pub fn clear_overlays(&mut self) {
        self.underlay = None;
        if let Some(current) = self.overlay.take() {
            self.renderer.hide_overlay(current);
        }
    }

    pub fn set_terminal(&mut self, panel: TerminalPanel) {
        self.renderer.render_terminal(&panel);
        self.terminal = panel;
    }

    pub fn route_key(&self, key: &KeyPress) -> Option<Intent> {
        if let Some(overlay) = self.overlay {
            if overlay.is_confirmation() && key.key == "Escape" {
                return Some(Intent::CancelOverlay);
            }
            return None;
        }
        if self.screen != Screen::ExamInterface {
            return None;
        }
        match key.key.as_str() {
            "ArrowLeft" => Some(Intent::PreviousQuestion),
            "ArrowRight" => Some(Intent::NextQuestion),
            "f" | "F" if !key.ctrl && !key.meta => Some(Intent::ToggleFlag),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "tests/view_tests.rs"]
mod tests;
