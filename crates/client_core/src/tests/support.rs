use std::sync::Mutex as StdMutex;

use shared::{domain::Theme, protocol::ExamSummary};

use crate::{
    terminal::TerminalPanel,
    view::{
        ExamHeader, FlaggedEntry, Notice, Overlay, QuestionView, Renderer, Screen, ScoreDisplay,
        SolutionDisplay, TimerDisplay,
    },
};

#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    Screen(Screen),
    ShowOverlay(Overlay),
    HideOverlay(Overlay),
    ExamList(usize),
    Header(ExamHeader),
    Question(QuestionView),
    Timer(TimerDisplay),
    FlaggedList(Vec<FlaggedEntry>),
    Score(ScoreDisplay),
    Solution(SolutionDisplay),
    Terminal(TerminalPanel),
    Notice(Notice),
    Theme(Theme),
    SplitRatio(f64),
}

#[derive(Default)]
pub struct RecordingRenderer {
    calls: StdMutex<Vec<Rendered>>,
}

impl RecordingRenderer {
    pub fn calls(&self) -> Vec<Rendered> {
        self.calls.lock().expect("renderer lock").clone()
    }

    pub fn clear(&self) {
        self.calls.lock().expect("renderer lock").clear();
    }

    pub fn last_score(&self) -> Option<ScoreDisplay> {
        self.calls().into_iter().rev().find_map(|call| match call {
            Rendered::Score(score) => Some(score),
            _ => None,
        })
    }

    pub fn last_question(&self) -> Option<QuestionView> {
        self.calls().into_iter().rev().find_map(|call| match call {
            Rendered::Question(view) => Some(view),
            _ => None,
        })
    }

    pub fn last_solution(&self) -> Option<SolutionDisplay> {
        self.calls().into_iter().rev().find_map(|call| match call {
            Rendered::Solution(solution) => Some(solution),
            _ => None,
        })
    }

    pub fn last_timer(&self) -> Option<TimerDisplay> {
        self.calls().into_iter().rev().find_map(|call| match call {
            Rendered::Timer(timer) => Some(timer),
            _ => None,
        })
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Rendered::Notice(notice) => Some(notice),
                _ => None,
            })
            .collect()
    }

    fn push(&self, call: Rendered) {
        self.calls.lock().expect("renderer lock").push(call);
    }
}

impl Renderer for RecordingRenderer {
    fn show_screen(&self, screen: Screen) {
        self.push(Rendered::Screen(screen));
    }

    fn show_overlay(&self, overlay: Overlay) {
        self.push(Rendered::ShowOverlay(overlay));
    }

    fn hide_overlay(&self, overlay: Overlay) {
        self.push(Rendered::HideOverlay(overlay));
    }

    fn render_exam_list(&self, exams: &[ExamSummary]) {
        self.push(Rendered::ExamList(exams.len()));
    }

    fn render_exam_header(&self, header: &ExamHeader) {
        self.push(Rendered::Header(header.clone()));
    }

    fn render_question(&self, view: &QuestionView) {
        self.push(Rendered::Question(view.clone()));
    }

    fn render_timer(&self, timer: &TimerDisplay) {
        self.push(Rendered::Timer(timer.clone()));
    }

    fn render_flagged_list(&self, entries: &[FlaggedEntry]) {
        self.push(Rendered::FlaggedList(entries.to_vec()));
    }

    fn render_score(&self, score: &ScoreDisplay) {
        self.push(Rendered::Score(score.clone()));
    }

    fn render_solution(&self, solution: &SolutionDisplay) {
        self.push(Rendered::Solution(solution.clone()));
    }

    fn render_terminal(&self, panel: &TerminalPanel) {
        self.push(Rendered::Terminal(panel.clone()));
    }

    fn notify(&self, notice: &Notice) {
        self.push(Rendered::Notice(notice.clone()));
    }

    fn apply_theme(&self, theme: Theme) {
        self.push(Rendered::Theme(theme));
    }

    fn apply_split_ratio(&self, ratio: f64) {
        self.push(Rendered::SplitRatio(ratio));
    }
}
