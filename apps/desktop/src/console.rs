//! Plain-text `Renderer` for the terminal front end.

use std::sync::Mutex;

use client_core::{
    ExamHeader, FlaggedEntry, Notice, NoticeLevel, Overlay, QuestionView, Renderer, Screen,
    ScoreDisplay, SolutionDisplay, TerminalPanel, TimerDisplay,
};
use shared::{
    domain::{Theme, TimerSeverity},
    protocol::ExamSummary,
};

pub struct ConsoleRenderer {
    /// Last whole minute printed; the clock only prints when it changes.
    last_minute: Mutex<Option<u64>>,
}

impl ConsoleRenderer {
    pub fn new() -> Self {
        Self {
            last_minute: Mutex::new(None),
        }
    }
}

impl Default for ConsoleRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn overlay_title(overlay: Overlay) -> &'static str {
    match overlay {
        Overlay::TimesUp => "Time's up! Type `yes` to see your score.",
        Overlay::FlaggedQuestions => "Flagged questions (`jump <n>` or `no`)",
        Overlay::StopConfirmation => "Stop the exam and calculate the score? (`yes` / `no`)",
        Overlay::LeaveConfirmation => "Leave the exam? Progress stays on the server. (`yes` / `no`)",
        Overlay::Score => "Score (`solutions`, `close`, `cleanup`, `terminate`)",
        Overlay::Solutions => "Solutions (`snext`, `sprev`, `sol <n>`, `back`)",
    }
}

pub fn render_score_lines(score: &ScoreDisplay) -> Vec<String> {
    let mut lines = vec![
        format!("== {} ==", score.title),
        format!("Status: {}", score.status),
        format!("Score: {}%  ({})", score.percentage, score.points),
        format!("Elapsed: {}", score.elapsed),
    ];
    for row in &score.rows {
        let mark = if row.passed { "pass" } else { "fail" };
        lines.push(format!("  {:<5} {:<30} {:>9}  {mark}", row.label, row.topic, row.points));
    }
    if let Some(detail) = &score.detail {
        lines.push(detail.clone());
    }
    if let Some(error) = &score.inline_error {
        lines.push(format!("! {error}"));
    }
    lines
}

impl Renderer for ConsoleRenderer {
    fn show_screen(&self, screen: Screen) {
        match screen {
            Screen::ExamSelection => println!("\n== Select an exam (`start <id>`) =="),
            Screen::ExamInterface => println!("\n== Exam in progress (`help` for commands) =="),
            Screen::SessionEnded => {
                println!("\nSession ended. The exam environment was cleaned up; you can close this window.")
            }
        }
    }

    fn show_overlay(&self, overlay: Overlay) {
        println!("\n-- {} --", overlay_title(overlay));
    }

    fn hide_overlay(&self, _overlay: Overlay) {}

    fn render_exam_list(&self, exams: &[ExamSummary]) {
        if exams.is_empty() {
            println!("No exams available.");
        }
        for exam in exams {
            println!(
                "  {:<12} {} ({} questions, {} points, {} min)",
                exam.id.as_str(), exam.name, exam.questions, exam.points, exam.duration
            );
        }
    }

    fn render_exam_header(&self, header: &ExamHeader) {
        println!(
            "{}: {} questions, {} points, {} minutes",
            header.exam_name, header.question_count, header.total_points, header.duration_minutes
        );
    }

    fn render_question(&self, view: &QuestionView) {
        let flag = if view.flagged { " [flagged]" } else { "" };
        println!(
            "\n{} | {} ({} pts){flag}",
            view.position_label(),
            view.question.topic,
            view.question.points
        );
        if !view.question.namespace.is_empty() {
            println!("Namespace: {}", view.question.namespace);
        }
        println!("{}", view.question.content);
    }

    fn render_timer(&self, timer: &TimerDisplay) {
        let minute = timer.remaining_seconds / 60;
        let Ok(mut last) = self.last_minute.lock() else {
            return;
        };
        if *last == Some(minute) && !timer.paused {
            return;
        }
        *last = Some(minute);
        let marker = match timer.severity {
            TimerSeverity::Normal => "",
            TimerSeverity::Warning => " (!)",
            TimerSeverity::Danger => " (!!)",
        };
        let paused = if timer.paused { " [paused]" } else { "" };
        println!("[time left {}{marker}{paused}]", timer.text);
    }

    fn render_flagged_list(&self, entries: &[FlaggedEntry]) {
        if entries.is_empty() {
            println!("  No flagged questions.");
        }
        for entry in entries {
            println!("  {}. Q{} {}", entry.index + 1, entry.question_id, entry.topic);
        }
    }

    fn render_score(&self, score: &ScoreDisplay) {
        for line in render_score_lines(score) {
            println!("{line}");
        }
    }

    fn render_solution(&self, solution: &SolutionDisplay) {
        println!(
            "\n[{}/{}] {} {}",
            solution.index + 1,
            solution.total,
            solution.title(),
            solution.status_label()
        );
        println!("{}", solution.solution.content);
    }

    fn render_terminal(&self, panel: &TerminalPanel) {
        if let TerminalPanel::Visible { url } = panel {
            println!("Terminal: {url}");
        }
    }

    fn notify(&self, notice: &Notice) {
        match notice.level {
            NoticeLevel::Info => println!("{}", notice.message),
            NoticeLevel::Error => eprintln!("error: {}", notice.message),
        }
    }

    fn apply_theme(&self, theme: Theme) {
        println!("Theme: {}", theme.as_str());
    }

    fn apply_split_ratio(&self, ratio: f64) {
        println!("Split ratio: {ratio:.2}");
    }
}
