//! Line commands typed at the console, mapped onto controller intents.

use anyhow::{anyhow, bail, Result};
use client_core::{Intent, KeyPress, Overlay, SessionSnapshot};
use shared::domain::{format_clock, ExamId};

pub const HELP: &str = "\
commands:
  exams                 reload the exam list
  start <id>            start (or resume) an exam
  next | n, prev | p    move between questions
  go <n>                jump to question n
  flag | f              flag or unflag the current question
  pause                 pause or resume the timer
  flagged, jump <n>     list flagged questions, jump to flagged question n
  stop                  stop the exam and score it
  yes | no              answer the open dialog
  solutions, sol <n>    open solutions, show solution n
  snext, sprev, back    step through solutions, back to the score
  close                 close the score panel
  leave                 leave the exam without stopping the timer
  cleanup, terminate    clean up the environment, then return or end
  key <name> [ctrl] [meta]
                        send a keyboard shortcut
  theme, split <ratio>  toggle theme, set the panel split
  status, help, quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Intent(Intent),
    /// `yes`: meaning depends on the dialog currently open.
    Confirm,
    ListExams,
    ToggleTheme,
    SetSplit(f64),
    Status,
    Help,
    Quit,
}

/// Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match head.to_ascii_lowercase().as_str() {
        "exams" | "list" => Command::ListExams,
        "start" | "select" => {
            let id = args.first().ok_or_else(|| anyhow!("usage: start <exam id>"))?;
            Command::Intent(Intent::SelectExam(ExamId::from(*id)))
        }
        "next" | "n" => Command::Intent(Intent::NextQuestion),
        "prev" | "previous" | "p" => Command::Intent(Intent::PreviousQuestion),
        "go" | "goto" => Command::Intent(Intent::Navigate(ordinal(&args, "go <n>")?)),
        "flag" | "f" => Command::Intent(Intent::ToggleFlag),
        "pause" | "resume" => Command::Intent(Intent::TogglePause),
        "stop" => Command::Intent(Intent::RequestStop),
        "yes" | "y" | "confirm" | "ok" => Command::Confirm,
        "no" | "cancel" | "esc" => Command::Intent(Intent::CancelOverlay),
        "flagged" => Command::Intent(Intent::ShowFlagged),
        "jump" => Command::Intent(Intent::JumpToFlagged(ordinal(&args, "jump <n>")?)),
        "solutions" => Command::Intent(Intent::ViewSolutions),
        "sol" | "solution" => Command::Intent(Intent::ShowSolution(ordinal(&args, "sol <n>")?)),
        "snext" => Command::Intent(Intent::NextSolution),
        "sprev" => Command::Intent(Intent::PreviousSolution),
        "back" => Command::Intent(Intent::BackToScore),
        "close" => Command::Intent(Intent::CloseScore),
        "leave" => Command::Intent(Intent::RequestLeave),
        "home" => Command::Intent(Intent::ReturnToSelection),
        "cleanup" => Command::Intent(Intent::CleanupAndReturn),
        "terminate" => Command::Intent(Intent::CleanupAndTerminate),
        "key" => Command::Intent(Intent::Key(parse_key(&args)?)),
        "theme" => Command::ToggleTheme,
        "split" => {
            let raw = args.first().ok_or_else(|| anyhow!("usage: split <ratio>"))?;
            let ratio = raw
                .parse::<f64>()
                .map_err(|_| anyhow!("split ratio must be a number, got `{raw}`"))?;
            Command::SetSplit(ratio)
        }
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => bail!("unknown command `{other}` (try `help`)"),
    };
    Ok(Some(command))
}

/// One-based on the console, zero-based in the controller.
fn ordinal(args: &[&str], usage: &str) -> Result<usize> {
    let raw = args.first().ok_or_else(|| anyhow!("usage: {usage}"))?;
    match raw.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n - 1),
        _ => bail!("expected a number from 1, got `{raw}`"),
    }
}

fn parse_key(args: &[&str]) -> Result<KeyPress> {
    let (name, modifiers) = args
        .split_first()
        .ok_or_else(|| anyhow!("usage: key <name> [ctrl] [meta]"))?;
    let mut key = KeyPress::plain(*name);
    for modifier in modifiers {
        match modifier.to_ascii_lowercase().as_str() {
            "ctrl" | "control" => key = key.with_ctrl(),
            "meta" | "cmd" => key = key.with_meta(),
            other => bail!("unknown modifier `{other}`"),
        }
    }
    Ok(key)
}

/// `yes` answers whichever dialog is open.
pub fn resolve_confirm(overlay: Option<Overlay>) -> Option<Intent> {
    match overlay? {
        Overlay::StopConfirmation => Some(Intent::ConfirmStop),
        Overlay::LeaveConfirmation => Some(Intent::ConfirmLeave),
        Overlay::TimesUp => Some(Intent::AcknowledgeTimesUp),
        Overlay::FlaggedQuestions | Overlay::Score | Overlay::Solutions => None,
    }
}

pub fn status_lines(snapshot: &SessionSnapshot) -> Vec<String> {
    let session = &snapshot.session;
    let mut lines = vec![format!(
        "lifecycle: {:?}, screen: {:?}, overlay: {}",
        session.lifecycle,
        snapshot.screen,
        snapshot
            .overlay
            .map(|overlay| format!("{overlay:?}"))
            .unwrap_or_else(|| "none".to_string())
    )];
    if let Some(exam_id) = &session.exam_id {
        let position = if session.questions.is_empty() {
            "no questions".to_string()
        } else {
            format!(
                "question {} of {}",
                session.current_index + 1,
                session.questions.len()
            )
        };
        lines.push(format!(
            "exam: {exam_id}, {position}, {} flagged",
            session.flagged.len()
        ));
        lines.push(format!(
            "time left: {}{}",
            format_clock(session.time_remaining_seconds),
            if session.paused { " (paused)" } else { "" }
        ));
    }
    lines
}

#[cfg(test)]
#[path = "tests/commands_tests.rs"]
mod tests;
