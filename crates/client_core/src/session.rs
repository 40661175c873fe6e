//! Client-side exam session state machine.
//!
//! `SessionController` owns the one `Session`, the view bookkeeping and the
//! timer synchronizer behind a single async mutex. The lock is never held
//! across a network call: every remote operation snapshots what it needs,
//! releases the lock, awaits the server and then re-checks the session
//! epoch before applying anything.

use std::{
    collections::HashSet,
    sync::{Arc, Weak},
    time::Duration,
};

use anyhow::{anyhow, Result};
use shared::{
    domain::{ExamId, Lifecycle, QuestionId},
    protocol::{ExamConfig, ExamSummary, Question, Solution, TimerState},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{
    api::ExamApi,
    error::{SessionError, SessionResult},
    intent::Intent,
    terminal::{resolve_terminal_panel, LaunchOptions, TerminalPanel},
    timer::{TimerSynchronizer, DEFAULT_POLL_INTERVAL, MIN_POLL_INTERVAL},
    view::{
        ExamHeader, FlaggedEntry, KeyPress, Notice, Overlay, QuestionView, Renderer, Screen,
        ScoreDisplay, ScoreResult, SolutionDisplay, TimerDisplay, ViewCoordinator,
        EXAM_LIST_FAILED_NOTICE, SCORE_UNREACHABLE_STATUS, SOLUTIONS_FAILED_NOTICE,
        SOLUTIONS_UNAVAILABLE_NOTICE, START_FAILED_NOTICE,
    },
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub exam_id: Option<ExamId>,
    pub questions: Vec<Question>,
    pub current_index: usize,
    pub flagged: HashSet<QuestionId>,
    pub lifecycle: Lifecycle,
    /// Display cache; the server owns the clock.
    pub time_remaining_seconds: u64,
    pub paused: bool,
    pub epoch: u64,
}

impl Session {
    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current_index)
    }

    pub fn is_flagged(&self, question_id: &QuestionId) -> bool {
        self.flagged.contains(question_id)
    }

    /// Flagged questions in question order.
    pub fn flagged_entries(&self) -> Vec<FlaggedEntry> {
        self.questions
            .iter()
            .enumerate()
            .filter(|(_, question)| self.flagged.contains(&question.id))
            .map(|(index, question)| FlaggedEntry {
                index,
                question_id: question.id.clone(),
                topic: question.topic.clone(),
            })
            .collect()
    }

    fn reset(epoch: u64) -> Self {
        Self {
            epoch,
            ..Self::default()
        }
    }
}

/// Converts the server's 1-based `start_question` into an index, clamping
/// out-of-range values into the question list.
pub fn resume_index(start_question: i64, question_count: usize) -> usize {
    if question_count == 0 {
        return 0;
    }
    let last = i64::try_from(question_count).unwrap_or(i64::MAX);
    (start_question.clamp(1, last) - 1) as usize
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    LifecycleChanged { from: Lifecycle, to: Lifecycle },
    QuestionChanged { index: usize, question_id: QuestionId },
    FlagChanged { question_id: QuestionId, flagged: bool },
    TimerUpdated { remaining_seconds: u64, paused: bool },
    TimesUp,
    ScoreReady { percentage: f64, passed: bool },
    ScoreFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The session is not in a timed lifecycle, or the tick was for another exam.
    Ignored,
    Updated,
    PauseChanged,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PendingAction {
    Start,
    Flag,
    Pause,
    Score,
    Solutions,
    Solution,
    Cleanup,
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub poll_interval: Duration,
    pub launch: LaunchOptions,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            launch: LaunchOptions::default(),
        }
    }
}

/// Read-only copy of controller state for front ends and tests.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session: Session,
    pub screen: Screen,
    pub overlay: Option<Overlay>,
    pub score: Option<ScoreResult>,
    pub score_display: Option<ScoreDisplay>,
    pub solutions: Vec<Solution>,
    pub solution_index: usize,
    pub exams: Vec<ExamSummary>,
    pub exam_config: Option<ExamConfig>,
    pub terminal: TerminalPanel,
    pub timer_running: bool,
}

struct ControllerState {
    session: Session,
    view: ViewCoordinator,
    timer: TimerSynchronizer,
    score: Option<ScoreResult>,
    score_display: Option<ScoreDisplay>,
    solutions: Vec<Solution>,
    solution_index: usize,
    exams: Vec<ExamSummary>,
    exam_config: Option<ExamConfig>,
    inflight: HashSet<(PendingAction, u64)>,
}

impl ControllerState {
    fn begin(&mut self, action: PendingAction) -> Option<u64> {
        let epoch = self.session.epoch;
        self.inflight.insert((action, epoch)).then_some(epoch)
    }

    fn finish(&mut self, action: PendingAction, epoch: u64) {
        self.inflight.remove(&(action, epoch));
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.session.epoch == epoch
    }

    fn lifecycle(&self) -> Lifecycle {
        self.session.lifecycle
    }
}

struct LoadedExam {
    exam_id: ExamId,
    config: ExamConfig,
    questions: Vec<Question>,
    flagged: HashSet<QuestionId>,
    start_question: i64,
    terminal: TerminalPanel,
}

pub struct SessionController {
    api: Arc<dyn ExamApi>,
    inner: Mutex<ControllerState>,
    events: broadcast::Sender<SessionEvent>,
    poll_interval: Duration,
    launch: LaunchOptions,
}

impl SessionController {
    pub fn new(api: Arc<dyn ExamApi>, renderer: Arc<dyn Renderer>) -> Arc<Self> {
        Self::with_options(api, renderer, ControllerOptions::default())
    }

    pub fn with_options(
        api: Arc<dyn ExamApi>,
        renderer: Arc<dyn Renderer>,
        options: ControllerOptions,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        Arc::new(Self {
            api,
            inner: Mutex::new(ControllerState {
                session: Session::default(),
                view: ViewCoordinator::new(renderer),
                timer: TimerSynchronizer::new(),
                score: None,
                score_display: None,
                solutions: Vec::new(),
                solution_index: 0,
                exams: Vec::new(),
                exam_config: None,
                inflight: HashSet::new(),
            }),
            events,
            poll_interval: options.poll_interval.max(MIN_POLL_INTERVAL),
            launch: options.launch,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.inner.lock().await;
        SessionSnapshot {
            session: state.session.clone(),
            screen: state.view.screen(),
            overlay: state.view.overlay(),
            score: state.score.clone(),
            score_display: state.score_display.clone(),
            solutions: state.solutions.clone(),
            solution_index: state.solution_index,
            exams: state.exams.clone(),
            exam_config: state.exam_config.clone(),
            terminal: state.view.terminal().clone(),
            timer_running: state.timer.is_running(),
        }
    }

    pub async fn route_key(&self, key: &KeyPress) -> Option<Intent> {
        self.inner.lock().await.view.route_key(key)
    }

    /// Page-load entry point: resumes a running remote exam, otherwise
    /// (or when the resume fails) shows the exam list.
    pub async fn bootstrap(self: &Arc<Self>) -> SessionResult<()> {
        match self.api.timer().await {
            Ok(TimerState {
                running: true,
                exam_id: Some(exam_id),
                start_question,
                ..
            }) => {
                info!(%exam_id, start_question, "session: resuming running exam");
                match self.resume(exam_id, start_question).await {
                    Ok(()) => return Ok(()),
                    Err(err) => warn!(error = %err, "session: resume failed, falling back to exam list"),
                }
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "session: timer unavailable at startup"),
        }
        self.inner
            .lock()
            .await
            .view
            .show_screen(Screen::ExamSelection);
        self.load_exam_list().await.map(|_| ())
    }

    pub async fn load_exam_list(&self) -> SessionResult<Vec<ExamSummary>> {
        match self.api.list_exams().await {
            Ok(exams) => {
                let mut state = self.inner.lock().await;
                state.view.renderer().render_exam_list(&exams);
                state.exams = exams.clone();
                debug!(count = exams.len(), "session: exam list loaded");
                Ok(exams)
            }
            Err(source) => {
                let state = self.inner.lock().await;
                state
                    .view
                    .renderer()
                    .notify(&Notice::error(EXAM_LIST_FAILED_NOTICE));
                Err(SessionError::ExamList { source })
            }
        }
    }

    pub async fn start(self: &Arc<Self>, exam_id: ExamId) -> SessionResult<()> {
        self.enter(exam_id, None).await
    }

    /// Re-enters an exam whose remote timer is already running.
    pub async fn resume(self: &Arc<Self>, exam_id: ExamId, start_question: i64) -> SessionResult<()> {
        self.enter(exam_id, Some(start_question)).await
    }

    async fn enter(self: &Arc<Self>, exam_id: ExamId, resume_at: Option<i64>) -> SessionResult<()> {
        let action = if resume_at.is_some() { "resume" } else { "start" };
        let epoch = {
            let mut state = self.inner.lock().await;
            if state.lifecycle() != Lifecycle::NotStarted {
                return Err(SessionError::NotAllowed {
                    action,
                    lifecycle: state.lifecycle(),
                });
            }
            match state.begin(PendingAction::Start) {
                Some(epoch) => epoch,
                None => {
                    debug!(%exam_id, "session: start already in flight");
                    return Ok(());
                }
            }
        };

        let loaded = self.load_exam(exam_id.clone(), resume_at).await;

        let mut state = self.inner.lock().await;
        state.finish(PendingAction::Start, epoch);
        if !state.is_current(epoch) || state.lifecycle() != Lifecycle::NotStarted {
            debug!(%exam_id, "session: discarding stale exam load");
            return Ok(());
        }
        match loaded {
            Ok(loaded) => {
                self.enter_loaded(&mut state, loaded);
                Ok(())
            }
            Err(source) => {
                warn!(%exam_id, error = %source, "session: failed to {action} exam");
                state
                    .view
                    .renderer()
                    .notify(&Notice::error(START_FAILED_NOTICE));
                Err(SessionError::Load { exam_id, source })
            }
        }
    }

    async fn load_exam(&self, exam_id: ExamId, resume_at: Option<i64>) -> Result<LoadedExam> {
        let (config, questions) = futures::future::try_join(
            self.api.exam_config(&exam_id),
            self.api.questions(&exam_id),
        )
        .await?;
        if questions.is_empty() {
            return Err(anyhow!("exam {exam_id} has no questions"));
        }

        let flagged = match resume_at {
            None => {
                self.api.start_timer(&exam_id).await?;
                HashSet::new()
            }
            Some(_) => match self.api.flags().await {
                Ok(flags) => flags.into_iter().collect(),
                Err(err) => {
                    warn!(%exam_id, error = %err, "session: could not restore flags");
                    HashSet::new()
                }
            },
        };

        let terminal = resolve_terminal_panel(self.api.as_ref(), &self.launch).await;
        Ok(LoadedExam {
            exam_id,
            config,
            questions,
            flagged,
            start_question: resume_at.unwrap_or(1),
            terminal,
        })
    }

    fn enter_loaded(self: &Arc<Self>, state: &mut ControllerState, loaded: LoadedExam) {
        let current_index = resume_index(loaded.start_question, loaded.questions.len());
        let header = ExamHeader::new(&loaded.config, loaded.questions.len());
        state.session = Session {
            exam_id: Some(loaded.exam_id.clone()),
            questions: loaded.questions,
            current_index,
            flagged: loaded.flagged,
            lifecycle: Lifecycle::NotStarted,
            time_remaining_seconds: u64::from(loaded.config.duration) * 60,
            paused: false,
            epoch: state.session.epoch.wrapping_add(1),
        };
        state.score = None;
        state.score_display = None;
        state.solutions.clear();
        state.solution_index = 0;
        state.exam_config = Some(loaded.config);

        self.transition(state, Lifecycle::Active);
        state.view.show_screen(Screen::ExamInterface);
        state.view.renderer().render_exam_header(&header);
        state.view.set_terminal(loaded.terminal);
        state.view.renderer().render_timer(&TimerDisplay::new(
            state.session.time_remaining_seconds,
            false,
        ));
        self.render_current_question(state);
        self.start_polling(state);
        info!(
            exam_id = %loaded.exam_id,
            questions = state.session.questions.len(),
            current_index,
            epoch = state.session.epoch,
            "session: exam active"
        );
    }

    fn start_polling(self: &Arc<Self>, state: &mut ControllerState) {
        let controller: Weak<Self> = Arc::downgrade(self);
        state.timer.start(self.poll_interval, move |generation| {
            let controller = controller.clone();
            async move {
                match controller.upgrade() {
                    Some(controller) => controller.poll_timer(generation).await,
                    None => false,
                }
            }
        });
    }

    /// One synchronizer tick. Returns `false` once polling should stop.
    pub async fn poll_timer(&self, generation: u64) -> bool {
        if !self.inner.lock().await.timer.accepts(generation) {
            return false;
        }
        let fetched = self.api.timer().await;
        let mut state = self.inner.lock().await;
        if !state.timer.accepts(generation) {
            debug!(generation, "timer: discarding tick from cancelled loop");
            return false;
        }
        match fetched {
            Ok(timer) => self.reconcile(&mut state, &timer) != TickOutcome::Expired,
            Err(source) => {
                let err = SessionError::TimerPoll { source };
                warn!(generation, error = %err, "timer: poll failed, retrying next tick");
                true
            }
        }
    }

    /// Applies a server timer snapshot as a tick would.
    pub async fn apply_timer_state(&self, timer: &TimerState) -> TickOutcome {
        let mut state = self.inner.lock().await;
        self.reconcile(&mut state, timer)
    }

    fn reconcile(&self, state: &mut ControllerState, timer: &TimerState) -> TickOutcome {
        if !state.lifecycle().is_timed() {
            return TickOutcome::Ignored;
        }
        if let (Some(ours), Some(theirs)) = (&state.session.exam_id, &timer.exam_id) {
            if ours != theirs {
                debug!(ours = %ours, theirs = %theirs, "timer: state belongs to another exam");
                return TickOutcome::Ignored;
            }
        }

        state.session.time_remaining_seconds = timer.remaining_seconds;
        let mut outcome = TickOutcome::Updated;
        if timer.paused != state.session.paused {
            state.session.paused = timer.paused;
            let next = if timer.paused {
                Lifecycle::Paused
            } else {
                Lifecycle::Active
            };
            self.transition(state, next);
            outcome = TickOutcome::PauseChanged;
        }
        state.view.renderer().render_timer(&TimerDisplay::new(
            timer.remaining_seconds,
            state.session.paused,
        ));
        let _ = self.events.send(SessionEvent::TimerUpdated {
            remaining_seconds: timer.remaining_seconds,
            paused: state.session.paused,
        });

        if !timer.running && state.lifecycle() == Lifecycle::Active && !state.session.paused {
            state.timer.cancel();
            self.transition(state, Lifecycle::Ended);
            state.view.open_overlay(Overlay::TimesUp);
            let _ = self.events.send(SessionEvent::TimesUp);
            info!(epoch = state.session.epoch, "session: time is up");
            return TickOutcome::Expired;
        }
        outcome
    }

    /// Silently ignored outside Active or out of bounds.
    pub async fn navigate(&self, index: usize) -> bool {
        let mut state = self.inner.lock().await;
        if state.lifecycle() != Lifecycle::Active || index >= state.session.questions.len() {
            return false;
        }
        state.session.current_index = index;
        self.render_current_question(&state);
        if let Some(question) = state.session.current_question() {
            let _ = self.events.send(SessionEvent::QuestionChanged {
                index,
                question_id: question.id.clone(),
            });
        }
        true
    }

    pub async fn next(&self) -> bool {
        let index = self.inner.lock().await.session.current_index;
        self.navigate(index.saturating_add(1)).await
    }

    pub async fn previous(&self) -> bool {
        let index = self.inner.lock().await.session.current_index;
        match index.checked_sub(1) {
            Some(index) => self.navigate(index).await,
            None => false,
        }
    }

    /// Applies the server's answer; nothing flips locally before it arrives.
    pub async fn toggle_flag(&self) -> SessionResult<()> {
        let (epoch, question_id) = {
            let mut state = self.inner.lock().await;
            if state.lifecycle() != Lifecycle::Active {
                return Err(SessionError::NotAllowed {
                    action: "toggle flag",
                    lifecycle: state.lifecycle(),
                });
            }
            let Some(question_id) = state.session.current_question().map(|q| q.id.clone()) else {
                return Ok(());
            };
            match state.begin(PendingAction::Flag) {
                Some(epoch) => (epoch, question_id),
                None => {
                    debug!(%question_id, "session: flag toggle already in flight");
                    return Ok(());
                }
            }
        };

        let result = self.api.toggle_flag(&question_id).await;

        let mut state = self.inner.lock().await;
        state.finish(PendingAction::Flag, epoch);
        if !state.is_current(epoch) {
            debug!(%question_id, "session: discarding stale flag toggle");
            return Ok(());
        }
        match result {
            Ok(flagged) => {
                if flagged {
                    state.session.flagged.insert(question_id.clone());
                } else {
                    state.session.flagged.remove(&question_id);
                }
                let showing = state
                    .session
                    .current_question()
                    .is_some_and(|question| question.id == question_id);
                if showing {
                    self.render_current_question(&state);
                }
                if state.view.overlay() == Some(Overlay::FlaggedQuestions) {
                    let entries = state.session.flagged_entries();
                    state.view.renderer().render_flagged_list(&entries);
                }
                let _ = self.events.send(SessionEvent::FlagChanged {
                    question_id,
                    flagged,
                });
                Ok(())
            }
            Err(source) => Err(SessionError::Action {
                action: "toggle flag",
                source,
            }),
        }
    }

    pub async fn toggle_pause(&self) -> SessionResult<()> {
        let epoch = {
            let mut state = self.inner.lock().await;
            if !state.lifecycle().is_timed() {
                return Err(SessionError::NotAllowed {
                    action: "toggle pause",
                    lifecycle: state.lifecycle(),
                });
            }
            match state.begin(PendingAction::Pause) {
                Some(epoch) => epoch,
                None => {
                    debug!("session: pause toggle already in flight");
                    return Ok(());
                }
            }
        };

        let result = self.api.toggle_pause().await;

        let mut state = self.inner.lock().await;
        state.finish(PendingAction::Pause, epoch);
        if !state.is_current(epoch) {
            debug!("session: discarding stale pause toggle");
            return Ok(());
        }
        match result {
            Ok(timer) => {
                self.reconcile(&mut state, &timer);
                Ok(())
            }
            Err(source) => Err(SessionError::Action {
                action: "toggle pause",
                source,
            }),
        }
    }

    pub async fn request_stop(&self) -> SessionResult<()> {
        let mut state = self.inner.lock().await;
        if state.lifecycle() != Lifecycle::Active {
            return Err(SessionError::NotAllowed {
                action: "stop",
                lifecycle: state.lifecycle(),
            });
        }
        state.view.open_overlay(Overlay::StopConfirmation);
        Ok(())
    }

    pub async fn confirm_stop(&self) -> SessionResult<()> {
        let confirmed = self
            .inner
            .lock()
            .await
            .view
            .dismiss(Overlay::StopConfirmation);
        if !confirmed {
            return Ok(());
        }
        self.execute_stop().await
    }

    /// Closes a dismissable overlay (confirmations and the flagged list).
    pub async fn cancel_overlay(&self) {
        let mut state = self.inner.lock().await;
        if matches!(
            state.view.overlay(),
            Some(Overlay::StopConfirmation | Overlay::LeaveConfirmation | Overlay::FlaggedQuestions)
        ) {
            state.view.close_overlay();
        }
    }

    /// Ends the exam and requests a score. Calling it again while scoring
    /// is in progress or done is a no-op.
    pub async fn execute_stop(&self) -> SessionResult<()> {
        let epoch = {
            let mut state = self.inner.lock().await;
            match state.lifecycle() {
                Lifecycle::Active | Lifecycle::Paused | Lifecycle::Ended => {}
                Lifecycle::Scoring | Lifecycle::ReviewingSolutions => return Ok(()),
                lifecycle @ Lifecycle::NotStarted => {
                    return Err(SessionError::NotAllowed {
                        action: "stop",
                        lifecycle,
                    })
                }
            }
            state.timer.cancel();
            self.transition(&mut state, Lifecycle::Scoring);
            state.score = None;
            self.show_score(&mut state, ScoreDisplay::pending());
            match state.begin(PendingAction::Score) {
                Some(epoch) => epoch,
                None => return Ok(()),
            }
        };

        let result = self.api.compute_score().await;

        let mut state = self.inner.lock().await;
        state.finish(PendingAction::Score, epoch);
        if !state.is_current(epoch) {
            debug!(epoch, "session: discarding score for a previous session");
            return Ok(());
        }
        match result {
            Ok(response) if response.success => {
                let result = ScoreResult::from(response);
                info!(
                    percentage = result.percentage,
                    passed = result.passed,
                    "session: score ready"
                );
                let _ = self.events.send(SessionEvent::ScoreReady {
                    percentage: result.percentage,
                    passed: result.passed,
                });
                self.show_score(&mut state, ScoreDisplay::from_result(&result));
                state.score = Some(result);
                Ok(())
            }
            Ok(response) => {
                let display = ScoreDisplay::refused(response.error.as_deref());
                let message = display.status.clone();
                self.show_score(&mut state, display);
                let _ = self.events.send(SessionEvent::ScoreFailed(message.clone()));
                Err(SessionError::Scoring { message })
            }
            Err(err) => {
                warn!(error = %err, "session: score request failed");
                self.show_score(&mut state, ScoreDisplay::unreachable());
                let message = SCORE_UNREACHABLE_STATUS.to_string();
                let _ = self.events.send(SessionEvent::ScoreFailed(message.clone()));
                Err(SessionError::Scoring { message })
            }
        }
    }

    pub async fn acknowledge_times_up(&self) -> SessionResult<()> {
        {
            let mut state = self.inner.lock().await;
            if state.lifecycle() != Lifecycle::Ended {
                return Err(SessionError::NotAllowed {
                    action: "acknowledge times up",
                    lifecycle: state.lifecycle(),
                });
            }
            state.view.dismiss(Overlay::TimesUp);
        }
        self.execute_stop().await
    }

    pub async fn show_flagged_list(&self) -> SessionResult<()> {
        let mut state = self.inner.lock().await;
        if !state.lifecycle().is_timed() {
            return Err(SessionError::NotAllowed {
                action: "show flagged",
                lifecycle: state.lifecycle(),
            });
        }
        let entries = state.session.flagged_entries();
        state.view.renderer().render_flagged_list(&entries);
        state.view.open_overlay(Overlay::FlaggedQuestions);
        Ok(())
    }

    pub async fn jump_to_flagged(&self, index: usize) -> SessionResult<()> {
        self.inner
            .lock()
            .await
            .view
            .dismiss(Overlay::FlaggedQuestions);
        self.navigate(index).await;
        Ok(())
    }

    pub async fn request_leave(&self) -> SessionResult<()> {
        let lifecycle = {
            let mut state = self.inner.lock().await;
            let lifecycle = state.lifecycle();
            if lifecycle.is_timed() {
                state.view.open_overlay(Overlay::LeaveConfirmation);
                return Ok(());
            }
            lifecycle
        };
        match lifecycle {
            Lifecycle::NotStarted => Ok(()),
            _ => self.return_to_selection().await,
        }
    }

    pub async fn confirm_leave(&self) -> SessionResult<()> {
        let confirmed = self
            .inner
            .lock()
            .await
            .view
            .dismiss(Overlay::LeaveConfirmation);
        if !confirmed {
            return Ok(());
        }
        self.return_to_selection().await
    }

    /// Drops the session and shows the exam list again.
    pub async fn return_to_selection(&self) -> SessionResult<()> {
        {
            let mut state = self.inner.lock().await;
            self.reset_session(&mut state);
            state.view.show_screen(Screen::ExamSelection);
        }
        self.load_exam_list().await.map(|_| ())
    }

    pub async fn close_score(&self) -> SessionResult<()> {
        let lifecycle = self.inner.lock().await.lifecycle();
        if !lifecycle.is_post_exam() {
            return Err(SessionError::NotAllowed {
                action: "close score",
                lifecycle,
            });
        }
        self.return_to_selection().await
    }

    pub async fn request_solutions(&self) -> SessionResult<()> {
        let (epoch, exam_id) = {
            let mut state = self.inner.lock().await;
            if state.lifecycle() != Lifecycle::Scoring {
                return Err(SessionError::NotAllowed {
                    action: "view solutions",
                    lifecycle: state.lifecycle(),
                });
            }
            let available = state
                .score
                .as_ref()
                .is_some_and(|score| score.solutions_available);
            let Some(exam_id) = state.session.exam_id.clone().filter(|_| available) else {
                state
                    .view
                    .renderer()
                    .notify(&Notice::info(SOLUTIONS_UNAVAILABLE_NOTICE));
                return Ok(());
            };
            match state.begin(PendingAction::Solutions) {
                Some(epoch) => (epoch, exam_id),
                None => return Ok(()),
            }
        };

        let result = self.api.solutions(&exam_id).await;

        {
            let mut state = self.inner.lock().await;
            state.finish(PendingAction::Solutions, epoch);
            if !state.is_current(epoch) || state.lifecycle() != Lifecycle::Scoring {
                debug!(%exam_id, "session: discarding stale solutions");
                return Ok(());
            }
            match result {
                Ok(response) => {
                    let solutions = response.solutions.unwrap_or_default();
                    if !response.available || solutions.is_empty() {
                        state
                            .view
                            .renderer()
                            .notify(&Notice::info(SOLUTIONS_UNAVAILABLE_NOTICE));
                        return Ok(());
                    }
                    debug!(%exam_id, count = solutions.len(), "session: solutions loaded");
                    state.solutions = solutions;
                    state.solution_index = 0;
                    self.transition(&mut state, Lifecycle::ReviewingSolutions);
                    state.view.open_overlay(Overlay::Solutions);
                    Self::render_current_solution(&state);
                }
                Err(source) => {
                    state
                        .view
                        .renderer()
                        .notify(&Notice::error(SOLUTIONS_FAILED_NOTICE));
                    return Err(SessionError::Action {
                        action: "load solutions",
                        source,
                    });
                }
            }
        }
        self.fill_solution_content(0).await
    }

    pub async fn show_solution(&self, index: usize) -> SessionResult<()> {
        {
            let mut state = self.inner.lock().await;
            if state.lifecycle() != Lifecycle::ReviewingSolutions {
                return Err(SessionError::NotAllowed {
                    action: "show solution",
                    lifecycle: state.lifecycle(),
                });
            }
            if index >= state.solutions.len() {
                return Ok(());
            }
            state.solution_index = index;
            Self::render_current_solution(&state);
        }
        self.fill_solution_content(index).await
    }

    pub async fn next_solution(&self) -> SessionResult<()> {
        let index = self.inner.lock().await.solution_index;
        self.show_solution(index.saturating_add(1)).await
    }

    pub async fn previous_solution(&self) -> SessionResult<()> {
        let index = self.inner.lock().await.solution_index;
        match index.checked_sub(1) {
            Some(index) => self.show_solution(index).await,
            None => Ok(()),
        }
    }

    /// Solutions listed without content are fetched one by one on demand.
    async fn fill_solution_content(&self, index: usize) -> SessionResult<()> {
        let (epoch, exam_id, question_id) = {
            let mut state = self.inner.lock().await;
            let Some(solution) = state.solutions.get(index) else {
                return Ok(());
            };
            if !solution.content.is_empty() {
                return Ok(());
            }
            let question_id = solution.id.clone();
            let Some(exam_id) = state.session.exam_id.clone() else {
                return Ok(());
            };
            match state.begin(PendingAction::Solution) {
                Some(epoch) => (epoch, exam_id, question_id),
                None => return Ok(()),
            }
        };

        let result = self.api.solution(&exam_id, &question_id).await;

        let mut state = self.inner.lock().await;
        state.finish(PendingAction::Solution, epoch);
        if !state.is_current(epoch) {
            return Ok(());
        }
        match result {
            Ok(Some(fetched)) => {
                let Some(slot) = state.solutions.get_mut(index) else {
                    return Ok(());
                };
                if slot.id != fetched.id {
                    return Ok(());
                }
                *slot = fetched;
                if state.solution_index == index
                    && state.lifecycle() == Lifecycle::ReviewingSolutions
                {
                    Self::render_current_solution(&state);
                }
                Ok(())
            }
            Ok(None) => {
                debug!(%exam_id, %question_id, "session: no solution content on server");
                Ok(())
            }
            Err(source) => Err(SessionError::Action {
                action: "load solution",
                source,
            }),
        }
    }

    pub async fn back_to_score(&self) -> SessionResult<()> {
        let mut state = self.inner.lock().await;
        if state.lifecycle() != Lifecycle::ReviewingSolutions {
            return Err(SessionError::NotAllowed {
                action: "back to score",
                lifecycle: state.lifecycle(),
            });
        }
        self.transition(&mut state, Lifecycle::Scoring);
        state.view.dismiss(Overlay::Solutions);
        if state.view.overlay() != Some(Overlay::Score) {
            state.view.open_overlay(Overlay::Score);
        }
        if let Some(display) = &state.score_display {
            state.view.renderer().render_score(display);
        }
        Ok(())
    }

    pub async fn cleanup_and_return(&self) -> SessionResult<()> {
        self.run_cleanup(false).await
    }

    /// Cleans up, shuts the server down and leaves a static end screen.
    pub async fn cleanup_and_terminate(&self) -> SessionResult<()> {
        self.run_cleanup(true).await
    }

    async fn run_cleanup(&self, terminate: bool) -> SessionResult<()> {
        let epoch = {
            let mut state = self.inner.lock().await;
            if !state.lifecycle().is_post_exam() {
                return Err(SessionError::NotAllowed {
                    action: "cleanup",
                    lifecycle: state.lifecycle(),
                });
            }
            match state.begin(PendingAction::Cleanup) {
                Some(epoch) => epoch,
                None => return Ok(()),
            }
        };

        let result = async {
            self.api.cleanup().await?;
            if terminate {
                self.api.shutdown().await?;
            }
            anyhow::Ok(())
        }
        .await;

        let mut state = self.inner.lock().await;
        state.finish(PendingAction::Cleanup, epoch);
        if !state.is_current(epoch) {
            return Ok(());
        }
        match result {
            Ok(()) if terminate => {
                info!("session: cleaned up and shut down");
                self.reset_session(&mut state);
                state.view.show_screen(Screen::SessionEnded);
                Ok(())
            }
            Ok(()) => {
                info!("session: cleaned up");
                drop(state);
                self.return_to_selection().await
            }
            Err(source) => {
                if state.lifecycle() == Lifecycle::ReviewingSolutions {
                    self.transition(&mut state, Lifecycle::Scoring);
                }
                let display = state
                    .score_display
                    .clone()
                    .unwrap_or_else(ScoreDisplay::pending)
                    .with_inline_error(format!("Cleanup failed: {source}"));
                self.show_score(&mut state, display);
                Err(SessionError::Cleanup { source })
            }
        }
    }

    fn reset_session(&self, state: &mut ControllerState) {
        state.timer.cancel();
        let from = state.lifecycle();
        state.session = Session::reset(state.session.epoch.wrapping_add(1));
        state.score = None;
        state.score_display = None;
        state.solutions.clear();
        state.solution_index = 0;
        state.exam_config = None;
        state.inflight.clear();
        state.view.clear_overlays();
        if from != Lifecycle::NotStarted {
            let _ = self.events.send(SessionEvent::LifecycleChanged {
                from,
                to: Lifecycle::NotStarted,
            });
            info!(from = ?from, "session: reset");
        }
    }

    fn transition(&self, state: &mut ControllerState, to: Lifecycle) {
        let from = state.session.lifecycle;
        if from == to {
            return;
        }
        state.session.lifecycle = to;
        debug!(from = ?from, to = ?to, epoch = state.session.epoch, "session: lifecycle changed");
        let _ = self.events.send(SessionEvent::LifecycleChanged { from, to });
    }

    fn render_current_question(&self, state: &ControllerState) {
        let session = &state.session;
        let Some(question) = session.current_question() else {
            return;
        };
        let view = QuestionView {
            index: session.current_index,
            total: session.questions.len(),
            question: question.clone(),
            flagged: session.is_flagged(&question.id),
            flagged_count: session.flagged.len(),
        };
        state.view.renderer().render_question(&view);
    }

    fn render_current_solution(state: &ControllerState) {
        let Some(solution) = state.solutions.get(state.solution_index) else {
            return;
        };
        let display = SolutionDisplay::new(
            state.solution_index,
            state.solutions.len(),
            solution.clone(),
            state.score.as_ref(),
        );
        state.view.renderer().render_solution(&display);
    }

    fn show_score(&self, state: &mut ControllerState, display: ScoreDisplay) {
        state.view.renderer().render_score(&display);
        state.score_display = Some(display);
        state.view.open_overlay(Overlay::Score);
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
