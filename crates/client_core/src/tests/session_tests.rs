use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{ExamId, Lifecycle, QuestionId},
    protocol::{
        ExamConfig, ExamSummary, Question, QuestionScore, ScoreResponse, Solution,
        SolutionsResponse, TerminalStatus, TimerState,
    },
};
use tokio::sync::Notify;

use super::*;
use crate::{
    api::ExamApi,
    test_support::RecordingRenderer,
    view::{KeyPress, NoticeLevel, ScoreOutcome, MANUAL_SCORING_HINT},
};

struct FakeState {
    exams: Vec<ExamSummary>,
    questions: Vec<Question>,
    timer: TimerState,
    flagged: HashSet<QuestionId>,
    paused: bool,
    score: ScoreResponse,
    solutions: SolutionsResponse,
    single_solutions: HashMap<QuestionId, Solution>,
    terminal: TerminalStatus,
    failing: HashSet<&'static str>,
    calls: HashMap<&'static str, usize>,
}

struct FakeExamApi {
    state: StdMutex<FakeState>,
    gates: StdMutex<HashMap<&'static str, Arc<Notify>>>,
}

fn question(id: &str, topic: &str) -> Question {
    Question {
        id: QuestionId::from(id),
        topic: topic.to_string(),
        points: 5,
        namespace: "default".to_string(),
        resources: String::new(),
        files: String::new(),
        content: format!("# {topic}"),
    }
}

fn running_timer(remaining_seconds: u64) -> TimerState {
    TimerState {
        remaining_seconds,
        running: true,
        paused: false,
        exam_id: None,
        start_question: 1,
    }
}

fn passing_score() -> ScoreResponse {
    ScoreResponse {
        success: true,
        percentage: 75.0,
        total_score: 75.0,
        max_score: 100.0,
        passed: true,
        elapsed_formatted: Some("12:34".to_string()),
        solutions_available: true,
        questions: vec![
            QuestionScore {
                id: QuestionId::from("1"),
                topic: "Pods".to_string(),
                score: 50.0,
                max_score: 50.0,
                passed: true,
            },
            QuestionScore {
                id: QuestionId::from("2"),
                topic: "Services".to_string(),
                score: 25.0,
                max_score: 50.0,
                passed: false,
            },
        ],
        exam_id: Some(ExamId::from("ckad-1")),
        error: None,
    }
}

impl FakeExamApi {
    fn with_questions(count: usize) -> Arc<Self> {
        let questions = (1..=count)
            .map(|n| question(&n.to_string(), &format!("Topic {n}")))
            .collect();
        Arc::new(Self {
            state: StdMutex::new(FakeState {
                exams: vec![ExamSummary {
                    id: ExamId::from("ckad-1"),
                    name: "CKAD Simulation 1".to_string(),
                    duration: 120,
                    questions: count as u32,
                    points: 100,
                }],
                questions,
                timer: running_timer(7_200),
                flagged: HashSet::new(),
                paused: false,
                score: passing_score(),
                solutions: SolutionsResponse {
                    available: true,
                    solutions: Some(vec![
                        Solution {
                            id: QuestionId::from("1"),
                            topic: "Pods".to_string(),
                            content: "kubectl run nginx --image=nginx".to_string(),
                        },
                        Solution {
                            id: QuestionId::from("2"),
                            topic: "Services".to_string(),
                            content: String::new(),
                        },
                    ]),
                },
                single_solutions: HashMap::from([(
                    QuestionId::from("2"),
                    Solution {
                        id: QuestionId::from("2"),
                        topic: "Services".to_string(),
                        content: "kubectl expose deploy web --port=80".to_string(),
                    },
                )]),
                terminal: TerminalStatus::default(),
                failing: HashSet::new(),
                calls: HashMap::new(),
            }),
            gates: StdMutex::new(HashMap::new()),
        })
    }

    fn update(&self, apply: impl FnOnce(&mut FakeState)) {
        apply(&mut *self.state.lock().expect("fake state"));
    }

    fn fail(&self, endpoint: &'static str) {
        self.update(|state| {
            state.failing.insert(endpoint);
        });
    }

    fn calls(&self, endpoint: &'static str) -> usize {
        self.state
            .lock()
            .expect("fake state")
            .calls
            .get(endpoint)
            .copied()
            .unwrap_or(0)
    }

    fn gate(&self, endpoint: &'static str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .lock()
            .expect("fake gates")
            .insert(endpoint, gate.clone());
        gate
    }

    fn ungate(&self, endpoint: &'static str) {
        self.gates.lock().expect("fake gates").remove(endpoint);
    }

    async fn enter(&self, endpoint: &'static str) -> Result<()> {
        *self
            .state
            .lock()
            .expect("fake state")
            .calls
            .entry(endpoint)
            .or_default() += 1;
        let gate = self.gates.lock().expect("fake gates").get(endpoint).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.state.lock().expect("fake state").failing.contains(endpoint) {
            return Err(anyhow!("{endpoint} unavailable"));
        }
        Ok(())
    }

    fn read<T>(&self, read: impl FnOnce(&mut FakeState) -> T) -> T {
        read(&mut *self.state.lock().expect("fake state"))
    }
}

#[async_trait]
impl ExamApi for FakeExamApi {
    async fn list_exams(&self) -> Result<Vec<ExamSummary>> {
        self.enter("list_exams").await?;
        Ok(self.read(|state| state.exams.clone()))
    }

    async fn exam_config(&self, exam_id: &ExamId) -> Result<ExamConfig> {
        self.enter("exam_config").await?;
        Ok(ExamConfig {
            exam_name: "CKAD Simulation 1".to_string(),
            exam_id: Some(exam_id.clone()),
            total_points: 100,
            ..ExamConfig::default()
        })
    }

    async fn questions(&self, _exam_id: &ExamId) -> Result<Vec<Question>> {
        self.enter("questions").await?;
        Ok(self.read(|state| state.questions.clone()))
    }

    async fn timer(&self) -> Result<TimerState> {
        self.enter("timer").await?;
        Ok(self.read(|state| state.timer.clone()))
    }

    async fn start_timer(&self, _exam_id: &ExamId) -> Result<()> {
        self.enter("start_timer").await
    }

    async fn toggle_pause(&self) -> Result<TimerState> {
        self.enter("toggle_pause").await?;
        Ok(self.read(|state| {
            state.paused = !state.paused;
            TimerState {
                paused: state.paused,
                ..state.timer.clone()
            }
        }))
    }

    async fn toggle_flag(&self, question_id: &QuestionId) -> Result<bool> {
        self.enter("toggle_flag").await?;
        Ok(self.read(|state| {
            if state.flagged.remove(question_id) {
                false
            } else {
                state.flagged.insert(question_id.clone());
                true
            }
        }))
    }

    async fn flags(&self) -> Result<Vec<QuestionId>> {
        self.enter("flags").await?;
        Ok(self.read(|state| state.flagged.iter().cloned().collect()))
    }

    async fn compute_score(&self) -> Result<ScoreResponse> {
        self.enter("compute_score").await?;
        Ok(self.read(|state| state.score.clone()))
    }

    async fn solutions(&self, _exam_id: &ExamId) -> Result<SolutionsResponse> {
        self.enter("solutions").await?;
        Ok(self.read(|state| state.solutions.clone()))
    }

    async fn solution(
        &self,
        _exam_id: &ExamId,
        question_id: &QuestionId,
    ) -> Result<Option<Solution>> {
        self.enter("solution").await?;
        Ok(self.read(|state| state.single_solutions.get(question_id).cloned()))
    }

    async fn terminal_status(&self) -> Result<TerminalStatus> {
        self.enter("terminal_status").await?;
        Ok(self.read(|state| state.terminal.clone()))
    }

    async fn cleanup(&self) -> Result<()> {
        self.enter("cleanup").await
    }

    async fn shutdown(&self) -> Result<()> {
        self.enter("shutdown").await
    }
}

fn controller_with_interval(
    api: &Arc<FakeExamApi>,
    poll_interval: Duration,
) -> (Arc<SessionController>, Arc<RecordingRenderer>) {
    let renderer = Arc::new(RecordingRenderer::default());
    let controller = SessionController::with_options(
        api.clone(),
        renderer.clone(),
        ControllerOptions {
            poll_interval,
            ..ControllerOptions::default()
        },
    );
    (controller, renderer)
}

fn new_controller(api: &Arc<FakeExamApi>) -> (Arc<SessionController>, Arc<RecordingRenderer>) {
    controller_with_interval(api, Duration::from_secs(3_600))
}

async fn started(questions: usize) -> (Arc<FakeExamApi>, Arc<SessionController>, Arc<RecordingRenderer>) {
    let api = FakeExamApi::with_questions(questions);
    let (controller, renderer) = new_controller(&api);
    controller
        .start(ExamId::from("ckad-1"))
        .await
        .expect("start exam");
    (api, controller, renderer)
}

async fn wait_for_calls(api: &FakeExamApi, endpoint: &'static str, expected: usize) {
    for _ in 0..1_000 {
        if api.calls(endpoint) >= expected {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("{endpoint} was called {} times, expected {expected}", api.calls(endpoint));
}

async fn lifecycle(controller: &SessionController) -> Lifecycle {
    controller.snapshot().await.session.lifecycle
}

fn tick(remaining_seconds: u64, running: bool, paused: bool) -> TimerState {
    TimerState {
        remaining_seconds,
        running,
        paused,
        exam_id: Some(ExamId::from("ckad-1")),
        start_question: 1,
    }
}

#[tokio::test]
async fn start_enters_active_on_first_question() {
    let (api, controller, renderer) = started(3).await;

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.session.lifecycle, Lifecycle::Active);
    assert_eq!(snapshot.session.current_index, 0);
    assert_eq!(snapshot.session.exam_id, Some(ExamId::from("ckad-1")));
    assert_eq!(snapshot.session.time_remaining_seconds, 120 * 60);
    assert_eq!(snapshot.screen, Screen::ExamInterface);
    assert_eq!(snapshot.overlay, None);
    assert!(snapshot.timer_running);
    assert_eq!(api.calls("start_timer"), 1);
    assert_eq!(
        renderer.last_question().map(|view| view.position_label()),
        Some("Question 1 of 3".to_string())
    );
}

#[tokio::test]
async fn navigate_moves_only_within_bounds_while_active() {
    let fresh = FakeExamApi::with_questions(3);
    let (idle, _) = new_controller(&fresh);
    assert!(!idle.navigate(0).await);

    let (_api, controller, _renderer) = started(3).await;
    assert!(controller.navigate(2).await);
    assert_eq!(controller.snapshot().await.session.current_index, 2);

    assert!(!controller.navigate(3).await);
    assert!(!controller.next().await);
    assert_eq!(controller.snapshot().await.session.current_index, 2);

    assert!(controller.previous().await);
    assert!(controller.previous().await);
    assert!(!controller.previous().await);
    assert_eq!(controller.snapshot().await.session.current_index, 0);

    controller.toggle_pause().await.expect("pause");
    assert_eq!(lifecycle(&controller).await, Lifecycle::Paused);
    assert!(!controller.navigate(1).await);
    assert_eq!(controller.snapshot().await.session.current_index, 0);
}

#[tokio::test]
async fn navigation_emits_question_changed() {
    let (_api, controller, _renderer) = started(3).await;
    let mut events = controller.subscribe_events();

    controller.navigate(1).await;
    assert_eq!(
        events.recv().await.expect("event"),
        SessionEvent::QuestionChanged {
            index: 1,
            question_id: QuestionId::from("2"),
        }
    );
}

#[tokio::test]
async fn flag_toggled_twice_restores_membership() {
    let (api, controller, renderer) = started(3).await;
    controller.navigate(1).await;
    let id = QuestionId::from("2");

    controller.toggle_flag().await.expect("flag");
    assert!(controller.snapshot().await.session.flagged.contains(&id));
    assert!(renderer.last_question().expect("question").flagged);

    controller.toggle_flag().await.expect("unflag");
    assert!(controller.snapshot().await.session.flagged.is_empty());
    assert!(!renderer.last_question().expect("question").flagged);
    assert_eq!(api.calls("toggle_flag"), 2);
}

#[tokio::test]
async fn failed_flag_toggle_leaves_state_untouched() {
    let (api, controller, _renderer) = started(2).await;
    api.fail("toggle_flag");

    let err = controller.toggle_flag().await.expect_err("flag must fail");
    assert!(matches!(
        err,
        SessionError::Action {
            action: "toggle flag",
            ..
        }
    ));
    assert!(controller.snapshot().await.session.flagged.is_empty());
}

#[tokio::test]
async fn overlapping_flag_toggles_are_coalesced() {
    let (api, controller, _renderer) = started(2).await;
    let gate = api.gate("toggle_flag");

    let first = tokio::spawn({
        let controller = controller.clone();
        async move { controller.toggle_flag().await }
    });
    wait_for_calls(&api, "toggle_flag", 1).await;

    controller.toggle_flag().await.expect("coalesced toggle");
    assert_eq!(api.calls("toggle_flag"), 1);

    gate.notify_one();
    first.await.expect("join").expect("first toggle");
    assert!(controller
        .snapshot()
        .await
        .session
        .flagged
        .contains(&QuestionId::from("1")));
}

#[tokio::test]
async fn countdown_reaching_zero_ends_exactly_once() {
    let (_api, controller, renderer) = started(2).await;

    let mut outcomes = Vec::new();
    for remaining in (0..=902u64).rev() {
        outcomes.push(
            controller
                .apply_timer_state(&tick(remaining, remaining > 0, false))
                .await,
        );
    }

    let expired: Vec<usize> = outcomes
        .iter()
        .enumerate()
        .filter(|(_, outcome)| **outcome == TickOutcome::Expired)
        .map(|(index, _)| index)
        .collect();
    assert_eq!(expired, vec![902]);

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.session.lifecycle, Lifecycle::Ended);
    assert_eq!(snapshot.overlay, Some(Overlay::TimesUp));
    assert!(!snapshot.timer_running);
    assert_eq!(renderer.last_timer().map(|timer| timer.text), Some("0:00".to_string()));

    assert_eq!(
        controller.apply_timer_state(&tick(0, false, false)).await,
        TickOutcome::Ignored
    );
}

#[tokio::test]
async fn paused_server_timer_never_ends_the_exam() {
    let (_api, controller, _renderer) = started(2).await;

    assert_eq!(
        controller.apply_timer_state(&tick(600, false, true)).await,
        TickOutcome::PauseChanged
    );
    for _ in 0..5 {
        assert_eq!(
            controller.apply_timer_state(&tick(600, false, true)).await,
            TickOutcome::Updated
        );
    }
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.session.lifecycle, Lifecycle::Paused);
    assert!(snapshot.session.paused);
    assert_eq!(snapshot.overlay, None);
}

#[tokio::test]
async fn server_pause_flag_is_adopted_both_ways() {
    let (_api, controller, _renderer) = started(2).await;

    controller.apply_timer_state(&tick(500, true, true)).await;
    assert_eq!(lifecycle(&controller).await, Lifecycle::Paused);

    controller.apply_timer_state(&tick(500, true, false)).await;
    assert_eq!(lifecycle(&controller).await, Lifecycle::Active);
}

#[tokio::test]
async fn ticks_for_another_exam_are_ignored() {
    let (_api, controller, _renderer) = started(2).await;
    let foreign = TimerState {
        exam_id: Some(ExamId::from("ckad-2")),
        ..tick(0, false, false)
    };
    assert_eq!(
        controller.apply_timer_state(&foreign).await,
        TickOutcome::Ignored
    );
    assert_eq!(lifecycle(&controller).await, Lifecycle::Active);
}

#[tokio::test]
async fn pause_toggle_follows_the_server() {
    let (api, controller, renderer) = started(2).await;

    controller.toggle_pause().await.expect("pause");
    assert_eq!(lifecycle(&controller).await, Lifecycle::Paused);
    assert!(renderer.last_timer().expect("timer").paused);

    controller.toggle_pause().await.expect("resume");
    assert_eq!(lifecycle(&controller).await, Lifecycle::Active);

    api.fail("toggle_pause");
    assert!(controller.toggle_pause().await.is_err());
    assert_eq!(lifecycle(&controller).await, Lifecycle::Active);
}

#[test]
fn resume_index_clamps_into_question_range() {
    assert_eq!(resume_index(5, 10), 4);
    assert_eq!(resume_index(0, 10), 0);
    assert_eq!(resume_index(999, 10), 9);
    assert_eq!(resume_index(-3, 10), 0);
    assert_eq!(resume_index(1, 0), 0);
}

#[tokio::test]
async fn resume_clamps_start_question_and_restores_flags() {
    for (start_question, expected) in [(5, 4), (0, 0), (999, 9)] {
        let api = FakeExamApi::with_questions(10);
        api.update(|state| {
            state.flagged.insert(QuestionId::from("3"));
        });
        let (controller, _renderer) = new_controller(&api);

        controller
            .resume(ExamId::from("ckad-1"), start_question)
            .await
            .expect("resume");

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.session.current_index, expected);
        assert_eq!(snapshot.session.lifecycle, Lifecycle::Active);
        assert!(snapshot.session.flagged.contains(&QuestionId::from("3")));
        assert_eq!(api.calls("start_timer"), 0);
    }
}

#[tokio::test]
async fn resume_survives_flag_fetch_failure() {
    let api = FakeExamApi::with_questions(4);
    api.fail("flags");
    let (controller, _renderer) = new_controller(&api);

    controller
        .resume(ExamId::from("ckad-1"), 2)
        .await
        .expect("resume");
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.session.current_index, 1);
    assert!(snapshot.session.flagged.is_empty());
}

#[tokio::test]
async fn load_failure_keeps_not_started_and_notifies() {
    for endpoint in ["questions", "exam_config", "start_timer"] {
        let api = FakeExamApi::with_questions(3);
        api.fail(endpoint);
        let (controller, renderer) = new_controller(&api);

        let err = controller
            .start(ExamId::from("ckad-1"))
            .await
            .expect_err("start must fail");
        assert!(matches!(err, SessionError::Load { .. }), "{endpoint}");

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.session.lifecycle, Lifecycle::NotStarted);
        assert!(!snapshot.timer_running);
        let notices = renderer.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Error);
        assert_eq!(notices[0].message, START_FAILED_NOTICE);
    }
}

#[tokio::test]
async fn exam_without_questions_is_a_load_error() {
    let api = FakeExamApi::with_questions(0);
    let (controller, _renderer) = new_controller(&api);
    assert!(matches!(
        controller.start(ExamId::from("empty")).await,
        Err(SessionError::Load { .. })
    ));
    assert_eq!(api.calls("start_timer"), 0);
}

#[tokio::test]
async fn start_is_rejected_once_an_exam_is_running() {
    let (_api, controller, _renderer) = started(2).await;
    assert!(matches!(
        controller.start(ExamId::from("ckad-2")).await,
        Err(SessionError::NotAllowed { .. })
    ));
}

#[tokio::test]
async fn scoring_refusal_shows_server_error() {
    let (api, controller, renderer) = started(2).await;
    api.update(|state| {
        state.score = ScoreResponse {
            success: false,
            error: Some("boom".to_string()),
            ..ScoreResponse::default()
        };
    });

    let err = controller.execute_stop().await.expect_err("scoring fails");
    assert!(matches!(err, SessionError::Scoring { ref message } if message == "boom"));

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.session.lifecycle, Lifecycle::Scoring);
    assert!(snapshot.score.is_none());
    let display = renderer.last_score().expect("score rendered");
    assert_eq!(display.outcome, ScoreOutcome::Error);
    assert_eq!(display.status, "boom");
    assert_eq!(display.detail.as_deref(), Some(MANUAL_SCORING_HINT));
}

#[tokio::test]
async fn scoring_transport_failure_keeps_scoring() {
    let (api, controller, renderer) = started(2).await;
    api.fail("compute_score");

    assert!(controller.execute_stop().await.is_err());
    assert_eq!(lifecycle(&controller).await, Lifecycle::Scoring);
    let display = renderer.last_score().expect("score rendered");
    assert_eq!(display.title, "Error");
    assert_eq!(display.status, "Failed to connect to server");
}

#[tokio::test]
async fn stop_flow_renders_pending_then_passing_score() {
    let (api, controller, renderer) = started(2).await;

    assert!(controller.navigate(1).await);
    controller.request_stop().await.expect("request stop");
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.overlay, Some(Overlay::StopConfirmation));
    assert_eq!(snapshot.session.lifecycle, Lifecycle::Active);

    renderer.clear();
    controller.confirm_stop().await.expect("confirm stop");

    let scores: Vec<ScoreDisplay> = renderer
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            crate::test_support::Rendered::Score(score) => Some(score),
            _ => None,
        })
        .collect();
    assert_eq!(scores.len(), 2);
    assert_eq!(scores[0].outcome, ScoreOutcome::Pending);
    assert_eq!(scores[0].title, "Calculating Score...");
    assert_eq!(scores[1].percentage, "75");
    assert_eq!(scores[1].status, "PASSED");
    assert_eq!(scores[1].points, "75 / 100");

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.session.lifecycle, Lifecycle::Scoring);
    assert_eq!(snapshot.overlay, Some(Overlay::Score));
    assert!(snapshot.score.expect("score").passed);
    assert!(!snapshot.timer_running);
    assert_eq!(api.calls("compute_score"), 1);
}

#[tokio::test]
async fn stop_needs_an_active_exam() {
    let (_api, controller, _renderer) = started(2).await;
    controller.toggle_pause().await.expect("pause");
    assert!(matches!(
        controller.request_stop().await,
        Err(SessionError::NotAllowed { .. })
    ));
    assert_eq!(controller.snapshot().await.overlay, None);
}

#[tokio::test]
async fn execute_stop_runs_once() {
    let (api, controller, _renderer) = started(2).await;
    let gate = api.gate("compute_score");

    let first = tokio::spawn({
        let controller = controller.clone();
        async move { controller.execute_stop().await }
    });
    wait_for_calls(&api, "compute_score", 1).await;

    controller.execute_stop().await.expect("second stop is a no-op");
    assert_eq!(api.calls("compute_score"), 1);

    gate.notify_one();
    first.await.expect("join").expect("stop");
    controller.execute_stop().await.expect("third stop is a no-op");
    assert_eq!(api.calls("compute_score"), 1);
    assert!(controller.snapshot().await.score.is_some());
}

#[tokio::test]
async fn score_for_a_previous_session_is_discarded() {
    let (api, controller, _renderer) = started(2).await;
    let gate = api.gate("compute_score");

    let stop = tokio::spawn({
        let controller = controller.clone();
        async move { controller.execute_stop().await }
    });
    wait_for_calls(&api, "compute_score", 1).await;

    controller
        .return_to_selection()
        .await
        .expect("return to selection");
    gate.notify_one();
    stop.await.expect("join").expect("stale stop");

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.session.lifecycle, Lifecycle::NotStarted);
    assert!(snapshot.score.is_none());
    assert!(snapshot.score_display.is_none());
    assert_eq!(snapshot.overlay, None);
}

#[tokio::test]
async fn times_up_acknowledgement_requests_score() {
    let (_api, controller, _renderer) = started(2).await;
    controller.apply_timer_state(&tick(0, false, false)).await;
    assert_eq!(controller.snapshot().await.overlay, Some(Overlay::TimesUp));

    controller
        .acknowledge_times_up()
        .await
        .expect("acknowledge");
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.session.lifecycle, Lifecycle::Scoring);
    assert_eq!(snapshot.overlay, Some(Overlay::Score));
    assert!(snapshot.score.is_some());
}

#[tokio::test(start_paused = true)]
async fn synchronizer_polls_once_per_interval_until_stop() {
    let api = FakeExamApi::with_questions(2);
    let (controller, _renderer) = controller_with_interval(&api, Duration::from_secs(1));
    controller
        .start(ExamId::from("ckad-1"))
        .await
        .expect("start");

    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert_eq!(api.calls("timer"), 3);

    controller.execute_stop().await.expect("stop");
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(api.calls("timer"), 3);
}

#[tokio::test(start_paused = true)]
async fn zero_poll_interval_is_clamped() {
    let api = FakeExamApi::with_questions(2);
    api.update(|state| state.timer = tick(3_000, true, false));
    let (controller, _renderer) = controller_with_interval(&api, Duration::ZERO);
    controller
        .start(ExamId::from("ckad-1"))
        .await
        .expect("start");

    tokio::time::sleep(MIN_POLL_INTERVAL * 2 + Duration::from_millis(50)).await;
    assert_eq!(api.calls("timer"), 3);
    assert_eq!(lifecycle(&controller).await, Lifecycle::Active);
}

#[tokio::test(start_paused = true)]
async fn synchronizer_stops_after_expiry() {
    let api = FakeExamApi::with_questions(2);
    api.update(|state| state.timer = tick(0, false, false));
    let (controller, _renderer) = controller_with_interval(&api, Duration::from_secs(1));
    controller
        .start(ExamId::from("ckad-1"))
        .await
        .expect("start");

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(api.calls("timer"), 1);
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.session.lifecycle, Lifecycle::Ended);
    assert!(!snapshot.timer_running);
}

#[tokio::test(start_paused = true)]
async fn synchronizer_stops_on_return_to_selection() {
    let api = FakeExamApi::with_questions(2);
    let (controller, _renderer) = controller_with_interval(&api, Duration::from_secs(1));
    controller
        .start(ExamId::from("ckad-1"))
        .await
        .expect("start");

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    controller
        .return_to_selection()
        .await
        .expect("return to selection");
    let polls = api.calls("timer");
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(api.calls("timer"), polls);
    assert_eq!(controller.snapshot().await.screen, Screen::ExamSelection);
}

#[tokio::test(start_paused = true)]
async fn synchronizer_keeps_polling_after_fetch_errors() {
    let api = FakeExamApi::with_questions(2);
    api.fail("timer");
    let (controller, _renderer) = controller_with_interval(&api, Duration::from_secs(1));
    controller
        .start(ExamId::from("ckad-1"))
        .await
        .expect("start");

    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert_eq!(api.calls("timer"), 4);
    assert_eq!(lifecycle(&controller).await, Lifecycle::Active);
}

#[tokio::test]
async fn tick_from_a_cancelled_generation_is_discarded() {
    let (api, controller, _renderer) = started(2).await;
    wait_for_calls(&api, "timer", 1).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    let generation = controller.inner.lock().await.timer.generation();
    let gate = api.gate("timer");
    let stale = tokio::spawn({
        let controller = controller.clone();
        async move { controller.poll_timer(generation).await }
    });
    wait_for_calls(&api, "timer", 2).await;

    controller.inner.lock().await.timer.cancel();
    api.update(|state| state.timer = tick(0, false, false));
    gate.notify_one();

    assert!(!stale.await.expect("join"));
    assert_eq!(lifecycle(&controller).await, Lifecycle::Active);
    api.ungate("timer");
}

#[tokio::test]
async fn solutions_flow_round_trips_to_score() {
    let (api, controller, renderer) = started(2).await;
    controller.execute_stop().await.expect("stop");

    controller.request_solutions().await.expect("solutions");
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.session.lifecycle, Lifecycle::ReviewingSolutions);
    assert_eq!(snapshot.overlay, Some(Overlay::Solutions));
    let first = renderer.last_solution().expect("solution");
    assert_eq!(first.index, 0);
    assert_eq!(first.status_label(), "PASSED");
    assert_eq!(api.calls("solution"), 0);

    controller.next_solution().await.expect("next");
    let second = renderer.last_solution().expect("solution");
    assert_eq!(second.index, 1);
    assert_eq!(second.status_label(), "FAILED");
    assert_eq!(second.solution.content, "kubectl expose deploy web --port=80");
    assert_eq!(api.calls("solution"), 1);

    controller.next_solution().await.expect("past the end");
    assert_eq!(controller.snapshot().await.solution_index, 1);

    controller.previous_solution().await.expect("previous");
    assert_eq!(controller.snapshot().await.solution_index, 0);

    controller.back_to_score().await.expect("back");
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.session.lifecycle, Lifecycle::Scoring);
    assert_eq!(snapshot.overlay, Some(Overlay::Score));
}

#[tokio::test]
async fn unavailable_solutions_are_a_soft_failure() {
    let (api, controller, renderer) = started(2).await;
    api.update(|state| state.solutions = SolutionsResponse::default());
    controller.execute_stop().await.expect("stop");

    controller.request_solutions().await.expect("soft failure");
    assert_eq!(lifecycle(&controller).await, Lifecycle::Scoring);
    assert_eq!(
        renderer.notices().last().map(|notice| notice.message.clone()),
        Some(SOLUTIONS_UNAVAILABLE_NOTICE.to_string())
    );
}

#[tokio::test]
async fn solutions_need_a_score_that_offers_them() {
    let (api, controller, renderer) = started(2).await;
    api.update(|state| state.score.solutions_available = false);
    controller.execute_stop().await.expect("stop");

    controller.request_solutions().await.expect("soft failure");
    assert_eq!(api.calls("solutions"), 0);
    assert_eq!(lifecycle(&controller).await, Lifecycle::Scoring);
    assert_eq!(renderer.notices().len(), 1);
}

#[tokio::test]
async fn solutions_fetch_failure_notifies() {
    let (api, controller, renderer) = started(2).await;
    api.fail("solutions");
    controller.execute_stop().await.expect("stop");

    assert!(matches!(
        controller.request_solutions().await,
        Err(SessionError::Action { .. })
    ));
    assert_eq!(lifecycle(&controller).await, Lifecycle::Scoring);
    assert_eq!(
        renderer.notices().last().map(|notice| notice.message.clone()),
        Some(SOLUTIONS_FAILED_NOTICE.to_string())
    );
}

#[tokio::test]
async fn cleanup_failure_restores_score_view() {
    let (api, controller, renderer) = started(2).await;
    controller.execute_stop().await.expect("stop");
    controller.request_solutions().await.expect("solutions");
    api.fail("cleanup");

    let err = controller
        .cleanup_and_return()
        .await
        .expect_err("cleanup fails");
    assert!(matches!(err, SessionError::Cleanup { .. }));

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.session.lifecycle, Lifecycle::Scoring);
    assert_eq!(snapshot.overlay, Some(Overlay::Score));
    let display = renderer.last_score().expect("score");
    assert_eq!(display.percentage, "75");
    assert!(display
        .inline_error
        .expect("inline error")
        .contains("cleanup unavailable"));
}

#[tokio::test]
async fn cleanup_and_return_shows_exam_list() {
    let (api, controller, _renderer) = started(2).await;
    controller.execute_stop().await.expect("stop");

    controller.cleanup_and_return().await.expect("cleanup");
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.session.lifecycle, Lifecycle::NotStarted);
    assert_eq!(snapshot.screen, Screen::ExamSelection);
    assert_eq!(snapshot.exams.len(), 1);
    assert_eq!(api.calls("cleanup"), 1);
    assert_eq!(api.calls("shutdown"), 0);
}

#[tokio::test]
async fn cleanup_and_terminate_ends_the_session() {
    let (api, controller, _renderer) = started(2).await;
    controller.execute_stop().await.expect("stop");

    controller.cleanup_and_terminate().await.expect("terminate");
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.screen, Screen::SessionEnded);
    assert_eq!(snapshot.session.lifecycle, Lifecycle::NotStarted);
    assert_eq!(snapshot.overlay, None);
    assert_eq!(api.calls("shutdown"), 1);
}

#[tokio::test]
async fn cleanup_is_only_offered_after_the_exam() {
    let (api, controller, _renderer) = started(2).await;
    assert!(matches!(
        controller.cleanup_and_return().await,
        Err(SessionError::NotAllowed { .. })
    ));
    assert_eq!(api.calls("cleanup"), 0);
}

#[tokio::test]
async fn bootstrap_resumes_running_exam() {
    let api = FakeExamApi::with_questions(5);
    api.update(|state| {
        state.timer = TimerState {
            start_question: 3,
            ..tick(3_000, true, false)
        };
    });
    let (controller, _renderer) = new_controller(&api);

    controller.bootstrap().await.expect("bootstrap");
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.session.lifecycle, Lifecycle::Active);
    assert_eq!(snapshot.session.current_index, 2);
    assert_eq!(api.calls("start_timer"), 0);
    assert_eq!(api.calls("list_exams"), 0);
}

#[tokio::test]
async fn bootstrap_falls_back_to_exam_list_when_resume_fails() {
    let api = FakeExamApi::with_questions(5);
    api.update(|state| state.timer = tick(3_000, true, false));
    api.fail("exam_config");
    let (controller, renderer) = new_controller(&api);

    controller.bootstrap().await.expect("exam list still loads");
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.session.lifecycle, Lifecycle::NotStarted);
    assert_eq!(snapshot.screen, Screen::ExamSelection);
    assert_eq!(snapshot.exams.len(), 1);
    assert!(!snapshot.timer_running);
    assert_eq!(api.calls("list_exams"), 1);
    assert!(renderer
        .calls()
        .contains(&crate::test_support::Rendered::Screen(Screen::ExamSelection)));
}

#[tokio::test]
async fn bootstrap_without_running_exam_lists_exams() {
    let api = FakeExamApi::with_questions(5);
    api.update(|state| state.timer = tick(0, false, false));
    let (controller, renderer) = new_controller(&api);

    controller.bootstrap().await.expect("bootstrap");
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.screen, Screen::ExamSelection);
    assert_eq!(snapshot.exams.len(), 1);
    assert!(renderer
        .calls()
        .contains(&crate::test_support::Rendered::ExamList(1)));
}

#[tokio::test]
async fn exam_list_failure_notifies() {
    let api = FakeExamApi::with_questions(5);
    api.fail("timer");
    api.fail("list_exams");
    let (controller, renderer) = new_controller(&api);

    assert!(matches!(
        controller.bootstrap().await,
        Err(SessionError::ExamList { .. })
    ));
    assert_eq!(
        renderer.notices().last().map(|notice| notice.message.clone()),
        Some(EXAM_LIST_FAILED_NOTICE.to_string())
    );
}

#[tokio::test]
async fn keyboard_shortcuts_drive_the_exam() {
    let (_api, controller, _renderer) = started(3).await;

    controller
        .dispatch(Intent::Key(KeyPress::plain("ArrowRight")))
        .await
        .expect("next");
    controller
        .dispatch(Intent::Key(KeyPress::plain("f")))
        .await
        .expect("flag");
    controller
        .dispatch(Intent::Key(KeyPress::plain("f").with_ctrl()))
        .await
        .expect("ignored");

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.session.current_index, 1);
    assert_eq!(snapshot.session.flagged.len(), 1);

    controller.dispatch(Intent::RequestStop).await.expect("stop");
    controller
        .dispatch(Intent::Key(KeyPress::plain("ArrowLeft")))
        .await
        .expect("swallowed");
    assert_eq!(controller.snapshot().await.session.current_index, 1);

    controller
        .dispatch(Intent::Key(KeyPress::plain("Escape")))
        .await
        .expect("dismiss");
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.overlay, None);
    assert_eq!(snapshot.session.lifecycle, Lifecycle::Active);
}

#[tokio::test]
async fn flagged_list_jumps_to_question() {
    let (_api, controller, renderer) = started(4).await;
    controller.navigate(2).await;
    controller.toggle_flag().await.expect("flag");
    controller.navigate(0).await;

    controller.show_flagged_list().await.expect("flagged list");
    assert_eq!(
        controller.snapshot().await.overlay,
        Some(Overlay::FlaggedQuestions)
    );
    let listed = renderer.calls().into_iter().rev().find_map(|call| match call {
        crate::test_support::Rendered::FlaggedList(entries) => Some(entries),
        _ => None,
    });
    assert_eq!(listed.expect("flagged entries")[0].index, 2);

    controller.jump_to_flagged(2).await.expect("jump");
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.overlay, None);
    assert_eq!(snapshot.session.current_index, 2);
}

#[tokio::test]
async fn leaving_an_exam_asks_first() {
    let (_api, controller, _renderer) = started(2).await;

    controller.request_leave().await.expect("request leave");
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.overlay, Some(Overlay::LeaveConfirmation));
    assert_eq!(snapshot.session.lifecycle, Lifecycle::Active);

    controller.cancel_overlay().await;
    assert_eq!(controller.snapshot().await.overlay, None);

    controller.request_leave().await.expect("request leave");
    controller.confirm_leave().await.expect("confirm leave");
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.session.lifecycle, Lifecycle::NotStarted);
    assert_eq!(snapshot.screen, Screen::ExamSelection);
    assert!(!snapshot.timer_running);
}

#[tokio::test]
async fn new_exam_discards_previous_score() {
    let (_api, controller, _renderer) = started(2).await;
    controller.execute_stop().await.expect("stop");
    controller.close_score().await.expect("close score");

    controller
        .start(ExamId::from("ckad-1"))
        .await
        .expect("second start");
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.session.lifecycle, Lifecycle::Active);
    assert!(snapshot.score.is_none());
    assert!(snapshot.solutions.is_empty());
    assert!(snapshot.session.epoch >= 3);
}

#[tokio::test]
async fn terminal_panel_follows_server_status() {
    let api = FakeExamApi::with_questions(2);
    api.update(|state| {
        state.terminal = TerminalStatus {
            enabled: true,
            running: true,
            port: 7681,
            url: None,
        };
    });
    let (controller, _renderer) = new_controller(&api);
    controller
        .start(ExamId::from("ckad-1"))
        .await
        .expect("start");
    assert_eq!(
        controller.snapshot().await.terminal,
        TerminalPanel::Visible {
            url: "http://localhost:7681".to_string()
        }
    );

    let api = FakeExamApi::with_questions(2);
    api.fail("terminal_status");
    let (controller, _renderer) = new_controller(&api);
    controller
        .start(ExamId::from("ckad-1"))
        .await
        .expect("start without terminal");
    assert_eq!(controller.snapshot().await.terminal, TerminalPanel::Hidden);
}
