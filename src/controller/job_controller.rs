//! JobController: 배치 조회 작업의 상태 머신
//!
//! Idle → Running → (Paused ⇄ Running) → Completed, 그리고 Running/Paused → Idle(cancel).
//! 모든 부수 효과는 엔진으로 보내는 명령이며, 상태 전이는 명령을 보내는 시점에
//! 낙관적으로 수행합니다. 엔진 응답을 기다리지 않습니다.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::aggregator::{Aggregation, DiscardReason, ResultAggregator};
use super::{parse_identifiers, ControllerError};
use crate::domain::{
    BatchJob, ControllerEvent, EngineCommand, EngineEvent, Generation, JobSnapshot, JobState, UserNotice,
};
use crate::engine::{EngineError, EngineHandle};

/// 배치 조회 컨트롤러
///
/// 책임:
/// - 작업 상태(`BatchJob`)의 단독 소유 및 변경
/// - 엔진에 start/pause/resume/cancel/reset 명령 발행
/// - 엔진 이벤트를 집계기에 넘기고 결과에 따라 상태 전이
/// - 관찰자에게 `ControllerEvent` 브로드캐스트
#[derive(Debug)]
pub struct JobController<E: EngineHandle> {
    engine: E,
    job: BatchJob,
    aggregator: ResultAggregator,
    notice: Option<UserNotice>,
    event_tx: broadcast::Sender<ControllerEvent>,
}

impl<E: EngineHandle> JobController<E> {
    /// # Arguments
    /// * `engine` - 명령을 받을 엔진 핸들
    /// * `event_capacity` - 관찰자 브로드캐스트 버퍼 크기
    pub fn new(engine: E, event_capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(event_capacity.max(1));
        Self {
            engine,
            job: BatchJob::new(),
            aggregator: ResultAggregator::new(),
            notice: None,
            event_tx,
        }
    }

    #[must_use]
    pub const fn job(&self) -> &BatchJob {
        &self.job
    }

    #[must_use]
    pub const fn state(&self) -> JobState {
        self.job.state()
    }

    #[must_use]
    pub const fn generation(&self) -> Generation {
        self.job.generation()
    }

    /// 가장 최근의 사용자 알림
    #[must_use]
    pub const fn notice(&self) -> Option<&UserNotice> {
        self.notice.as_ref()
    }

    #[must_use]
    pub fn progress_fraction(&self) -> f64 {
        self.job.progress_fraction()
    }

    #[must_use]
    pub const fn aggregator(&self) -> &ResultAggregator {
        &self.aggregator
    }

    #[must_use]
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot::from_job(&self.job, self.notice.clone())
    }

    /// 관찰자 이벤트 구독
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<ControllerEvent> {
        self.event_tx.clone()
    }

    /// 사용자 입력 텍스트(한 줄에 하나)로 새 작업을 제출합니다.
    ///
    /// 공백뿐인 입력은 아무 부수 효과 없이 거부됩니다.
    pub async fn submit(&mut self, text: &str) -> Result<Generation, ControllerError> {
        self.submit_identifiers(parse_identifiers(text)).await
    }

    /// 식별자 목록으로 새 작업을 제출합니다.
    pub async fn submit_identifiers(&mut self, identifiers: Vec<String>) -> Result<Generation, ControllerError> {
        if identifiers.is_empty() {
            debug!("submission rejected: empty identifier list");
            return Err(ControllerError::EmptySubmission);
        }
        let from = self.job.state();
        if !from.accepts_submission() {
            return Err(ControllerError::JobInProgress { state: from });
        }

        self.notice = None;
        let generation = self.job.begin(identifiers);
        self.emit_state_change(from, JobState::Running);
        info!("🚀 consultation {} started with {} parcel codes", generation, self.job.total_count());

        let start = EngineCommand::Start {
            generation,
            identifiers: self.job.identifiers().to_vec(),
        };
        for command in [EngineCommand::Reset, start] {
            if let Err(e) = self.engine.dispatch(command).await {
                self.abort_start(&e);
                return Ok(self.job.generation());
            }
        }
        Ok(generation)
    }

    /// Running → Paused
    pub async fn pause(&mut self) -> Result<(), ControllerError> {
        self.require(JobState::Running, "pause")?;
        self.transition(JobState::Paused);
        info!("⏸️ consultation {} paused at {}/{}", self.job.generation(), self.job.loaded_count(), self.job.total_count());

        if let Err(e) = self.engine.dispatch(EngineCommand::Pause).await {
            // 이미 Paused이므로 안전한 상태입니다.
            self.raise_command_failure(&e, "pause");
        }
        Ok(())
    }

    /// Paused → Running
    pub async fn resume(&mut self) -> Result<(), ControllerError> {
        self.require(JobState::Paused, "resume")?;
        self.transition(JobState::Running);
        info!("▶️ consultation {} resumed", self.job.generation());

        if let Err(e) = self.engine.dispatch(EngineCommand::Resume).await {
            self.transition(JobState::Paused);
            self.raise_command_failure(&e, "resume");
        }
        Ok(())
    }

    /// Running/Paused → Idle. 다른 상태에서는 아무것도 하지 않습니다.
    ///
    /// 세대를 먼저 올리고 카운터/버퍼를 비운 뒤 엔진에 중단을 지시합니다.
    /// 엔진이 실제로 멈췄는지는 기다리지 않습니다.
    pub async fn cancel(&mut self) -> Result<(), ControllerError> {
        let from = self.job.state();
        if !from.is_active() {
            debug!("cancel ignored while {}", from);
            return Ok(());
        }

        let generation = self.job.clear(JobState::Idle);
        self.emit_state_change(from, JobState::Idle);
        warn!("❌ consultation cancelled, now at {}", generation);

        if let Err(e) = self.engine.dispatch(EngineCommand::Cancel).await {
            self.raise_command_failure(&e, "cancel");
        }
        Ok(())
    }

    /// 작업을 새 Idle 상태로 되돌립니다. 몇 번을 불러도 결과는 같습니다.
    ///
    /// 진행 중인 작업에 대해서는 `cancel`과 같습니다.
    pub async fn reset(&mut self) -> Result<(), ControllerError> {
        let from = self.job.state();
        if from.is_active() {
            return self.cancel().await;
        }

        self.notice = None;
        let generation = self.job.clear(JobState::Idle);
        if from != JobState::Idle {
            self.emit_state_change(from, JobState::Idle);
        }
        debug!("🔄 controller reset, now at {}", generation);

        if let Err(e) = self.engine.dispatch(EngineCommand::Reset).await {
            self.raise_command_failure(&e, "reset");
        }
        Ok(())
    }

    /// 엔진 이벤트 하나를 처리합니다. 이벤트는 도착 순서대로 한 번에 하나씩 들어와야 합니다.
    pub fn handle_event(&mut self, event: EngineEvent) -> Aggregation {
        let outcome = self.aggregator.apply(&mut self.job, event);

        match &outcome {
            Aggregation::Appended { line, loaded_count, completed } => {
                debug!("📥 {}/{} {}", loaded_count, self.job.total_count(), line);
                self.emit(ControllerEvent::RecordAppended {
                    generation: self.job.generation(),
                    line: line.clone(),
                    loaded_count: *loaded_count,
                    total_count: self.job.total_count(),
                });
                if *completed {
                    self.transition(JobState::Completed);
                    info!("✅ consultation {} completed ({} records)", self.job.generation(), self.job.output_buffer().len());
                }
            }
            Aggregation::Failed { message } => {
                error!("🔥 consultation {} halted by engine failure: {}", self.job.generation(), message);
                if self.job.state() == JobState::Running {
                    self.transition(JobState::Paused);
                }
                self.raise(UserNotice::job_failure(self.job.generation(), message.clone()));
            }
            Aggregation::Discarded(DiscardReason::Stale { event, current }) => {
                self.emit(ControllerEvent::StaleEventDiscarded {
                    event_generation: *event,
                    current_generation: *current,
                });
            }
            Aggregation::Discarded(_) => {}
        }

        outcome
    }

    fn require(&self, expected: JobState, action: &'static str) -> Result<(), ControllerError> {
        let state = self.job.state();
        if state == expected {
            Ok(())
        } else {
            Err(ControllerError::InvalidTransition { action, state })
        }
    }

    /// start/reset 전달 실패: Running으로 남지 않도록 작업을 중단 상태로 돌립니다.
    fn abort_start(&mut self, e: &EngineError) {
        let from = self.job.state();
        self.job.clear(JobState::Cancelled);
        self.emit_state_change(from, JobState::Cancelled);
        self.raise_command_failure(e, "start");
    }

    fn raise_command_failure(&mut self, e: &EngineError, command: &str) {
        error!("📪 failed to deliver '{}' to engine: {}", command, e);
        self.raise(UserNotice::command_failure(self.job.generation(), command, e.to_string()));
    }

    fn raise(&mut self, notice: UserNotice) {
        self.notice = Some(notice.clone());
        self.emit(ControllerEvent::Notice(notice));
    }

    fn transition(&mut self, to: JobState) {
        let from = self.job.state();
        self.job.set_state(to);
        self.emit_state_change(from, to);
    }

    fn emit_state_change(&self, from: JobState, to: JobState) {
        debug!("🔀 job state {} → {}", from, to);
        self.emit(ControllerEvent::StateChanged {
            from,
            to,
            generation: self.job.generation(),
            timestamp: chrono::Utc::now(),
        });
    }

    fn emit(&self, event: ControllerEvent) {
        if self.event_tx.send(event).is_err() {
            debug!("no controller event subscribers");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{NoticeKind, ParcelRecord};
    use crate::test_utils::RecordingEngine;
    use rstest::rstest;

    fn controller() -> (JobController<RecordingEngine>, RecordingEngine) {
        let engine = RecordingEngine::new();
        (JobController::new(engine.clone(), 64), engine)
    }

    fn record(controller: &JobController<RecordingEngine>, code: &str, current: usize) -> EngineEvent {
        EngineEvent::record(controller.generation(), ParcelRecord::with_code(code), current, controller.job().total_count())
    }

    #[tokio::test]
    async fn submit_sets_counts_and_issues_reset_then_start() {
        let (mut controller, engine) = controller();
        let generation = controller.submit("A1\nA2\nA3").await.unwrap();

        assert_eq!(controller.state(), JobState::Running);
        assert_eq!(controller.job().total_count(), 3);
        assert_eq!(controller.job().loaded_count(), 0);
        assert_eq!(
            engine.commands(),
            vec![
                EngineCommand::Reset,
                EngineCommand::Start {
                    generation,
                    identifiers: vec!["A1".into(), "A2".into(), "A3".into()],
                },
            ]
        );
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("\n \t\n")]
    #[tokio::test]
    async fn blank_submission_is_rejected_without_side_effects(#[case] text: &str) {
        let (mut controller, engine) = controller();
        let before = controller.job().clone();

        assert_eq!(controller.submit(text).await, Err(ControllerError::EmptySubmission));
        assert_eq!(controller.job(), &before);
        assert!(engine.commands().is_empty());
    }

    #[tokio::test]
    async fn scenario_two_of_three_records_arrive_in_order() {
        let (mut controller, _engine) = controller();
        controller.submit("A1\nA2\nA3").await.unwrap();

        controller.handle_event(record(&controller, "A1", 1));
        controller.handle_event(record(&controller, "A2", 2));

        assert_eq!(controller.job().loaded_count(), 2);
        assert_eq!(controller.state(), JobState::Running);
        let buffer = controller.job().output_buffer();
        assert_eq!(buffer.len(), 2);
        assert!(buffer[0].starts_with("A1 | "));
        assert!(buffer[1].starts_with("A2 | "));
    }

    #[tokio::test]
    async fn cancelled_generation_events_do_not_touch_reset_job() {
        let (mut controller, engine) = controller();
        controller.submit("A1\nA2\nA3").await.unwrap();
        controller.handle_event(record(&controller, "A1", 1));
        controller.handle_event(record(&controller, "A2", 2));
        let old = controller.generation();

        controller.pause().await.unwrap();
        controller.cancel().await.unwrap();
        let late = controller.handle_event(EngineEvent::record(old, ParcelRecord::with_code("A3"), 3, 3));

        assert!(matches!(late, Aggregation::Discarded(DiscardReason::Stale { .. })));
        assert_eq!(controller.state(), JobState::Idle);
        assert_eq!(controller.job().loaded_count(), 0);
        assert!(controller.job().output_buffer().is_empty());
        assert_eq!(engine.command_names(), vec!["reset", "start", "pause", "cancel"]);
    }

    #[tokio::test]
    async fn cancel_then_resubmit_starts_clean() {
        let (mut controller, _engine) = controller();
        controller.submit("A\nB").await.unwrap();
        controller.handle_event(record(&controller, "A", 1));
        let old = controller.generation();

        controller.cancel().await.unwrap();
        controller.submit("X\nY\nZ").await.unwrap();
        controller.handle_event(EngineEvent::record(old, ParcelRecord::with_code("B"), 2, 2));
        controller.handle_event(EngineEvent::failure(old, "stale failure"));

        assert_eq!(controller.state(), JobState::Running);
        assert!(controller.job().output_buffer().is_empty());
        assert_eq!(controller.job().loaded_count(), 0);
        assert_eq!(controller.job().total_count(), 3);
        assert!(controller.notice().is_none());
    }

    #[tokio::test]
    async fn single_item_failure_pauses_and_surfaces_message() {
        let (mut controller, _engine) = controller();
        controller.submit("X").await.unwrap();
        let generation = controller.generation();

        controller.handle_event(EngineEvent::failure(generation, "Expired or invalid cookies!"));

        assert_eq!(controller.state(), JobState::Paused);
        assert_eq!(controller.job().loaded_count(), 0);
        assert!(controller.job().output_buffer().is_empty());
        let notice = controller.notice().unwrap();
        assert_eq!(notice.kind, NoticeKind::JobFailure);
        assert_eq!(notice.message, "Expired or invalid cookies!");
    }

    #[tokio::test]
    async fn failure_preserves_partial_results() {
        let (mut controller, _engine) = controller();
        controller.submit("A\nB\nC").await.unwrap();
        controller.handle_event(record(&controller, "A", 1));
        let before = controller.job().clone();

        controller.handle_event(EngineEvent::failure(controller.generation(), "boom"));

        assert_eq!(controller.job().output_buffer(), before.output_buffer());
        assert_eq!(controller.job().loaded_count(), before.loaded_count());
        assert_eq!(controller.state(), JobState::Paused);
    }

    #[tokio::test]
    async fn last_record_completes_job() {
        let (mut controller, engine) = controller();
        controller.submit("A\nB").await.unwrap();
        controller.handle_event(record(&controller, "A", 1));
        controller.handle_event(record(&controller, "B", 2));

        assert_eq!(controller.state(), JobState::Completed);
        assert!((controller.progress_fraction() - 1.0).abs() < f64::EPSILON);
        assert_eq!(engine.command_names(), vec!["reset", "start"]);
    }

    #[tokio::test]
    async fn new_submission_rejected_while_active() {
        let (mut controller, _engine) = controller();
        controller.submit("A").await.unwrap();
        assert_eq!(
            controller.submit("B").await,
            Err(ControllerError::JobInProgress { state: JobState::Running })
        );
        controller.pause().await.unwrap();
        assert_eq!(
            controller.submit("B").await,
            Err(ControllerError::JobInProgress { state: JobState::Paused })
        );
    }

    #[tokio::test]
    async fn pause_and_resume_are_state_gated() {
        let (mut controller, engine) = controller();
        assert_eq!(
            controller.pause().await,
            Err(ControllerError::InvalidTransition { action: "pause", state: JobState::Idle })
        );
        controller.submit("A\nB").await.unwrap();
        controller.pause().await.unwrap();
        assert_eq!(
            controller.pause().await,
            Err(ControllerError::InvalidTransition { action: "pause", state: JobState::Paused })
        );
        controller.resume().await.unwrap();
        assert_eq!(
            controller.resume().await,
            Err(ControllerError::InvalidTransition { action: "resume", state: JobState::Running })
        );
        assert_eq!(engine.command_names(), vec!["reset", "start", "pause", "resume"]);
    }

    #[tokio::test]
    async fn cancel_when_idle_is_a_no_op() {
        let (mut controller, engine) = controller();
        let generation = controller.generation();
        controller.cancel().await.unwrap();
        assert_eq!(controller.generation(), generation);
        assert!(engine.commands().is_empty());
    }

    #[tokio::test]
    async fn undeliverable_start_never_leaves_job_running() {
        let (mut controller, engine) = controller();
        engine.fail_on("start");

        controller.submit("A\nB").await.unwrap();

        assert_eq!(controller.state(), JobState::Cancelled);
        assert_eq!(controller.notice().unwrap().kind, NoticeKind::CommandFailure);
        // 다시 제출할 수 있어야 합니다.
        assert!(controller.state().accepts_submission());
    }

    #[tokio::test]
    async fn undeliverable_resume_falls_back_to_paused() {
        let (mut controller, engine) = controller();
        controller.submit("A\nB").await.unwrap();
        controller.pause().await.unwrap();
        engine.fail_on("resume");

        controller.resume().await.unwrap();

        assert_eq!(controller.state(), JobState::Paused);
        assert_eq!(controller.notice().unwrap().kind, NoticeKind::CommandFailure);
    }

    #[tokio::test]
    async fn reset_is_idempotent() {
        let (mut controller, _engine) = controller();
        controller.submit("A").await.unwrap();
        controller.handle_event(record(&controller, "A", 1));
        assert_eq!(controller.state(), JobState::Completed);

        controller.reset().await.unwrap();
        let once = controller.snapshot();
        controller.reset().await.unwrap();
        let twice = controller.snapshot();

        assert_eq!(once.state, JobState::Idle);
        assert_eq!(once.output, twice.output);
        assert_eq!(once.loaded_count, twice.loaded_count);
        assert_eq!(once.total_count, 0);
        assert!(twice.generation > once.generation);
    }

    #[tokio::test]
    async fn observers_receive_state_and_record_events() {
        let (mut controller, _engine) = controller();
        let mut events = controller.subscribe();
        controller.submit("A").await.unwrap();
        controller.handle_event(record(&controller, "A", 1));

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(matches!(seen[0], ControllerEvent::StateChanged { from: JobState::Idle, to: JobState::Running, .. }));
        assert!(matches!(seen[1], ControllerEvent::RecordAppended { loaded_count: 1, total_count: 1, .. }));
        assert!(matches!(seen[2], ControllerEvent::StateChanged { to: JobState::Completed, .. }));
    }

    #[test]
    fn progress_is_zero_without_a_job() {
        let (controller, _engine) = controller();
        assert!(controller.progress_fraction().abs() < f64::EPSILON);
        assert_eq!(controller.snapshot().total_count, 0);
    }
}
