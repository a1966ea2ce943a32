//! ControllerRuntime: 단일 소비자 이벤트 루프
//!
//! 사용자 요청과 엔진 이벤트를 하나의 `tokio::select!` 루프에서 순서대로 처리합니다.
//! 컨트롤러는 이 루프만 변경하므로 두 이벤트가 동시에 처리되는 일은 없습니다.
//! 처리 후마다 최신 스냅샷을 watch 채널로 게시합니다.

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::job_controller::JobController;
use super::ControllerError;
use crate::domain::{ControllerEvent, EngineEvent, JobSnapshot};
use crate::engine::EngineHandle;

/// 사용자(UI)가 보내는 요청
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    /// 한 줄에 하나씩 적힌 식별자 텍스트
    Submit(String),
    Pause,
    Resume,
    Cancel,
    Reset,
}

#[derive(Debug)]
struct ControlRequest {
    command: UserCommand,
    reply: oneshot::Sender<Result<(), ControllerError>>,
}

/// 컨트롤러를 소유하고 구동하는 루프
pub struct ControllerRuntime<E: EngineHandle> {
    controller: JobController<E>,
    engine_events: mpsc::Receiver<EngineEvent>,
    requests: mpsc::Receiver<ControlRequest>,
    snapshot_tx: watch::Sender<JobSnapshot>,
    shutdown: CancellationToken,
}

impl<E: EngineHandle> ControllerRuntime<E> {
    /// # Arguments
    /// * `controller` - 구동할 컨트롤러
    /// * `engine_events` - 엔진 이벤트 수신단 (프로세스 수명 동안 유지되는 단일 구독)
    /// * `request_capacity` - 사용자 요청 채널 크기
    /// * `shutdown` - 루프 종료 토큰
    pub fn new(
        controller: JobController<E>,
        engine_events: mpsc::Receiver<EngineEvent>,
        request_capacity: usize,
        shutdown: CancellationToken,
    ) -> (Self, RuntimeHandle) {
        let (request_tx, requests) = mpsc::channel(request_capacity.max(1));
        let (snapshot_tx, snapshot_rx) = watch::channel(controller.snapshot());
        let handle = RuntimeHandle {
            request_tx,
            snapshot_rx,
            event_tx: controller.event_sender(),
            shutdown: shutdown.clone(),
        };
        let runtime = Self {
            controller,
            engine_events,
            requests,
            snapshot_tx,
            shutdown,
        };
        (runtime, handle)
    }

    /// 루프를 실행하고, 종료 시 컨트롤러를 돌려줍니다.
    pub async fn run(mut self) -> JobController<E> {
        info!("🎬 ControllerRuntime loop started");
        let mut engine_open = true;

        loop {
            tokio::select! {
                request = self.requests.recv() => {
                    let Some(ControlRequest { command, reply }) = request else {
                        info!("📪 all runtime handles dropped");
                        break;
                    };
                    debug!("📨 user command: {:?}", command);
                    let result = self.apply(command).await;
                    self.publish();
                    if reply.send(result).is_err() {
                        debug!("requester went away before the reply");
                    }
                }
                event = self.engine_events.recv(), if engine_open => {
                    match event {
                        Some(event) => {
                            self.controller.handle_event(event);
                            self.publish();
                        }
                        None => {
                            warn!("📪 engine event channel closed");
                            engine_open = false;
                        }
                    }
                }
                () = self.shutdown.cancelled() => {
                    warn!("🚫 ControllerRuntime received shutdown signal");
                    break;
                }
            }
        }

        info!("🏁 ControllerRuntime loop ended in state {}", self.controller.state());
        self.controller
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.controller.snapshot());
    }

    async fn apply(&mut self, command: UserCommand) -> Result<(), ControllerError> {
        match command {
            UserCommand::Submit(text) => self.controller.submit(&text).await.map(|_| ()),
            UserCommand::Pause => self.controller.pause().await,
            UserCommand::Resume => self.controller.resume().await,
            UserCommand::Cancel => self.controller.cancel().await,
            UserCommand::Reset => self.controller.reset().await,
        }
    }
}

/// 런타임에 요청을 보내고 상태를 관찰하는 핸들
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    request_tx: mpsc::Sender<ControlRequest>,
    snapshot_rx: watch::Receiver<JobSnapshot>,
    event_tx: broadcast::Sender<ControllerEvent>,
    shutdown: CancellationToken,
}

impl RuntimeHandle {
    /// 요청을 보내고 컨트롤러의 판정을 기다립니다 (엔진 처리 완료는 기다리지 않음).
    pub async fn send(&self, command: UserCommand) -> Result<(), ControllerError> {
        let (reply, response) = oneshot::channel();
        self.request_tx
            .send(ControlRequest { command, reply })
            .await
            .map_err(|_| ControllerError::RuntimeClosed)?;
        response.await.map_err(|_| ControllerError::RuntimeClosed)?
    }

    pub async fn submit(&self, text: impl Into<String>) -> Result<(), ControllerError> {
        self.send(UserCommand::Submit(text.into())).await
    }

    pub async fn pause(&self) -> Result<(), ControllerError> {
        self.send(UserCommand::Pause).await
    }

    pub async fn resume(&self) -> Result<(), ControllerError> {
        self.send(UserCommand::Resume).await
    }

    pub async fn cancel(&self) -> Result<(), ControllerError> {
        self.send(UserCommand::Cancel).await
    }

    pub async fn reset(&self) -> Result<(), ControllerError> {
        self.send(UserCommand::Reset).await
    }

    /// 가장 최근에 게시된 스냅샷
    #[must_use]
    pub fn snapshot(&self) -> JobSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// 스냅샷 변경 구독
    #[must_use]
    pub fn snapshots(&self) -> watch::Receiver<JobSnapshot> {
        self.snapshot_rx.clone()
    }

    /// 컨트롤러 이벤트 구독
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.event_tx.subscribe()
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
