//! ConsultWorker: 순차 조회 엔진
//!
//! 명령 채널을 소비하며 식별자를 한 번에 하나씩 조회하고, 결과/실패를
//! 세대 태그가 붙은 이벤트로 내보냅니다.
//!
//! - 일시정지: 진행 중인 항목이 끝난 뒤 다음 항목 전에 멈춤 (watch 채널)
//! - 취소/리셋: `CancellationToken`으로 실행 중단, 이후 이벤트 방출 없음
//! - 항목 실패: 실패 이벤트 후 스스로 정지, 재개 시 실패 항목부터 다시 시도

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ParcelFetcher;
use crate::domain::{EngineCommand, EngineEvent, Generation};

/// 현재 실행 중인 작업
#[derive(Debug)]
struct ActiveRun {
    generation: Generation,
    identifiers: Arc<Vec<String>>,
    /// 다음에 조회할 위치. 실패 시 실패 항목 위치에 머뭅니다.
    next_index: Arc<AtomicUsize>,
    /// 항목 실패로 스스로 멈췄음. 실패 이벤트보다 먼저 설정됩니다.
    halted: Arc<AtomicBool>,
    pause_tx: watch::Sender<bool>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ActiveRun {
    fn stop(self) {
        self.cancel.cancel();
        debug!("🛑 run {} stopped at {}/{}", self.generation, self.next_index.load(Ordering::SeqCst), self.identifiers.len());
    }

    fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    fn is_exhausted(&self) -> bool {
        self.next_index.load(Ordering::SeqCst) >= self.identifiers.len()
    }
}

/// 실행 태스크에 넘기는 컨텍스트
struct RunContext<F: ParcelFetcher> {
    fetcher: Arc<F>,
    generation: Generation,
    identifiers: Arc<Vec<String>>,
    next_index: Arc<AtomicUsize>,
    halted: Arc<AtomicBool>,
    pause_rx: watch::Receiver<bool>,
    cancel: CancellationToken,
    event_tx: mpsc::Sender<EngineEvent>,
    request_delay: Duration,
}

/// 순차 조회 엔진
pub struct ConsultWorker<F: ParcelFetcher> {
    fetcher: Arc<F>,
    request_delay: Duration,
    event_tx: mpsc::Sender<EngineEvent>,
    current: Option<ActiveRun>,
}

impl<F: ParcelFetcher> ConsultWorker<F> {
    /// # Arguments
    /// * `fetcher` - 항목 하나를 조회하는 수집기
    /// * `request_delay` - 연속 조회 사이 대기 시간
    /// * `event_tx` - 결과 이벤트 송신단
    pub fn new(fetcher: F, request_delay: Duration, event_tx: mpsc::Sender<EngineEvent>) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            request_delay,
            event_tx,
            current: None,
        }
    }

    /// 명령 수신 루프. 채널이 닫히거나 `shutdown`이 취소되면 종료합니다.
    pub async fn run(mut self, mut command_rx: mpsc::Receiver<EngineCommand>, shutdown: CancellationToken) {
        info!("🎬 ConsultWorker command loop started");

        loop {
            tokio::select! {
                command = command_rx.recv() => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => {
                            warn!("📪 ConsultWorker command channel closed");
                            break;
                        }
                    }
                }
                () = shutdown.cancelled() => {
                    warn!("🚫 ConsultWorker received shutdown signal");
                    break;
                }
            }
        }

        if let Some(run) = self.current.take() {
            run.stop();
        }
        info!("🏁 ConsultWorker command loop ended");
    }

    fn handle_command(&mut self, command: EngineCommand) {
        debug!("📨 ConsultWorker received command: {}", command.name());
        match command {
            EngineCommand::Reset | EngineCommand::Cancel => {
                if let Some(run) = self.current.take() {
                    info!("❌ stopping run {}", run.generation);
                    run.stop();
                }
            }
            EngineCommand::Start { generation, identifiers } => {
                if let Some(previous) = self.current.take() {
                    warn!("Start while run {} still alive, stopping it", previous.generation);
                    previous.stop();
                }
                info!("🚀 starting run {} with {} identifiers", generation, identifiers.len());
                self.current = Some(self.spawn_run(generation, Arc::new(identifiers), Arc::new(AtomicUsize::new(0))));
            }
            EngineCommand::Pause => match &self.current {
                Some(run) => {
                    info!("⏸️ pausing run {}", run.generation);
                    let _ = run.pause_tx.send(true);
                }
                None => debug!("pause ignored, no active run"),
            },
            EngineCommand::Resume => self.resume(),
        }
    }

    fn resume(&mut self) {
        let Some(run) = self.current.take() else {
            debug!("resume ignored, no active run");
            return;
        };

        if !run.is_halted() {
            if run.task.is_finished() && run.is_exhausted() {
                debug!("resume ignored, run {} already exhausted", run.generation);
            } else {
                info!("▶️ resuming run {}", run.generation);
                let _ = run.pause_tx.send(false);
            }
            self.current = Some(run);
            return;
        }

        // 실패로 멈춘 실행: 실패한 항목부터 새 태스크로 이어갑니다.
        let ActiveRun { generation, identifiers, next_index, .. } = run;
        info!(
            "🔁 restarting halted run {} from item {}/{}",
            generation,
            next_index.load(Ordering::SeqCst) + 1,
            identifiers.len()
        );
        self.current = Some(self.spawn_run(generation, identifiers, next_index));
    }

    fn spawn_run(&self, generation: Generation, identifiers: Arc<Vec<String>>, next_index: Arc<AtomicUsize>) -> ActiveRun {
        let (pause_tx, pause_rx) = watch::channel(false);
        let halted = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();
        let context = RunContext {
            fetcher: Arc::clone(&self.fetcher),
            generation,
            identifiers: Arc::clone(&identifiers),
            next_index: Arc::clone(&next_index),
            halted: Arc::clone(&halted),
            pause_rx,
            cancel: cancel.clone(),
            event_tx: self.event_tx.clone(),
            request_delay: self.request_delay,
        };
        let task = tokio::spawn(process_run(context));

        ActiveRun {
            generation,
            identifiers,
            next_index,
            halted,
            pause_tx,
            cancel,
            task,
        }
    }
}

/// 일시정지가 풀릴 때까지 대기. 취소되면 `false`.
async fn wait_until_resumed(pause_rx: &mut watch::Receiver<bool>, cancel: &CancellationToken) -> bool {
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        if !*pause_rx.borrow_and_update() {
            return true;
        }
        tokio::select! {
            () = cancel.cancelled() => return false,
            changed = pause_rx.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
        }
    }
}

async fn process_run<F: ParcelFetcher>(mut ctx: RunContext<F>) {
    let total = ctx.identifiers.len();
    let start = ctx.next_index.load(Ordering::SeqCst);

    for index in start..total {
        if !wait_until_resumed(&mut ctx.pause_rx, &ctx.cancel).await {
            return;
        }

        let code = &ctx.identifiers[index];
        debug!("🔎 [{}] consulting {} ({}/{})", ctx.generation, code, index + 1, total);

        let outcome = tokio::select! {
            () = ctx.cancel.cancelled() => return,
            outcome = ctx.fetcher.fetch(code) => outcome,
        };
        if ctx.cancel.is_cancelled() {
            return;
        }

        let event = match outcome {
            Ok(record) => {
                ctx.next_index.store(index + 1, Ordering::SeqCst);
                EngineEvent::record(ctx.generation, record, index + 1, total)
            }
            Err(e) => {
                warn!("❌ [{}] consult of {} failed, halting: {}", ctx.generation, code, e);
                ctx.halted.store(true, Ordering::SeqCst);
                let _ = ctx.event_tx.send(EngineEvent::failure(ctx.generation, e.to_string())).await;
                return;
            }
        };

        if ctx.event_tx.send(event).await.is_err() {
            warn!("📪 [{}] event receiver dropped, abandoning run", ctx.generation);
            return;
        }

        if index + 1 < total && !ctx.request_delay.is_zero() {
            tokio::select! {
                () = ctx.cancel.cancelled() => return,
                () = tokio::time::sleep(ctx.request_delay) => {}
            }
        }
    }

    info!("✅ [{}] run exhausted ({} identifiers)", ctx.generation, total);
}
