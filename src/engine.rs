//! 외부 처리 엔진 경계
//!
//! 컨트롤러는 `EngineHandle`로 명령만 보내고, 결과는 세대 태그가 붙은
//! `EngineEvent` 스트림으로만 돌아옵니다. 명령 전달은 fire-and-forget입니다.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::{EngineCommand, ParcelRecord};

pub mod sigef;
pub mod worker;

pub use sigef::SigefFetcher;
pub use worker::ConsultWorker;

/// 엔진 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Engine unreachable while sending '{command}': {reason}")]
    Unreachable { command: &'static str, reason: String },
}

/// 식별자 한 건 조회 실패
///
/// 메시지는 그대로 사용자에게 노출됩니다.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("Error sending the request: {0}")]
    Http(String),

    #[error("Parcel code not found!: {status}")]
    NotFound { status: u16 },

    #[error("Expired or invalid cookies! Renew the cookies and try again.")]
    CredentialsExpired,

    #[error("The cookies were not found or were deleted, try saving them again. {0}")]
    CredentialsMissing(String),

    #[error("Error reading the response body: {0}")]
    Body(String),

    #[error("Could not parse the parcel page: {0}")]
    Parse(String),
}

/// 컨트롤러가 엔진에 명령을 보내는 표면
#[async_trait]
pub trait EngineHandle: Send + Sync {
    /// 명령을 큐에 넣고 즉시 반환합니다. 엔진의 처리 완료를 기다리지 않습니다.
    async fn dispatch(&self, command: EngineCommand) -> Result<(), EngineError>;
}

/// 식별자 한 건을 조회해 레코드로 만드는 수집기
#[async_trait]
pub trait ParcelFetcher: Send + Sync + 'static {
    async fn fetch(&self, parcel_code: &str) -> Result<ParcelRecord, FetchError>;
}

/// `ConsultWorker`로 가는 명령 채널 송신단
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    command_tx: mpsc::Sender<EngineCommand>,
}

impl WorkerHandle {
    #[must_use]
    pub const fn new(command_tx: mpsc::Sender<EngineCommand>) -> Self {
        Self { command_tx }
    }
}

#[async_trait]
impl EngineHandle for WorkerHandle {
    async fn dispatch(&self, command: EngineCommand) -> Result<(), EngineError> {
        let name = command.name();
        debug!("📨 dispatching '{}' to consult worker", name);
        self.command_tx
            .send(command)
            .await
            .map_err(|e| EngineError::Unreachable {
                command: name,
                reason: e.to_string(),
            })
    }
}
