//! 엔진과 컨트롤러, 관찰자 사이를 오가는 메시지 타입
//!
//! - `EngineCommand`: 컨트롤러 → 엔진 (fire-and-forget)
//! - `EngineEvent`: 엔진 → 컨트롤러 (세대 태그 포함)
//! - `ControllerEvent`: 컨트롤러 → 관찰자 (UI 등)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::{BatchJob, Generation, JobState};
use super::parcel::ParcelRecord;

/// 엔진에 보내는 명령
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineCommand {
    /// 엔진 측 작업 상태 정리
    Reset,
    /// 순차 처리 시작. 이후 모든 이벤트는 `generation`으로 태그됩니다.
    Start {
        generation: Generation,
        identifiers: Vec<String>,
    },
    /// 진행 중인 항목 이후로 방출 중단
    Pause,
    /// 다음 미처리 항목부터 재개
    Resume,
    /// 처리 중단. 이 세대로는 더 이상 이벤트를 내보내지 않습니다.
    Cancel,
}

impl EngineCommand {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Reset => "reset",
            Self::Start { .. } => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Cancel => "cancel",
        }
    }
}

/// 성공 페이로드
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParcelResult {
    pub data: ParcelRecord,
    pub total_count: usize,
    pub current_count: usize,
}

/// 결과 채널 페이로드
///
/// 하나의 채널에 성공/실패가 함께 흐르며, 별도 태그 없이 모양으로 구분합니다.
/// 객체면 레코드, 문자열이면 실패 메시지입니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConsultPayload {
    Record(ParcelResult),
    Failure(String),
}

/// 엔진이 방출하는 이벤트
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineEvent {
    pub generation: Generation,
    pub payload: ConsultPayload,
}

impl EngineEvent {
    #[must_use]
    pub fn record(generation: Generation, data: ParcelRecord, current_count: usize, total_count: usize) -> Self {
        Self {
            generation,
            payload: ConsultPayload::Record(ParcelResult {
                data,
                total_count,
                current_count,
            }),
        }
    }

    #[must_use]
    pub fn failure(generation: Generation, message: impl Into<String>) -> Self {
        Self {
            generation,
            payload: ConsultPayload::Failure(message.into()),
        }
    }
}

/// 사용자 알림 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeKind {
    /// 엔진이 보고한 치명적 작업 실패
    JobFailure,
    /// 엔진에 명령을 전달하지 못함
    CommandFailure,
}

/// 사용자에게 띄우는 차단형 알림
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserNotice {
    pub kind: NoticeKind,
    pub title: String,
    pub message: String,
    pub generation: Generation,
    pub timestamp: DateTime<Utc>,
}

impl UserNotice {
    #[must_use]
    pub fn job_failure(generation: Generation, message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::JobFailure,
            title: "There was an error!".to_string(),
            message: message.into(),
            generation,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn command_failure(generation: Generation, command: &str, message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::CommandFailure,
            title: format!("Could not deliver '{command}' to the engine"),
            message: message.into(),
            generation,
            timestamp: Utc::now(),
        }
    }
}

/// 관찰자에게 보여줄 작업 스냅샷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub state: JobState,
    pub generation: Generation,
    pub loaded_count: usize,
    pub total_count: usize,
    pub progress: f64,
    pub output: Vec<String>,
    pub notice: Option<UserNotice>,
}

impl JobSnapshot {
    #[must_use]
    pub fn from_job(job: &BatchJob, notice: Option<UserNotice>) -> Self {
        Self {
            state: job.state(),
            generation: job.generation(),
            loaded_count: job.loaded_count(),
            total_count: job.total_count(),
            progress: job.progress_fraction(),
            output: job.output_buffer().to_vec(),
            notice,
        }
    }

    /// 누적 출력 (라인마다 개행)
    #[must_use]
    pub fn output_text(&self) -> String {
        self.output.iter().fold(String::new(), |mut text, line| {
            text.push_str(line);
            text.push('\n');
            text
        })
    }
}

impl Default for JobSnapshot {
    fn default() -> Self {
        Self::from_job(&BatchJob::default(), None)
    }
}

/// 컨트롤러가 관찰자에게 브로드캐스트하는 이벤트
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ControllerEvent {
    StateChanged {
        from: JobState,
        to: JobState,
        generation: Generation,
        timestamp: DateTime<Utc>,
    },
    RecordAppended {
        generation: Generation,
        line: String,
        loaded_count: usize,
        total_count: usize,
    },
    Notice(UserNotice),
    StaleEventDiscarded {
        event_generation: Generation,
        current_generation: Generation,
    },
}
