//! ResultAggregator: 엔진 이벤트 스트림을 작업 상태에 반영
//!
//! 세대가 다르거나 범위를 벗어난 이벤트를 걸러내고, 받아들인 레코드는
//! 출력 버퍼에 한 줄씩 추가합니다. 상태 전이는 컨트롤러의 몫입니다.

use tracing::{debug, warn};

use crate::domain::{BatchJob, ConsultPayload, EngineEvent, Generation, ParcelResult};

/// 이벤트를 버린 이유
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscardReason {
    /// 대체/취소된 이전 세대의 이벤트
    Stale { event: Generation, current: Generation },
    /// 현재 작업이 이벤트를 받을 상태가 아님
    Inactive,
    /// 작업 크기와 맞지 않는 카운트
    OutOfRange { current_count: usize, total_count: usize },
}

/// 이벤트 하나를 처리한 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aggregation {
    /// 레코드가 버퍼에 추가됨
    Appended {
        line: String,
        loaded_count: usize,
        /// 마지막 미처리 식별자까지 결과가 모두 도착함
        completed: bool,
    },
    /// 작업을 멈추게 하는 실패. 버퍼/카운터는 그대로입니다.
    Failed { message: String },
    Discarded(DiscardReason),
}

/// 결과 집계기
#[derive(Debug, Default)]
pub struct ResultAggregator {
    accepted: u64,
    discarded: u64,
}

impl ResultAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 받아들인 레코드 수 (프로세스 전체 누적)
    #[must_use]
    pub const fn accepted(&self) -> u64 {
        self.accepted
    }

    /// 버린 이벤트 수 (프로세스 전체 누적)
    #[must_use]
    pub const fn discarded(&self) -> u64 {
        self.discarded
    }

    /// 이벤트 하나를 작업에 반영합니다.
    pub fn apply(&mut self, job: &mut BatchJob, event: EngineEvent) -> Aggregation {
        let outcome = Self::classify(job, event);
        match &outcome {
            Aggregation::Discarded(reason) => {
                self.discarded += 1;
                debug!("🗑️ discarded engine event: {:?}", reason);
            }
            Aggregation::Appended { .. } => self.accepted += 1,
            Aggregation::Failed { .. } => {}
        }
        outcome
    }

    fn classify(job: &mut BatchJob, event: EngineEvent) -> Aggregation {
        if event.generation != job.generation() {
            return Aggregation::Discarded(DiscardReason::Stale {
                event: event.generation,
                current: job.generation(),
            });
        }
        if !job.state().is_active() {
            return Aggregation::Discarded(DiscardReason::Inactive);
        }

        match event.payload {
            ConsultPayload::Failure(message) => Aggregation::Failed { message },
            ConsultPayload::Record(result) => Self::append(job, result),
        }
    }

    fn append(job: &mut BatchJob, result: ParcelResult) -> Aggregation {
        let ParcelResult { data, total_count, current_count } = result;

        if total_count != job.total_count() || current_count == 0 || current_count > job.total_count() {
            warn!(
                "⚠️ out-of-range record for {}: {}/{} (job total {})",
                data.parcel_code,
                current_count,
                total_count,
                job.total_count()
            );
            return Aggregation::Discarded(DiscardReason::OutOfRange { current_count, total_count });
        }
        if job.outstanding() == 0 {
            return Aggregation::Discarded(DiscardReason::OutOfRange { current_count, total_count });
        }

        job.advance_to(current_count);
        let line = data.to_output_line();
        job.push_line(line.clone());

        Aggregation::Appended {
            line,
            loaded_count: job.loaded_count(),
            completed: job.outstanding() == 0,
        }
    }
}
