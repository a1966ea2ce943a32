//! 배치 조회 작업 모델
//!
//! `BatchJob`은 한 번의 제출 단위이며, 컨트롤러가 단독으로 소유하고 변경합니다.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 작업 세대 태그
///
/// 리셋/취소마다 증가하며 엔진 이벤트에 붙어 이전 작업의 늦은 이벤트를 걸러냅니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Generation(u64);

impl Generation {
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// 다음 세대
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen#{}", self.0)
    }
}

/// 작업 상태
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    #[default]
    Idle,
    Running,
    Paused,
    Completed,
    Cancelled,
}

impl JobState {
    /// 엔진이 작업을 쥐고 있는 상태 (Running/Paused)
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    /// 새 제출을 받을 수 있는 상태
    #[must_use]
    pub const fn accepts_submission(self) -> bool {
        matches!(self, Self::Idle | Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// 제출 한 건에 대한 작업 상태
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchJob {
    identifiers: Vec<String>,
    state: JobState,
    loaded_count: usize,
    total_count: usize,
    output_buffer: Vec<String>,
    generation: Generation,
}

impl BatchJob {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    #[must_use]
    pub const fn state(&self) -> JobState {
        self.state
    }

    #[must_use]
    pub const fn loaded_count(&self) -> usize {
        self.loaded_count
    }

    #[must_use]
    pub const fn total_count(&self) -> usize {
        self.total_count
    }

    #[must_use]
    pub fn output_buffer(&self) -> &[String] {
        &self.output_buffer
    }

    #[must_use]
    pub const fn generation(&self) -> Generation {
        self.generation
    }

    /// 진행률 (0.0 ~ 1.0). 전체 건수가 0이면 항상 0입니다.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress_fraction(&self) -> f64 {
        if self.total_count == 0 {
            return 0.0;
        }
        self.loaded_count as f64 / self.total_count as f64
    }

    /// 아직 결과가 오지 않은 식별자 수
    #[must_use]
    pub const fn outstanding(&self) -> usize {
        self.total_count.saturating_sub(self.loaded_count)
    }

    /// 새 실행을 위해 상태를 초기화하고 식별자를 적재합니다.
    ///
    /// 세대를 올리므로 이전 실행의 이벤트는 더 이상 반영되지 않습니다.
    pub(crate) fn begin(&mut self, identifiers: Vec<String>) -> Generation {
        self.generation = self.generation.next();
        self.total_count = identifiers.len();
        self.identifiers = identifiers;
        self.loaded_count = 0;
        self.output_buffer.clear();
        self.state = JobState::Running;
        self.generation
    }

    /// 카운터/버퍼/식별자를 비우고 세대를 올립니다. 상태는 `next_state`가 됩니다.
    pub(crate) fn clear(&mut self, next_state: JobState) -> Generation {
        self.generation = self.generation.next();
        self.identifiers.clear();
        self.loaded_count = 0;
        self.total_count = 0;
        self.output_buffer.clear();
        self.state = next_state;
        self.generation
    }

    pub(crate) fn set_state(&mut self, state: JobState) {
        self.state = state;
    }

    /// 엔진이 보고한 완료 건수를 반영합니다. 되돌아가거나 범위를 넘지 않습니다.
    pub(crate) fn advance_to(&mut self, current_count: usize) {
        let clamped = current_count.min(self.total_count);
        self.loaded_count = self.loaded_count.max(clamped);
    }

    pub(crate) fn push_line(&mut self, line: String) {
        self.output_buffer.push(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_job_is_idle_with_zero_progress() {
        let job = BatchJob::new();
        assert_eq!(job.state(), JobState::Idle);
        assert_eq!(job.total_count(), 0);
        assert!(job.progress_fraction().abs() < f64::EPSILON);
    }

    #[test]
    fn begin_bumps_generation_and_resets_counters() {
        let mut job = BatchJob::new();
        let first = job.begin(vec!["A".into(), "B".into()]);
        job.advance_to(1);
        job.push_line("A | ...".into());

        let second = job.begin(vec!["C".into()]);
        assert!(second > first);
        assert_eq!(job.total_count(), 1);
        assert_eq!(job.loaded_count(), 0);
        assert!(job.output_buffer().is_empty());
        assert_eq!(job.state(), JobState::Running);
    }

    #[test]
    fn advance_never_regresses_or_overflows() {
        let mut job = BatchJob::new();
        job.begin(vec!["A".into(), "B".into(), "C".into()]);
        job.advance_to(2);
        job.advance_to(1);
        assert_eq!(job.loaded_count(), 2);
        job.advance_to(10);
        assert_eq!(job.loaded_count(), 3);
        assert_eq!(job.outstanding(), 0);
    }

    #[test]
    fn progress_fraction_tracks_loaded_over_total() {
        let mut job = BatchJob::new();
        job.begin(vec!["A".into(), "B".into(), "C".into(), "D".into()]);
        job.advance_to(1);
        assert!((job.progress_fraction() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn state_predicates() {
        assert!(JobState::Running.is_active());
        assert!(JobState::Paused.is_active());
        assert!(!JobState::Completed.is_active());
        assert!(JobState::Cancelled.accepts_submission());
        assert!(!JobState::Paused.accepts_submission());
    }
}
