//! 요청 간 최소 간격 유지.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// 고정 간격 페이서.
///
/// 한 시도의 소요 시간이 간격보다 짧으면 남은 시간만큼 대기하도록 알려줍니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacer {
    interval: Duration,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// 분당 한도에서 간격 계산 (`60 / limit` 초).
    pub fn from_minute_limit(limit: u32) -> Self {
        if limit == 0 {
            return Self::new(Duration::ZERO);
        }
        Self::new(Duration::from_millis(60_000 / u64::from(limit)))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// `started`에 시작한 시도 이후 `now`까지 채워야 할 대기 시간.
    pub fn shortfall(&self, started: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
        let elapsed = (now - started).to_std().unwrap_or(Duration::ZERO);
        self.interval.saturating_sub(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use chrono::TimeZone;

    #[test]
    fn test_interval_from_minute_limit() {
        assert_eq!(Pacer::from_minute_limit(10).interval(), Duration::from_secs(6));
        assert_eq!(Pacer::from_minute_limit(0).interval(), Duration::ZERO);
    }

    #[test]
    fn test_shortfall_with_virtual_clock() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let pacer = Pacer::from_minute_limit(10);

        let started = clock.now();
        clock.advance(Duration::from_millis(1500));
        assert_eq!(pacer.shortfall(started, clock.now()), Duration::from_millis(4500));

        clock.advance(Duration::from_secs(10));
        assert_eq!(pacer.shortfall(started, clock.now()), Duration::ZERO);
    }
}
