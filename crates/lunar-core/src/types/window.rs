//! 시간봉 수집 윈도우.
//!
//! 모든 윈도우 경계는 정시에 정렬되며 시작/종료 모두 포함(inclusive)입니다.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// 한 시간의 초 수.
pub const HOUR_SECS: i64 = 3600;

/// 시각을 정시로 내림.
pub fn floor_to_hour(time: DateTime<Utc>) -> DateTime<Utc> {
    let secs = time.timestamp();
    DateTime::from_timestamp(secs - secs.rem_euclid(HOUR_SECS), 0).unwrap_or(time)
}

/// 한 심볼에 대해 가져올 시간 범위.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchWindow {
    pub symbol_id: i64,
    /// 첫 시간봉 (포함)
    pub start: DateTime<Utc>,
    /// 마지막 시간봉 (포함)
    pub end: DateTime<Utc>,
}

impl FetchWindow {
    /// 경계를 정시로 내려 윈도우 생성.
    pub fn new(symbol_id: i64, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            symbol_id,
            start: floor_to_hour(start),
            end: floor_to_hour(end),
        }
    }

    /// 가져올 시간봉이 없는지 (이미 최신 상태).
    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    /// 윈도우에 포함된 시간봉 수.
    pub fn hours(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            (self.end - self.start).num_hours() + 1
        }
    }

    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        time >= self.start && time <= self.end
    }

    pub fn start_unix(&self) -> i64 {
        self.start.timestamp()
    }

    pub fn end_unix(&self) -> i64 {
        self.end.timestamp()
    }

    /// 최대 `max_hours`개 시간봉 단위로 시간순 분할.
    ///
    /// 분할된 윈도우는 서로 겹치지 않고 빈틈 없이 원래 범위를 덮습니다.
    pub fn split(&self, max_hours: i64) -> Vec<FetchWindow> {
        if self.is_empty() {
            return Vec::new();
        }
        let max_hours = max_hours.max(1);

        let mut chunks = Vec::new();
        let mut start = self.start;
        while start <= self.end {
            let end = (start + Duration::hours(max_hours - 1)).min(self.end);
            chunks.push(FetchWindow {
                symbol_id: self.symbol_id,
                start,
                end,
            });
            start = end + Duration::hours(1);
        }
        chunks
    }
}

impl std::fmt::Display for FetchWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} - {}",
            self.start.format("%d.%m.%Y %H:%M"),
            self.end.format("%d.%m.%Y %H:%M")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_floor_to_hour() {
        assert_eq!(floor_to_hour(at(2024, 3, 1, 13, 59)), at(2024, 3, 1, 13, 0));
        assert_eq!(floor_to_hour(at(2024, 3, 1, 13, 0)), at(2024, 3, 1, 13, 0));
    }

    #[test]
    fn test_window_hours_and_empty() {
        let window = FetchWindow::new(1, at(2024, 1, 1, 0, 0), at(2024, 1, 1, 23, 30));
        assert_eq!(window.hours(), 24);
        assert!(!window.is_empty());

        let up_to_date = FetchWindow::new(1, at(2024, 1, 2, 0, 0), at(2024, 1, 1, 23, 0));
        assert!(up_to_date.is_empty());
        assert_eq!(up_to_date.hours(), 0);
        assert!(up_to_date.split(10).is_empty());
    }

    #[test]
    fn test_split_chunks_are_contiguous() {
        let window = FetchWindow::new(7, at(2024, 1, 1, 0, 0), at(2024, 1, 1, 9, 0));
        let chunks = window.split(4);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].start, at(2024, 1, 1, 0, 0));
        assert_eq!(chunks[0].end, at(2024, 1, 1, 3, 0));
        assert_eq!(chunks[1].start, at(2024, 1, 1, 4, 0));
        assert_eq!(chunks[2].end, at(2024, 1, 1, 9, 0));
        assert_eq!(chunks[2].hours(), 2);
    }

    proptest! {
        #[test]
        fn prop_split_covers_window(hours in 1i64..5000, max_hours in 1i64..800) {
            let start = at(2020, 1, 1, 0, 0);
            let window = FetchWindow::new(1, start, start + Duration::hours(hours - 1));
            let chunks = window.split(max_hours);

            prop_assert_eq!(chunks.first().map(|c| c.start), Some(window.start));
            prop_assert_eq!(chunks.last().map(|c| c.end), Some(window.end));
            prop_assert_eq!(chunks.iter().map(|c| c.hours()).sum::<i64>(), window.hours());
            for pair in chunks.windows(2) {
                prop_assert_eq!(pair[0].end + Duration::hours(1), pair[1].start);
            }
            prop_assert!(chunks.iter().all(|c| c.hours() <= max_hours));
        }
    }
}
