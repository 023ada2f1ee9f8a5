//! API 쿼터 추적.
//!
//! 쿼터는 자격 증명 하나를 모든 심볼이 공유하므로, 재시도를 포함한
//! 모든 요청 직전에 확인합니다. 스냅샷은 요청 로그에서 매번 새로 계산합니다.

use std::time::Duration;

use chrono::{DateTime, Utc};
use lunar_core::QuotaSnapshot;
use lunar_data::{DataError, HarvestStore};

/// 자격 증명별 요청 한도.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaLimits {
    pub minute: u32,
    /// `None`이면 시간 한도 없음
    pub hour: Option<u32>,
    pub day: u32,
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            minute: 10,
            hour: None,
            day: 2000,
        }
    }
}

/// 한도 도달 시 재확인까지의 대기.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaWaits {
    pub minute: Duration,
    pub hour: Duration,
    pub day: Duration,
}

impl Default for QuotaWaits {
    fn default() -> Self {
        Self {
            minute: Duration::from_secs(5),
            hour: Duration::from_secs(60),
            day: Duration::from_secs(3600),
        }
    }
}

/// 한도에 걸린 구간.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaWindow {
    Minute,
    Hour,
    Day,
}

impl std::fmt::Display for QuotaWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Minute => write!(f, "minute"),
            Self::Hour => write!(f, "hour"),
            Self::Day => write!(f, "day"),
        }
    }
}

/// 쿼터 판단 결과.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    Proceed,
    Throttle { window: QuotaWindow, wait: Duration },
}

/// 자격 증명 하나의 쿼터 추적기.
#[derive(Debug, Clone)]
pub struct QuotaTracker {
    key_name: String,
    limits: QuotaLimits,
    waits: QuotaWaits,
}

impl QuotaTracker {
    pub fn new(key_name: impl Into<String>, limits: QuotaLimits, waits: QuotaWaits) -> Self {
        Self {
            key_name: key_name.into(),
            limits,
            waits,
        }
    }

    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    /// 스냅샷 기준 요청 가능 여부.
    ///
    /// 긴 구간부터 확인하여 일 한도 소진 중에 분 단위 대기를 반복하지 않습니다.
    pub fn evaluate(&self, snapshot: &QuotaSnapshot) -> QuotaDecision {
        if snapshot.count_day >= i64::from(self.limits.day) {
            return QuotaDecision::Throttle {
                window: QuotaWindow::Day,
                wait: self.waits.day,
            };
        }
        if let Some(hour_limit) = self.limits.hour {
            if snapshot.count_hour >= i64::from(hour_limit) {
                return QuotaDecision::Throttle {
                    window: QuotaWindow::Hour,
                    wait: self.waits.hour,
                };
            }
        }
        if snapshot.count_minute >= i64::from(self.limits.minute) {
            return QuotaDecision::Throttle {
                window: QuotaWindow::Minute,
                wait: self.waits.minute,
            };
        }
        QuotaDecision::Proceed
    }

    /// 요청 로그에서 스냅샷을 계산하고 판단.
    pub async fn consult(
        &self,
        store: &dyn HarvestStore,
        now: DateTime<Utc>,
    ) -> Result<(QuotaSnapshot, QuotaDecision), DataError> {
        let snapshot = store.quota_snapshot(&self.key_name, now).await?;
        let decision = self.evaluate(&snapshot);
        Ok((snapshot, decision))
    }

    /// 로그용 사용량 문자열 (예: "3/10 & 120/2000").
    pub fn usage(&self, snapshot: &QuotaSnapshot) -> String {
        format!(
            "{}/{} & {}/{}",
            snapshot.count_minute, self.limits.minute, snapshot.count_day, self.limits.day
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> QuotaTracker {
        QuotaTracker::new(
            "key_outlook",
            QuotaLimits {
                minute: 10,
                hour: Some(300),
                day: 2000,
            },
            QuotaWaits::default(),
        )
    }

    fn snapshot(minute: i64, hour: i64, day: i64) -> QuotaSnapshot {
        QuotaSnapshot {
            key_name: "key_outlook".to_string(),
            count_minute: minute,
            count_hour: hour,
            count_day: day,
        }
    }

    #[test]
    fn test_proceed_below_limits() {
        assert_eq!(tracker().evaluate(&snapshot(9, 299, 1999)), QuotaDecision::Proceed);
    }

    #[test]
    fn test_minute_limit_throttles() {
        assert_eq!(
            tracker().evaluate(&snapshot(10, 10, 10)),
            QuotaDecision::Throttle {
                window: QuotaWindow::Minute,
                wait: Duration::from_secs(5)
            }
        );
    }

    #[test]
    fn test_hour_limit_throttles() {
        assert_eq!(
            tracker().evaluate(&snapshot(0, 300, 300)),
            QuotaDecision::Throttle {
                window: QuotaWindow::Hour,
                wait: Duration::from_secs(60)
            }
        );
    }

    #[test]
    fn test_day_limit_takes_precedence() {
        assert_eq!(
            tracker().evaluate(&snapshot(10, 300, 2000)),
            QuotaDecision::Throttle {
                window: QuotaWindow::Day,
                wait: Duration::from_secs(3600)
            }
        );
    }

    #[test]
    fn test_no_hour_limit() {
        let tracker = QuotaTracker::new("k", QuotaLimits::default(), QuotaWaits::default());
        assert_eq!(tracker.evaluate(&snapshot(0, 100_000, 0)), QuotaDecision::Proceed);
        assert_eq!(tracker.usage(&snapshot(3, 0, 120)), "3/10 & 120/2000");
    }
}
