//! API 사용량 타입.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 자격 증명별 롤링 요청 수.
///
/// 요청 로그에서 매번 다시 계산되는 읽기 전용 뷰이며 반복 간 캐시하지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    pub key_name: String,
    /// 최근 1분 요청 수
    pub count_minute: i64,
    /// 최근 1시간 요청 수
    pub count_hour: i64,
    /// 최근 24시간 요청 수
    pub count_day: i64,
}

impl QuotaSnapshot {
    /// 사용 이력이 없는 스냅샷.
    pub fn idle(key_name: impl Into<String>) -> Self {
        Self {
            key_name: key_name.into(),
            count_minute: 0,
            count_hour: 0,
            count_day: 0,
        }
    }
}

/// 요청 로그 항목.
///
/// 모든 fetch 시도는 요청 전에 기록되어 쿼터 계산에 반영됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLogEntry {
    /// 서비스 이름 (예: "LunarCrush")
    pub service: String,
    /// 사용한 API 키 이름
    pub key_name: String,
    pub requested_at: DateTime<Utc>,
    /// 요청을 발생시킨 작업
    pub function_name: String,
    pub url: String,
}
