//! 심볼 레지스트리 타입.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 수집 대상 자산.
///
/// 외부 디스커버리 프로세스가 생성하며, 수집기는 커밋 성공 후
/// `last_update`/`last_timestamp`만 갱신합니다. 삭제되지 않고
/// `include_etl = false`로 비활성화됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    /// 제공자 기준 고유 ID
    pub id: i64,
    /// 티커 (예: "BTC")
    pub ticker: String,
    /// 표시 이름
    pub name: String,
    /// 수집 대상 여부
    pub include_etl: bool,
    /// 마지막 커밋 시각
    pub last_update: Option<DateTime<Utc>>,
    /// 커밋된 데이터의 최대 타임스탬프
    pub last_timestamp: Option<DateTime<Utc>>,
    /// 레지스트리 상태 메모 (예: "New symbol")
    pub status: Option<String>,
}

impl Symbol {
    /// 수집 이력이 없는 새 심볼 생성.
    pub fn new(id: i64, ticker: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            ticker: ticker.into(),
            name: name.into(),
            include_etl: true,
            last_update: None,
            last_timestamp: None,
            status: None,
        }
    }

    /// 현재 체크포인트 (수집 이력이 없으면 `None`).
    pub fn checkpoint(&self) -> Option<Checkpoint> {
        self.last_timestamp.map(|last_timestamp| Checkpoint {
            last_timestamp,
            last_update: self.last_update,
        })
    }
}

/// 심볼별 수집 체크포인트.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// 마지막으로 커밋된 데이터 타임스탬프
    pub last_timestamp: DateTime<Utc>,
    /// 마지막 커밋 시각
    pub last_update: Option<DateTime<Utc>>,
}
