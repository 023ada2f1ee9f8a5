//! 시간봉 시계열 레코드.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 심볼의 한 시간 구간 지표.
///
/// 영구 저장소에서 `(symbol_id, time)` 조합은 유일합니다.
/// 제공자가 생략할 수 있는 지표는 모두 `Option`입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesRecord {
    pub symbol_id: i64,
    /// 시간봉 시작 시각 (정시)
    pub time: DateTime<Utc>,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub close: Option<Decimal>,
    /// 24시간 거래량
    pub volume_24h: Option<Decimal>,
    pub market_cap: Option<Decimal>,
    pub circulating_supply: Option<Decimal>,
    /// 감성 점수 (0-100)
    pub sentiment: Option<f64>,
    pub contributors_active: Option<i64>,
    pub contributors_created: Option<i64>,
    pub posts_active: Option<i64>,
    pub posts_created: Option<i64>,
    pub interactions: Option<i64>,
    /// 소셜 점유율 (%)
    pub social_dominance: Option<f64>,
    pub galaxy_score: Option<f64>,
    pub volatility: Option<f64>,
    pub alt_rank: Option<i64>,
    pub spam: Option<i64>,
}

/// 커밋 전 스테이징 영역에 머무는 레코드 (형태는 동일).
pub type StagingRecord = TimeSeriesRecord;

impl TimeSeriesRecord {
    /// 지표가 비어 있는 레코드 생성.
    pub fn empty(symbol_id: i64, time: DateTime<Utc>) -> Self {
        Self {
            symbol_id,
            time,
            open: None,
            high: None,
            low: None,
            close: None,
            volume_24h: None,
            market_cap: None,
            circulating_supply: None,
            sentiment: None,
            contributors_active: None,
            contributors_created: None,
            posts_active: None,
            posts_created: None,
            interactions: None,
            social_dominance: None,
            galaxy_score: None,
            volatility: None,
            alt_rank: None,
            spam: None,
        }
    }

    /// Unix 타임스탬프 (초).
    pub fn time_unix(&self) -> i64 {
        self.time.timestamp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_time_unix_matches_timestamp() {
        let time = DateTime::from_timestamp(1_704_067_200, 0).unwrap();
        let mut record = TimeSeriesRecord::empty(3, time);
        record.close = Some(dec!(42000.5));

        assert_eq!(record.time_unix(), 1_704_067_200);
        assert_eq!(record.close, Some(dec!(42000.5)));
        assert!(record.sentiment.is_none());
    }
}
