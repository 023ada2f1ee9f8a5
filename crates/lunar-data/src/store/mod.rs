//! 수집 상태 저장소 추상화.
//!
//! 수집기는 네 가지 영속 상태를 다룹니다:
//!
//! | 테이블 | 역할 |
//! |--------|------|
//! | `symbols` | 심볼 레지스트리와 체크포인트 (`last_timestamp`, `last_update`) |
//! | `lunar_data_staging` | 커밋 전 레코드 (append-only, 커밋 시에만 비움) |
//! | `lunar_data` | 영구 시계열 (`(symbol_id, time_unix)` 유일) |
//! | `api_request_log` | 자격 증명별 요청 로그 (쿼터 계산) |
//!
//! 스테이징 → 영구 저장소 이동과 체크포인트 갱신은 [`CommitTx`] 하나의
//! 작업 단위 안에서 수행됩니다. `commit()` 없이 drop된 트랜잭션은 롤백됩니다.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lunar_core::{Checkpoint, QuotaSnapshot, RequestLogEntry, Symbol, TimeSeriesRecord};
use serde::{Deserialize, Serialize};

use crate::Result;

/// 한 패스에서 심볼을 방문하는 순서.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolOrder {
    /// 마지막 커밋이 가장 오래된 심볼부터 (이력 없는 심볼 우선)
    #[default]
    Staleness,
    /// 심볼 ID 오름차순
    Id,
}

impl std::str::FromStr for SymbolOrder {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "staleness" | "last_update" => Ok(Self::Staleness),
            "id" | "symbol_id" => Ok(Self::Id),
            _ => Err(format!("Unknown symbol order: {}", s)),
        }
    }
}

/// 심볼 하나의 스테이징 현황.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StagedSummary {
    /// 스테이징된 행 수 (중복 포함)
    pub rows: u64,
    /// 스테이징된 행 중 최대 타임스탬프
    pub max_time: Option<DateTime<Utc>>,
}

/// 수집 상태 저장소.
#[async_trait]
pub trait HarvestStore: Send + Sync {
    /// `include_etl = true`인 심볼 목록.
    ///
    /// `only`가 비어 있지 않으면 해당 ID만 반환합니다.
    async fn eligible_symbols(&self, order: SymbolOrder, only: &[i64]) -> Result<Vec<Symbol>>;

    /// 심볼의 현재 체크포인트 (수집 이력이 없으면 `None`).
    ///
    /// # Errors
    ///
    /// - `DataError::NotFound`: 레지스트리에 없는 심볼
    async fn load_checkpoint(&self, symbol_id: i64) -> Result<Option<Checkpoint>>;

    /// 스테이징 테이블에 행 추가. 추가된 행 수를 반환합니다.
    ///
    /// 전부 추가되거나 하나도 추가되지 않습니다.
    async fn stage(&self, rows: &[TimeSeriesRecord]) -> Result<usize>;

    /// 심볼의 스테이징 행 조회 (시간순). 삭제하지 않습니다.
    async fn staged(&self, symbol_id: i64) -> Result<Vec<TimeSeriesRecord>>;

    /// API 요청 기록.
    async fn log_request(&self, entry: &RequestLogEntry) -> Result<()>;

    /// `now` 기준 롤링 분/시/일 요청 수.
    ///
    /// 요청은 `requested_at > now - 구간`일 때 해당 구간에 포함됩니다.
    async fn quota_snapshot(&self, key_name: &str, now: DateTime<Utc>) -> Result<QuotaSnapshot>;

    /// 커밋 작업 단위 시작.
    async fn begin(&self) -> Result<Box<dyn CommitTx>>;
}

/// 스테이징 → 영구 저장소 이동을 위한 작업 단위.
#[async_trait]
pub trait CommitTx: Send {
    /// 심볼의 스테이징 현황.
    async fn staged_summary(&mut self, symbol_id: i64) -> Result<StagedSummary>;

    /// 스테이징된 행을 영구 저장소로 병합.
    ///
    /// 이미 존재하는 `(symbol_id, time)`은 건너뜁니다. 실제 삽입된 행 수를 반환합니다.
    async fn merge_staged(&mut self, symbol_id: i64) -> Result<u64>;

    /// 심볼의 스테이징 행 삭제.
    async fn clear_staged(&mut self, symbol_id: i64) -> Result<u64>;

    /// 체크포인트 갱신: `last_timestamp = max(기존, last_time)`, `last_update = commit_time`.
    async fn advance_checkpoint(
        &mut self,
        symbol_id: i64,
        last_time: DateTime<Utc>,
        commit_time: DateTime<Utc>,
    ) -> Result<()>;

    /// 모든 변경을 확정.
    async fn commit(self: Box<Self>) -> Result<()>;
}
