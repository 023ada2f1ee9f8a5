//! 스테이징 버퍼.
//!
//! 가져온 행은 먼저 스테이징 테이블에 append 되고, 커밋 시점에만
//! 영구 저장소로 이동합니다. 겹치는 윈도우로 인한 중복 타임스탬프는
//! 여기서 허용하며 커밋 시 영구 저장소의 유일성으로 걸러집니다.
//!
//! 버퍼는 커밋 주기 판단을 위해 심볼별 미커밋 행 수만 추적하고,
//! 실제 비우기는 커밋 트랜잭션이 담당합니다.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lunar_core::StagingRecord;
use lunar_data::{DataError, HarvestStore};

/// 커밋 주기.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CommitCadence {
    /// 심볼의 모든 윈도우 처리 후
    #[default]
    PerSymbol,
    /// 심볼의 미커밋 행이 N개 이상일 때
    Rows(usize),
    /// 첫 미커밋 행 이후 일정 시간 경과 시
    Interval(Duration),
}

impl std::str::FromStr for CommitCadence {
    type Err = String;

    /// `symbol`, `rows:N`, `secs:N` 형식.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if s == "symbol" {
            return Ok(Self::PerSymbol);
        }

        let (kind, value) = s
            .split_once(':')
            .ok_or_else(|| format!("Unknown commit cadence: {}", s))?;
        let n: u64 = value
            .parse()
            .map_err(|_| format!("Invalid commit cadence value: {}", value))?;
        if n == 0 {
            return Err(format!("Commit cadence must be positive: {}", s));
        }

        match kind {
            "rows" => Ok(Self::Rows(n as usize)),
            "secs" => Ok(Self::Interval(Duration::from_secs(n))),
            _ => Err(format!("Unknown commit cadence: {}", s)),
        }
    }
}

/// 스테이징 버퍼.
pub struct StagingBuffer {
    store: Arc<dyn HarvestStore>,
    pending: HashMap<i64, usize>,
    first_staged: HashMap<i64, DateTime<Utc>>,
}

impl StagingBuffer {
    pub fn new(store: Arc<dyn HarvestStore>) -> Self {
        Self {
            store,
            pending: HashMap::new(),
            first_staged: HashMap::new(),
        }
    }

    /// 행 추가. 스테이징 테이블에 기록된 행 수를 반환합니다.
    pub async fn append(
        &mut self,
        rows: &[StagingRecord],
        now: DateTime<Utc>,
    ) -> Result<usize, DataError> {
        let staged = self.store.stage(rows).await?;
        for row in rows {
            *self.pending.entry(row.symbol_id).or_insert(0) += 1;
            self.first_staged.entry(row.symbol_id).or_insert(now);
        }
        Ok(staged)
    }

    /// 심볼의 스테이징 행 (시간순).
    ///
    /// 스테이징 영역은 비우지 않습니다. 삭제는 커밋 트랜잭션 안에서만 일어납니다.
    pub async fn drain(&self, symbol_id: i64) -> Result<Vec<StagingRecord>, DataError> {
        self.store.staged(symbol_id).await
    }

    /// 이번 실행에서 스테이징했지만 아직 커밋하지 않은 행 수.
    pub fn pending(&self, symbol_id: i64) -> usize {
        self.pending.get(&symbol_id).copied().unwrap_or(0)
    }

    /// 심볼 처리 도중 커밋이 필요한지.
    pub fn should_flush(&self, cadence: CommitCadence, symbol_id: i64, now: DateTime<Utc>) -> bool {
        match cadence {
            CommitCadence::PerSymbol => false,
            CommitCadence::Rows(limit) => self.pending(symbol_id) >= limit,
            CommitCadence::Interval(interval) => {
                self.first_staged.get(&symbol_id).is_some_and(|first| {
                    (now - *first).to_std().unwrap_or(Duration::ZERO) >= interval
                })
            }
        }
    }

    /// 커밋이 영구 반영된 후 심볼의 추적 상태 초기화.
    pub fn drained(&mut self, symbol_id: i64) -> usize {
        self.first_staged.remove(&symbol_id);
        self.pending.remove(&symbol_id).unwrap_or(0)
    }
}
