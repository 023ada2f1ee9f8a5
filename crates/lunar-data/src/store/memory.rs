//! 인메모리 저장소.
//!
//! PostgreSQL 저장소와 같은 의미(유일성, 원자적 커밋, 롤링 쿼터)를
//! 프로세스 메모리에서 제공합니다. 테스트와 로컬 검증에 사용하며,
//! 다음 스테이징이나 병합을 실패시키는 오류 주입을 지원합니다.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use lunar_core::{Checkpoint, QuotaSnapshot, RequestLogEntry, Symbol, TimeSeriesRecord};
use tokio::sync::Mutex;

use super::{CommitTx, HarvestStore, StagedSummary, SymbolOrder};
use crate::error::{DataError, Result};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    symbols: BTreeMap<i64, Symbol>,
    staging: Vec<TimeSeriesRecord>,
    /// (symbol_id, time_unix) → 레코드
    permanent: BTreeMap<(i64, i64), TimeSeriesRecord>,
    request_log: Vec<RequestLogEntry>,
}

/// 인메모리 수집 상태 저장소.
#[derive(Clone, Default)]
pub struct MemoryHarvestStore {
    state: Arc<Mutex<MemoryState>>,
    fail_next_merge: Arc<AtomicBool>,
    fail_next_stage: Arc<AtomicBool>,
}

impl MemoryHarvestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 심볼 등록 (같은 ID가 있으면 교체).
    pub async fn insert_symbol(&self, symbol: Symbol) {
        self.state.lock().await.symbols.insert(symbol.id, symbol);
    }

    pub async fn symbol(&self, symbol_id: i64) -> Option<Symbol> {
        self.state.lock().await.symbols.get(&symbol_id).cloned()
    }

    /// 영구 저장소의 심볼 레코드 (시간순).
    pub async fn permanent_rows(&self, symbol_id: i64) -> Vec<TimeSeriesRecord> {
        self.state
            .lock()
            .await
            .permanent
            .range((symbol_id, i64::MIN)..=(symbol_id, i64::MAX))
            .map(|(_, record)| record.clone())
            .collect()
    }

    /// 스테이징 영역의 심볼 레코드 (추가 순서).
    pub async fn staged_rows(&self, symbol_id: i64) -> Vec<TimeSeriesRecord> {
        self.state
            .lock()
            .await
            .staging
            .iter()
            .filter(|r| r.symbol_id == symbol_id)
            .cloned()
            .collect()
    }

    pub async fn requests(&self) -> Vec<RequestLogEntry> {
        self.state.lock().await.request_log.clone()
    }

    /// 다음 `merge_staged` 호출을 실패시킴.
    pub fn fail_next_merge(&self) {
        self.fail_next_merge.store(true, Ordering::SeqCst);
    }

    /// 다음 `stage` 호출을 마지막 행에서 실패시킴.
    pub fn fail_next_stage(&self) {
        self.fail_next_stage.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl HarvestStore for MemoryHarvestStore {
    async fn eligible_symbols(&self, order: SymbolOrder, only: &[i64]) -> Result<Vec<Symbol>> {
        let state = self.state.lock().await;
        let mut symbols: Vec<Symbol> = state
            .symbols
            .values()
            .filter(|s| s.include_etl)
            .filter(|s| only.is_empty() || only.contains(&s.id))
            .cloned()
            .collect();

        if order == SymbolOrder::Staleness {
            // None(이력 없음)이 가장 먼저 정렬됨
            symbols.sort_by_key(|s| (s.last_update, s.id));
        }
        Ok(symbols)
    }

    async fn load_checkpoint(&self, symbol_id: i64) -> Result<Option<Checkpoint>> {
        let state = self.state.lock().await;
        let symbol = state
            .symbols
            .get(&symbol_id)
            .ok_or_else(|| DataError::NotFound(format!("symbol {}", symbol_id)))?;
        Ok(symbol.checkpoint())
    }

    async fn stage(&self, rows: &[TimeSeriesRecord]) -> Result<usize> {
        let mut state = self.state.lock().await;
        let mut batch = Vec::with_capacity(rows.len());
        for (idx, record) in rows.iter().enumerate() {
            if idx + 1 == rows.len() && self.fail_next_stage.swap(false, Ordering::SeqCst) {
                return Err(DataError::InjectedFault(format!(
                    "stage failed at row {} of symbol {}",
                    idx, record.symbol_id
                )));
            }
            batch.push(record.clone());
        }
        state.staging.extend(batch);
        Ok(rows.len())
    }

    async fn staged(&self, symbol_id: i64) -> Result<Vec<TimeSeriesRecord>> {
        let mut rows = self.staged_rows(symbol_id).await;
        rows.sort_by_key(|r| r.time);
        Ok(rows)
    }

    async fn log_request(&self, entry: &RequestLogEntry) -> Result<()> {
        self.state.lock().await.request_log.push(entry.clone());
        Ok(())
    }

    async fn quota_snapshot(&self, key_name: &str, now: DateTime<Utc>) -> Result<QuotaSnapshot> {
        let state = self.state.lock().await;
        let count_since = |span: Duration| {
            state
                .request_log
                .iter()
                .filter(|e| e.key_name == key_name && e.requested_at > now - span)
                .count() as i64
        };

        Ok(QuotaSnapshot {
            key_name: key_name.to_string(),
            count_minute: count_since(Duration::minutes(1)),
            count_hour: count_since(Duration::hours(1)),
            count_day: count_since(Duration::days(1)),
        })
    }

    async fn begin(&self) -> Result<Box<dyn CommitTx>> {
        let working = self.state.lock().await.clone();
        Ok(Box::new(MemoryCommitTx {
            shared: Arc::clone(&self.state),
            fail_next_merge: Arc::clone(&self.fail_next_merge),
            working,
        }))
    }
}

/// 작업 사본에 변경을 모았다가 `commit()` 시 한 번에 반영하는 작업 단위.
pub struct MemoryCommitTx {
    shared: Arc<Mutex<MemoryState>>,
    fail_next_merge: Arc<AtomicBool>,
    working: MemoryState,
}

#[async_trait]
impl CommitTx for MemoryCommitTx {
    async fn staged_summary(&mut self, symbol_id: i64) -> Result<StagedSummary> {
        let staged = self.working.staging.iter().filter(|r| r.symbol_id == symbol_id);
        let mut summary = StagedSummary::default();
        for record in staged {
            summary.rows += 1;
            summary.max_time = summary.max_time.max(Some(record.time));
        }
        Ok(summary)
    }

    async fn merge_staged(&mut self, symbol_id: i64) -> Result<u64> {
        if self.fail_next_merge.swap(false, Ordering::SeqCst) {
            return Err(DataError::InjectedFault(format!(
                "merge failed for symbol {}",
                symbol_id
            )));
        }

        // 나중에 스테이징된 행이 우선
        let mut latest: BTreeMap<i64, &TimeSeriesRecord> = BTreeMap::new();
        for record in self.working.staging.iter().filter(|r| r.symbol_id == symbol_id) {
            latest.insert(record.time_unix(), record);
        }

        let mut inserted = 0;
        for (time_unix, record) in latest {
            let key = (symbol_id, time_unix);
            if !self.working.permanent.contains_key(&key) {
                self.working.permanent.insert(key, record.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn clear_staged(&mut self, symbol_id: i64) -> Result<u64> {
        let before = self.working.staging.len();
        self.working.staging.retain(|r| r.symbol_id != symbol_id);
        Ok((before - self.working.staging.len()) as u64)
    }

    async fn advance_checkpoint(
        &mut self,
        symbol_id: i64,
        last_time: DateTime<Utc>,
        commit_time: DateTime<Utc>,
    ) -> Result<()> {
        let symbol = self
            .working
            .symbols
            .get_mut(&symbol_id)
            .ok_or_else(|| DataError::NotFound(format!("symbol {}", symbol_id)))?;

        symbol.last_timestamp = symbol.last_timestamp.max(Some(last_time));
        symbol.last_update = Some(commit_time);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut shared = self.shared.lock().await;
        // 요청 로그는 트랜잭션 대상이 아님
        shared.symbols = self.working.symbols;
        shared.staging = self.working.staging;
        shared.permanent = self.working.permanent;
        Ok(())
    }
}
