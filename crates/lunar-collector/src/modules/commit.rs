//! 스테이징 → 영구 저장소 커밋.
//!
//! 한 트랜잭션 안에서 다음을 수행합니다:
//!
//! 1. 심볼의 스테이징 행을 `lunar_data`로 병합 (중복 타임스탬프는 건너뜀)
//! 2. 심볼의 스테이징 행 삭제
//! 3. 스테이징 행의 최대 타임스탬프로 체크포인트 전진
//!
//! 어느 단계든 실패하면 트랜잭션이 drop 되어 전부 롤백됩니다. 스테이징 행은
//! 그대로 남아 다음 커밋에서 다시 시도되고, 체크포인트는 변하지 않습니다.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use lunar_data::{DataError, HarvestStore};
use tracing::instrument;

use super::checkpoint::CheckpointStore;
use super::staging::StagingBuffer;

/// 커밋 결과.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    pub symbol_id: i64,
    /// 이동한 스테이징 행 수 (중복 포함)
    pub staged: u64,
    /// 영구 저장소에 새로 삽입된 행 수
    pub inserted: u64,
    /// 커밋 후 체크포인트 (스테이징이 비어 있었으면 `None`)
    pub checkpoint: Option<DateTime<Utc>>,
    pub elapsed: Duration,
}

impl CommitReceipt {
    pub fn is_noop(&self) -> bool {
        self.staged == 0
    }
}

/// 커밋 조정자.
#[derive(Clone)]
pub struct CommitCoordinator {
    store: Arc<dyn HarvestStore>,
    checkpoints: CheckpointStore,
}

impl CommitCoordinator {
    pub fn new(store: Arc<dyn HarvestStore>, checkpoints: CheckpointStore) -> Self {
        Self { store, checkpoints }
    }

    /// 심볼의 스테이징 행을 원자적으로 커밋.
    ///
    /// 이전 실행에서 남은 스테이징 행도 함께 커밋됩니다.
    #[instrument(skip(self, staging))]
    pub async fn commit(
        &self,
        staging: &mut StagingBuffer,
        symbol_id: i64,
        commit_time: DateTime<Utc>,
    ) -> Result<CommitReceipt, DataError> {
        let started = Instant::now();
        let mut tx = self.store.begin().await?;

        let summary = tx.staged_summary(symbol_id).await?;
        let Some(max_time) = summary.max_time else {
            staging.drained(symbol_id);
            return Ok(CommitReceipt {
                symbol_id,
                staged: 0,
                inserted: 0,
                checkpoint: None,
                elapsed: started.elapsed(),
            });
        };

        let inserted = tx.merge_staged(symbol_id).await?;
        let cleared = tx.clear_staged(symbol_id).await?;
        self.checkpoints
            .advance(tx.as_mut(), symbol_id, max_time, commit_time)
            .await?;
        tx.commit().await?;

        staging.drained(symbol_id);

        tracing::debug!(
            symbol_id,
            staged = summary.rows,
            cleared,
            inserted,
            checkpoint = %max_time,
            "스테이징 커밋 완료"
        );

        Ok(CommitReceipt {
            symbol_id,
            staged: summary.rows,
            inserted,
            checkpoint: Some(max_time),
            elapsed: started.elapsed(),
        })
    }
}
