//! 심볼별 수집 체크포인트.
//!
//! 체크포인트는 `symbols.last_timestamp`(커밋된 최대 타임스탬프)와
//! `symbols.last_update`(마지막 커밋 시각)입니다.
//!
//! - 체크포인트 없음: `epoch` ~ `floor_hour(now) - 1h`
//! - 체크포인트 있음: `floor_hour(last_timestamp) + 1h` ~ `floor_hour(now) - 1h`
//!
//! 시간봉의 `time`은 구간 시작이므로 `floor_hour(now)` 봉은 아직 진행 중이며
//! 수집하지 않습니다.
//!
//! 갱신은 [`CommitCoordinator`](super::commit::CommitCoordinator)가 커밋
//! 트랜잭션 안에서만 수행하며, 값은 절대 뒤로 가지 않습니다.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use lunar_core::{floor_to_hour, Checkpoint, FetchWindow};
use lunar_data::{CommitTx, DataError, HarvestStore};

/// 체크포인트로부터 다음 수집 윈도우 계산.
///
/// 마지막 포함 봉은 완전히 끝난 직전 시간봉입니다.
pub fn window_after(
    symbol_id: i64,
    checkpoint: Option<&Checkpoint>,
    epoch: DateTime<Utc>,
    now: DateTime<Utc>,
) -> FetchWindow {
    let start = match checkpoint {
        Some(cp) => floor_to_hour(cp.last_timestamp) + Duration::hours(1),
        None => floor_to_hour(epoch),
    };
    let last_closed = floor_to_hour(now) - Duration::hours(1);
    FetchWindow::new(symbol_id, start, last_closed)
}

/// 체크포인트 저장소.
#[derive(Clone)]
pub struct CheckpointStore {
    store: Arc<dyn HarvestStore>,
    epoch: DateTime<Utc>,
}

impl CheckpointStore {
    pub fn new(store: Arc<dyn HarvestStore>, epoch: DateTime<Utc>) -> Self {
        Self { store, epoch }
    }

    pub async fn load(&self, symbol_id: i64) -> Result<Option<Checkpoint>, DataError> {
        self.store.load_checkpoint(symbol_id).await
    }

    /// 최신 체크포인트 기준 다음 윈도우.
    pub async fn next_window(
        &self,
        symbol_id: i64,
        now: DateTime<Utc>,
    ) -> Result<FetchWindow, DataError> {
        let checkpoint = self.load(symbol_id).await?;
        Ok(window_after(symbol_id, checkpoint.as_ref(), self.epoch, now))
    }

    /// 커밋 트랜잭션 안에서 체크포인트 전진.
    ///
    /// 완전히 반영되는 커밋에서만 호출해야 합니다.
    pub async fn advance(
        &self,
        tx: &mut dyn CommitTx,
        symbol_id: i64,
        new_last_timestamp: DateTime<Utc>,
        commit_time: DateTime<Utc>,
    ) -> Result<(), DataError> {
        tx.advance_checkpoint(symbol_id, new_last_timestamp, commit_time)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use lunar_core::Symbol;
    use lunar_data::MemoryHarvestStore;
    use proptest::prelude::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn epoch() -> DateTime<Utc> {
        at(2019, 1, 1, 0, 0)
    }

    #[test]
    fn test_window_without_checkpoint_starts_at_epoch() {
        let window = window_after(1, None, epoch(), at(2024, 6, 1, 13, 47));
        assert_eq!(window.start, at(2019, 1, 1, 0, 0));
        assert_eq!(window.end, at(2024, 6, 1, 12, 0));
    }

    #[test]
    fn test_window_resumes_one_hour_after_checkpoint() {
        let checkpoint = Checkpoint {
            last_timestamp: at(2024, 6, 1, 9, 0),
            last_update: None,
        };
        let window = window_after(1, Some(&checkpoint), epoch(), at(2024, 6, 1, 13, 5));
        assert_eq!(window.start, at(2024, 6, 1, 10, 0));
        assert_eq!(window.end, at(2024, 6, 1, 12, 0));
        assert_eq!(window.hours(), 3);
    }

    #[test]
    fn test_window_is_empty_when_up_to_date() {
        let checkpoint = Checkpoint {
            last_timestamp: at(2024, 6, 1, 13, 0),
            last_update: None,
        };
        let window = window_after(1, Some(&checkpoint), epoch(), at(2024, 6, 1, 13, 59));
        assert!(window.is_empty());
    }

    #[test]
    fn test_in_progress_hour_is_excluded() {
        // 12:30 시점의 12:00 봉은 아직 끝나지 않음
        let checkpoint = Checkpoint {
            last_timestamp: at(2024, 6, 1, 11, 0),
            last_update: None,
        };
        let window = window_after(1, Some(&checkpoint), epoch(), at(2024, 6, 1, 12, 30));
        assert!(window.is_empty());
        assert!(!window.contains(at(2024, 6, 1, 12, 0)));

        let window = window_after(1, Some(&checkpoint), epoch(), at(2024, 6, 1, 13, 0));
        assert_eq!(window.start, at(2024, 6, 1, 12, 0));
        assert_eq!(window.end, at(2024, 6, 1, 12, 0));
        assert_eq!(window.hours(), 1);
    }

    #[tokio::test]
    async fn test_next_window_reads_latest_checkpoint() {
        let store = MemoryHarvestStore::new();
        let mut symbol = Symbol::new(5, "ADA", "Cardano");
        symbol.last_timestamp = Some(at(2024, 1, 1, 5, 0));
        store.insert_symbol(symbol).await;

        let checkpoints = CheckpointStore::new(Arc::new(store.clone()), at(2019, 1, 1, 0, 0));
        let window = checkpoints.next_window(5, at(2024, 1, 1, 8, 30)).await.unwrap();
        assert_eq!(window.start, at(2024, 1, 1, 6, 0));

        let mut tx = store.begin().await.unwrap();
        checkpoints
            .advance(tx.as_mut(), 5, at(2024, 1, 1, 7, 0), at(2024, 1, 1, 8, 30))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let window = checkpoints.next_window(5, at(2024, 1, 1, 8, 30)).await.unwrap();
        assert_eq!(window.start, at(2024, 1, 1, 8, 0));
        assert!(window.is_empty());

        let window = checkpoints.next_window(5, at(2024, 1, 1, 9, 0)).await.unwrap();
        assert_eq!(window.hours(), 1);
    }

    #[tokio::test]
    async fn test_unknown_symbol_is_not_found() {
        let checkpoints =
            CheckpointStore::new(Arc::new(MemoryHarvestStore::new()), at(2019, 1, 1, 0, 0));
        assert!(matches!(
            checkpoints.next_window(99, at(2024, 1, 1, 0, 0)).await,
            Err(DataError::NotFound(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_window_never_overlaps_checkpoint(
            last_secs in 1_546_300_800i64..1_700_000_000,
            ahead_secs in 0i64..10_000_000,
        ) {
            let last = DateTime::from_timestamp(last_secs, 0).unwrap();
            let now = last + Duration::seconds(ahead_secs);
            let checkpoint = Checkpoint { last_timestamp: last, last_update: None };
            let window = window_after(1, Some(&checkpoint), epoch(), now);

            prop_assert!(window.start > last);
            prop_assert_eq!(window.start.timestamp() % 3600, 0);
            prop_assert_eq!(window.end.timestamp() % 3600, 0);
            prop_assert!(window.end + Duration::hours(1) <= now);
        }
    }
}
