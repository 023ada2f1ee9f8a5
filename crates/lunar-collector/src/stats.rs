//! 수집 통계 구조체.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 수집 실행 통계
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarvestStats {
    /// 완료한 패스 수
    pub passes: usize,
    /// 처리한 심볼 수
    pub symbols_processed: usize,
    /// 이미 최신이라 요청하지 않은 심볼 수
    pub symbols_up_to_date: usize,
    /// 행을 스테이징한 윈도우 수
    pub windows_staged: usize,
    /// 데이터 없음 윈도우 수
    pub windows_skipped: usize,
    /// 포기한 윈도우 수 (다음 패스에서 재시도)
    pub windows_failed: usize,
    /// 총 요청 시도 수
    pub requests: usize,
    /// 재시도 횟수
    pub retries: usize,
    /// 쿼터 대기 횟수
    pub throttle_waits: usize,
    /// 스테이징한 행 수
    pub rows_staged: usize,
    /// 영구 저장소에 삽입된 행 수
    pub rows_inserted: u64,
    /// 커밋 횟수
    pub commits: usize,
    /// 커밋 실패 횟수
    pub commit_failures: usize,
    /// 소요 시간
    #[serde(skip)]
    pub elapsed: Duration,
}

impl HarvestStats {
    /// 새 통계 객체 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 요청 성공률 계산 (%)
    pub fn success_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            ((self.windows_staged + self.windows_skipped) as f64 / self.requests as f64) * 100.0
        }
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self, operation: &str) {
        tracing::info!(
            operation = operation,
            passes = self.passes,
            symbols = self.symbols_processed,
            up_to_date = self.symbols_up_to_date,
            staged = self.windows_staged,
            skipped = self.windows_skipped,
            failed = self.windows_failed,
            requests = self.requests,
            retries = self.retries,
            throttle_waits = self.throttle_waits,
            rows_staged = self.rows_staged,
            rows_inserted = self.rows_inserted,
            commits = self.commits,
            commit_failures = self.commit_failures,
            success_rate = format!("{:.1}%", self.success_rate()),
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "수집 완료"
        );
    }
}
