//! 에러 타입 정의.

use lunar_data::DataError;
use thiserror::Error;

/// Collector 에러 타입
#[derive(Debug, Error)]
pub enum CollectorError {
    /// 저장소 에러
    #[error("Storage error: {0}")]
    Store(#[from] DataError),

    /// 설정 에러
    #[error("Configuration error: {0}")]
    Config(String),

    /// 연속 커밋 실패로 수집 중단
    #[error("Commit halted after {failures} consecutive failures: {last}")]
    CommitHalted {
        failures: u32,
        #[source]
        last: DataError,
    },
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, CollectorError>;
