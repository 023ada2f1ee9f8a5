//! LunarCrush 시간봉 증분 수집기.
//!
//! 심볼별 체크포인트에서 다음 윈도우를 계산하고, 공유 API 쿼터 안에서
//! 요청/재시도하며, 가져온 행을 스테이징했다가 원자적으로 커밋합니다:
//!
//! ```text
//! Harvester → QuotaTracker → fetch → ErrorClassifier
//!           → { StagingBuffer | backoff + retry | skip }
//!           → CommitCoordinator (staging → lunar_data, checkpoint)
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod modules;
pub mod stats;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CollectorConfig;
pub use error::{CollectorError, Result};
pub use stats::HarvestStats;
