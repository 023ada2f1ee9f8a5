//! LunarCrush 시간봉 수집기의 핵심 도메인 타입.
//!
//! 이 crate는 수집기 전체에서 공유하는 값 타입을 정의합니다:
//! - 심볼 레지스트리 ([`Symbol`], [`Checkpoint`])
//! - 시계열 레코드 ([`TimeSeriesRecord`])
//! - 수집 윈도우 ([`FetchWindow`])와 시간 정렬 헬퍼
//! - API 사용량 스냅샷 ([`QuotaSnapshot`])
//! - tracing 기반 로깅 초기화

pub mod logging;
pub mod types;

pub use types::*;
