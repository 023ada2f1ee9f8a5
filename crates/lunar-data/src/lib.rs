//! LunarCrush 수집기의 저장소/제공자 계층.
//!
//! - [`store`]: 심볼 레지스트리, 스테이징 테이블, 영구 시계열 테이블,
//!   요청 로그에 대한 저장소 추상화 (PostgreSQL, 인메모리)
//! - [`provider`]: LunarCrush 시계열 API 클라이언트

pub mod error;
pub mod provider;
pub mod store;

pub use error::{DataError, Result};
pub use provider::{lunarcrush::LunarCrushClient, MetricsSource, RawResponse};
pub use store::{
    memory::MemoryHarvestStore, postgres::PgHarvestStore, CommitTx, HarvestStore, StagedSummary,
    SymbolOrder,
};
