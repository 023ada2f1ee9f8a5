//! 도메인 값 타입.

pub mod quota;
pub mod record;
pub mod symbol;
pub mod window;

pub use quota::{QuotaSnapshot, RequestLogEntry};
pub use record::{StagingRecord, TimeSeriesRecord};
pub use symbol::{Checkpoint, Symbol};
pub use window::{floor_to_hour, FetchWindow, HOUR_SECS};
