//! 수집 파이프라인 구성 요소.

pub mod checkpoint;
pub mod classifier;
pub mod commit;
pub mod harvester;
pub mod pacer;
pub mod quota;
pub mod staging;

pub use checkpoint::CheckpointStore;
pub use classifier::{ErrorClassifier, FetchOutcome};
pub use commit::{CommitCoordinator, CommitReceipt};
pub use harvester::{transition, AttemptState, Harvester, PassEnd};
pub use pacer::Pacer;
pub use quota::{QuotaDecision, QuotaLimits, QuotaTracker, QuotaWaits, QuotaWindow};
pub use staging::{CommitCadence, StagingBuffer};
