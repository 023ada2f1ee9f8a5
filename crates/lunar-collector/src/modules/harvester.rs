//! 수집 제어 루프.
//!
//! 심볼 하나를 처리하는 흐름:
//!
//! ```text
//! next_window → split → [quota gate → log → fetch → classify]* → commit
//! ```
//!
//! 요청은 항상 하나씩만 진행됩니다. 쿼터는 자격 증명 단위로 공유되므로
//! 재시도를 포함한 모든 시도 전에 확인합니다.

use std::sync::Arc;
use std::time::{Duration, Instant};

use lunar_core::{FetchWindow, QuotaSnapshot, RequestLogEntry, Symbol};
use lunar_data::{HarvestStore, MetricsSource};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::checkpoint::CheckpointStore;
use super::classifier::{ErrorClassifier, FetchOutcome};
use super::commit::CommitCoordinator;
use super::pacer::Pacer;
use super::quota::{QuotaDecision, QuotaTracker};
use super::staging::StagingBuffer;
use crate::clock::Clock;
use crate::config::{HarvestConfig, QuotaConfig};
use crate::error::CollectorError;
use crate::stats::HarvestStats;
use crate::Result;

/// 요청 로그의 function_name 값
const FUNCTION_NAME: &str = "harvest_time_series";

/// (심볼, 윈도우) 시도 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    /// 요청 진행 중 (재시도 대기 후에도 이 상태로 돌아옴)
    Fetching,
    /// 행을 스테이징함. 커밋 주기에 따라 영구 저장소로 이동
    Committed { rows: usize },
    /// 데이터 없음
    Skipped,
    /// 대기 후 같은 윈도우 재시도
    BackoffThenRetry { wait: Duration },
    /// 이번 패스에서 윈도우 포기
    Failed,
}

/// 분류 결과에서 다음 상태 결정.
///
/// `retries`는 이 윈도우에서 이미 수행한 재시도 횟수입니다.
pub fn transition(outcome: &FetchOutcome, retries: u32, max_retries: Option<u32>) -> AttemptState {
    match outcome {
        FetchOutcome::Success(rows) => AttemptState::Committed { rows: rows.len() },
        FetchOutcome::EmptyResult => AttemptState::Skipped,
        FetchOutcome::RateLimited { wait } | FetchOutcome::ServerUnavailable { wait, .. } => {
            match max_retries {
                Some(max) if retries >= max => AttemptState::Failed,
                _ => AttemptState::BackoffThenRetry { wait: *wait },
            }
        }
        FetchOutcome::ClientError { .. }
        | FetchOutcome::ParseFailure(_)
        | FetchOutcome::TransportFailure(_) => AttemptState::Failed,
    }
}

/// 패스 종료 사유.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassEnd {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowEnd {
    Staged,
    Skipped,
    Failed,
    Cancelled,
}

/// 증분 수집기.
pub struct Harvester {
    store: Arc<dyn HarvestStore>,
    source: Arc<dyn MetricsSource>,
    clock: Arc<dyn Clock>,
    quota: QuotaTracker,
    pacer: Pacer,
    classifier: ErrorClassifier,
    checkpoints: CheckpointStore,
    committer: CommitCoordinator,
    staging: StagingBuffer,
    config: HarvestConfig,
    cancel: CancellationToken,
    stats: HarvestStats,
    /// 연속 커밋 실패 횟수
    commit_failures: u32,
}

impl Harvester {
    pub fn new(
        store: Arc<dyn HarvestStore>,
        source: Arc<dyn MetricsSource>,
        clock: Arc<dyn Clock>,
        quota: QuotaConfig,
        config: HarvestConfig,
        cancel: CancellationToken,
    ) -> Self {
        let pacer = config
            .pacing()
            .map(Pacer::new)
            .unwrap_or_else(|| Pacer::from_minute_limit(quota.limits.minute));
        let checkpoints = CheckpointStore::new(Arc::clone(&store), config.epoch_datetime());

        Self {
            quota: QuotaTracker::new(quota.key_name, quota.limits, quota.waits),
            pacer,
            classifier: ErrorClassifier::new(config.rate_limit_wait(), config.server_wait()),
            committer: CommitCoordinator::new(Arc::clone(&store), checkpoints.clone()),
            checkpoints,
            staging: StagingBuffer::new(Arc::clone(&store)),
            store,
            source,
            clock,
            config,
            cancel,
            stats: HarvestStats::new(),
            commit_failures: 0,
        }
    }

    pub fn stats(&self) -> &HarvestStats {
        &self.stats
    }

    /// 중단 신호를 받을 때까지 패스를 반복.
    pub async fn run(&mut self) -> Result<HarvestStats> {
        let started = Instant::now();
        info!(
            key = self.quota.key_name(),
            pacing_ms = self.pacer.interval().as_millis() as u64,
            cadence = ?self.config.commit_cadence,
            "수집기 시작"
        );

        loop {
            if self.run_pass().await? == PassEnd::Cancelled {
                break;
            }
            debug!(idle_secs = self.config.idle_secs, "다음 패스까지 대기");
            if !self.pause(self.config.idle()).await {
                break;
            }
        }

        info!(symbols = self.stats.symbols_processed, "중단 신호 수신, 수집기 종료");
        self.stats.elapsed = started.elapsed();
        Ok(self.stats.clone())
    }

    /// 패스 한 번만 실행.
    pub async fn run_once(&mut self) -> Result<HarvestStats> {
        let started = Instant::now();
        self.run_pass().await?;
        self.stats.elapsed = started.elapsed();
        Ok(self.stats.clone())
    }

    /// 수집 대상 심볼 전체를 한 번 순회.
    pub async fn run_pass(&mut self) -> Result<PassEnd> {
        let symbols = self
            .store
            .eligible_symbols(self.config.symbol_order, &self.config.symbols)
            .await?;
        info!(count = symbols.len(), order = ?self.config.symbol_order, "패스 시작");

        for (idx, symbol) in symbols.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Ok(PassEnd::Cancelled);
            }
            debug!(
                progress = format!("{}/{}", idx + 1, symbols.len()),
                ticker = %symbol.ticker,
                "심볼 처리"
            );
            if self.harvest_symbol(symbol).await? == PassEnd::Cancelled {
                return Ok(PassEnd::Cancelled);
            }
        }

        self.stats.passes += 1;
        info!(pass = self.stats.passes, symbols = symbols.len(), "패스 완료");
        Ok(PassEnd::Completed)
    }

    async fn harvest_symbol(&mut self, symbol: &Symbol) -> Result<PassEnd> {
        let now = self.clock.now();
        let window = self.checkpoints.next_window(symbol.id, now).await?;
        if window.is_empty() {
            debug!(symbol_id = symbol.id, ticker = %symbol.ticker, "이미 최신 상태");
            self.stats.symbols_up_to_date += 1;
            self.flush(symbol.id).await?;
            return Ok(PassEnd::Completed);
        }

        let chunks = window.split(self.config.max_window_hours());
        info!(
            symbol_id = symbol.id,
            ticker = %symbol.ticker,
            window = %window,
            hours = window.hours(),
            chunks = chunks.len(),
            "심볼 수집 시작"
        );

        let mut end = PassEnd::Completed;
        for chunk in &chunks {
            match self.harvest_window(symbol, chunk).await? {
                WindowEnd::Staged | WindowEnd::Skipped => {}
                // 뒤 윈도우를 먼저 커밋하면 체크포인트가 실패 구간을 건너뜀
                WindowEnd::Failed => break,
                WindowEnd::Cancelled => {
                    end = PassEnd::Cancelled;
                    break;
                }
            }
            if end == PassEnd::Completed
                && self
                    .staging
                    .should_flush(self.config.commit_cadence, symbol.id, self.clock.now())
            {
                self.flush(symbol.id).await?;
            }
        }

        self.flush(symbol.id).await?;
        self.stats.symbols_processed += 1;
        Ok(end)
    }

    async fn harvest_window(&mut self, symbol: &Symbol, window: &FetchWindow) -> Result<WindowEnd> {
        let mut retries = 0u32;

        loop {
            let Some(snapshot) = self.wait_for_quota().await? else {
                return Ok(WindowEnd::Cancelled);
            };

            let started = self.clock.now();
            self.store
                .log_request(&RequestLogEntry {
                    service: self.source.service().to_string(),
                    key_name: self.quota.key_name().to_string(),
                    requested_at: started,
                    function_name: FUNCTION_NAME.to_string(),
                    url: self.source.request_url(window),
                })
                .await?;
            self.stats.requests += 1;

            let fetch_started = Instant::now();
            let raw = self.source.fetch(window).await;
            let fetch_ms = fetch_started.elapsed().as_millis() as u64;
            let outcome = self.classifier.classify(window, raw);
            let state = transition(&outcome, retries, self.config.max_retries);

            let end = match (state, outcome) {
                (AttemptState::Committed { rows }, FetchOutcome::Success(records)) => {
                    let staged = self.staging.append(&records, self.clock.now()).await?;
                    self.stats.rows_staged += staged;
                    self.stats.windows_staged += 1;
                    info!(
                        symbol_id = symbol.id,
                        ticker = %symbol.ticker,
                        window = %window,
                        rows,
                        pending = self.staging.pending(symbol.id),
                        usage = self.quota.usage(&snapshot),
                        fetch_ms,
                        "스테이징 완료"
                    );
                    Some(WindowEnd::Staged)
                }
                (AttemptState::Skipped, _) => {
                    self.stats.windows_skipped += 1;
                    info!(
                        symbol_id = symbol.id,
                        ticker = %symbol.ticker,
                        window = %window,
                        "데이터 없음, 건너뜀"
                    );
                    Some(WindowEnd::Skipped)
                }
                (AttemptState::BackoffThenRetry { wait }, outcome) => {
                    retries += 1;
                    self.stats.retries += 1;
                    warn!(
                        symbol_id = symbol.id,
                        ticker = %symbol.ticker,
                        outcome = outcome.kind(),
                        retry = retries,
                        wait_secs = wait.as_secs(),
                        "요청 실패, 대기 후 재시도"
                    );
                    if !self.pause(wait).await {
                        return Ok(WindowEnd::Cancelled);
                    }
                    None
                }
                (AttemptState::Failed, outcome) => {
                    self.stats.windows_failed += 1;
                    error!(
                        symbol_id = symbol.id,
                        ticker = %symbol.ticker,
                        window = %window,
                        outcome = outcome.kind(),
                        detail = ?outcome,
                        retries,
                        "윈도우 수집 실패, 다음 패스에서 재시도"
                    );
                    Some(WindowEnd::Failed)
                }
                (AttemptState::Fetching, _) | (AttemptState::Committed { .. }, _) => None,
            };

            let shortfall = self.pacer.shortfall(started, self.clock.now());
            if !shortfall.is_zero() && !self.pause(shortfall).await {
                return Ok(end.unwrap_or(WindowEnd::Cancelled));
            }

            if let Some(end) = end {
                return Ok(end);
            }
        }
    }

    /// 쿼터가 허용할 때까지 대기. 허용 시점의 스냅샷을 반환하며 중단되면 `None`.
    async fn wait_for_quota(&mut self) -> Result<Option<QuotaSnapshot>> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(None);
            }
            let (snapshot, decision) = self
                .quota
                .consult(self.store.as_ref(), self.clock.now())
                .await?;
            match decision {
                QuotaDecision::Proceed => return Ok(Some(snapshot)),
                QuotaDecision::Throttle { window, wait } => {
                    self.stats.throttle_waits += 1;
                    info!(
                        key = self.quota.key_name(),
                        window = %window,
                        usage = self.quota.usage(&snapshot),
                        wait_secs = wait.as_secs(),
                        "쿼터 한도 도달, 대기"
                    );
                    if !self.pause(wait).await {
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// 스테이징 행 커밋.
    ///
    /// 실패해도 스테이징 행은 남아 다음 커밋에서 다시 시도됩니다.
    /// 연속 실패가 한도에 도달하면 수집을 중단합니다.
    async fn flush(&mut self, symbol_id: i64) -> Result<()> {
        let commit_time = self.clock.now();
        match self
            .committer
            .commit(&mut self.staging, symbol_id, commit_time)
            .await
        {
            Ok(receipt) => {
                self.commit_failures = 0;
                if !receipt.is_noop() {
                    self.stats.commits += 1;
                    self.stats.rows_inserted += receipt.inserted;
                    info!(
                        symbol_id,
                        staged = receipt.staged,
                        inserted = receipt.inserted,
                        checkpoint = ?receipt.checkpoint,
                        elapsed_ms = receipt.elapsed.as_millis() as u64,
                        "커밋 완료"
                    );
                }
                Ok(())
            }
            Err(e) => {
                self.commit_failures += 1;
                self.stats.commit_failures += 1;
                error!(
                    symbol_id,
                    failures = self.commit_failures,
                    max = self.config.max_commit_failures,
                    error = %e,
                    "커밋 실패, 스테이징 유지"
                );
                if self.commit_failures >= self.config.max_commit_failures {
                    return Err(CollectorError::CommitHalted {
                        failures: self.commit_failures,
                        last: e,
                    });
                }
                Ok(())
            }
        }
    }

    /// 중단 가능한 대기. 중단되면 `false`.
    async fn pause(&self, wait: Duration) -> bool {
        if wait.is_zero() {
            return !self.cancel.is_cancelled();
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = self.clock.sleep(wait) => true,
        }
    }
}
