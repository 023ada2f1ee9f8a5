//! 환경변수 기반 설정 모듈.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use lunar_data::provider::lunarcrush::DEFAULT_BASE_URL;
use lunar_data::SymbolOrder;
use secrecy::SecretString;

use crate::error::CollectorError;
use crate::modules::quota::{QuotaLimits, QuotaWaits};
use crate::modules::staging::CommitCadence;
use crate::Result;

/// Collector 전체 설정
#[derive(Debug)]
pub struct CollectorConfig {
    /// 데이터베이스 URL
    pub database_url: String,
    /// 최대 DB 연결 수
    pub database_max_connections: u32,
    /// LunarCrush API 설정
    pub provider: ProviderConfig,
    /// 쿼터 설정
    pub quota: QuotaConfig,
    /// 수집 루프 설정
    pub harvest: HarvestConfig,
}

/// LunarCrush API 설정
#[derive(Debug)]
pub struct ProviderConfig {
    /// Bearer 토큰
    pub api_key: SecretString,
    /// API 기본 주소
    pub base_url: String,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
}

/// API 키 쿼터 설정
#[derive(Debug, Clone)]
pub struct QuotaConfig {
    /// 요청 로그에 기록되는 API 키 이름
    pub key_name: String,
    pub limits: QuotaLimits,
    pub waits: QuotaWaits,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            key_name: "key_outlook".to_string(),
            limits: QuotaLimits::default(),
            waits: QuotaWaits::default(),
        }
    }
}

/// 수집 루프 설정
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// 체크포인트가 없는 심볼의 수집 시작일
    pub epoch: NaiveDate,
    /// 한 요청의 최대 범위 (일)
    pub max_window_days: i64,
    /// 심볼 방문 순서
    pub symbol_order: SymbolOrder,
    /// 커밋 주기
    pub commit_cadence: CommitCadence,
    /// 요청 간 최소 간격 (밀리초, 없으면 분당 한도에서 계산)
    pub pacing_ms: Option<u64>,
    /// 429 기본 대기 (초)
    pub rate_limit_wait_secs: u64,
    /// 5xx 기본 대기 (초)
    pub server_wait_secs: u64,
    /// 윈도우당 연속 재시도 한도 (없으면 무제한)
    pub max_retries: Option<u32>,
    /// 연속 커밋 실패 허용 횟수
    pub max_commit_failures: u32,
    /// 패스 사이 대기 (초)
    pub idle_secs: u64,
    /// 특정 심볼만 수집 (비어 있으면 전체)
    pub symbols: Vec<i64>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            epoch: NaiveDate::from_ymd_opt(2019, 1, 1).unwrap_or_default(),
            max_window_days: 730,
            symbol_order: SymbolOrder::Staleness,
            commit_cadence: CommitCadence::PerSymbol,
            pacing_ms: None,
            rate_limit_wait_secs: 3600,
            server_wait_secs: 10,
            max_retries: None,
            max_commit_failures: 3,
            idle_secs: 60,
            symbols: Vec::new(),
        }
    }
}

impl CollectorConfig {
    /// 환경변수에서 설정 로드
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = required_var("DATABASE_URL")?;
        let api_key = required_var("LUNARCRUSH_API_KEY")?;

        let defaults = HarvestConfig::default();
        let harvest = HarvestConfig {
            epoch: match std::env::var("HARVEST_EPOCH") {
                Ok(v) => NaiveDate::parse_from_str(&v, "%Y-%m-%d").map_err(|e| {
                    CollectorError::Config(format!("HARVEST_EPOCH '{}': {}", v, e))
                })?,
                Err(_) => defaults.epoch,
            },
            max_window_days: env_var_parse("HARVEST_MAX_WINDOW_DAYS", defaults.max_window_days),
            symbol_order: env_var_from_str("HARVEST_SYMBOL_ORDER", defaults.symbol_order)?,
            commit_cadence: env_var_from_str("HARVEST_COMMIT_CADENCE", defaults.commit_cadence)?,
            pacing_ms: env_var_opt("HARVEST_PACING_MS"),
            rate_limit_wait_secs: env_var_parse(
                "HARVEST_RATE_LIMIT_WAIT_SECS",
                defaults.rate_limit_wait_secs,
            ),
            server_wait_secs: env_var_parse("HARVEST_SERVER_WAIT_SECS", defaults.server_wait_secs),
            max_retries: env_var_opt("HARVEST_MAX_RETRIES"),
            max_commit_failures: env_var_parse(
                "HARVEST_MAX_COMMIT_FAILURES",
                defaults.max_commit_failures,
            ),
            idle_secs: env_var_parse("HARVEST_IDLE_SECS", defaults.idle_secs),
            symbols: Vec::new(),
        };

        let quota_defaults = QuotaConfig::default();
        let quota = QuotaConfig {
            key_name: std::env::var("LUNARCRUSH_KEY_NAME").unwrap_or(quota_defaults.key_name),
            limits: QuotaLimits {
                minute: env_var_parse("QUOTA_MINUTE_LIMIT", quota_defaults.limits.minute),
                hour: env_var_opt("QUOTA_HOUR_LIMIT"),
                day: env_var_parse("QUOTA_DAY_LIMIT", quota_defaults.limits.day),
            },
            waits: QuotaWaits {
                minute: Duration::from_secs(env_var_parse("QUOTA_MINUTE_WAIT_SECS", 5)),
                hour: Duration::from_secs(env_var_parse("QUOTA_HOUR_WAIT_SECS", 60)),
                day: Duration::from_secs(env_var_parse("QUOTA_DAY_WAIT_SECS", 3600)),
            },
        };

        let config = Self {
            database_url,
            database_max_connections: env_var_parse("DATABASE_MAX_CONNECTIONS", 5),
            provider: ProviderConfig {
                api_key: SecretString::from(api_key),
                base_url: std::env::var("LUNARCRUSH_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
                timeout_secs: env_var_parse("HARVEST_HTTP_TIMEOUT_SECS", 30),
            },
            quota,
            harvest,
        };
        config.validate()?;
        Ok(config)
    }

    /// 설정 값 검증
    pub fn validate(&self) -> Result<()> {
        let limits = &self.quota.limits;
        if limits.minute == 0 || limits.day == 0 || limits.hour == Some(0) {
            return Err(CollectorError::Config(
                "쿼터 한도는 0보다 커야 합니다".to_string(),
            ));
        }
        if self.harvest.max_window_days <= 0 {
            return Err(CollectorError::Config(
                "HARVEST_MAX_WINDOW_DAYS는 0보다 커야 합니다".to_string(),
            ));
        }
        Ok(())
    }
}

impl ProviderConfig {
    /// 요청 타임아웃을 Duration으로 반환
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl HarvestConfig {
    /// 수집 시작 시각 (UTC 자정)
    pub fn epoch_datetime(&self) -> DateTime<Utc> {
        self.epoch.and_time(chrono::NaiveTime::MIN).and_utc()
    }

    /// 한 요청의 최대 시간봉 수
    pub fn max_window_hours(&self) -> i64 {
        self.max_window_days.max(1) * 24
    }

    /// 설정된 요청 간 최소 간격
    pub fn pacing(&self) -> Option<Duration> {
        self.pacing_ms.map(Duration::from_millis)
    }

    pub fn rate_limit_wait(&self) -> Duration {
        Duration::from_secs(self.rate_limit_wait_secs)
    }

    pub fn server_wait(&self) -> Duration {
        Duration::from_secs(self.server_wait_secs)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_secs(self.idle_secs)
    }
}

fn required_var(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| CollectorError::Config(format!("{} 환경변수가 설정되지 않았습니다", key)))
}

/// 환경변수에서 값을 파싱 (실패 시 기본값 사용)
fn env_var_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// 설정되지 않았으면 `None`
fn env_var_opt<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// 잘못된 값은 설정 에러로 처리
fn env_var_from_str<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    match std::env::var(key) {
        Ok(v) => v
            .parse()
            .map_err(|e| CollectorError::Config(format!("{}: {}", key, e))),
        Err(_) => Ok(default),
    }
}
