//! PostgreSQL 저장소.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lunar_core::{Checkpoint, QuotaSnapshot, RequestLogEntry, Symbol, TimeSeriesRecord};
use rust_decimal::Decimal;
use sqlx::postgres::PgPool;
use sqlx::{FromRow, Postgres, Transaction};
use tracing::{debug, instrument};

use super::{CommitTx, HarvestStore, StagedSummary, SymbolOrder};
use crate::error::{DataError, Result};

/// 번들된 스키마 (`init-schema` 명령에서 적용).
pub const SCHEMA_SQL: &str = include_str!("../../migrations/0001_harvest.sql");

/// `symbols` 테이블 레코드.
#[derive(Debug, Clone, FromRow)]
struct SymbolRow {
    id: i64,
    ticker: String,
    name: String,
    include_etl: bool,
    last_update: Option<DateTime<Utc>>,
    last_timestamp: Option<i64>,
    status: Option<String>,
}

impl SymbolRow {
    fn into_symbol(self) -> Result<Symbol> {
        let last_timestamp = self.last_timestamp.map(unix_to_datetime).transpose()?;
        Ok(Symbol {
            id: self.id,
            ticker: self.ticker,
            name: self.name,
            include_etl: self.include_etl,
            last_update: self.last_update,
            last_timestamp,
            status: self.status,
        })
    }
}

/// `lunar_data_staging` 테이블 레코드.
#[derive(Debug, Clone, FromRow)]
struct StagedRow {
    symbol_id: i64,
    time_unix: i64,
    open: Option<Decimal>,
    high: Option<Decimal>,
    low: Option<Decimal>,
    close: Option<Decimal>,
    volume_24h: Option<Decimal>,
    market_cap: Option<Decimal>,
    circulating_supply: Option<Decimal>,
    sentiment: Option<f64>,
    contributors_active: Option<i64>,
    contributors_created: Option<i64>,
    posts_active: Option<i64>,
    posts_created: Option<i64>,
    interactions: Option<i64>,
    social_dominance: Option<f64>,
    galaxy_score: Option<f64>,
    volatility: Option<f64>,
    alt_rank: Option<i64>,
    spam: Option<i64>,
}

impl StagedRow {
    fn into_record(self) -> Result<TimeSeriesRecord> {
        Ok(TimeSeriesRecord {
            symbol_id: self.symbol_id,
            time: unix_to_datetime(self.time_unix)?,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume_24h: self.volume_24h,
            market_cap: self.market_cap,
            circulating_supply: self.circulating_supply,
            sentiment: self.sentiment,
            contributors_active: self.contributors_active,
            contributors_created: self.contributors_created,
            posts_active: self.posts_active,
            posts_created: self.posts_created,
            interactions: self.interactions,
            social_dominance: self.social_dominance,
            galaxy_score: self.galaxy_score,
            volatility: self.volatility,
            alt_rank: self.alt_rank,
            spam: self.spam,
        })
    }
}

fn unix_to_datetime(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| DataError::SerializationError(format!("invalid unix timestamp: {}", secs)))
}

/// PostgreSQL 기반 수집 상태 저장소.
#[derive(Clone)]
pub struct PgHarvestStore {
    pool: PgPool,
}

impl PgHarvestStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 번들된 스키마 적용 (이미 있는 객체는 유지).
    pub async fn apply_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl HarvestStore for PgHarvestStore {
    #[instrument(skip(self, only), fields(filter = only.len()))]
    async fn eligible_symbols(&self, order: SymbolOrder, only: &[i64]) -> Result<Vec<Symbol>> {
        let sql = match order {
            SymbolOrder::Staleness => {
                r#"
                SELECT id, ticker, name, include_etl, last_update, last_timestamp, status
                FROM symbols
                WHERE include_etl = TRUE
                  AND (cardinality($1::int8[]) = 0 OR id = ANY($1))
                ORDER BY last_update ASC NULLS FIRST, id ASC
                "#
            }
            SymbolOrder::Id => {
                r#"
                SELECT id, ticker, name, include_etl, last_update, last_timestamp, status
                FROM symbols
                WHERE include_etl = TRUE
                  AND (cardinality($1::int8[]) = 0 OR id = ANY($1))
                ORDER BY id ASC
                "#
            }
        };

        let rows: Vec<SymbolRow> = sqlx::query_as(sql)
            .bind(only)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(SymbolRow::into_symbol).collect()
    }

    async fn load_checkpoint(&self, symbol_id: i64) -> Result<Option<Checkpoint>> {
        let row: Option<(Option<i64>, Option<DateTime<Utc>>)> = sqlx::query_as(
            r#"
            SELECT last_timestamp, last_update
            FROM symbols
            WHERE id = $1
            "#,
        )
        .bind(symbol_id)
        .fetch_optional(&self.pool)
        .await?;

        let (last_timestamp, last_update) =
            row.ok_or_else(|| DataError::NotFound(format!("symbol {}", symbol_id)))?;

        match last_timestamp {
            Some(secs) => Ok(Some(Checkpoint {
                last_timestamp: unix_to_datetime(secs)?,
                last_update,
            })),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, rows), fields(count = rows.len()))]
    async fn stage(&self, rows: &[TimeSeriesRecord]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut staged = 0;
        let mut tx = self.pool.begin().await?;

        // UNNEST 일괄 삽입. 전체가 한 트랜잭션
        for chunk in rows.chunks(500) {
            let symbol_ids: Vec<i64> = chunk.iter().map(|r| r.symbol_id).collect();
            let datetimes: Vec<DateTime<Utc>> = chunk.iter().map(|r| r.time).collect();
            let time_unix: Vec<i64> = chunk.iter().map(|r| r.time_unix()).collect();
            let opens: Vec<Option<Decimal>> = chunk.iter().map(|r| r.open).collect();
            let highs: Vec<Option<Decimal>> = chunk.iter().map(|r| r.high).collect();
            let lows: Vec<Option<Decimal>> = chunk.iter().map(|r| r.low).collect();
            let closes: Vec<Option<Decimal>> = chunk.iter().map(|r| r.close).collect();
            let volumes: Vec<Option<Decimal>> = chunk.iter().map(|r| r.volume_24h).collect();
            let market_caps: Vec<Option<Decimal>> = chunk.iter().map(|r| r.market_cap).collect();
            let supplies: Vec<Option<Decimal>> =
                chunk.iter().map(|r| r.circulating_supply).collect();
            let sentiments: Vec<Option<f64>> = chunk.iter().map(|r| r.sentiment).collect();
            let contributors_active: Vec<Option<i64>> =
                chunk.iter().map(|r| r.contributors_active).collect();
            let contributors_created: Vec<Option<i64>> =
                chunk.iter().map(|r| r.contributors_created).collect();
            let posts_active: Vec<Option<i64>> = chunk.iter().map(|r| r.posts_active).collect();
            let posts_created: Vec<Option<i64>> = chunk.iter().map(|r| r.posts_created).collect();
            let interactions: Vec<Option<i64>> = chunk.iter().map(|r| r.interactions).collect();
            let dominance: Vec<Option<f64>> = chunk.iter().map(|r| r.social_dominance).collect();
            let galaxy: Vec<Option<f64>> = chunk.iter().map(|r| r.galaxy_score).collect();
            let volatility: Vec<Option<f64>> = chunk.iter().map(|r| r.volatility).collect();
            let alt_rank: Vec<Option<i64>> = chunk.iter().map(|r| r.alt_rank).collect();
            let spam: Vec<Option<i64>> = chunk.iter().map(|r| r.spam).collect();

            let result = sqlx::query(
                r#"
                INSERT INTO lunar_data_staging
                    (symbol_id, datetime, time_unix, open, high, low, close, volume_24h,
                     market_cap, circulating_supply, sentiment, contributors_active,
                     contributors_created, posts_active, posts_created, interactions,
                     social_dominance, galaxy_score, volatility, alt_rank, spam)
                SELECT * FROM UNNEST(
                    $1::int8[], $2::timestamptz[], $3::int8[],
                    $4::numeric[], $5::numeric[], $6::numeric[], $7::numeric[],
                    $8::numeric[], $9::numeric[], $10::numeric[],
                    $11::float8[], $12::int8[], $13::int8[], $14::int8[], $15::int8[],
                    $16::int8[], $17::float8[], $18::float8[], $19::float8[],
                    $20::int8[], $21::int8[]
                )
                "#,
            )
            .bind(&symbol_ids)
            .bind(&datetimes)
            .bind(&time_unix)
            .bind(&opens)
            .bind(&highs)
            .bind(&lows)
            .bind(&closes)
            .bind(&volumes)
            .bind(&market_caps)
            .bind(&supplies)
            .bind(&sentiments)
            .bind(&contributors_active)
            .bind(&contributors_created)
            .bind(&posts_active)
            .bind(&posts_created)
            .bind(&interactions)
            .bind(&dominance)
            .bind(&galaxy)
            .bind(&volatility)
            .bind(&alt_rank)
            .bind(&spam)
            .execute(&mut *tx)
            .await
            .map_err(|e| DataError::InsertError(e.to_string()))?;

            staged += result.rows_affected() as usize;
        }
        tx.commit().await?;

        debug!(staged, "스테이징 저장 완료");
        Ok(staged)
    }

    async fn staged(&self, symbol_id: i64) -> Result<Vec<TimeSeriesRecord>> {
        let rows: Vec<StagedRow> = sqlx::query_as(
            r#"
            SELECT symbol_id, time_unix, open, high, low, close, volume_24h, market_cap,
                   circulating_supply, sentiment, contributors_active, contributors_created,
                   posts_active, posts_created, interactions, social_dominance, galaxy_score,
                   volatility, alt_rank, spam
            FROM lunar_data_staging
            WHERE symbol_id = $1
            ORDER BY time_unix ASC, id ASC
            "#,
        )
        .bind(symbol_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StagedRow::into_record).collect()
    }

    async fn log_request(&self, entry: &RequestLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO api_request_log (service, key_name, requested_at, function_name, url)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&entry.service)
        .bind(&entry.key_name)
        .bind(entry.requested_at)
        .bind(&entry.function_name)
        .bind(&entry.url)
        .execute(&self.pool)
        .await
        .map_err(|e| DataError::InsertError(e.to_string()))?;
        Ok(())
    }

    async fn quota_snapshot(&self, key_name: &str, now: DateTime<Utc>) -> Result<QuotaSnapshot> {
        let (count_minute, count_hour, count_day): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE requested_at > $2::timestamptz - INTERVAL '1 minute'),
                COUNT(*) FILTER (WHERE requested_at > $2::timestamptz - INTERVAL '1 hour'),
                COUNT(*)
            FROM api_request_log
            WHERE key_name = $1
              AND requested_at > $2::timestamptz - INTERVAL '1 day'
            "#,
        )
        .bind(key_name)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(QuotaSnapshot {
            key_name: key_name.to_string(),
            count_minute,
            count_hour,
            count_day,
        })
    }

    async fn begin(&self) -> Result<Box<dyn CommitTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgCommitTx { tx }))
    }
}

/// PostgreSQL 트랜잭션 기반 커밋 작업 단위.
pub struct PgCommitTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl CommitTx for PgCommitTx {
    async fn staged_summary(&mut self, symbol_id: i64) -> Result<StagedSummary> {
        let (rows, max_unix): (i64, Option<i64>) = sqlx::query_as(
            r#"
            SELECT COUNT(*), MAX(time_unix)
            FROM lunar_data_staging
            WHERE symbol_id = $1
            "#,
        )
        .bind(symbol_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(StagedSummary {
            rows: rows.max(0) as u64,
            max_time: max_unix.map(unix_to_datetime).transpose()?,
        })
    }

    async fn merge_staged(&mut self, symbol_id: i64) -> Result<u64> {
        // 같은 시간봉이 여러 번 스테이징된 경우 가장 최근 행을 사용
        let result = sqlx::query(
            r#"
            INSERT INTO lunar_data
                (symbol_id, datetime, time_unix, open, high, low, close, volume_24h,
                 market_cap, circulating_supply, sentiment, contributors_active,
                 contributors_created, posts_active, posts_created, interactions,
                 social_dominance, galaxy_score, volatility, alt_rank, spam)
            SELECT DISTINCT ON (time_unix)
                symbol_id, datetime, time_unix, open, high, low, close, volume_24h,
                market_cap, circulating_supply, sentiment, contributors_active,
                contributors_created, posts_active, posts_created, interactions,
                social_dominance, galaxy_score, volatility, alt_rank, spam
            FROM lunar_data_staging
            WHERE symbol_id = $1
            ORDER BY time_unix, id DESC
            ON CONFLICT (symbol_id, time_unix) DO NOTHING
            "#,
        )
        .bind(symbol_id)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| DataError::InsertError(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn clear_staged(&mut self, symbol_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM lunar_data_staging WHERE symbol_id = $1")
            .bind(symbol_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn advance_checkpoint(
        &mut self,
        symbol_id: i64,
        last_time: DateTime<Utc>,
        commit_time: DateTime<Utc>,
    ) -> Result<()> {
        // GREATEST는 NULL을 무시하므로 첫 커밋도 그대로 처리됨
        let result = sqlx::query(
            r#"
            UPDATE symbols
            SET last_timestamp = GREATEST(last_timestamp, $2),
                last_update = $3
            WHERE id = $1
            "#,
        )
        .bind(symbol_id)
        .bind(last_time.timestamp())
        .bind(commit_time)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DataError::NotFound(format!("symbol {}", symbol_id)));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
