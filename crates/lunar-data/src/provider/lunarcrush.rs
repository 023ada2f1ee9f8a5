//! LunarCrush 시계열 API 클라이언트.
//!
//! `GET {base}/public/coins/{id}/time-series/v2?bucket=hour&interval=all&start=..&end=..`
//! 요청에 Bearer 토큰을 붙여 보냅니다. 응답은 `data` 배열을 가진 JSON 객체입니다.
//!
//! # 사용 예제
//!
//! ```rust,ignore
//! use lunar_data::LunarCrushClient;
//!
//! let timeout = Duration::from_secs(30);
//! let client = LunarCrushClient::new("API_KEY", "https://lunarcrush.com/api4", timeout)?;
//! let raw = client.fetch(&window).await;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use lunar_core::{FetchWindow, TimeSeriesRecord};
use reqwest::header::{AUTHORIZATION, RETRY_AFTER};
use rust_decimal::Decimal;
use serde::Deserialize;

use super::{MetricsSource, RawResponse};
use crate::error::{DataError, Result};

/// 기본 API 주소.
pub const DEFAULT_BASE_URL: &str = "https://lunarcrush.com/api4";

/// LunarCrush API 클라이언트.
#[derive(Clone)]
pub struct LunarCrushClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl LunarCrushClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DataError::ConfigError(e.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, symbol_id: i64) -> String {
        format!("{}/public/coins/{}/time-series/v2", self.base_url, symbol_id)
    }
}

#[async_trait]
impl MetricsSource for LunarCrushClient {
    fn service(&self) -> &str {
        "LunarCrush"
    }

    fn request_url(&self, window: &FetchWindow) -> String {
        format!(
            "{}?bucket=hour&interval=all&start={}&end={}",
            self.endpoint(window.symbol_id),
            window.start_unix(),
            window.end_unix()
        )
    }

    async fn fetch(&self, window: &FetchWindow) -> RawResponse {
        let start = window.start_unix().to_string();
        let end = window.end_unix().to_string();

        tracing::debug!(
            symbol_id = window.symbol_id,
            start = %start,
            end = %end,
            "LunarCrush API 요청"
        );

        let response = match self
            .client
            .get(self.endpoint(window.symbol_id))
            .query(&[
                ("bucket", "hour"),
                ("interval", "all"),
                ("start", start.as_str()),
                ("end", end.as_str()),
            ])
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return RawResponse::Transport(e.to_string()),
        };

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        match response.text().await {
            Ok(body) => RawResponse::Http {
                status,
                retry_after,
                body,
            },
            Err(e) => RawResponse::Transport(format!("본문 수신 실패: {}", e)),
        }
    }
}

// =============================================================================
// 응답 파싱
// =============================================================================

#[derive(Debug, Deserialize)]
struct SeriesEnvelope {
    #[serde(default)]
    data: Option<Vec<SeriesPoint>>,
}

#[derive(Debug, Deserialize)]
struct SeriesPoint {
    time: i64,
    #[serde(default)]
    open: Option<Decimal>,
    #[serde(default)]
    high: Option<Decimal>,
    #[serde(default)]
    low: Option<Decimal>,
    #[serde(default)]
    close: Option<Decimal>,
    #[serde(default)]
    volume_24h: Option<Decimal>,
    #[serde(default)]
    market_cap: Option<Decimal>,
    #[serde(default)]
    circulating_supply: Option<Decimal>,
    #[serde(default)]
    sentiment: Option<f64>,
    #[serde(default)]
    contributors_active: Option<i64>,
    #[serde(default)]
    contributors_created: Option<i64>,
    #[serde(default)]
    posts_active: Option<i64>,
    #[serde(default)]
    posts_created: Option<i64>,
    #[serde(default)]
    interactions: Option<i64>,
    #[serde(default)]
    social_dominance: Option<f64>,
    #[serde(default)]
    galaxy_score: Option<f64>,
    #[serde(default)]
    volatility: Option<f64>,
    #[serde(default)]
    alt_rank: Option<i64>,
    #[serde(default)]
    spam: Option<i64>,
}

impl SeriesPoint {
    fn into_record(self, symbol_id: i64) -> std::result::Result<TimeSeriesRecord, String> {
        let time = DateTime::from_timestamp(self.time, 0)
            .ok_or_else(|| format!("invalid time: {}", self.time))?;

        Ok(TimeSeriesRecord {
            symbol_id,
            time,
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

/// 시계열 응답 본문 파싱.
///
/// `data`가 없거나 `null`이면 빈 목록을 반환합니다. 구조가 맞지 않으면
/// 원인 설명을 `Err`로 반환합니다.
pub fn parse_series(
    symbol_id: i64,
    body: &str,
) -> std::result::Result<Vec<TimeSeriesRecord>, String> {
    let envelope: SeriesEnvelope =
        serde_json::from_str(body).map_err(|e| format!("JSON 파싱 실패: {}", e))?;

    envelope
        .data
        .unwrap_or_default()
        .into_iter()
        .map(|point| point.into_record(symbol_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn window() -> FetchWindow {
        FetchWindow::new(
            3,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 2, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_parse_series_full_point() {
        let body = r#"{"data":[{"time":1704067200,"open":42000.5,"high":42100,"low":41900.25,
            "close":42050,"volume_24h":1.5e10,"market_cap":8.2e11,"circulating_supply":19500000,
            "sentiment":71,"contributors_active":1200,"contributors_created":40,
            "posts_active":5400,"posts_created":300,"interactions":1000000,
            "social_dominance":21.4,"galaxy_score":66,"volatility":0.012,"alt_rank":12,"spam":3}]}"#;

        let rows = parse_series(3, body).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.symbol_id, 3);
        assert_eq!(row.time_unix(), 1_704_067_200);
        assert_eq!(row.open, Some(dec!(42000.5)));
        assert_eq!(row.alt_rank, Some(12));
        assert_eq!(row.sentiment, Some(71.0));
    }

    #[test]
    fn test_parse_series_missing_fields_are_none() {
        let rows = parse_series(3, r#"{"data":[{"time":1704067200}]}"#).unwrap();
        assert_eq!(rows[0], TimeSeriesRecord::empty(3, rows[0].time));
    }

    #[test]
    fn test_parse_series_empty_and_missing_data() {
        assert!(parse_series(3, r#"{"data":[]}"#).unwrap().is_empty());
        assert!(parse_series(3, r#"{"data":null}"#).unwrap().is_empty());
        assert!(parse_series(3, r#"{"config":{}}"#).unwrap().is_empty());
    }

    #[test]
    fn test_parse_series_structural_failures() {
        assert!(parse_series(3, "<html>oops</html>").is_err());
        assert!(parse_series(3, r#"{"data":{"time":1}}"#).is_err());
        assert!(parse_series(3, r#"{"data":[{"open":1.0}]}"#).is_err());
    }

    #[tokio::test]
    async fn test_fetch_sends_bearer_and_range() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/public/coins/3/time-series/v2")
            .match_header("authorization", "Bearer secret")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("bucket".into(), "hour".into()),
                mockito::Matcher::UrlEncoded("start".into(), "1704067200".into()),
                mockito::Matcher::UrlEncoded("end".into(), "1704074400".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"data":[]}"#)
            .create_async()
            .await;

        let client = LunarCrushClient::new("secret", server.url(), Duration::from_secs(5)).unwrap();
        let raw = client.fetch(&window()).await;

        mock.assert_async().await;
        assert_eq!(raw, RawResponse::http(200, r#"{"data":[]}"#));
    }

    #[tokio::test]
    async fn test_fetch_reads_retry_after() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Any)
            .with_status(429)
            .with_header("retry-after", "120")
            .with_body("Too Many Requests")
            .create_async()
            .await;

        let client = LunarCrushClient::new("secret", server.url(), Duration::from_secs(5)).unwrap();
        match client.fetch(&window()).await {
            RawResponse::Http {
                status,
                retry_after,
                ..
            } => {
                assert_eq!(status, 429);
                assert_eq!(retry_after, Some(Duration::from_secs(120)));
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_transport_failure() {
        // 닫힌 포트
        let client =
            LunarCrushClient::new("secret", "http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        assert!(matches!(
            client.fetch(&window()).await,
            RawResponse::Transport(_)
        ));
    }

    #[test]
    fn test_request_url() {
        let client =
            LunarCrushClient::new("k", "https://example.test/api4/", Duration::from_secs(1))
                .unwrap();
        assert_eq!(
            client.request_url(&window()),
            "https://example.test/api4/public/coins/3/time-series/v2?bucket=hour&interval=all&start=1704067200&end=1704074400"
        );
    }
}
