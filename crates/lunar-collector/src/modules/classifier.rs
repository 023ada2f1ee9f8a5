//! 요청 결과 분류기.
//!
//! 한 번의 요청 시도([`RawResponse`])를 닫힌 결과 집합 [`FetchOutcome`]으로
//! 변환합니다. 재시도/백오프 결정은 이 결과 값만으로 내려집니다.
//!
//! | 상태 코드 | 결과 |
//! |-----------|------|
//! | 200 (행 있음) | `Success` |
//! | 200 (`data` 없음/빈 배열) | `EmptyResult` |
//! | 200 (구조 불일치) | `ParseFailure` |
//! | 429 | `RateLimited` (기본 1시간) |
//! | 500, 502, 503, 504 | `ServerUnavailable` (기본 10초) |
//! | 400, 401, 403, 404 | `ClientError` |
//! | 그 외 | `ServerUnavailable` (기본 대기) |

use std::time::Duration;

use lunar_core::{FetchWindow, TimeSeriesRecord};
use lunar_data::provider::lunarcrush::parse_series;
use lunar_data::RawResponse;

/// 분류된 요청 결과.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// 윈도우 범위의 행 수신
    Success(Vec<TimeSeriesRecord>),
    /// 정상 응답이지만 데이터 없음 (에러 아님)
    EmptyResult,
    /// 제공자 요청 한도 초과
    RateLimited { wait: Duration },
    /// 서버 일시 장애 또는 표에 없는 상태 코드
    ServerUnavailable { status: u16, wait: Duration },
    /// 요청 자체의 문제 (잘못된 요청, 인증, 없는 심볼)
    ClientError { status: u16 },
    /// 응답 본문 구조 불일치
    ParseFailure(String),
    /// 연결/타임아웃 등 전송 실패
    TransportFailure(String),
}

impl FetchOutcome {
    /// 같은 윈도우를 다시 시도해야 하는지.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::ServerUnavailable { .. })
    }

    /// 재시도 전 권장 대기 시간.
    pub fn suggested_wait(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { wait } | Self::ServerUnavailable { wait, .. } => Some(*wait),
            _ => None,
        }
    }

    /// 로그용 짧은 이름.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::EmptyResult => "empty",
            Self::RateLimited { .. } => "rate_limited",
            Self::ServerUnavailable { .. } => "server_unavailable",
            Self::ClientError { .. } => "client_error",
            Self::ParseFailure(_) => "parse_failure",
            Self::TransportFailure(_) => "transport_failure",
        }
    }
}

/// 상태 코드 분류 (정적 표).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusClass {
    Ok,
    RateLimited,
    ServerUnavailable,
    Client,
    Unmapped,
}

fn status_class(status: u16) -> StatusClass {
    match status {
        200 => StatusClass::Ok,
        429 => StatusClass::RateLimited,
        500 | 502 | 503 | 504 => StatusClass::ServerUnavailable,
        400 | 401 | 403 | 404 => StatusClass::Client,
        _ => StatusClass::Unmapped,
    }
}

/// 요청 결과 분류기.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    /// 429 기본 대기
    rate_limit_wait: Duration,
    /// 5xx 및 표에 없는 상태의 기본 대기
    server_wait: Duration,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self {
            rate_limit_wait: Duration::from_secs(3600),
            server_wait: Duration::from_secs(10),
        }
    }
}

impl ErrorClassifier {
    pub fn new(rate_limit_wait: Duration, server_wait: Duration) -> Self {
        Self {
            rate_limit_wait,
            server_wait,
        }
    }

    /// 요청 시도 결과 분류.
    ///
    /// 성공 응답의 행 중 윈도우 밖의 행은 버립니다.
    pub fn classify(&self, window: &FetchWindow, raw: RawResponse) -> FetchOutcome {
        let (status, retry_after, body) = match raw {
            RawResponse::Transport(detail) => return FetchOutcome::TransportFailure(detail),
            RawResponse::Http {
                status,
                retry_after,
                body,
            } => (status, retry_after, body),
        };

        match status_class(status) {
            StatusClass::Ok => self.classify_body(window, &body),
            StatusClass::RateLimited => FetchOutcome::RateLimited {
                wait: retry_after.unwrap_or(self.rate_limit_wait),
            },
            StatusClass::ServerUnavailable => FetchOutcome::ServerUnavailable {
                status,
                wait: retry_after.unwrap_or(self.server_wait),
            },
            StatusClass::Client => FetchOutcome::ClientError { status },
            StatusClass::Unmapped => FetchOutcome::ServerUnavailable {
                status,
                wait: self.server_wait,
            },
        }
    }

    fn classify_body(&self, window: &FetchWindow, body: &str) -> FetchOutcome {
        let rows = match parse_series(window.symbol_id, body) {
            Ok(rows) => rows,
            Err(detail) => return FetchOutcome::ParseFailure(detail),
        };
        if rows.is_empty() {
            return FetchOutcome::EmptyResult;
        }

        let received = rows.len();
        let rows: Vec<TimeSeriesRecord> =
            rows.into_iter().filter(|r| window.contains(r.time)).collect();
        if rows.len() < received {
            tracing::debug!(
                symbol_id = window.symbol_id,
                dropped = received - rows.len(),
                "윈도우 밖의 행 제외"
            );
        }

        if rows.is_empty() {
            FetchOutcome::EmptyResult
        } else {
            FetchOutcome::Success(rows)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn window() -> FetchWindow {
        FetchWindow::new(
            3,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 2, 0, 0).unwrap(),
        )
    }

    fn classify(raw: RawResponse) -> FetchOutcome {
        ErrorClassifier::default().classify(&window(), raw)
    }

    #[test]
    fn test_success_rows() {
        let body = r#"{"data":[{"time":1704067200,"close":1.0},{"time":1704070800,"close":2.0}]}"#;
        match classify(RawResponse::http(200, body)) {
            FetchOutcome::Success(rows) => assert_eq!(rows.len(), 2),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_empty_payloads() {
        assert_eq!(classify(RawResponse::http(200, r#"{"data":[]}"#)), FetchOutcome::EmptyResult);
        assert_eq!(classify(RawResponse::http(200, "{}")), FetchOutcome::EmptyResult);
    }

    #[test]
    fn test_rows_outside_window_are_dropped() {
        // 2024-01-01 03:00 은 윈도우 밖
        let body = r#"{"data":[{"time":1704067200},{"time":1704078000}]}"#;
        match classify(RawResponse::http(200, body)) {
            FetchOutcome::Success(rows) => {
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0].time_unix(), 1_704_067_200);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let only_outside = r#"{"data":[{"time":1704078000}]}"#;
        assert_eq!(classify(RawResponse::http(200, only_outside)), FetchOutcome::EmptyResult);
    }

    #[test]
    fn test_parse_failure() {
        assert!(matches!(
            classify(RawResponse::http(200, "not json")),
            FetchOutcome::ParseFailure(_)
        ));
    }

    #[test]
    fn test_status_table() {
        assert_eq!(
            classify(RawResponse::http(429, "")),
            FetchOutcome::RateLimited {
                wait: Duration::from_secs(3600)
            }
        );
        for status in [500, 502, 503, 504] {
            assert_eq!(
                classify(RawResponse::http(status, "")),
                FetchOutcome::ServerUnavailable {
                    status,
                    wait: Duration::from_secs(10)
                }
            );
        }
        for status in [400, 401, 403, 404] {
            assert_eq!(
                classify(RawResponse::http(status, "")),
                FetchOutcome::ClientError { status }
            );
        }
    }

    #[test]
    fn test_unmapped_status_is_short_retry() {
        for status in [201, 302, 418, 520] {
            let outcome = classify(RawResponse::http(status, r#"{"data":[{"time":1704067200}]}"#));
            assert!(outcome.is_retryable(), "status {}", status);
            assert_eq!(outcome.suggested_wait(), Some(Duration::from_secs(10)));
        }
    }

    #[test]
    fn test_retry_after_overrides_default_wait() {
        let raw = RawResponse::Http {
            status: 429,
            retry_after: Some(Duration::from_secs(90)),
            body: String::new(),
        };
        assert_eq!(
            classify(raw),
            FetchOutcome::RateLimited {
                wait: Duration::from_secs(90)
            }
        );
    }

    #[test]
    fn test_transport_failure() {
        let outcome = classify(RawResponse::Transport("connection reset".to_string()));
        assert_eq!(outcome.kind(), "transport_failure");
        assert!(!outcome.is_retryable());
    }
}
