//! 시계열 데이터 제공자.

pub mod lunarcrush;

use std::time::Duration;

use async_trait::async_trait;
use lunar_core::FetchWindow;

/// 한 번의 요청 시도 결과 (분류 전).
///
/// 전송 실패도 값으로 반환되며, 재시도 여부는 분류기가 결정합니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawResponse {
    /// HTTP 응답 수신
    Http {
        status: u16,
        /// `Retry-After` 헤더 (초 단위 값만 인식)
        retry_after: Option<Duration>,
        body: String,
    },
    /// 연결/타임아웃/본문 수신 실패
    Transport(String),
}

impl RawResponse {
    /// 본문이 있는 HTTP 응답 생성.
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self::Http {
            status,
            retry_after: None,
            body: body.into(),
        }
    }
}

/// 시간봉 시계열 제공자.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// 요청 로그에 기록할 서비스 이름.
    fn service(&self) -> &str;

    /// 요청 로그에 기록할 URL.
    fn request_url(&self, window: &FetchWindow) -> String;

    /// 윈도우 범위의 시간봉 요청 (포함 범위).
    async fn fetch(&self, window: &FetchWindow) -> RawResponse;
}
