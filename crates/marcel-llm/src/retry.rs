use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;

use crate::error::LlmError;

const BASE_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Statuses worth another attempt: rate limiting and gateway hiccups.
fn is_transient(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

/// Doubling backoff from `BASE_BACKOFF_MS`, capped at `MAX_BACKOFF`.
fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(BASE_BACKOFF_MS.saturating_mul(1 << attempt.min(16))).min(MAX_BACKOFF)
}

/// `Retry-After` in seconds when present, otherwise [`backoff`]. Capped either way.
fn retry_delay(response: &reqwest::Response, attempt: u32) -> Duration {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map_or_else(|| backoff(attempt), |secs| Duration::from_secs(secs).min(MAX_BACKOFF))
}

/// Send a request, retrying transient failures up to `max_retries` times.
///
/// `send` must build a fresh request on every call. A 429 that survives every attempt
/// becomes [`LlmError::RateLimited`]; any other final response is returned as-is so the
/// caller can report its status.
///
/// # Errors
///
/// Returns `LlmError::RateLimited` when rate limiting persists, or `LlmError::Http` when
/// the request cannot be sent.
pub(crate) async fn send_with_retry<F, Fut>(
    provider: &str,
    max_retries: u32,
    mut send: F,
) -> Result<reqwest::Response, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let mut attempt = 0;
    loop {
        let response = send().await?;
        let status = response.status();
        if !is_transient(status) {
            return Ok(response);
        }
        if attempt >= max_retries {
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(LlmError::RateLimited);
            }
            return Ok(response);
        }

        let delay = retry_delay(&response, attempt);
        tracing::warn!(
            provider,
            status = status.as_u16(),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt = attempt + 1,
            max_retries,
            "transient upstream failure, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::test_utils::{http_response, spawn_mock_server};

    fn with_status(status: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nRetry-After: 0\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
        )
    }

    async fn send(port: u16, max_retries: u32) -> Result<reqwest::Response, LlmError> {
        let client = reqwest::Client::new();
        let url = format!("http://127.0.0.1:{port}/v1/chat/completions");
        send_with_retry("test", max_retries, || client.get(&url).send()).await
    }

    #[test]
    fn transient_statuses() {
        assert!(is_transient(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_transient(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!is_transient(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn backoff_is_capped() {
        assert_eq!(backoff(0), Duration::from_millis(500));
        assert_eq!(backoff(1), Duration::from_secs(1));
        assert_eq!(backoff(40), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn first_success_is_returned() {
        let port = spawn_mock_server(vec![http_response("200 OK", "text/plain", "ok")]).await;
        let response = send(port, 3).await.unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn persistent_rate_limit_is_an_error() {
        let port = spawn_mock_server(vec![
            with_status("429 Too Many Requests"),
            with_status("429 Too Many Requests"),
        ])
        .await;
        let result = send(port, 1).await;
        assert!(matches!(result, Err(LlmError::RateLimited)), "got: {result:?}");
    }

    #[tokio::test]
    async fn recovers_after_unavailable() {
        let port = spawn_mock_server(vec![
            with_status("503 Service Unavailable"),
            http_response("200 OK", "text/plain", "ok"),
        ])
        .await;
        let response = send(port, 2).await.unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn exhausted_gateway_error_is_handed_back() {
        let port = spawn_mock_server(vec![with_status("502 Bad Gateway")]).await;
        let response = send(port, 0).await.unwrap();
        assert_eq!(response.status(), 502);
    }

    #[tokio::test]
    async fn server_error_is_not_retried() {
        let port = spawn_mock_server(vec![
            with_status("500 Internal Server Error"),
            http_response("200 OK", "text/plain", "ok"),
        ])
        .await;
        let response = send(port, 3).await.unwrap();
        assert_eq!(response.status(), 500);
    }

    proptest! {
        #[test]
        fn backoff_never_shrinks(attempt in 0u32..64) {
            prop_assert!(backoff(attempt + 1) >= backoff(attempt));
            prop_assert!(backoff(attempt) <= MAX_BACKOFF);
        }
    }
}
