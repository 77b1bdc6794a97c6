//! HTTP retry helpers for transient errors.
//!
//! Remote imagery backends use [`send_bytes`] instead of calling
//! `reqwest::RequestBuilder::send()` directly, so every download gets
//! automatic retry with exponential backoff for transient failures
//! (timeouts, connection resets, server errors, rate limiting).
//!
//! ```ignore
//! let bytes = retry::send_bytes(|| client.get(&url)).await?;
//! ```

use std::time::Duration;

use crate::ImageryError;

/// Maximum number of retry attempts for transient HTTP errors.
///
/// With exponential backoff (2s, 4s, 8s) the total wait before giving up
/// is 14 seconds per image.
const MAX_RETRIES: u32 = 3;

/// Sends an HTTP request and returns the response body as bytes.
///
/// The `build_request` closure is called on each attempt to construct a
/// fresh [`reqwest::RequestBuilder`] (since builders are consumed by
/// `.send()`).
///
/// Retries connection errors, timeouts, HTTP 429, and HTTP 5xx up to
/// [`MAX_RETRIES`] times. Does **not** retry other HTTP 4xx; these are
/// permanent.
///
/// # Errors
///
/// Returns [`ImageryError`] if the request fails after all retries, the
/// server returns a non-retryable status code, or the body cannot be read.
#[allow(clippy::future_not_send)]
pub async fn send_bytes<F>(build_request: F) -> Result<Vec<u8>, ImageryError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let response = send_inner(&build_request, MAX_RETRIES).await?;
    let bytes = response.bytes().await?;
    Ok(bytes.to_vec())
}

/// Whether a response status is worth another attempt.
fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status.as_u16() == 429 || status.is_server_error()
}

/// Core retry loop.
///
/// Sends the request built by `build_request`, retrying transient
/// failures up to `max_retries` times with exponential backoff.
#[allow(clippy::future_not_send)]
async fn send_inner<F>(
    build_request: &F,
    max_retries: u32,
) -> Result<reqwest::Response, ImageryError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;
    loop {
        let error = match build_request().send().await {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) => {
                let status = response.status();
                let error = ImageryError::Request {
                    message: format!("HTTP {status} from {}", response.url()),
                };
                if !is_retryable_status(status) {
                    return Err(error);
                }
                error
            }
            Err(e) if is_transient(&e) => ImageryError::Http(e),
            Err(e) => return Err(ImageryError::Http(e)),
        };

        if attempt >= max_retries {
            log::warn!("  giving up after {max_retries} retries: {error}");
            return Err(error);
        }
        attempt += 1;

        let delay = Duration::from_secs(1u64 << attempt);
        log::warn!("  {error}; retry {attempt}/{max_retries} in {delay:?}");
        tokio::time::sleep(delay).await;
    }
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::*;

    #[test]
    fn retries_rate_limits_and_server_errors_only() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!is_retryable_status(StatusCode::FORBIDDEN));
    }

    #[tokio::test]
    async fn unreachable_host_is_an_http_error() {
        let client = reqwest::Client::new();
        let result = send_inner(&|| client.get("http://[::1"), 0).await;
        assert!(matches!(result, Err(ImageryError::Http(_))));
    }
}
