use crate::llm::error::LlmError;
use reqwest::StatusCode;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn with_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }
}

/// Runs a request closure with exponential backoff.
///
/// Retries network errors, 429 (honouring `Retry-After`) and 5xx. Any other
/// status is returned as-is for the caller to inspect, as is the final
/// response once retries are exhausted.
pub async fn request_with_retry<F, Fut>(
    mut task: F,
    policy: RetryPolicy,
) -> Result<reqwest::Response, LlmError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let mut attempt = 0;
    let mut delay = policy.base_delay;

    loop {
        attempt += 1;
        match task().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() || attempt > policy.max_retries {
                    return Ok(response);
                }
                if status != StatusCode::TOO_MANY_REQUESTS && !status.is_server_error() {
                    return Ok(response);
                }
                let wait = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(delay)
                    .min(policy.max_delay);
                tracing::warn!(%status, ?wait, attempt, max = policy.max_retries, "request failed, retrying");
                tokio::time::sleep(wait).await;
            }
            Err(e) => {
                if attempt > policy.max_retries {
                    return Err(LlmError::Network(format!(
                        "request failed after {attempt} attempts: {e}"
                    )));
                }
                tracing::warn!(error = %e, ?delay, attempt, max = policy.max_retries, "network error, retrying");
                tokio::time::sleep(delay).await;
            }
        }
        delay = (delay * 2).min(policy.max_delay);
    }
}

/// Turn a non-2xx response into `LlmError::Status`, passing success through.
pub async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(LlmError::Status {
        status: status.as_u16(),
        body: body.chars().take(500).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
        }
    }

    fn client() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    #[tokio::test]
    async fn retries_server_errors_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let url = format!("{}/flaky", server.uri());
        let client = client();
        let response = request_with_retry(|| client.get(&url).send(), fast(3)).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = client();
        let url = server.uri();
        let response = request_with_retry(|| client.get(&url).send(), fast(3)).await.unwrap();
        assert_eq!(response.status(), 401);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);

        let err = ensure_success(response).await.unwrap_err();
        assert!(matches!(err, LlmError::Status { status: 401, .. }));
    }

    #[tokio::test]
    async fn exhausted_retries_return_last_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = client();
        let url = server.uri();
        let response = request_with_retry(|| client.get(&url).send(), fast(1)).await.unwrap();
        assert_eq!(response.status(), 500);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unreachable_host_is_a_network_error() {
        let client = client();
        // Port 9 (discard) is closed on test hosts.
        let result = request_with_retry(|| client.get("http://127.0.0.1:9/").send(), fast(0)).await;
        assert!(matches!(result, Err(LlmError::Network(_))));
    }
}
