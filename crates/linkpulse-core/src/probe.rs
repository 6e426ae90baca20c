//! Probe Engine: a pure function of `(URL) -> ProbeResult` that emulates a
//! real browser, follows redirects, and classifies outcomes.

use std::time::{Duration, Instant};

use rand::Rng;
use reqwest::{Method, StatusCode};

use crate::error::ProbeError;
use crate::model::{HealthStatus, ProbeResult};

/// Six realistic desktop-browser User-Agent strings, one chosen uniformly
/// at random per probe.
const USER_AGENTS: [&str; 6] = [
    // Chrome / Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    // Chrome / macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    // Firefox / Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    // Safari / macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    // Edge / Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.0.0",
    // Chrome / Linux
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
];

/// Status codes that indicate an anti-automation (bot) challenge rather than
/// a genuine failure; trigger a HEAD -> GET retry.
const BOT_CHALLENGE_STATUSES: [u16; 5] = [403, 405, 406, 429, 503];

/// Configuration the Probe Engine is invoked with; these mirror
/// `CHECK_TIMEOUT_MS` / `DEGRADED_THRESHOLD_MS`.
#[derive(Debug, Clone, Copy)]
pub struct ProbeConfig {
    pub check_timeout: Duration,
    pub degraded_threshold: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            check_timeout: Duration::from_millis(10_000),
            degraded_threshold: Duration::from_millis(3_000),
        }
    }
}

/// Stateless browser-emulating prober. Holds only a shared `reqwest::Client`;
/// no synchronization is needed between concurrent probes beyond whatever
/// rate limiting the caller applies.
#[derive(Clone)]
pub struct ProbeEngine {
    client: reqwest::Client,
    config: ProbeConfig,
}

impl ProbeEngine {
    pub fn new(client: reqwest::Client, config: ProbeConfig) -> Self {
        Self { client, config }
    }

    /// Run one probe against `long_url`, returning a `ProbeResult` that is
    /// always `Ok` — transport errors and deadlines are themselves
    /// classified into a `down` result, never a job failure.
    #[tracing::instrument(skip(self), fields(url = %long_url))]
    pub async fn probe(&self, long_url: &str) -> ProbeResult {
        let start = Instant::now();
        let deadline = self.config.check_timeout;
        let user_agent = pick_user_agent();

        let outcome = tokio::time::timeout(
            deadline,
            self.issue_with_bot_challenge_retry(long_url, user_agent, deadline),
        )
        .await;

        let latency_ms = start.elapsed().as_millis() as i64;

        match outcome {
            Ok(Ok(status)) => self.classify(status.as_u16() as i32, latency_ms, None),
            Ok(Err(err)) => self.classify_error(err, latency_ms),
            Err(_elapsed) => self.classify_error(
                ProbeError::DeadlineExceeded {
                    elapsed_ms: latency_ms,
                },
                latency_ms,
            ),
        }
    }

    /// Issue the HEAD request; on a bot-challenge status, jitter-sleep and
    /// re-issue as GET under the *same* remaining deadline.
    async fn issue_with_bot_challenge_retry(
        &self,
        url: &str,
        user_agent: &'static str,
        overall_deadline: Duration,
    ) -> Result<StatusCode, ProbeError> {
        let attempt_start = Instant::now();
        let head_status = self.issue(Method::HEAD, url, user_agent).await?;

        if !BOT_CHALLENGE_STATUSES.contains(&head_status.as_u16()) {
            return Ok(head_status);
        }

        let jitter_ms = 100 + rand::thread_rng().gen_range(0..200);
        tokio::time::sleep(Duration::from_millis(jitter_ms)).await;

        let remaining = overall_deadline.saturating_sub(attempt_start.elapsed());
        if remaining.is_zero() {
            return Err(ProbeError::DeadlineExceeded {
                elapsed_ms: attempt_start.elapsed().as_millis() as i64,
            });
        }

        tokio::time::timeout(remaining, self.issue(Method::GET, url, user_agent))
            .await
            .map_err(|_| ProbeError::DeadlineExceeded {
                elapsed_ms: attempt_start.elapsed().as_millis() as i64,
            })?
    }

    async fn issue(
        &self,
        method: Method,
        url: &str,
        user_agent: &'static str,
    ) -> Result<StatusCode, ProbeError> {
        let request = self
            .client
            .request(method, url)
            .headers(browser_headers(user_agent));

        let response = request.send().await.map_err(ProbeError::from)?;
        Ok(response.status())
    }

    /// Classify a completed response. A pure total function of
    /// `(status_code, latency_ms)`.
    fn classify(&self, status_code: i32, latency_ms: i64, error_message: Option<String>) -> ProbeResult {
        let is_healthy = (200..400).contains(&status_code);
        let health_status = if !is_healthy {
            HealthStatus::Down
        } else if Duration::from_millis(latency_ms.max(0) as u64) > self.config.degraded_threshold {
            HealthStatus::Degraded
        } else {
            HealthStatus::Up
        };

        ProbeResult {
            status_code,
            latency_ms,
            is_healthy,
            health_status,
            error_message,
        }
    }

    fn classify_error(&self, err: ProbeError, latency_ms: i64) -> ProbeResult {
        let status_code = err.status_code();
        ProbeResult {
            status_code,
            latency_ms,
            is_healthy: false,
            health_status: HealthStatus::Down,
            error_message: Some(err.to_string()),
        }
    }
}

fn pick_user_agent() -> &'static str {
    let idx = rand::thread_rng().gen_range(0..USER_AGENTS.len());
    USER_AGENTS[idx]
}

/// Compose a browser-style header set. Chromium UAs (Chrome, Edge) get the
/// full `Sec-CH-UA*` / `Sec-Fetch-*` client-hint set with a platform derived
/// from the UA string; Firefox/Safari do not send those.
fn browser_headers(user_agent: &str) -> reqwest::header::HeaderMap {
    use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

    let mut headers = HeaderMap::new();
    headers.insert(
        reqwest::header::USER_AGENT,
        HeaderValue::from_str(user_agent).expect("static UA strings are valid header values"),
    );
    headers.insert(
        reqwest::header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(
        reqwest::header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9"),
    );
    headers.insert(
        reqwest::header::ACCEPT_ENCODING,
        HeaderValue::from_static("gzip, deflate, br"),
    );
    headers.insert(
        reqwest::header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        HeaderName::from_static("pragma"),
        HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        reqwest::header::CONNECTION,
        HeaderValue::from_static("keep-alive"),
    );
    headers.insert(
        HeaderName::from_static("upgrade-insecure-requests"),
        HeaderValue::from_static("1"),
    );

    if is_chromium(user_agent) {
        let platform = chromium_platform(user_agent);
        headers.insert(
            HeaderName::from_static("sec-ch-ua"),
            HeaderValue::from_static(
                "\"Chromium\";v=\"124\", \"Google Chrome\";v=\"124\", \"Not-A.Brand\";v=\"99\"",
            ),
        );
        headers.insert(
            HeaderName::from_static("sec-ch-ua-mobile"),
            HeaderValue::from_static("?0"),
        );
        headers.insert(
            HeaderName::from_static("sec-ch-ua-platform"),
            HeaderValue::from_str(platform).unwrap_or_else(|_| HeaderValue::from_static("\"Unknown\"")),
        );
        headers.insert(
            HeaderName::from_static("sec-fetch-dest"),
            HeaderValue::from_static("document"),
        );
        headers.insert(
            HeaderName::from_static("sec-fetch-mode"),
            HeaderValue::from_static("navigate"),
        );
        headers.insert(
            HeaderName::from_static("sec-fetch-site"),
            HeaderValue::from_static("none"),
        );
        headers.insert(
            HeaderName::from_static("sec-fetch-user"),
            HeaderValue::from_static("?1"),
        );
    }

    headers
}

fn is_chromium(user_agent: &str) -> bool {
    user_agent.contains("Chrome") || user_agent.contains("Edg/")
}

fn chromium_platform(user_agent: &str) -> &'static str {
    if user_agent.contains("Windows") {
        "\"Windows\""
    } else if user_agent.contains("Macintosh") {
        "\"macOS\""
    } else {
        "\"Linux\""
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> ProbeEngine {
        ProbeEngine::new(reqwest::Client::new(), ProbeConfig::default())
    }

    #[test]
    fn classify_up_on_fast_200() {
        let result = engine().classify(200, 50, None);
        assert_eq!(result.health_status, HealthStatus::Up);
        assert!(result.is_healthy);
    }

    #[test]
    fn classify_degraded_on_slow_200() {
        let result = engine().classify(200, 3500, None);
        assert_eq!(result.health_status, HealthStatus::Degraded);
        assert!(result.is_healthy);
    }

    #[test]
    fn classify_down_on_5xx() {
        let result = engine().classify(500, 50, None);
        assert_eq!(result.health_status, HealthStatus::Down);
        assert!(!result.is_healthy);
    }

    #[test]
    fn classify_down_on_redirect_boundary() {
        // 400 is not healthy; 399 is (< 400 is the healthy upper bound).
        assert_eq!(engine().classify(399, 10, None).health_status, HealthStatus::Up);
        assert_eq!(engine().classify(400, 10, None).health_status, HealthStatus::Down);
    }

    #[test]
    fn deadline_exceeded_maps_to_408() {
        let err = ProbeError::DeadlineExceeded { elapsed_ms: 10_000 };
        assert_eq!(err.status_code(), 408);
    }

    #[test]
    fn transport_error_maps_to_zero() {
        let err = ProbeError::Transport("connection refused".into());
        assert_eq!(err.status_code(), 0);
    }

    #[test]
    fn chromium_platform_detection() {
        assert_eq!(
            chromium_platform("Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/124"),
            "\"Windows\""
        );
        assert_eq!(
            chromium_platform("Mozilla/5.0 (Macintosh; Intel Mac OS X) Chrome/124"),
            "\"macOS\""
        );
        assert_eq!(chromium_platform("Mozilla/5.0 (X11; Linux x86_64) Chrome/124"), "\"Linux\"");
    }

    #[test]
    fn firefox_is_not_chromium() {
        assert!(!is_chromium(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0"
        ));
    }
}
