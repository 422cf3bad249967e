//! Source retrieval with exponential backoff retry logic.
//!
//! This module downloads the raw text of each configured source URL. A
//! failed source is reported as unavailable rather than aborting the run;
//! the pipeline works with whatever subset of sources responded.
//!
//! # Architecture
//!
//! The module uses a trait-based design for flexibility:
//! - [`FetchText`]: Core trait defining an async URL-to-text fetch
//! - [`HttpFetcher`]: Wraps a `reqwest::Client` GET request
//! - [`RetryFetch`]: Decorator that adds retry logic to any `FetchText` implementation
//!
//! # Retry Strategy
//!
//! - Attempt count per source is configurable (first try included)
//! - Exponential backoff starting at the configured base delay
//! - Maximum delay capped at 30 seconds
//! - Random jitter (0-250ms) added to prevent thundering herd

use crate::models::{FetchOutcome, SourceReport};
use crate::settings::Settings;
use futures::stream::{self, StreamExt};
use rand::{rng, Rng};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{info, instrument, warn};

/// Trait for async retrieval of a document body.
///
/// Implementors turn a URL into its response text. The abstraction exists
/// so decorators (like retry logic) can wrap any underlying transport.
pub trait FetchText {
    /// The type of document body returned.
    type Body;

    /// Retrieve the document at `url`.
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to fetch
    ///
    /// # Returns
    ///
    /// The response body, or an error if the request failed or the server
    /// answered with a non-success status.
    async fn fetch(&self, url: &str) -> Result<Self::Body, Box<dyn Error>>;
}

/// Wrapper that adds exponential backoff retry logic to any [`FetchText`] implementation.
///
/// Transparently retries transient failures with exponential backoff and
/// jitter. Designed to ride out rate limiting, flaky DNS, and temporary
/// server errors on the public IP lists.
///
/// # Backoff Strategy
///
/// The delay between retries follows this formula:
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryFetch<T> {
    /// The underlying fetcher to wrap.
    inner: T,
    /// Maximum number of retry attempts before giving up.
    max_retries: usize,
    /// Initial delay between retries (doubles with each attempt).
    base_delay: StdDuration,
    /// Maximum delay cap to prevent excessive waiting.
    max_delay: StdDuration,
}

impl<T> RetryFetch<T>
where
    T: FetchText,
{
    /// Create a new retry wrapper around an existing [`FetchText`] implementation.
    ///
    /// # Arguments
    ///
    /// * `inner` - The underlying fetcher to wrap
    /// * `max_retries` - Maximum number of retry attempts after the first try
    /// * `base_delay` - Initial delay between retries
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }

    /// Delay before the next retry: exponential in the attempt number,
    /// clamped so large attempt counts neither overflow the shift nor
    /// exceed `max_delay`.
    fn backoff_delay(&self, attempt: usize) -> StdDuration {
        self.base_delay
            .saturating_mul(1 << (attempt - 1).min(31))
            .min(self.max_delay)
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> FetchText for RetryFetch<T>
where
    T: FetchText + fmt::Debug,
{
    type Body = T::Body;

    #[instrument(level = "info", skip_all, fields(url = %url))]
    async fn fetch(&self, url: &str) -> Result<Self::Body, Box<dyn Error>> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.fetch(url).await {
                Ok(body) => {
                    return Ok(body);
                }
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries {
                        warn!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis() as u128,
                            elapsed_ms_total = total_dt.as_millis() as u128,
                            error = %e,
                            "fetch() exhausted retries"
                        );
                        return Err(e);
                    }

                    // backoff calc
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = self.backoff_delay(attempt) + StdDuration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis() as u128,
                        elapsed_ms_total = total_dt.as_millis() as u128,
                        ?delay,
                        error = %e,
                        "fetch() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Plain HTTP GET fetcher backed by a shared [`reqwest::Client`].
///
/// Non-success statuses are turned into errors so the retry decorator
/// treats them like transport failures.
#[derive(Debug)]
pub struct HttpFetcher<'a> {
    /// The shared HTTP client (connection pool, headers, timeout).
    pub client: &'a reqwest::Client,
}

impl<'a> FetchText for HttpFetcher<'a> {
    type Body = String;

    #[instrument(level = "info", skip_all)]
    async fn fetch(&self, url: &str) -> Result<Self::Body, Box<dyn Error>> {
        let t0 = Instant::now();
        let res = self.client.get(url).send().await?.error_for_status()?;
        let body = res.text().await?;
        let dt = t0.elapsed();

        info!(
            elapsed_ms = dt.as_millis() as u128,
            bytes = body.len(),
            "GET succeeded"
        );
        Ok(body)
    }
}

/// Build the HTTP client shared by all source fetches.
///
/// Sends a browser-like User-Agent and Accept headers; several of the
/// public lists answer bot agents with an error page or an empty body.
///
/// # Arguments
///
/// * `settings` - Supplies the User-Agent string and per-attempt timeout
///
/// # Returns
///
/// A configured client, or an error if the client could not be built.
pub fn build_client(settings: &Settings) -> Result<reqwest::Client, Box<dyn Error>> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

    let client = reqwest::Client::builder()
        .user_agent(settings.user_agent.clone())
        .default_headers(headers)
        .timeout(StdDuration::from_secs(settings.fetch_timeout_secs))
        .build()?;
    Ok(client)
}

/// Fetch one source with retries, reducing the result to a [`SourceReport`].
///
/// Never returns an error: a source that stays unreachable after all
/// attempts is recorded as [`FetchOutcome::Unavailable`].
async fn fetch_source(
    client: &reqwest::Client,
    url: &str,
    max_retries: usize,
    base_delay: StdDuration,
) -> SourceReport {
    let fetcher = RetryFetch::new(HttpFetcher { client }, max_retries, base_delay);
    let outcome = match fetcher.fetch(url).await {
        Ok(body) => FetchOutcome::Retrieved(body),
        Err(_) => FetchOutcome::Unavailable,
    };
    SourceReport {
        url: url.to_string(),
        outcome,
    }
}

/// Fetch every configured source through a bounded worker pool.
///
/// Sources are fetched concurrently, at most `fetch_workers` in flight.
/// Completion order is arbitrary; one report is returned per source
/// regardless of success.
///
/// # Arguments
///
/// * `settings` - Source list and fetch tunables
/// * `client` - The shared HTTP client from [`build_client`]
///
/// # Returns
///
/// One [`SourceReport`] per configured source.
#[instrument(level = "info", skip_all)]
pub async fn fetch_sources(settings: &Settings, client: &reqwest::Client) -> Vec<SourceReport> {
    let total = settings.sources.len();
    let max_retries = settings.fetch_attempts.saturating_sub(1);
    let base_delay = StdDuration::from_millis(settings.retry_base_delay_ms);
    let done = AtomicUsize::new(0);

    let reports: Vec<SourceReport> = stream::iter(settings.sources.iter())
        .map(|url| {
            let done = &done;
            async move {
                let report = fetch_source(client, url, max_retries, base_delay).await;
                let n = done.fetch_add(1, Ordering::SeqCst) + 1;
                let host = url::Url::parse(url)
                    .ok()
                    .and_then(|u| u.host_str().map(str::to_string))
                    .unwrap_or_else(|| url.clone());
                if report.outcome.is_retrieved() {
                    info!(done = n, total, host = %host, "source retrieved");
                } else {
                    warn!(done = n, total, host = %host, "source unavailable");
                }
                report
            }
        })
        .buffer_unordered(settings.fetch_workers)
        .collect()
        .await;

    let retrieved = reports.iter().filter(|r| r.outcome.is_retrieved()).count();
    info!(retrieved, total, "source fetching finished");
    reports
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fails the first `fail_first` calls, then succeeds.
    #[derive(Debug)]
    struct FlakyFetcher {
        fail_first: usize,
        calls: AtomicUsize,
    }

    impl FetchText for FlakyFetcher {
        type Body = String;

        async fn fetch(&self, _url: &str) -> Result<String, Box<dyn Error>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Err("simulated outage".into())
            } else {
                Ok("1.1.1.1".to_string())
            }
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failures() {
        let flaky = FlakyFetcher {
            fail_first: 2,
            calls: AtomicUsize::new(0),
        };
        let fetcher = RetryFetch::new(flaky, 2, StdDuration::from_millis(1));
        let body = fetcher.fetch("https://example.com").await.unwrap();
        assert_eq!(body, "1.1.1.1");
        assert_eq!(fetcher.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_budget() {
        let flaky = FlakyFetcher {
            fail_first: usize::MAX,
            calls: AtomicUsize::new(0),
        };
        let fetcher = RetryFetch::new(flaky, 1, StdDuration::from_millis(1));
        assert!(fetcher.fetch("https://example.com").await.is_err());
        // One initial try plus one retry.
        assert_eq!(fetcher.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_retries_means_single_attempt() {
        let flaky = FlakyFetcher {
            fail_first: usize::MAX,
            calls: AtomicUsize::new(0),
        };
        let fetcher = RetryFetch::new(flaky, 0, StdDuration::from_millis(1));
        assert!(fetcher.fetch("https://example.com").await.is_err());
        assert_eq!(fetcher.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_delay_is_capped_for_large_attempt_counts() {
        let flaky = FlakyFetcher {
            fail_first: 0,
            calls: AtomicUsize::new(0),
        };
        let fetcher = RetryFetch::new(flaky, 100, StdDuration::from_millis(1));
        assert_eq!(fetcher.backoff_delay(1), StdDuration::from_millis(1));
        assert_eq!(fetcher.backoff_delay(5), StdDuration::from_millis(16));
        // Attempt counts past the shift width clamp instead of overflowing.
        assert_eq!(fetcher.backoff_delay(100), fetcher.max_delay);
    }

    #[test]
    fn test_build_client_accepts_defaults() {
        let settings = Settings::default();
        assert!(build_client(&settings).is_ok());
    }
}
