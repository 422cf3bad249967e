//! Best-effort location lookups for collected addresses.
//!
//! Each address gets one lookup against a public location service. The
//! service promises no schema stability, so any deviation (network error,
//! non-success HTTP status, unparsable body, missing fields) degrades to
//! [`GeoLabel::Unresolved`] instead of an error. Lookup failures are data
//! quality, not run failures.
//!
//! # Throttling
//!
//! Lookups run through a bounded worker pool, in batches with a short pause
//! between them, to stay inside the service's informal rate limits.

use crate::models::GeoLabel;
use crate::settings::Settings;
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use serde::Deserialize;
use std::error::Error;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration as StdDuration;
use tokio::time::sleep;
use tracing::{debug, info, instrument};

/// The subset of the lookup service's response this pipeline reads.
///
/// Every field is optional; a response missing any of them simply
/// contributes less (or nothing) to the label.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LookupResponse {
    status: Option<String>,
    country: Option<String>,
    #[serde(rename = "regionName")]
    region_name: Option<String>,
    city: Option<String>,
}

impl LookupResponse {
    /// Reduce the response to a location label.
    ///
    /// Returns `None` unless the service reported success and at least one
    /// location field is non-empty.
    fn into_label(self) -> Option<String> {
        if self.status.as_deref() != Some("success") {
            return None;
        }
        let label = [self.country, self.region_name, self.city]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .join("-");
        if label.is_empty() { None } else { Some(label) }
    }
}

/// Client for the external location-lookup service.
pub struct GeoClient {
    client: reqwest::Client,
    endpoint: String,
    lang: String,
}

impl GeoClient {
    /// Build a lookup client from the configured endpoint, language, and
    /// timeout.
    pub fn new(settings: &Settings) -> Result<Self, Box<dyn Error>> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(StdDuration::from_secs(settings.geo_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: settings.geo_api.trim_end_matches('/').to_string(),
            lang: settings.geo_lang.clone(),
        })
    }

    /// Resolve a best-effort location label for one address.
    ///
    /// Never fails: every problem along the way collapses to
    /// [`GeoLabel::Unresolved`].
    pub async fn lookup(&self, addr: IpAddr) -> GeoLabel {
        match self.try_lookup(addr).await {
            Ok(Some(label)) => GeoLabel::Resolved(label),
            Ok(None) => GeoLabel::Unresolved,
            Err(e) => {
                debug!(addr = %addr, error = %e, "location lookup failed");
                GeoLabel::Unresolved
            }
        }
    }

    async fn try_lookup(&self, addr: IpAddr) -> Result<Option<String>, Box<dyn Error>> {
        let url = self.lookup_url(&addr.to_string());
        let body = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let parsed: LookupResponse = serde_json::from_str(&body)?;
        Ok(parsed.into_label())
    }

    fn lookup_url(&self, addr: &str) -> String {
        format!(
            "{}/{}?lang={}&fields=status,country,regionName,city",
            self.endpoint,
            urlencoding::encode(addr),
            self.lang
        )
    }
}

/// Counts of lookups performed and lookups that produced a label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LookupStats {
    /// Lookups attempted (one per address).
    pub attempted: usize,
    /// Lookups that yielded a resolved label.
    pub resolved: usize,
}

impl LookupStats {
    /// Fraction of attempted lookups that resolved, in `0.0..=1.0`.
    pub fn success_rate(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            self.resolved as f64 / self.attempted as f64
        }
    }
}

/// Attach a location label to every address through a bounded worker pool.
///
/// Addresses are processed in batches of `lookup_batch_size`, with at most
/// `lookup_workers` lookups in flight and a pause between batches. Order of
/// the returned pairs is arbitrary.
///
/// # Arguments
///
/// * `client` - The lookup client
/// * `addrs` - Addresses of one family to annotate
/// * `settings` - Worker pool and batching tunables
///
/// # Returns
///
/// One `(address, label)` pair per input address, plus lookup statistics.
#[instrument(level = "info", skip_all, fields(total = addrs.len()))]
pub async fn annotate_addresses<A>(
    client: &GeoClient,
    addrs: &[A],
    settings: &Settings,
) -> (Vec<(A, GeoLabel)>, LookupStats)
where
    A: Copy + Into<IpAddr>,
{
    let total = addrs.len();
    let done = AtomicUsize::new(0);
    let resolved = AtomicUsize::new(0);
    let batches = total.div_ceil(settings.lookup_batch_size);
    let mut labeled: Vec<(A, GeoLabel)> = Vec::with_capacity(total);

    for (batch_no, chunk) in addrs.chunks(settings.lookup_batch_size).enumerate() {
        let mut batch: Vec<(A, GeoLabel)> = stream::iter(chunk.iter().copied())
            .map(|addr| {
                let done = &done;
                let resolved = &resolved;
                async move {
                    let label = client.lookup(addr.into()).await;
                    if label.is_resolved() {
                        resolved.fetch_add(1, Ordering::SeqCst);
                    }
                    let n = done.fetch_add(1, Ordering::SeqCst) + 1;
                    if n % 100 == 0 {
                        info!(done = n, total, "location lookups progressing");
                    }
                    (addr, label)
                }
            })
            .buffer_unordered(settings.lookup_workers)
            .collect()
            .await;
        labeled.append(&mut batch);
        info!(
            batch = batch_no + 1,
            batches,
            done = labeled.len(),
            total,
            "lookup batch completed"
        );

        if labeled.len() < total {
            sleep(StdDuration::from_millis(settings.lookup_batch_pause_ms)).await;
        }
    }

    let stats = LookupStats {
        attempted: done.load(Ordering::SeqCst),
        resolved: resolved.load(Ordering::SeqCst),
    };
    info!(
        attempted = stats.attempted,
        resolved = stats.resolved,
        "location lookups finished"
    );
    (labeled, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_label_joins_nonempty_parts() {
        let resp = LookupResponse {
            status: Some("success".to_string()),
            country: Some("United States".to_string()),
            region_name: Some("California".to_string()),
            city: Some("Los Angeles".to_string()),
        };
        assert_eq!(
            resp.into_label(),
            Some("United States-California-Los Angeles".to_string())
        );
    }

    #[test]
    fn test_label_skips_empty_parts() {
        let resp = LookupResponse {
            status: Some("success".to_string()),
            country: Some("Deutschland".to_string()),
            region_name: Some(String::new()),
            city: None,
        };
        assert_eq!(resp.into_label(), Some("Deutschland".to_string()));
    }

    #[test]
    fn test_failed_status_yields_no_label() {
        let resp = LookupResponse {
            status: Some("fail".to_string()),
            country: Some("United States".to_string()),
            ..Default::default()
        };
        assert_eq!(resp.into_label(), None);
    }

    #[test]
    fn test_missing_status_yields_no_label() {
        let resp: LookupResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(resp.into_label(), None);
    }

    #[test]
    fn test_success_without_location_fields_yields_no_label() {
        let resp: LookupResponse = serde_json::from_str(r#"{"status":"success"}"#).unwrap();
        assert_eq!(resp.into_label(), None);
    }

    #[test]
    fn test_response_parses_service_field_names() {
        let body = r#"{"status":"success","country":"美国","regionName":"加州","city":"San Jose"}"#;
        let resp: LookupResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.into_label(), Some("美国-加州-San Jose".to_string()));
    }

    #[test]
    fn test_lookup_url_percent_encodes_address() {
        let client = GeoClient::new(&Settings::default()).unwrap();
        let url = client.lookup_url("2606:4700:4700::1111");
        assert!(url.starts_with("http://ip-api.com/json/2606%3A4700%3A4700%3A%3A1111?"));
        assert!(url.ends_with("lang=zh-CN&fields=status,country,regionName,city"));
    }

    #[tokio::test]
    async fn test_unreachable_service_degrades_every_lookup_to_unresolved() {
        let mut settings = Settings::default();
        // Port 1 on loopback refuses immediately; no real service is hit.
        settings.geo_api = "http://127.0.0.1:1/json".to_string();
        let client = GeoClient::new(&settings).unwrap();

        let addrs = [
            Ipv4Addr::new(1, 1, 1, 1),
            Ipv4Addr::new(9, 9, 9, 9),
            Ipv4Addr::new(104, 16, 0, 1),
        ];
        let (labeled, stats) = annotate_addresses(&client, &addrs, &settings).await;

        assert_eq!(labeled.len(), addrs.len());
        assert!(labeled.iter().all(|(_, label)| *label == GeoLabel::Unresolved));
        assert!(labeled.iter().all(|(_, label)| label.as_text() == "unknown"));
        assert_eq!(
            stats,
            LookupStats {
                attempted: 3,
                resolved: 0
            }
        );
    }

    #[test]
    fn test_success_rate_handles_zero_attempts() {
        assert_eq!(LookupStats::default().success_rate(), 0.0);
        let stats = LookupStats {
            attempted: 4,
            resolved: 3,
        };
        assert!((stats.success_rate() - 0.75).abs() < f64::EPSILON);
    }
}
